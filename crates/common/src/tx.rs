use alloy_consensus::{SignableTransaction, Transaction, TxEnvelope, TxLegacy};
use alloy_eips::eip2718::{Decodable2718, Encodable2718};
use alloy_primitives::{
    Address, Bytes, PrimitiveSignature, SignatureError, TxKind, B256, U256,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum QueueOrigin {
    #[default]
    #[serde(rename = "sequencer")]
    Sequencer,
    /// Forced inclusion from L1
    #[serde(rename = "l1")]
    L1ToL2,
}

/// Sequencer signature over the transaction hash
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SeqSign {
    pub r: U256,
    pub s: U256,
    pub v: u64,
}

impl SeqSign {
    pub const fn zero() -> Self {
        Self { r: U256::ZERO, s: U256::ZERO, v: 0 }
    }

    pub fn is_zero(&self) -> bool {
        self.r.is_zero() && self.s.is_zero() && self.v == 0
    }

    pub fn recover(&self, hash: B256) -> Result<Address, SignatureError> {
        let parity = match self.v {
            0 | 27 => false,
            1 | 28 => true,
            v => return Err(SignatureError::InvalidParity(v)),
        };
        PrimitiveSignature::new(self.r, self.s, parity).recover_address_from_prehash(&hash)
    }

    /// Parses the `r,s,v` form used by the data transport layer
    pub fn parse(raw: &str) -> Option<Self> {
        let mut parts = raw.split(',');
        let r = parts.next()?.trim().parse().ok()?;
        let s = parts.next()?.trim().parse().ok()?;
        let v = parts.next()?.trim();
        let v = match v.strip_prefix("0x") {
            Some(hex) => u64::from_str_radix(hex, 16).ok()?,
            None => v.parse().ok()?,
        };
        if parts.next().is_some() {
            return None;
        }
        Some(Self { r, s, v })
    }
}

impl From<PrimitiveSignature> for SeqSign {
    fn from(sig: PrimitiveSignature) -> Self {
        Self { r: sig.r(), s: sig.s(), v: sig.v() as u64 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionMeta {
    pub l1_block_number: Option<u64>,
    pub l1_timestamp: u64,
    /// Originating L1 account, set for forced inclusions
    pub l1_message_sender: Option<Address>,
    pub queue_origin: QueueOrigin,
    /// Canonical transaction chain position
    pub index: Option<u64>,
    pub queue_index: Option<u64>,
    pub raw_transaction: Bytes,
    pub seq_sign: Option<SeqSign>,
}

/// A transaction together with its rollup metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollupTransaction {
    pub tx: TxEnvelope,
    pub meta: TransactionMeta,
}

impl RollupTransaction {
    /// Wraps a user transaction submitted to the sequencer
    pub fn sequencer(tx: TxEnvelope) -> Self {
        let raw_transaction = tx.encoded_2718().into();
        Self {
            tx,
            meta: TransactionMeta {
                queue_origin: QueueOrigin::Sequencer,
                raw_transaction,
                ..Default::default()
            },
        }
    }

    /// Decodes an EIP-2718 envelope submitted to the sequencer
    pub fn decode_sequencer(raw: &[u8]) -> eyre::Result<Self> {
        let tx = TxEnvelope::decode_2718(&mut &raw[..])?;
        let mut tx = Self::sequencer(tx);
        tx.meta.raw_transaction = Bytes::copy_from_slice(raw);
        Ok(tx)
    }

    /// Builds a forced inclusion, these carry no meaningful signature
    #[allow(clippy::too_many_arguments)]
    pub fn enqueue(
        chain_id: u64,
        queue_index: u64,
        target: Address,
        gas_limit: u64,
        data: Bytes,
        origin: Address,
        l1_block_number: u64,
        l1_timestamp: u64,
    ) -> Self {
        let tx = TxLegacy {
            chain_id: Some(chain_id),
            nonce: queue_index,
            gas_price: 0,
            gas_limit,
            to: TxKind::Call(target),
            value: U256::ZERO,
            input: data,
        };
        let tx: TxEnvelope =
            tx.into_signed(PrimitiveSignature::new(U256::ZERO, U256::ZERO, false)).into();
        let raw_transaction = tx.encoded_2718().into();

        Self {
            tx,
            meta: TransactionMeta {
                l1_block_number: Some(l1_block_number),
                l1_timestamp,
                l1_message_sender: Some(origin),
                queue_origin: QueueOrigin::L1ToL2,
                index: None,
                queue_index: Some(queue_index),
                raw_transaction,
                seq_sign: None,
            },
        }
    }

    pub fn hash(&self) -> B256 {
        *self.tx.tx_hash()
    }

    pub fn is_l1_to_l2(&self) -> bool {
        self.meta.queue_origin == QueueOrigin::L1ToL2
    }

    /// L1 origin for forced inclusions, recovered signer otherwise
    pub fn sender(&self) -> Result<Address, SignatureError> {
        match (self.meta.queue_origin, self.meta.l1_message_sender) {
            (QueueOrigin::L1ToL2, Some(origin)) => Ok(origin),
            _ => self.tx.recover_signer(),
        }
    }

    pub fn to(&self) -> Option<Address> {
        self.tx.to()
    }

    pub fn value(&self) -> U256 {
        self.tx.value()
    }

    pub fn input(&self) -> &Bytes {
        self.tx.input()
    }

    pub fn gas_price(&self) -> u128 {
        self.tx.gas_price().unwrap_or_else(|| self.tx.max_fee_per_gas())
    }

    /// Compares a replayed transaction with the one committed at the same position
    pub fn matches_committed(&self, committed: &RollupTransaction) -> bool {
        let to = |tx: &RollupTransaction| tx.to().unwrap_or_default();

        to(self) == to(committed) &&
            self.input() == committed.input() &&
            self.tx.gas_limit() == committed.tx.gas_limit() &&
            self.meta.queue_origin == committed.meta.queue_origin &&
            self.meta.l1_message_sender == committed.meta.l1_message_sender &&
            self.meta.l1_block_number == committed.meta.l1_block_number
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RollupBlock {
    pub number: u64,
    pub timestamp: u64,
    pub state_root: B256,
    pub transactions: Vec<RollupTransaction>,
}

impl RollupBlock {
    /// Index of the block in the canonical chain, the genesis block has none
    pub fn index(&self) -> Option<u64> {
        self.number.checked_sub(1)
    }
}
