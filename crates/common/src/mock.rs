//! In-memory collaborators for tests

use std::{
    collections::HashMap,
    sync::atomic::{AtomicUsize, Ordering},
};

use alloy_consensus::{SignableTransaction, TxLegacy};
use alloy_primitives::{Address, Bytes, TxKind, B256, U256};
use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;
use async_trait::async_trait;
use parking_lot::Mutex;

use crate::{
    client::{Batch, ClientError, RollupClient},
    engine::{CommitError, EngineError, ExecutionEngine, PendingCommit},
    tx::{RollupBlock, RollupTransaction},
    types::{Backend, EthContext, SyncStatus},
};

pub const TEST_CHAIN_ID: u64 = 1088;

/// Legacy transfer signed by `signer`
pub fn transfer(
    signer: &PrivateKeySigner,
    nonce: u64,
    to: Address,
    value: U256,
) -> RollupTransaction {
    call(signer, nonce, to, value, Bytes::new())
}

pub fn call(
    signer: &PrivateKeySigner,
    nonce: u64,
    to: Address,
    value: U256,
    input: Bytes,
) -> RollupTransaction {
    let tx = TxLegacy {
        chain_id: Some(TEST_CHAIN_ID),
        nonce,
        gas_price: 1_000_000_000,
        gas_limit: 1_000_000,
        to: TxKind::Call(to),
        value,
        input,
    };
    let sig = signer.sign_hash_sync(&tx.signature_hash()).unwrap();
    RollupTransaction::sequencer(tx.into_signed(sig).into())
}

pub fn enqueue(queue_index: u64, l1_block_number: u64, l1_timestamp: u64) -> RollupTransaction {
    RollupTransaction::enqueue(
        TEST_CHAIN_ID,
        queue_index,
        Address::with_last_byte(0x07),
        1_000_000,
        Bytes::new(),
        Address::with_last_byte(0xcc),
        l1_block_number,
        l1_timestamp,
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifierReport {
    pub index: u64,
    pub state_root: B256,
    pub verifier_root: B256,
    pub success: bool,
}

#[derive(Debug, Default)]
pub struct MockRemote {
    /// By queue index
    pub enqueues: Vec<RollupTransaction>,
    /// By canonical index
    pub transactions: Vec<RollupTransaction>,
    pub transaction_batches: Vec<(Batch, Vec<RollupTransaction>)>,
    /// Batches from this index are only served as block batches
    pub inbox_batches_from: Option<u64>,
    /// By block index
    pub blocks: Vec<RollupBlock>,
    pub block_batches: Vec<(Batch, Vec<RollupBlock>)>,
    pub state_roots: HashMap<u64, B256>,
    pub eth_contexts: HashMap<u64, EthContext>,
    pub latest_context: Option<EthContext>,
    pub syncing: bool,
    pub verifier_reports: Vec<VerifierReport>,
}

/// [`RollupClient`] serving data from memory
#[derive(Debug, Default)]
pub struct MockRollupClient {
    pub remote: Mutex<MockRemote>,
    fetches: AtomicUsize,
}

impl MockRollupClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of item fetches served so far
    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }

    fn fetched(&self) {
        self.fetches.fetch_add(1, Ordering::Relaxed);
    }
}

fn latest<T>(items: &[T]) -> Result<Option<u64>, ClientError> {
    match items.len() {
        0 => Err(ClientError::NotFound),
        n => Ok(Some(n as u64 - 1)),
    }
}

fn nth<T: Clone>(items: &[T], index: u64) -> Result<T, ClientError> {
    items.get(index as usize).cloned().ok_or(ClientError::NotFound)
}

#[async_trait]
impl RollupClient for MockRollupClient {
    async fn sync_status(&self, _backend: Backend) -> Result<SyncStatus, ClientError> {
        let remote = self.remote.lock();
        Ok(SyncStatus {
            syncing: remote.syncing,
            highest_known_transaction_index: None,
            current_transaction_index: remote.transactions.len().checked_sub(1).map(|i| i as u64),
        })
    }

    async fn latest_eth_context(&self) -> Result<EthContext, ClientError> {
        self.remote.lock().latest_context.ok_or(ClientError::NotFound)
    }

    async fn eth_context(&self, height: u64) -> Result<EthContext, ClientError> {
        self.remote.lock().eth_contexts.get(&height).copied().ok_or(ClientError::NotFound)
    }

    async fn enqueue(&self, index: u64) -> Result<RollupTransaction, ClientError> {
        self.fetched();
        nth(&self.remote.lock().enqueues, index)
    }

    async fn latest_enqueue(&self) -> Result<RollupTransaction, ClientError> {
        self.remote.lock().enqueues.last().cloned().ok_or(ClientError::NotFound)
    }

    async fn transaction(
        &self,
        index: u64,
        _backend: Backend,
    ) -> Result<RollupTransaction, ClientError> {
        self.fetched();
        nth(&self.remote.lock().transactions, index)
    }

    async fn latest_transaction_index(
        &self,
        _backend: Backend,
    ) -> Result<Option<u64>, ClientError> {
        latest(&self.remote.lock().transactions)
    }

    async fn raw_transaction_batch_index(
        &self,
        index: u64,
        _backend: Backend,
    ) -> Result<Option<u64>, ClientError> {
        let remote = self.remote.lock();
        nth(&remote.transactions, index)?;
        Ok(remote
            .transaction_batches
            .iter()
            .find(|(batch, _)| {
                (batch.prev_total_elements..batch.prev_total_elements + batch.size).contains(&index)
            })
            .map(|(batch, _)| batch.index))
    }

    async fn transaction_batch(
        &self,
        index: u64,
    ) -> Result<(Batch, Vec<RollupTransaction>), ClientError> {
        self.fetched();
        let remote = self.remote.lock();
        if remote.inbox_batches_from.is_some_and(|from| index >= from) {
            return Err(ClientError::UseInboxBatch(index));
        }
        nth(&remote.transaction_batches, index)
    }

    async fn latest_transaction_batch_index(&self) -> Result<Option<u64>, ClientError> {
        let remote = self.remote.lock();
        let tx_batches = latest(&remote.transaction_batches).ok().flatten();
        let block_batches = remote.block_batches.iter().map(|(batch, _)| batch.index).max();
        match tx_batches.max(block_batches) {
            Some(index) => Ok(Some(index)),
            None => Err(ClientError::NotFound),
        }
    }

    async fn block(&self, index: u64, _backend: Backend) -> Result<RollupBlock, ClientError> {
        self.fetched();
        nth(&self.remote.lock().blocks, index)
    }

    async fn raw_block_batch_index(
        &self,
        index: u64,
        _backend: Backend,
    ) -> Result<Option<u64>, ClientError> {
        let remote = self.remote.lock();
        nth(&remote.blocks, index)?;
        Ok(remote
            .block_batches
            .iter()
            .find(|(_, blocks)| blocks.iter().any(|block| block.index() == Some(index)))
            .map(|(batch, _)| batch.index))
    }

    async fn latest_block_index(&self, _backend: Backend) -> Result<Option<u64>, ClientError> {
        latest(&self.remote.lock().blocks)
    }

    async fn block_batch(&self, index: u64) -> Result<(Batch, Vec<RollupBlock>), ClientError> {
        self.fetched();
        let remote = self.remote.lock();
        remote
            .block_batches
            .iter()
            .find(|(batch, _)| batch.index == index)
            .cloned()
            .ok_or(ClientError::NotFound)
    }

    async fn state_root(&self, index: u64) -> Result<B256, ClientError> {
        Ok(self.remote.lock().state_roots.get(&index).copied().unwrap_or_default())
    }

    async fn set_last_verifier(
        &self,
        index: u64,
        state_root: B256,
        verifier_root: B256,
        success: bool,
    ) -> Result<(), ClientError> {
        self.remote.lock().verifier_reports.push(VerifierReport {
            index,
            state_root,
            verifier_root,
            success,
        });
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MockChain {
    /// `blocks[i]` has number `i + 1`
    pub blocks: Vec<RollupBlock>,
    pub storage: HashMap<(Address, U256), U256>,
    /// Root reported for the head
    pub state_root: B256,
    pub pool: Vec<RollupTransaction>,
    pub relayed: Vec<RollupTransaction>,
    /// Fails the next `mine` call
    pub mine_error: Option<String>,
    /// Fails every `validate_tx` call
    pub reject: Option<String>,
    /// Keeps mined transactions out of the chain, as if the engine dropped them
    pub drop_mined: bool,
}

/// [`ExecutionEngine`] that mines synchronously into memory
#[derive(Debug, Default)]
pub struct MockEngine {
    pub chain: Mutex<MockChain>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Chain with `head` single transaction blocks
    pub fn with_head(head: u64) -> Self {
        let engine = Self::new();
        {
            let mut chain = engine.chain.lock();
            for number in 1..=head {
                let mut tx = enqueue(number - 1, number, 1_700_000_000 + number);
                tx.meta.index = Some(number - 1);
                chain.blocks.push(RollupBlock {
                    number,
                    timestamp: tx.meta.l1_timestamp,
                    state_root: B256::ZERO,
                    transactions: vec![tx],
                });
            }
        }
        engine
    }

    pub fn set_storage(&self, address: Address, slot: u64, value: U256) {
        self.chain.lock().storage.insert((address, U256::from(slot)), value);
    }

    pub fn head(&self) -> u64 {
        self.chain.lock().blocks.len() as u64
    }

    pub fn last_block(&self) -> Option<RollupBlock> {
        self.chain.lock().blocks.last().cloned()
    }

    fn push(chain: &mut MockChain, txs: Vec<RollupTransaction>) {
        let number = chain.blocks.len() as u64 + 1;
        let timestamp = txs.first().map(|tx| tx.meta.l1_timestamp).unwrap_or_default();
        let state_root = chain.state_root;
        chain.blocks.push(RollupBlock { number, timestamp, state_root, transactions: txs });
    }
}

#[async_trait]
impl ExecutionEngine for MockEngine {
    async fn head_number(&self) -> Result<u64, EngineError> {
        Ok(self.head())
    }

    async fn head_state_root(&self) -> Result<B256, EngineError> {
        Ok(self.chain.lock().state_root)
    }

    async fn block_by_number(&self, number: u64) -> Result<Option<RollupBlock>, EngineError> {
        let Some(index) = number.checked_sub(1) else {
            return Ok(Some(RollupBlock::default()));
        };
        Ok(self.chain.lock().blocks.get(index as usize).cloned())
    }

    async fn storage_at(&self, address: Address, slot: U256) -> Result<U256, EngineError> {
        Ok(self.chain.lock().storage.get(&(address, slot)).copied().unwrap_or_default())
    }

    async fn contains_transaction(&self, hash: B256) -> Result<bool, EngineError> {
        let chain = self.chain.lock();
        Ok(chain.blocks.iter().flat_map(|block| &block.transactions).any(|tx| tx.hash() == hash))
    }

    async fn validate_tx(&self, _tx: &RollupTransaction, _local: bool) -> Result<(), EngineError> {
        match &self.chain.lock().reject {
            Some(reason) => Err(EngineError::Rejected(reason.clone())),
            None => Ok(()),
        }
    }

    async fn add_local(&self, tx: RollupTransaction) -> Result<(), EngineError> {
        let mut chain = self.chain.lock();
        if let Some(reason) = &chain.reject {
            return Err(EngineError::Rejected(reason.clone()));
        }
        chain.pool.push(tx);
        Ok(())
    }

    fn mine(&self, txs: Vec<RollupTransaction>) -> PendingCommit {
        let mut chain = self.chain.lock();
        if let Some(err) = chain.mine_error.take() {
            return PendingCommit::ready(Err(CommitError::Execution(err)));
        }
        if !chain.drop_mined {
            Self::push(&mut chain, txs);
        }
        PendingCommit::ready(Ok(()))
    }

    fn relay_other(&self, txs: Vec<RollupTransaction>) {
        let mut chain = self.chain.lock();
        chain.relayed.extend(txs.iter().cloned());
        Self::push(&mut chain, txs);
    }
}
