//! In-memory sequencer set contract

use std::{
    collections::HashMap,
    sync::atomic::{AtomicUsize, Ordering},
};

use alloy_primitives::{Address, Bytes, U256};
use async_trait::async_trait;
use parking_lot::Mutex;

use crate::{
    contract::{Epoch, EpochSource},
    error::EpochError,
    respan::RECOMMIT_EPOCH_SELECTOR,
};

/// `recommitEpoch` calldata moving blocks from `start` to `end` to `signer`
pub fn recommit_calldata(start: u64, end: u64, signer: Address) -> Bytes {
    let mut data = RECOMMIT_EPOCH_SELECTOR.to_vec();
    for word in [U256::from(1), U256::from(2), U256::from(start), U256::from(end)] {
        data.extend_from_slice(&word.to_be_bytes::<32>());
    }
    data.extend_from_slice(&[0u8; 12]);
    data.extend_from_slice(signer.as_slice());
    data.into()
}

#[derive(Debug, Default)]
pub struct MockSeqSet {
    /// `epochs[i]` has number `i`
    pub epochs: Vec<Epoch>,
    /// Highest committed epoch number
    pub current: u64,
    pub mpc: Address,
    pub balances: HashMap<Address, U256>,
    pub finalized: u64,
    /// Fails every call
    pub fail: bool,
}

#[derive(Debug, Default)]
pub struct MockEpochSource {
    pub state: Mutex<MockSeqSet>,
    lookups: AtomicUsize,
}

impl MockEpochSource {
    /// Consecutive epochs starting at block 0, one per signer
    pub fn with_epochs(length: u64, signers: &[Address]) -> Self {
        let source = Self::default();
        {
            let mut state = source.state.lock();
            for (number, signer) in signers.iter().enumerate() {
                let number = number as u64;
                state.epochs.push(Epoch {
                    number,
                    signer: *signer,
                    start_block: number * length,
                    end_block: (number + 1) * length - 1,
                });
            }
            state.current = signers.len().saturating_sub(1) as u64;
        }
        source
    }

    pub fn push_epoch(&self, signer: Address, start_block: u64, end_block: u64) {
        let mut state = self.state.lock();
        let number = state.epochs.len() as u64;
        state.epochs.push(Epoch { number, signer, start_block, end_block });
        state.current = number;
    }

    /// Rewrites the epoch covering `start_block` onwards, as a recommit does
    pub fn recommit(&self, signer: Address, start_block: u64, end_block: u64) {
        let mut state = self.state.lock();
        if let Some(epoch) = state.epochs.iter_mut().find(|epoch| epoch.contains(start_block)) {
            epoch.end_block = start_block.saturating_sub(1);
        }
        let number = state.epochs.len() as u64;
        state.epochs.push(Epoch { number, signer, start_block, end_block });
        state.current = number;
    }

    pub fn set_mpc(&self, mpc: Address, balance: U256) {
        let mut state = self.state.lock();
        state.mpc = mpc;
        state.balances.insert(mpc, balance);
    }

    /// Number of `epoch_by_block` reads, one per cache refresh
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::Relaxed)
    }

    fn check(&self) -> Result<parking_lot::MutexGuard<'_, MockSeqSet>, EpochError> {
        let state = self.state.lock();
        if state.fail {
            return Err(EpochError::Contract("mock failure".into()));
        }
        Ok(state)
    }
}

#[async_trait]
impl EpochSource for MockEpochSource {
    async fn current_epoch_number(&self) -> Result<u64, EpochError> {
        Ok(self.check()?.current)
    }

    async fn epoch(&self, number: u64) -> Result<Epoch, EpochError> {
        self.check()?
            .epochs
            .iter()
            .find(|epoch| epoch.number == number)
            .copied()
            .ok_or_else(|| EpochError::Contract(format!("unknown epoch {number}")))
    }

    async fn epoch_by_block(&self, height: u64) -> Result<u64, EpochError> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        let state = self.check()?;
        // newest first, recommitted epochs shadow the ones they cut short
        Ok(state
            .epochs
            .iter()
            .rev()
            .find(|epoch| epoch.contains(height))
            .map(|epoch| epoch.number)
            .unwrap_or(state.current + 1))
    }

    async fn finalized_block(&self) -> Result<u64, EpochError> {
        Ok(self.check()?.finalized)
    }

    async fn mpc_address(&self) -> Result<Address, EpochError> {
        Ok(self.check()?.mpc)
    }

    async fn balance(&self, address: Address) -> Result<U256, EpochError> {
        Ok(self.check()?.balances.get(&address).copied().unwrap_or_default())
    }
}
