use alloy_primitives::Address;

use crate::{contract::Epoch, respan::RespanQueue};

/// Last epoch fetched from the contract. Never persisted, rebuilt lazily after a restart
#[derive(Debug, Clone, Default)]
pub struct CachedEpoch {
    pub signer: Address,
    pub start_block: u64,
    pub end_block: u64,
    /// `false` forces a contract read on the next lookup
    pub valid: bool,
    pub respans: RespanQueue,
}

impl CachedEpoch {
    pub fn fill(&mut self, epoch: &Epoch) {
        self.signer = epoch.signer;
        self.start_block = epoch.start_block;
        self.end_block = epoch.end_block;
        self.valid = true;
    }

    pub fn covers(&self, height: u64) -> bool {
        (self.start_block..=self.end_block).contains(&height)
    }

    /// Drops the entry if it was validated for a range not containing `height`
    pub fn check_range(&mut self, height: u64) {
        if self.valid && !self.covers(height) {
            self.valid = false;
        }
    }
}

/// Signer transition announced ahead of the respan transaction itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreRespan {
    pub pre_signer: Address,
    pub new_signer: Address,
    pub start_block: u64,
}

impl PreRespan {
    /// `signer` is not the announced successor at `height`
    pub fn excludes(&self, signer: Address, height: u64) -> bool {
        self.start_block != 0 &&
            !self.new_signer.is_zero() &&
            height >= self.start_block &&
            self.new_signer != signer
    }
}
