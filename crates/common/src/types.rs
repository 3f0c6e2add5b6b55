use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

use alloy_primitives::B256;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeMode {
    Sequencer,
    Verifier,
}

/// Upstream a verifier syncs against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Data posted to L1
    L1,
    /// Blocks seen by other L2 nodes
    L2,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::L1 => "l1",
            Backend::L2 => "l2",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// L1 context at a given height
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EthContext {
    pub block_number: u64,
    pub timestamp: u64,
    #[serde(default)]
    pub block_hash: B256,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub syncing: bool,
    pub highest_known_transaction_index: Option<u64>,
    pub current_transaction_index: Option<u64>,
}

/// Most recent L1 context assigned to produced transactions
#[derive(Debug, Default)]
pub struct OvmContext {
    block_number: AtomicU64,
    timestamp: AtomicU64,
}

impl OvmContext {
    pub fn block_number(&self) -> u64 {
        self.block_number.load(Ordering::Relaxed)
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp.load(Ordering::Relaxed)
    }

    pub fn set_block_number(&self, block_number: u64) {
        self.block_number.store(block_number, Ordering::Relaxed);
    }

    pub fn set_timestamp(&self, timestamp: u64) {
        self.timestamp.store(timestamp, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> OvmSnapshot {
        OvmSnapshot { block_number: self.block_number(), timestamp: self.timestamp() }
    }

    pub fn restore(&self, snapshot: OvmSnapshot) {
        self.set_block_number(snapshot.block_number);
        self.set_timestamp(snapshot.timestamp);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OvmSnapshot {
    pub block_number: u64,
    pub timestamp: u64,
}
