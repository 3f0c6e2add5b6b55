use alloy_primitives::{Address, SignatureError, B256};
use rn_common::{
    client::ClientError,
    db::StoreError,
    engine::{CommitError, EngineError},
    tx::QueueOrigin,
};
use rn_epoch::EpochError;

use crate::{gas::FeeError, verify::VerifyError};

#[derive(Debug, thiserror::Error)]
pub enum ApplyError {
    #[error("queue origin l1 to l2 transaction without a timestamp: {0}")]
    MissingL1Timestamp(B256),

    #[error("received tx at index {index} when looking for {next}")]
    IndexAhead { index: u64, next: u64 },

    #[error("received block at index {index} when looking for {next}")]
    BlockAhead { index: u64, next: u64 },

    #[error("no index found on transaction {0}")]
    MissingIndex(B256),

    #[error("current sequencer incorrect, expected {expected}, local {local:?}")]
    NotSequencer { expected: Address, local: Option<Address> },

    #[error("tx {hash} has no sequencer signature, expected signer {expected}")]
    MissingSignature { hash: B256, expected: Address },

    #[error("tx signed by {recovered}, expected signer {expected}")]
    SignerMismatch { recovered: Address, expected: Address },

    #[error("invalid sequencer signature: {0}")]
    Recovery(#[from] SignatureError),

    #[error("invalid sender: {0}")]
    InvalidSender(SignatureError),

    #[error("sequencer signing key not set")]
    NoSigningKey,

    #[error("failed to sign: {0}")]
    Signing(#[from] alloy_signer::Error),

    #[error(transparent)]
    Epoch(#[from] EpochError),

    #[error(transparent)]
    Commit(#[from] CommitError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("failed to refresh gas price oracle cache: {0}")]
    GasOracle(EngineError),

    #[error("block {0} is not found")]
    BlockNotFound(u64),

    #[error("block {number} has {local} transactions locally, {remote} remotely")]
    BlockLengthMismatch { number: u64, local: usize, remote: usize },

    #[error("more than one transaction found in block {0}")]
    MultipleTransactions(u64),

    #[error("verifier does not accept transactions out of band")]
    VerifierRejects,

    #[error("sequencer is syncing")]
    Syncing,

    #[error("invalid transaction with queue origin {0:?}")]
    InvalidOrigin(QueueOrigin),

    #[error(transparent)]
    Fee(#[from] FeeError),
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("remote tip {remote} is behind local index {local}")]
    ShortRemoteTip { remote: u64, local: u64 },

    #[error("latest remote index is not defined")]
    UndefinedLatest,

    #[error("enqueue {queue_index} not included, tx {hash}")]
    EnqueueNotIncluded { queue_index: u64, hash: B256 },

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Apply(#[from] ApplyError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Epoch(#[from] EpochError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Verify(#[from] VerifyError),
}

impl SyncError {
    /// The remote source has no more items
    pub fn is_not_found(&self) -> bool {
        matches!(self, SyncError::Client(err) if err.is_not_found())
    }

    /// The chain went past the last committed epoch
    pub fn is_epoch_number_exceeds(&self) -> bool {
        match self {
            SyncError::Epoch(err) | SyncError::Apply(ApplyError::Epoch(err)) => {
                err.is_epoch_number_exceeds_known()
            }
            _ => false,
        }
    }

    pub fn is_short_remote_tip(&self) -> bool {
        matches!(self, SyncError::ShortRemoteTip { .. })
    }
}
