use alloy_primitives::Address;

#[derive(Debug, thiserror::Error)]
pub enum EpochError {
    /// The contract has no epoch recorded for this height yet
    #[error("epoch {epoch} for height {height} exceeds current epoch {current}")]
    EpochNumberExceedsKnown { height: u64, epoch: u64, current: u64 },

    #[error("respan at block {respan_start} not reached, head {head}, requested height {height}")]
    RespanPending { height: u64, head: u64, respan_start: u64 },

    #[error("pre-respan to other sequencer at block {height}, next signer {next_signer}")]
    PreRespanToOther { height: u64, next_signer: Address },

    #[error("respan to this sequencer starts at block {start}, requested height {height}")]
    NotYetNextSigner { height: u64, start: u64 },

    #[error("epoch contract call failed: {0}")]
    Contract(String),
}

impl EpochError {
    pub fn is_epoch_number_exceeds_known(&self) -> bool {
        matches!(self, EpochError::EpochNumberExceedsKnown { .. })
    }
}
