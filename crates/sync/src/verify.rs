use std::time::Duration;

use alloy_primitives::B256;
use rn_common::{client::{ClientError, RollupClient}, metrics::VerifierMetrics};
use tracing::{error, info};

/// Roughly ten hours of polling at the default delay
const STATE_ROOT_RETRIES: usize = 36_000;
const STATE_ROOT_RETRY_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("failed to fetch state root at index {index}: {source}")]
    Fetch { index: u64, local: B256, source: ClientError },

    #[error("remote state root mismatch at index {index}: remote {remote}, local {local}, batch root {batch_root}")]
    Mismatch { index: u64, remote: B256, local: B256, batch_root: B256 },

    #[error("state root at index {index} not posted after {retries} retries")]
    Timeout { index: u64, local: B256, retries: usize },
}

impl VerifyError {
    /// Root posted remotely, zero if it was never fetched
    pub fn remote_root(&self) -> B256 {
        match self {
            VerifyError::Mismatch { remote, .. } => *remote,
            _ => B256::ZERO,
        }
    }

    pub fn local_root(&self) -> B256 {
        match self {
            VerifyError::Fetch { local, .. } |
            VerifyError::Mismatch { local, .. } |
            VerifyError::Timeout { local, .. } => *local,
        }
    }
}

/// Compares locally computed state roots with the ones posted to L1
#[derive(Debug, Clone)]
pub struct StateRootVerifier {
    retries: usize,
    delay: Duration,
}

impl Default for StateRootVerifier {
    fn default() -> Self {
        Self::new(STATE_ROOT_RETRIES, STATE_ROOT_RETRY_DELAY)
    }
}

impl StateRootVerifier {
    pub fn new(retries: usize, delay: Duration) -> Self {
        Self { retries, delay }
    }

    /// Waits for the root at `index` to be posted and checks it against `local`.
    /// Returns the remote root
    pub async fn verify(
        &self,
        client: &dyn RollupClient,
        index: u64,
        local: B256,
        batch_root: B256,
    ) -> Result<B256, VerifyError> {
        for attempt in 0..self.retries {
            let remote = client
                .state_root(index)
                .await
                .map_err(|source| VerifyError::Fetch { index, local, source })?;

            if remote.is_zero() {
                info!(attempt, index, "state root not posted yet, retrying");
                tokio::time::sleep(self.delay).await;
                continue;
            }

            if remote != local {
                error!(index, %remote, %local, %batch_root, "state root mismatch");
                VerifierMetrics::state_root(false);
                return Err(VerifyError::Mismatch { index, remote, local, batch_root });
            }

            info!(attempt, index, %batch_root, "verified state root");
            VerifierMetrics::state_root(true);
            return Ok(remote);
        }

        Err(VerifyError::Timeout { index, local, retries: self.retries })
    }
}
