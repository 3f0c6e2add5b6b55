use std::sync::Arc;

use alloy_primitives::{Address, U256};
use rn_common::{metrics::EpochMetrics, tx::RollupTransaction};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::{
    cache::{CachedEpoch, PreRespan},
    contract::{Epoch, EpochSource},
    error::EpochError,
    respan::{decode_recommit, RespanCall},
};

/// Minimum transfer to the mpc address that may fall back to the current signer, 10 ether
pub const FALLBACK_MIN_TRANSFER: U256 = U256::from_limbs([10_000_000_000_000_000_000, 0, 0, 0]);
/// Maximum mpc balance for the fallback to apply, 0.5 ether
pub const FALLBACK_MAX_MPC_BALANCE: U256 = U256::from_limbs([500_000_000_000_000_000, 0, 0, 0]);

#[derive(Debug, Default)]
struct OracleState {
    cache: CachedEpoch,
    pre_respan: Option<PreRespan>,
}

/// Resolves the authorized signer for a block height
pub struct EpochOracle {
    source: Arc<dyn EpochSource>,
    seqset_contract: Address,
    valid_height: u64,
    default_signer: Address,
    state: Mutex<OracleState>,
}

impl EpochOracle {
    pub fn new(
        source: Arc<dyn EpochSource>,
        seqset_contract: Address,
        valid_height: u64,
        default_signer: Address,
    ) -> Self {
        Self {
            source,
            seqset_contract,
            valid_height,
            default_signer,
            state: Mutex::new(OracleState::default()),
        }
    }

    pub fn valid_height(&self) -> u64 {
        self.valid_height
    }

    pub fn epochs_enabled(&self) -> bool {
        self.valid_height > 0
    }

    /// Signer authorized to produce block `height`, `tx` is the transaction going into
    /// it if any and `head` the current chain head
    pub async fn resolve_signer(
        &self,
        tx: Option<&RollupTransaction>,
        height: u64,
        head: u64,
    ) -> Result<Address, EpochError> {
        if !self.epochs_enabled() || height <= self.valid_height {
            return Ok(self.default_signer);
        }

        let mut state = self.state.lock().await;

        if let Some(respan) = match tx {
            Some(tx) => self.respan_call(tx).await,
            None => None,
        } {
            info!(
                start = respan.start_block,
                end = respan.end_block,
                signer = %respan.new_signer,
                "respan call"
            );
            state.cache.respans.insert(respan.start_block);
            EpochMetrics::respan();
            return Ok(respan.new_signer);
        }

        let result = self.current_signer(&mut state, height, head).await;
        debug!(height, ?result, "resolved signer");

        match (result, tx) {
            (Err(err), Some(tx)) if err.is_epoch_number_exceeds_known() => {
                match self.fallback_signer(tx).await {
                    Some(signer) => {
                        warn!(height, %signer, hash = %tx.hash(), "epoch not committed, falling back to current signer");
                        EpochMetrics::fallback();
                        Ok(signer)
                    }
                    None => Err(err),
                }
            }
            (result, _) => result,
        }
    }

    fn targets_contract(&self, tx: &RollupTransaction) -> bool {
        !self.seqset_contract.is_zero() && tx.to() == Some(self.seqset_contract)
    }

    /// Decoded respan if `tx` is a `recommitEpoch` call from the mpc address
    pub async fn respan_call(&self, tx: &RollupTransaction) -> Option<RespanCall> {
        if !self.targets_contract(tx) {
            return None;
        }
        let sender = tx.sender().ok()?;
        let mpc = match self.source.mpc_address().await {
            Ok(mpc) => mpc,
            Err(err) => {
                error!(%err, "failed to read mpc address");
                return None;
            }
        };
        if sender != mpc {
            return None;
        }
        decode_recommit(tx.input())
    }

    pub async fn is_respan_call(&self, tx: &RollupTransaction) -> bool {
        self.respan_call(tx).await.is_some()
    }

    async fn current_signer(
        &self,
        state: &mut OracleState,
        height: u64,
        head: u64,
    ) -> Result<Address, EpochError> {
        state.cache.check_range(height);

        if state.pre_respan.is_some_and(|pre| pre.start_block <= head) {
            info!(head, "clear pre respan");
            state.pre_respan = None;
        }

        if let Some(respan_start) = state.cache.respans.front() {
            if height > respan_start && head < respan_start {
                error!(height, head, respan_start, "respan not reached");
                return Err(EpochError::RespanPending { height, head, respan_start });
            }
            if head >= respan_start {
                state.cache.respans.pop_front();
                state.cache.valid = false;
            }
        }

        if !state.cache.valid {
            let epoch = self.epoch_by_block_number(height).await?;
            state.cache.fill(&epoch);
            EpochMetrics::cache_refresh(epoch.number);
            info!(
                number = epoch.number,
                start = epoch.start_block,
                end = epoch.end_block,
                signer = %epoch.signer,
                "loaded epoch cache"
            );
        }

        Ok(state.cache.signer)
    }

    /// Epoch covering `height`, rejecting epochs the contract has not committed yet
    pub async fn epoch_by_block_number(&self, height: u64) -> Result<Epoch, EpochError> {
        let epoch = self.source.epoch_by_block(height).await?;
        let current = self.source.current_epoch_number().await?;
        if epoch > current {
            error!(height, epoch, current, "incorrect epoch number");
            return Err(EpochError::EpochNumberExceedsKnown { height, epoch, current });
        }
        self.source.epoch(epoch).await
    }

    /// Signer of the current epoch when `tx` funds a depleted mpc address
    async fn fallback_signer(&self, tx: &RollupTransaction) -> Option<Address> {
        let mpc = self.source.mpc_address().await.ok().filter(|mpc| !mpc.is_zero())?;
        if tx.to() != Some(mpc) || tx.value() < FALLBACK_MIN_TRANSFER {
            return None;
        }

        let balance = match self.source.balance(mpc).await {
            Ok(balance) => balance,
            Err(err) => {
                error!(%err, "failed to read mpc balance");
                return None;
            }
        };
        if balance > FALLBACK_MAX_MPC_BALANCE {
            debug!(%balance, "mpc address has enough balance");
            return None;
        }

        let current = self.source.current_epoch_number().await.ok()?;
        let epoch = self.source.epoch(current).await.ok()?;
        Some(epoch.signer)
    }

    /// Last block of the finalized epoch, the head itself before epochs apply
    pub async fn finalized_block(&self, head: u64) -> Result<u64, EpochError> {
        if head < self.valid_height {
            return Ok(head);
        }
        self.source.finalized_block().await
    }

    pub async fn set_pre_respan(&self, pre_signer: Address, new_signer: Address, start_block: u64) {
        info!(%pre_signer, %new_signer, start_block, "set pre respan");
        self.state.lock().await.pre_respan =
            Some(PreRespan { pre_signer, new_signer, start_block });
    }

    pub async fn pre_respan(&self) -> Option<PreRespan> {
        self.state.lock().await.pre_respan
    }

    /// Checks an announced respan allows `local` to sign block `height`
    pub async fn authorize_local(&self, local: Address, height: u64) -> Result<(), EpochError> {
        let Some(pre) = self.state.lock().await.pre_respan else {
            return Ok(());
        };

        if pre.excludes(local, height) {
            return Err(EpochError::PreRespanToOther { height, next_signer: pre.new_signer });
        }
        if pre.new_signer == local && height < pre.start_block {
            return Err(EpochError::NotYetNextSigner { height, start: pre.start_block });
        }
        Ok(())
    }

    pub async fn pending_respans(&self) -> Vec<u64> {
        self.state.lock().await.cache.respans.as_slice().to_vec()
    }

    pub async fn invalidate(&self) {
        self.state.lock().await.cache.valid = false;
        info!("removed cached epoch");
    }
}
