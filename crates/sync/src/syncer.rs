//! Range syncing from the data transport layer: enqueues, transaction batches and blocks

use std::time::Duration;

use alloy_primitives::B256;
use rn_common::{client::ClientError, metrics::SyncMetrics};
use tracing::{debug, error, info, warn};

use crate::{
    error::{ApplyError, SyncError},
    service::SyncService,
    tip::{sync_range, sync_to_tip},
};

/// Enqueues that never made it into the andromeda chain
const SKIPPED_ENQUEUES: [u64; 2] = [20397, 37446];
const ANDROMEDA_CHAIN_ID: u64 = 1088;

/// Inclusion of an enqueue races with blocks coming from the pool
const ENQUEUE_RECHECK_DELAY: Duration = Duration::from_secs(2);

impl SyncService {
    ///////////////////////////// QUEUE /////////////////////////////

    /// Applies every enqueue not seen yet. A backup sequencer waits until the active one
    /// hands over
    pub async fn sync_queue_to_tip(&self) -> Result<(), SyncError> {
        if self.should_wait_for_sequencer().await? {
            return Ok(());
        }

        let result = sync_to_tip(
            &self.loop_lock,
            || self.sync_queue(),
            || async { self.client.latest_enqueue_index().await.map_err(SyncError::from) },
        )
        .await;

        match result {
            // the chain is past the last committed epoch, retried on the next tick
            Err(err) if err.is_epoch_number_exceeds() => {
                warn!(%err, "cannot sync queue to tip, ignoring unknown epoch");
                Ok(())
            }
            result => result,
        }
    }

    async fn sync_queue(&self) -> Result<Option<u64>, SyncError> {
        let latest = self.client.latest_enqueue_index().await;
        let next = self.next_queue_index()?;
        sync_range(latest, next, |start, end| self.sync_queue_range(start, end)).await
    }

    async fn sync_queue_range(&self, start: u64, end: u64) -> Result<(), SyncError> {
        info!(start, end, "syncing enqueue transactions range");

        for queue_index in start..=end {
            if self.config.chain_id == ANDROMEDA_CHAIN_ID && SKIPPED_ENQUEUES.contains(&queue_index) {
                continue;
            }

            let tx = self.client.enqueue(queue_index).await?;
            let hash = tx.hash();
            let result = self.apply_transaction(tx, true).await;

            if self.config.is_verifier() {
                if let Err(err) = result {
                    error!(%err, %hash, queue_index, "failed to apply enqueue");
                    self.restore_queue_index(queue_index)?;
                    return Err(err.into());
                }
                continue;
            }

            if result.is_ok() && self.engine.contains_transaction(hash).await? {
                continue;
            }
            if let Err(err) = result {
                warn!(%err, %hash, queue_index, "enqueue not applied, checking inclusion");
            }

            tokio::time::sleep(ENQUEUE_RECHECK_DELAY).await;
            if !self.engine.contains_transaction(hash).await? {
                self.restore_queue_index(queue_index)?;
                error!(queue_index, %hash, "enqueue failed");
                return Err(SyncError::EnqueueNotIncluded { queue_index, hash });
            }
        }

        Ok(())
    }

    fn restore_queue_index(&self, queue_index: u64) -> Result<(), SyncError> {
        match queue_index.checked_sub(1) {
            Some(restore) => {
                self.store.set_latest_queue_index(Some(restore))?;
                SyncMetrics::latest_queue_index(restore);
                info!(restore, "restored queue index");
            }
            None => error!("failed at queue index zero"),
        }
        Ok(())
    }

    ///////////////////////////// BATCHES /////////////////////////////

    /// Replays batches posted to L1 and checks every resulting state root
    pub async fn sync_batches_to_tip(&self) -> Result<(), SyncError> {
        sync_to_tip(
            &self.loop_lock,
            || self.sync_batches(),
            || async { self.client.latest_transaction_batch_index().await.map_err(SyncError::from) },
        )
        .await
    }

    async fn sync_batches(&self) -> Result<Option<u64>, SyncError> {
        let latest = self.client.latest_transaction_batch_index().await;
        let next = self.next_batch_index()?;
        sync_range(latest, next, |start, end| self.sync_transaction_batch_range(start, end)).await
    }

    async fn sync_transaction_batch_range(&self, start: u64, end: u64) -> Result<(), SyncError> {
        info!(start, end, "syncing transaction batch range");

        for batch_index in start..=end {
            let head = self.engine.head_number().await?;
            if self.is_de_seq(head + 1) {
                self.sync_block_batch(batch_index).await?;
                continue;
            }

            debug!(batch_index, "fetching transaction batch");
            let (batch, txs) = match self.client.transaction_batch(batch_index).await {
                Ok(batch) => batch,
                Err(ClientError::UseInboxBatch(_)) => {
                    self.sync_block_batch(batch_index).await?;
                    continue;
                }
                Err(err) => return Err(err.into()),
            };

            let next = self.next_index()?;
            for tx in txs {
                let Some(index) = tx.meta.index else {
                    return Err(ApplyError::MissingIndex(tx.hash()).into());
                };
                if index < next {
                    debug!(index, "transaction already indexed");
                    continue;
                }

                self.apply_batched_transaction(tx).await?;
                self.verify_and_report(index, batch.root).await?;
            }

            self.set_batch_index(batch_index)?;
        }

        Ok(())
    }

    async fn sync_block_batch(&self, batch_index: u64) -> Result<(), SyncError> {
        let (batch, blocks) = self.client.block_batch(batch_index).await?;
        let next = self.next_index()?;

        for block in blocks {
            let Some(index) = block.index().filter(|index| *index >= next) else {
                debug!(number = block.number, "block already indexed");
                continue;
            };
            if block.transactions.is_empty() {
                continue;
            }

            self.apply_block(block).await?;
            self.verify_and_report(index, batch.root).await?;
        }

        self.set_batch_index(batch_index)
    }

    fn set_batch_index(&self, batch_index: u64) -> Result<(), SyncError> {
        self.store.set_latest_batch_index(Some(batch_index))?;
        SyncMetrics::latest_batch_index(batch_index);
        Ok(())
    }

    /// Checks the head state root against the one posted for `index` and reports the
    /// outcome back to the data transport layer
    async fn verify_and_report(&self, index: u64, batch_root: B256) -> Result<(), SyncError> {
        let local = self.engine.head_state_root().await?;

        match self.verifier.verify(self.client.as_ref(), index, local, batch_root).await {
            Ok(remote) => {
                self.client.set_last_verifier(index, remote, local, true).await?;
                Ok(())
            }
            Err(err) => {
                if let Err(report_err) =
                    self.client.set_last_verifier(index, err.remote_root(), err.local_root(), false).await
                {
                    warn!(%report_err, index, "failed to report verification failure");
                }
                Err(err.into())
            }
        }
    }

    ///////////////////////////// TRANSACTIONS /////////////////////////////

    /// Follows the configured backend transaction by transaction, or block by block once
    /// blocks may hold more than one transaction
    pub async fn sync_transactions_to_tip(&self) -> Result<(), SyncError> {
        if self.should_wait_for_sequencer().await? {
            return Ok(());
        }

        sync_to_tip(&self.loop_lock, || self.sync_transactions(), || self.latest_remote_index()).await
    }

    async fn latest_remote_index(&self) -> Result<Option<u64>, SyncError> {
        let backend = self.config.backend;
        let head = self.engine.head_number().await?;
        if self.is_de_seq(head + 1) {
            return Ok(self.client.latest_block_index(backend).await?);
        }
        Ok(self.client.latest_transaction_index(backend).await?)
    }

    async fn sync_transactions(&self) -> Result<Option<u64>, SyncError> {
        let backend = self.config.backend;
        let latest = match self.client.latest_block_index(backend).await {
            Ok(latest) => Ok(latest),
            Err(_) => self.client.latest_transaction_index(backend).await,
        };
        let next = self.next_index()?;
        sync_range(latest, next, |start, end| self.sync_transaction_range(start, end)).await
    }

    async fn sync_transaction_range(&self, start: u64, end: u64) -> Result<(), SyncError> {
        let backend = self.config.backend;
        info!(start, end, %backend, "syncing transaction range");

        for index in start..=end {
            if self.is_de_seq(index + 1) {
                let block = self.client.block(index, backend).await?;
                self.apply_block(block).await?;
            } else {
                let tx = self.client.transaction(index, backend).await?;
                self.apply_transaction(tx, true).await?;
            }
        }

        Ok(())
    }

    ///////////////////////////// HANDOVER /////////////////////////////

    /// A backup sequencer started below the active sequencer's height only follows peer
    /// blocks until it becomes the expected signer
    pub(crate) async fn waiting_sequencer_tip(&self) -> Result<bool, SyncError> {
        let start_height = self.start_seq_height();
        if !self.is_sequencer_mode() || !self.epoch.epochs_enabled() || start_height == 0 {
            return Ok(false);
        }

        let block_number = self.latest_index()?.map_or(1, |index| index + 2);
        if block_number <= start_height {
            return Ok(true);
        }

        let head = self.engine.head_number().await?;
        let expected = self.epoch.resolve_signer(None, block_number, head).await.inspect_err(
            |err| error!(%err, block_number, "cannot resolve signer while waiting for sequencer tip"),
        )?;

        Ok(self.local_signer() != Some(expected))
    }

    async fn should_wait_for_sequencer(&self) -> Result<bool, SyncError> {
        match self.waiting_sequencer_tip().await {
            Ok(waiting) => Ok(waiting),
            // the chain is past the last committed epoch
            Err(err) if err.is_epoch_number_exceeds() => Ok(true),
            Err(err) => Err(err),
        }
    }
}
