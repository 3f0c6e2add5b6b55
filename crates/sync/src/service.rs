use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use alloy_primitives::Address;
use alloy_provider::{Provider, ProviderBuilder};
use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use eyre::{bail, OptionExt, WrapErr};
use parking_lot::RwLock;
use rn_common::{
    api::SyncStatusResponse,
    client::{ClientError, RollupClient},
    config::SyncConfig,
    db::{IndexStore, StoreError},
    engine::ExecutionEngine,
    metrics::SyncMetrics,
    runtime::spawn,
    tx::{RollupBlock, RollupTransaction},
    types::{Backend, OvmContext},
    utils::{alert_discord, fmt_index},
};
use rn_epoch::EpochOracle;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, error, info, warn, Instrument};

use crate::{
    error::{ApplyError, SyncError},
    gas::GasPriceCache,
    verify::StateRootVerifier,
};

const HANDSHAKE_INTERVAL: Duration = Duration::from_secs(10);
const FINALIZED_CACHE_TTL: Duration = Duration::from_secs(300);

/// Drains the remote sources into the local chain and serves sequencer submissions
pub struct SyncService {
    pub(crate) config: SyncConfig,
    pub(crate) client: Arc<dyn RollupClient>,
    pub(crate) engine: Arc<dyn ExecutionEngine>,
    pub(crate) epoch: Arc<EpochOracle>,
    pub(crate) store: IndexStore,
    pub(crate) gas: GasPriceCache,
    pub(crate) signer: Option<PrivateKeySigner>,
    pub(crate) ctx: OvmContext,
    pub(crate) verifier: StateRootVerifier,
    syncing: AtomicBool,
    pub(crate) start_seq_height: AtomicU64,
    /// One sync-to-tip pass at a time
    pub(crate) loop_lock: Mutex<()>,
    /// Serializes commits and the pointer bookkeeping around them
    pub(crate) apply_lock: Mutex<()>,
    /// Held by RPC submissions and the sequencer loop
    pub(crate) tx_lock: Mutex<()>,
    /// Latest L1 confirmed index and when it was fetched
    finalized: RwLock<Option<(u64, Instant)>>,
}

impl SyncService {
    pub fn new(
        config: SyncConfig,
        client: Arc<dyn RollupClient>,
        engine: Arc<dyn ExecutionEngine>,
        epoch: Arc<EpochOracle>,
        store: IndexStore,
        signer: Option<PrivateKeySigner>,
    ) -> Self {
        let signer = signer.map(|signer| signer.with_chain_id(Some(config.chain_id)));

        Self {
            config,
            client,
            engine,
            epoch,
            store,
            gas: GasPriceCache::default(),
            signer,
            ctx: OvmContext::default(),
            verifier: StateRootVerifier::default(),
            syncing: AtomicBool::new(false),
            start_seq_height: AtomicU64::new(0),
            loop_lock: Mutex::new(()),
            apply_lock: Mutex::new(()),
            tx_lock: Mutex::new(()),
            finalized: RwLock::new(None),
        }
    }

    pub fn with_state_root_verifier(mut self, verifier: StateRootVerifier) -> Self {
        self.verifier = verifier;
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn local_signer(&self) -> Option<Address> {
        self.signer.as_ref().map(|signer| signer.address())
    }

    /// Produces blocks from L1 data, as opposed to following a verifier backend
    pub fn is_sequencer_mode(&self) -> bool {
        !self.config.is_verifier() && self.config.backend == Backend::L1
    }

    /// Block `number` may hold more than one transaction
    pub fn is_de_seq(&self, number: u64) -> bool {
        self.config.de_seq_block > 0 && number >= self.config.de_seq_block
    }

    ///////////////////////////// STARTUP /////////////////////////////

    /// Waits for the data transport layer and restores the in-memory context from the
    /// local chain. Must complete before the RPC accepts transactions
    #[tracing::instrument(skip_all, name = "init")]
    pub async fn initialize(&self) -> eyre::Result<()> {
        if !self.config.enable_sync {
            info!("sync disabled, only peer blocks will be applied");
            return self.initialize_latest_l1(self.config.ctc_deploy_height).await;
        }

        self.ensure_client().await;
        self.wait_remote_synced().await;

        info!(
            enforce = self.config.enforce_fees,
            up = ?self.config.fee_threshold_up,
            down = ?self.config.fee_threshold_down,
            "fees"
        );

        self.initialize_latest_l1(self.config.ctc_deploy_height).await?;
        self.set_start_seq_height().await?;

        if !self.config.is_verifier() {
            self.set_syncing(true);
        }

        Ok(())
    }

    async fn ensure_client(&self) {
        let mut interval = tokio::time::interval(HANDSHAKE_INTERVAL);
        loop {
            interval.tick().await;
            match self.client.latest_eth_context().await {
                Ok(_) => {
                    info!("connected to upstream service");
                    return;
                }
                Err(err) => info!(%err, "cannot connect to upstream service"),
            }
        }
    }

    async fn wait_remote_synced(&self) {
        let mut interval = tokio::time::interval(HANDSHAKE_INTERVAL);
        loop {
            interval.tick().await;
            match self.client.sync_status(self.config.backend).await {
                Ok(status) if !status.syncing => return,
                Ok(status) => info!(
                    index = fmt_index(status.current_transaction_index),
                    tip = fmt_index(status.highest_known_transaction_index),
                    "upstream still syncing"
                ),
                Err(err) => error!(%err, "cannot get sync status"),
            }
        }
    }

    /// Sets the L1 context from the deploy height on a fresh node, otherwise from the last
    /// applied transaction, repairing pointers that ran ahead of the chain
    pub async fn initialize_latest_l1(&self, deploy_height: Option<u64>) -> eyre::Result<()> {
        match self.store.latest_index()? {
            None => {
                let height = deploy_height
                    .ok_or_eyre("must configure with canonical transaction chain deploy height")?;
                info!(height, "initializing ovm context from deploy height");

                let context = self
                    .client
                    .eth_context(height)
                    .await
                    .wrap_err_with(|| format!("cannot fetch ctc deploy block at height {height}"))?;
                self.ctx.set_timestamp(context.timestamp);
                self.ctx.set_block_number(context.block_number);
            }

            Some(index) => {
                if self.config.is_verifier() && self.config.backend == Backend::L1 {
                    self.recover_batch_index(index).await?;
                }

                info!(index, "found latest index");
                let block = match self.engine.block_by_number(index + 1).await? {
                    Some(block) => block,
                    None => self.rewind_index(index).await?,
                };

                if let Some(tx) = block.transactions.first() {
                    self.ctx.set_timestamp(tx.meta.l1_timestamp);
                    self.ctx.set_block_number(tx.meta.l1_block_number.unwrap_or_default());
                }
            }
        }

        let queue_index = match self.store.latest_queue_index()? {
            None => match self.client.last_confirmed_enqueue().await {
                Ok(enqueue) => enqueue.meta.queue_index,
                Err(err) if err.is_not_found() => return Ok(()),
                Err(err) => return Err(err).wrap_err("cannot fetch last confirmed queue tx"),
            },
            Some(queue_index) => self.repair_queue_index(queue_index).await?,
        };

        self.store.set_latest_queue_index(queue_index)?;
        if let Some(queue_index) = queue_index {
            SyncMetrics::latest_queue_index(queue_index);
        }

        Ok(())
    }

    /// Moves the batch pointer back to the batch before the one holding `index`, in case
    /// batches were skipped
    async fn recover_batch_index(&self, index: u64) -> eyre::Result<()> {
        let backend = self.config.backend;
        let batch_index = if self.is_de_seq(index + 1) {
            self.client
                .raw_block_batch_index(index, backend)
                .await
                .wrap_err_with(|| format!("cannot fetch block at index {index}"))?
        } else {
            match self.client.raw_transaction_batch_index(index, backend).await {
                Ok(batch_index) => batch_index,
                // inbox batches may mix transactions and blocks
                Err(err) => self
                    .client
                    .raw_block_batch_index(index, backend)
                    .await
                    .map_err(|_| err)
                    .wrap_err_with(|| format!("cannot fetch transaction at index {index}"))?,
            }
        }
        .unwrap_or_default()
        .saturating_sub(1);

        info!(old = fmt_index(self.store.latest_batch_index()?), new = batch_index, "updating batch index");
        self.store.set_latest_batch_index(Some(batch_index))?;
        SyncMetrics::latest_batch_index(batch_index);
        Ok(())
    }

    /// The index was persisted but its block never made it to the chain
    async fn rewind_index(&self, index: u64) -> eyre::Result<RollupBlock> {
        let head = self.engine.head_number().await?;
        if head > index {
            bail!("current block height {head} greater than index {index}");
        }

        let rewound = head.checked_sub(1);
        self.store.set_latest_index(rewound)?;
        self.store.set_latest_verified_index(rewound)?;
        warn!(old = index, new = fmt_index(rewound), "block not found, resetting index");

        self.engine.block_by_number(head).await?.ok_or_eyre("missing head block")
    }

    /// Walks back from the head to the newest forced inclusion
    async fn repair_queue_index(&self, queue_index: u64) -> eyre::Result<Option<u64>> {
        info!(queue_index, "found latest queue index");

        let mut number = self.engine.head_number().await?;
        while number > 0 {
            let Some(block) = self.engine.block_by_number(number).await? else {
                warn!(number, "missing block when fixing queue index");
                return Ok(Some(queue_index));
            };

            let found = block
                .transactions
                .iter()
                .rev()
                .filter(|tx| tx.is_l1_to_l2())
                .find_map(|tx| tx.meta.queue_index);

            if let Some(found) = found {
                if found == queue_index {
                    info!(queue_index, "found correct starting queue index");
                } else {
                    info!(old = queue_index, new = found, "found incorrect starting queue index, fixing");
                }
                return Ok(Some(found));
            }

            number -= 1;
        }

        info!("hit genesis block when fixing queue index");
        Ok(None)
    }

    /// Height below which a backup sequencer waits for the active one
    async fn set_start_seq_height(&self) -> eyre::Result<()> {
        let height = match &self.config.sequencer_client_url {
            Some(url) => {
                let provider = ProviderBuilder::new().disable_recommended_fillers().on_http(url.clone());
                provider
                    .get_block_number()
                    .await
                    .wrap_err("cannot check the default sequencer height")?
            }
            None => self.engine.head_number().await?,
        };

        info!(height, "initial rollup start sequencer height");
        self.start_seq_height.store(height, Ordering::Relaxed);
        Ok(())
    }

    pub fn start_seq_height(&self) -> u64 {
        self.start_seq_height.load(Ordering::Relaxed)
    }

    /// Refreshes the gas cache and spawns the loops for the configured mode
    pub async fn start(
        self: Arc<Self>,
        relay_rx: mpsc::Receiver<RollupBlock>,
        shutdown: watch::Receiver<bool>,
    ) -> eyre::Result<()> {
        info!("updating gas price cache");
        self.gas.refresh(self.engine.as_ref()).await.wrap_err("failed to update gas price cache")?;

        if !self.config.enable_sync {
            info!("running without syncing enabled");
            spawn(self.relay_loop(relay_rx, shutdown).in_current_span());
            return Ok(());
        }

        if self.config.is_verifier() {
            spawn(self.verifier_loop(shutdown).in_current_span());
            return Ok(());
        }

        spawn(
            async move {
                if let Err(err) = self.sync_transactions_to_tip().await {
                    error!(%err, "sequencer cannot sync transactions to tip");
                    alert_discord(&format!("sequencer cannot sync transactions to tip: {err}"));
                    return;
                }
                if let Err(err) = self.sync_queue_to_tip().await {
                    error!(%err, "sequencer cannot sync queue to tip");
                    alert_discord(&format!("sequencer cannot sync queue to tip: {err}"));
                    return;
                }
                self.set_syncing(false);

                spawn(self.clone().sequencer_loop(shutdown.clone()).in_current_span());
                self.relay_loop(relay_rx, shutdown).await;
            }
            .in_current_span(),
        );

        Ok(())
    }

    ///////////////////////////// LOOPS /////////////////////////////

    #[tracing::instrument(skip_all, name = "sequencer")]
    async fn sequencer_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(
            poll_interval = ?self.config.poll_interval,
            refresh_threshold = ?self.config.timestamp_refresh_threshold,
            "starting sequencer loop"
        );

        let mut interval = tokio::time::interval(self.config.poll_interval);
        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = shutdown.changed() => break,
            }

            {
                let _guard = self.tx_lock.lock().await;
                if let Err(err) = self.sync_queue_to_tip().await {
                    error!(%err, "could not sequence");
                    SyncMetrics::sync_error("queue");
                }
            }

            if let Err(err) = self.update_l1_block_number().await {
                error!(%err, "could not update execution context");
            }
        }

        info!("sequencer loop stopped");
    }

    #[tracing::instrument(skip_all, name = "verifier")]
    async fn verifier_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(poll_interval = ?self.config.poll_interval, backend = %self.config.backend, "starting verifier loop");

        let mut interval = tokio::time::interval(self.config.poll_interval);
        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = shutdown.changed() => break,
            }

            if let Err(err) = self.verify().await {
                error!(%err, "could not verify");
            }
        }

        info!("verifier loop stopped");
    }

    async fn verify(&self) -> Result<(), SyncError> {
        match self.config.backend {
            Backend::L1 => self.sync_batches_to_tip().await.inspect_err(|_| SyncMetrics::sync_error("batch")),
            Backend::L2 => {
                self.sync_transactions_to_tip().await.inspect_err(|_| SyncMetrics::sync_error("transaction"))
            }
        }
    }

    /// Applies blocks produced by other replicas, failures are logged per transaction
    #[tracing::instrument(skip_all, name = "relay")]
    async fn relay_loop(
        self: Arc<Self>,
        mut relay_rx: mpsc::Receiver<RollupBlock>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            let block = tokio::select! {
                block = relay_rx.recv() => block,
                _ = shutdown.changed() => None,
            };
            let Some(block) = block else {
                break;
            };

            self.apply_relayed_block(block).await;
        }

        relay_rx.close();
        info!("relay loop stopped");
    }

    pub(crate) async fn apply_relayed_block(&self, block: RollupBlock) {
        if self.config.is_verifier() {
            return;
        }

        for (position, tx) in block.transactions.into_iter().enumerate() {
            let hash = tx.hash();
            debug!(%hash, position, block = block.number, "handle block from other node");
            if let Err(err) = self.apply_transaction(tx, false).await {
                error!(%err, %hash, block = block.number, "failed to apply peer transaction");
            }
        }
    }

    /// Adopts the latest L1 context once it is far enough ahead of the current one
    pub async fn update_l1_block_number(&self) -> Result<(), ClientError> {
        let context = self.client.latest_eth_context().await?;
        let current = self.ctx.timestamp();
        let threshold = self.config.timestamp_refresh_threshold.as_secs();

        if context.timestamp.saturating_sub(current) > threshold {
            info!(timestamp = context.timestamp, block_number = context.block_number, "updating eth context");
            self.ctx.set_block_number(context.block_number);
            self.ctx.set_timestamp(context.timestamp);
            SyncMetrics::l1_block_number(context.block_number);
        }
        Ok(())
    }

    ///////////////////////////// READS /////////////////////////////

    pub fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::Relaxed)
    }

    pub(crate) fn set_syncing(&self, syncing: bool) {
        info!(syncing, "setting sync status");
        self.syncing.store(syncing, Ordering::Relaxed);
        SyncMetrics::set_syncing(syncing);
    }

    pub fn latest_index(&self) -> Result<Option<u64>, StoreError> {
        self.store.latest_index()
    }

    pub fn next_index(&self) -> Result<u64, StoreError> {
        Ok(self.latest_index()?.map_or(0, |index| index + 1))
    }

    pub fn latest_queue_index(&self) -> Result<Option<u64>, StoreError> {
        self.store.latest_queue_index()
    }

    pub fn next_queue_index(&self) -> Result<u64, StoreError> {
        Ok(self.latest_queue_index()?.map_or(0, |index| index + 1))
    }

    pub fn latest_batch_index(&self) -> Result<Option<u64>, StoreError> {
        self.store.latest_batch_index()
    }

    pub fn next_batch_index(&self) -> Result<u64, StoreError> {
        Ok(self.latest_batch_index()?.map_or(0, |index| index + 1))
    }

    pub fn latest_verified_index(&self) -> Result<Option<u64>, StoreError> {
        self.store.latest_verified_index()
    }

    /// Wall clock seconds of the last commit, used to detect a stalled node
    pub fn latest_index_time(&self) -> Result<Option<i64>, StoreError> {
        self.store.latest_index_time()
    }

    pub fn latest_l1_block_number(&self) -> u64 {
        self.ctx.block_number()
    }

    pub fn latest_l1_timestamp(&self) -> u64 {
        self.ctx.timestamp()
    }

    /// Number of the latest block confirmed on L1
    pub async fn finalized_number(&self) -> Result<u64, ClientError> {
        let cached = *self.finalized.read();
        if let Some((index, fetched_at)) = cached {
            if fetched_at.elapsed() < FINALIZED_CACHE_TTL {
                return Ok(index + 1);
            }
        }

        let index = match self.client.latest_block_index(Backend::L1).await {
            Ok(index) => index,
            Err(_) => self.client.latest_transaction_index(Backend::L1).await?,
        }
        .ok_or(ClientError::NotFound)?;

        *self.finalized.write() = Some((index, Instant::now()));
        Ok(index + 1)
    }

    pub fn sync_status(&self) -> Result<SyncStatusResponse, StoreError> {
        let pointers = self.store.pointers()?;
        Ok(SyncStatusResponse {
            syncing: self.is_syncing(),
            latest_index: pointers.index,
            latest_queue_index: pointers.queue_index,
            latest_batch_index: pointers.batch_index,
            latest_verified_index: pointers.verified_index,
        })
    }

    pub async fn set_pre_respan(&self, pre_signer: Address, new_signer: Address, start_block: u64) {
        self.epoch.set_pre_respan(pre_signer, new_signer, start_block).await;
    }

    /// Applies a transaction from a trusted party, skipping fee and pool validation
    pub async fn ingest_transaction(&self, tx: RollupTransaction) -> Result<(), ApplyError> {
        self.apply_transaction(tx, true).await
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::B256;
    use rn_common::{
        client::Batch,
        mock::{enqueue, MockEngine},
        types::{EthContext, NodeMode},
    };

    use super::*;
    use crate::test_utils::{sync_config, Harness};

    #[tokio::test]
    async fn test_initialize_fresh_node() {
        let h = Harness::sequencer(MockEngine::new());
        let context = EthContext { block_number: 1200, timestamp: 1_700_000_000, block_hash: B256::ZERO };
        h.client.remote.lock().eth_contexts.insert(1200, context);

        h.service.initialize_latest_l1(Some(1200)).await.unwrap();

        assert_eq!(h.service.latest_l1_block_number(), 1200);
        assert_eq!(h.service.latest_l1_timestamp(), 1_700_000_000);
        assert_eq!(h.service.latest_index().unwrap(), None);
        assert_eq!(h.service.latest_queue_index().unwrap(), None);
    }

    #[tokio::test]
    async fn test_initialize_requires_deploy_height() {
        let h = Harness::sequencer(MockEngine::new());
        assert!(h.service.initialize_latest_l1(None).await.is_err());
    }

    #[tokio::test]
    async fn test_initialize_from_last_block() {
        let h = Harness::sequencer(MockEngine::with_head(3));
        h.service.store.set_latest_index(Some(2)).unwrap();
        h.service.store.set_latest_queue_index(Some(7)).unwrap();

        h.service.initialize_latest_l1(None).await.unwrap();

        let head = h.engine.last_block().unwrap();
        assert_eq!(h.service.latest_l1_timestamp(), head.transactions[0].meta.l1_timestamp);
        assert_eq!(h.service.latest_l1_block_number(), 3);
        // newest forced inclusion on chain is queue index 2
        assert_eq!(h.service.latest_queue_index().unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_initialize_rewinds_missing_block() {
        let h = Harness::sequencer(MockEngine::with_head(3));
        h.service.store.set_latest_index(Some(5)).unwrap();

        h.service.initialize_latest_l1(None).await.unwrap();

        assert_eq!(h.service.latest_index().unwrap(), Some(2));
        assert_eq!(h.service.latest_verified_index().unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_initialize_confirmed_enqueue() {
        let h = Harness::sequencer(MockEngine::new());
        h.client.remote.lock().eth_contexts.insert(1, EthContext::default());
        {
            let mut remote = h.client.remote.lock();
            let mut confirmed = enqueue(0, 1, 10);
            confirmed.meta.index = Some(0);
            remote.enqueues = vec![confirmed, enqueue(1, 1, 10)];
        }

        h.service.initialize_latest_l1(Some(1)).await.unwrap();
        assert_eq!(h.service.latest_queue_index().unwrap(), Some(0));
    }

    #[tokio::test]
    async fn test_verifier_recovers_batch_index() {
        let mut config = sync_config(NodeMode::Verifier);
        config.backend = Backend::L1;
        let h = Harness::new(config, MockEngine::with_head(4));
        {
            let mut remote = h.client.remote.lock();
            for i in 0..4 {
                let mut tx = enqueue(i, 1, 10);
                tx.meta.index = Some(i);
                remote.transactions.push(tx);
            }
            remote.transaction_batches = vec![
                (Batch { index: 0, size: 2, ..Default::default() }, vec![]),
                (Batch { index: 1, size: 2, prev_total_elements: 2, ..Default::default() }, vec![]),
            ];
        }
        h.service.store.set_latest_index(Some(3)).unwrap();
        h.service.store.set_latest_batch_index(Some(9)).unwrap();

        h.service.initialize_latest_l1(None).await.unwrap();
        assert_eq!(h.service.latest_batch_index().unwrap(), Some(0));
    }

    #[tokio::test]
    async fn test_verifier_recovers_batch_index_from_blocks() {
        let blocks: Vec<RollupBlock> =
            (1..=4).map(|number| RollupBlock { number, ..Default::default() }).collect();

        // multi transaction blocks go straight to the block, older ones fall back to it
        for de_seq_block in [1, 100] {
            let mut config = sync_config(NodeMode::Verifier);
            config.backend = Backend::L1;
            config.de_seq_block = de_seq_block;
            let h = Harness::new(config, MockEngine::with_head(4));
            {
                let mut remote = h.client.remote.lock();
                remote.blocks = blocks.clone();
                remote.block_batches = vec![
                    (Batch { index: 0, size: 2, ..Default::default() }, blocks[..2].to_vec()),
                    (Batch { index: 1, size: 2, prev_total_elements: 2, ..Default::default() }, blocks[2..].to_vec()),
                ];
            }
            h.service.store.set_latest_index(Some(3)).unwrap();
            h.service.store.set_latest_batch_index(Some(9)).unwrap();

            h.service.initialize_latest_l1(None).await.unwrap();
            assert_eq!(h.service.latest_batch_index().unwrap(), Some(0));
        }
    }

    #[tokio::test]
    async fn test_verifier_batch_recovery_requires_remote_entry() {
        let mut config = sync_config(NodeMode::Verifier);
        config.backend = Backend::L1;
        let h = Harness::new(config, MockEngine::with_head(4));
        h.service.store.set_latest_index(Some(3)).unwrap();
        h.service.store.set_latest_batch_index(Some(9)).unwrap();

        assert!(h.service.initialize_latest_l1(None).await.is_err());
        assert_eq!(h.service.latest_batch_index().unwrap(), Some(9));
    }

    #[tokio::test]
    async fn test_update_l1_block_number() {
        let h = Harness::sequencer(MockEngine::new());
        h.service.ctx.set_timestamp(1_000);
        h.service.ctx.set_block_number(10);

        h.client.remote.lock().latest_context =
            Some(EthContext { block_number: 11, timestamp: 1_100, block_hash: B256::ZERO });
        h.service.update_l1_block_number().await.unwrap();
        assert_eq!(h.service.latest_l1_block_number(), 10);

        h.client.remote.lock().latest_context =
            Some(EthContext { block_number: 30, timestamp: 1_181, block_hash: B256::ZERO });
        h.service.update_l1_block_number().await.unwrap();
        assert_eq!(h.service.latest_l1_block_number(), 30);
        assert_eq!(h.service.latest_l1_timestamp(), 1_181);
    }

    #[tokio::test]
    async fn test_finalized_number_cached() {
        let h = Harness::sequencer(MockEngine::new());
        h.client.remote.lock().transactions = vec![enqueue(0, 1, 10), enqueue(1, 1, 10)];

        assert_eq!(h.service.finalized_number().await.unwrap(), 2);

        h.client.remote.lock().transactions.push(enqueue(2, 1, 10));
        assert_eq!(h.service.finalized_number().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_initialize_waits_for_remote() {
        let h = Harness::sequencer(MockEngine::new());
        {
            let mut remote = h.client.remote.lock();
            remote.latest_context = Some(EthContext::default());
            remote.eth_contexts.insert(1200, EthContext { block_number: 1200, ..Default::default() });
        }

        h.service.initialize().await.unwrap();

        assert!(h.service.is_syncing());
        assert_eq!(h.service.start_seq_height(), 0);
        assert_eq!(h.service.latest_l1_block_number(), 1200);
    }
}
