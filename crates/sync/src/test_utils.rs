//! Service wired to in-memory collaborators

use std::{sync::Arc, time::Duration};

use alloy_primitives::Address;
use alloy_signer_local::PrivateKeySigner;
use rn_common::{
    config::SyncConfig,
    db::IndexStore,
    mock::{MockEngine, MockRollupClient, TEST_CHAIN_ID},
    types::{Backend, NodeMode},
};
use rn_epoch::{mock::MockEpochSource, EpochOracle};

use crate::{service::SyncService, verify::StateRootVerifier};

pub const SEQSET: Address = Address::new([0x5e; 20]);

pub fn sync_config(mode: NodeMode) -> SyncConfig {
    SyncConfig {
        chain_id: TEST_CHAIN_ID,
        mode,
        backend: Backend::L1,
        enable_sync: true,
        poll_interval: Duration::from_secs(15),
        timestamp_refresh_threshold: Duration::from_secs(180),
        ctc_deploy_height: Some(1200),
        de_seq_block: 0,
        sequencer_client_url: None,
        enforce_fees: false,
        fee_threshold_up: None,
        fee_threshold_down: None,
    }
}

pub struct Harness {
    pub client: Arc<MockRollupClient>,
    pub engine: Arc<MockEngine>,
    pub epochs: Arc<MockEpochSource>,
    pub signer: PrivateKeySigner,
    pub service: SyncService,
}

impl Harness {
    /// Epochs disabled, the local key signs everything
    pub fn new(config: SyncConfig, engine: MockEngine) -> Self {
        Self::with_epochs(config, engine, 0, MockEpochSource::default(), PrivateKeySigner::random())
    }

    pub fn sequencer(engine: MockEngine) -> Self {
        Self::new(sync_config(NodeMode::Sequencer), engine)
    }

    pub fn with_epochs(
        config: SyncConfig,
        engine: MockEngine,
        valid_height: u64,
        epochs: MockEpochSource,
        signer: PrivateKeySigner,
    ) -> Self {
        let client = Arc::new(MockRollupClient::new());
        let engine = Arc::new(engine);
        let epochs = Arc::new(epochs);
        let oracle =
            Arc::new(EpochOracle::new(epochs.clone(), SEQSET, valid_height, signer.address()));

        let service = SyncService::new(
            config,
            client.clone(),
            engine.clone(),
            oracle,
            IndexStore::temporary().unwrap(),
            Some(signer.clone()),
        )
        .with_state_root_verifier(StateRootVerifier::new(3, Duration::from_millis(1)));

        Self { client, engine, epochs, signer, service }
    }
}
