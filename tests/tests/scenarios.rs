#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use alloy_primitives::{Address, B256, U256};
    use alloy_signer::SignerSync;
    use alloy_signer_local::PrivateKeySigner;
    use rn_common::{
        client::Batch,
        config::SyncConfig,
        db::IndexStore,
        mock::{call, enqueue, transfer, MockEngine, MockRollupClient, TEST_CHAIN_ID},
        tx::{RollupBlock, RollupTransaction},
        types::{Backend, EthContext, NodeMode},
    };
    use rn_epoch::{
        mock::{recommit_calldata, MockEpochSource},
        EpochOracle, RespanQueue, FALLBACK_MIN_TRANSFER,
    };
    use rn_sync::{ApplyError, StateRootVerifier, SyncError, SyncService};
    use tokio::sync::{mpsc, watch};

    const SEQSET: Address = Address::new([0x5e; 20]);
    const VALID_HEIGHT: u64 = 10;

    fn config(mode: NodeMode, backend: Backend) -> SyncConfig {
        SyncConfig {
            chain_id: TEST_CHAIN_ID,
            mode,
            backend,
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

    struct Node {
        client: Arc<MockRollupClient>,
        engine: Arc<MockEngine>,
        service: Arc<SyncService>,
    }

    fn node(
        config: SyncConfig,
        engine: MockEngine,
        store: IndexStore,
        oracle: Arc<EpochOracle>,
        signer: Option<PrivateKeySigner>,
    ) -> Node {
        let client = Arc::new(MockRollupClient::new());
        let engine = Arc::new(engine);
        let service = SyncService::new(config, client.clone(), engine.clone(), oracle, store, signer)
            .with_state_root_verifier(StateRootVerifier::new(3, Duration::from_millis(1)));

        Node { client, engine, service: Arc::new(service) }
    }

    /// Single signer for every height
    fn no_epochs(signer: Address) -> Arc<EpochOracle> {
        Arc::new(EpochOracle::new(Arc::new(MockEpochSource::default()), SEQSET, 0, signer))
    }

    fn store_at(latest_index: Option<u64>) -> IndexStore {
        let store = IndexStore::temporary().unwrap();
        if let Some(index) = latest_index {
            store.commit_index(index, None, 0).unwrap();
        }
        store
    }

    /// Verifier whose next block is `height`
    fn verifier_at(height: u64, oracle: Arc<EpochOracle>) -> Node {
        node(
            config(NodeMode::Verifier, Backend::L2),
            MockEngine::with_head(height - 1),
            store_at(Some(height - 2)),
            oracle,
            None,
        )
    }

    fn sequencer_signed(mut tx: RollupTransaction, signer: &PrivateKeySigner) -> RollupTransaction {
        tx.meta.seq_sign = Some(signer.sign_hash_sync(&tx.hash()).unwrap().into());
        tx
    }

    fn user_transfer(nonce: u64) -> RollupTransaction {
        transfer(&PrivateKeySigner::random(), nonce, Address::with_last_byte(0xbb), U256::from(1))
    }

    async fn wait_for(mut condition: impl FnMut() -> bool) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn test_fresh_node_initializes_from_deploy_height() {
        let signer = PrivateKeySigner::random();
        let n = node(
            config(NodeMode::Sequencer, Backend::L1),
            MockEngine::new(),
            store_at(None),
            no_epochs(signer.address()),
            Some(signer),
        );
        let context = EthContext { block_number: 1200, timestamp: 1_700_000_000, block_hash: B256::ZERO };
        n.client.remote.lock().eth_contexts.insert(1200, context);

        n.service.initialize_latest_l1(Some(1200)).await.unwrap();

        assert_eq!(n.service.latest_l1_block_number(), 1200);
        assert_eq!(n.service.latest_l1_timestamp(), 1_700_000_000);
        assert_eq!(n.service.latest_index().unwrap(), None);
    }

    #[tokio::test]
    async fn test_submission_gets_next_index() {
        let signer = PrivateKeySigner::random();
        let n = node(
            config(NodeMode::Sequencer, Backend::L1),
            MockEngine::with_head(42),
            store_at(Some(41)),
            no_epochs(signer.address()),
            Some(signer),
        );

        n.service.validate_and_apply_sequencer_transaction(user_transfer(0)).await.unwrap();

        assert_eq!(n.service.latest_index().unwrap(), Some(42));
        assert_eq!(n.service.latest_verified_index().unwrap(), Some(42));
        let block = n.engine.last_block().unwrap();
        assert_eq!(block.number, 43);
        assert_eq!(block.transactions[0].meta.index, Some(42));

        let status = n.service.sync_status().unwrap();
        assert_eq!(status.latest_index, Some(42));
        assert_eq!(status.latest_verified_index, Some(42));
    }

    #[tokio::test]
    async fn test_index_is_monotonic() {
        let signer = PrivateKeySigner::random();
        let n = node(
            config(NodeMode::Sequencer, Backend::L1),
            MockEngine::new(),
            store_at(None),
            no_epochs(signer.address()),
            Some(signer),
        );

        let mut previous = None;
        for nonce in 0..5 {
            n.service.validate_and_apply_sequencer_transaction(user_transfer(nonce)).await.unwrap();

            let latest = n.service.latest_index().unwrap();
            assert_eq!(latest, Some(previous.map_or(0, |index: u64| index + 1)));
            assert!(n.service.latest_verified_index().unwrap() <= latest);
            previous = latest;
        }
        assert_eq!(n.engine.head(), 5);
    }

    #[tokio::test]
    async fn test_respans_switch_authorized_signer() {
        let mpc = PrivateKeySigner::random();
        let (pre, a, b) = (PrivateKeySigner::random(), PrivateKeySigner::random(), PrivateKeySigner::random());

        let source = Arc::new(MockEpochSource::default());
        source.push_epoch(pre.address(), 0, 199);
        source.push_epoch(pre.address(), 200, 399);
        source.set_mpc(mpc.address(), U256::ZERO);
        let oracle = Arc::new(EpochOracle::new(source.clone(), SEQSET, VALID_HEIGHT, pre.address()));

        let to_a = call(&mpc, 0, SEQSET, U256::ZERO, recommit_calldata(200, 299, a.address()));
        oracle.resolve_signer(Some(&to_a), 150, 149).await.unwrap();
        source.recommit(a.address(), 200, 299);

        let to_b = call(&mpc, 1, SEQSET, U256::ZERO, recommit_calldata(300, 399, b.address()));
        oracle.resolve_signer(Some(&to_b), 151, 150).await.unwrap();
        source.recommit(b.address(), 300, 399);

        for (height, signer) in [(199, &pre), (250, &a), (310, &b)] {
            let n = verifier_at(height, oracle.clone());
            let tx = user_transfer(0);

            let forged = sequencer_signed(tx.clone(), &PrivateKeySigner::random());
            let err = n.service.ingest_transaction(forged).await.unwrap_err();
            assert!(matches!(err, ApplyError::SignerMismatch { expected, .. } if expected == signer.address()));
            assert_eq!(n.service.latest_index().unwrap(), Some(height - 2));

            n.service.ingest_transaction(sequencer_signed(tx, signer)).await.unwrap();
            assert_eq!(n.service.latest_index().unwrap(), Some(height - 1));
            assert_eq!(n.engine.head(), height);
        }
    }

    #[tokio::test]
    async fn test_mpc_funding_falls_back_to_current_signer() {
        let current = PrivateKeySigner::random();
        let mpc = Address::with_last_byte(0xee);
        let source = Arc::new(MockEpochSource::default());
        source.push_epoch(current.address(), 0, 299);
        source.set_mpc(mpc, U256::from(400_000_000_000_000_000u64));
        let oracle = Arc::new(EpochOracle::new(source, SEQSET, VALID_HEIGHT, current.address()));

        let n = verifier_at(320, oracle);
        let user = PrivateKeySigner::random();

        let other = sequencer_signed(transfer(&user, 0, Address::with_last_byte(3), U256::from(1)), &current);
        let err = n.service.ingest_transaction(other).await.unwrap_err();
        assert!(matches!(err, ApplyError::Epoch(err) if err.is_epoch_number_exceeds_known()));

        let funding = sequencer_signed(transfer(&user, 0, mpc, FALLBACK_MIN_TRANSFER), &current);
        n.service.ingest_transaction(funding).await.unwrap();
        assert_eq!(n.service.latest_index().unwrap(), Some(319));
    }

    #[tokio::test]
    async fn test_short_remote_batch_tip() {
        let store = store_at(None);
        store.set_latest_batch_index(Some(7)).unwrap();
        let n = node(
            config(NodeMode::Verifier, Backend::L1),
            MockEngine::new(),
            store,
            no_epochs(Address::ZERO),
            None,
        );
        n.client.remote.lock().transaction_batches = (0..6)
            .map(|index| {
                let batch = Batch { index, root: B256::ZERO, size: 0, prev_total_elements: 0, block_number: 0, timestamp: 0 };
                (batch, Vec::new())
            })
            .collect();

        let err = n.service.sync_batches_to_tip().await.unwrap_err();

        assert!(matches!(err, SyncError::ShortRemoteTip { remote: 5, local: 7 }));
        assert_eq!(n.service.latest_batch_index().unwrap(), Some(7));
        assert_eq!(n.service.latest_index().unwrap(), None);
        assert_eq!(n.client.fetches(), 0);
    }

    #[tokio::test]
    async fn test_sync_to_tip_is_idempotent() {
        let n = node(
            config(NodeMode::Verifier, Backend::L2),
            MockEngine::new(),
            store_at(None),
            no_epochs(Address::ZERO),
            None,
        );
        n.client.remote.lock().transactions = (0..5)
            .map(|index| {
                let mut tx = enqueue(index, 10 + index, 1_700_000_000 + index);
                tx.meta.index = Some(index);
                tx
            })
            .collect();

        n.service.sync_transactions_to_tip().await.unwrap();
        assert_eq!(n.service.latest_index().unwrap(), Some(4));

        let fetches = n.client.fetches();
        n.service.sync_transactions_to_tip().await.unwrap();
        assert_eq!(n.client.fetches(), fetches);
        assert_eq!(n.engine.head(), 5);
    }

    #[test]
    fn test_respan_queue_order() {
        let mut queue = RespanQueue::default();
        for height in [100, 50, 75] {
            queue.insert(height);
        }
        assert_eq!(queue.as_slice(), &[50, 75, 100]);
        assert_eq!(queue.pop_front(), Some(50));
        assert_eq!(queue.front(), Some(75));
    }

    #[tokio::test]
    async fn test_sequencer_startup() {
        let signer = PrivateKeySigner::random();
        let n = node(
            config(NodeMode::Sequencer, Backend::L1),
            MockEngine::new(),
            store_at(None),
            no_epochs(signer.address()),
            Some(signer),
        );
        {
            let mut remote = n.client.remote.lock();
            remote.latest_context = Some(EthContext { block_number: 1200, ..Default::default() });
            remote.eth_contexts.insert(1200, EthContext { block_number: 1200, ..Default::default() });
            remote.enqueues = (0..3).map(|i| enqueue(i, 1200 + i, 1_700_000_000 + i)).collect();
        }

        n.service.initialize().await.unwrap();
        assert!(n.service.is_syncing());

        let (_relay_tx, relay_rx) = mpsc::channel(8);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        n.service.clone().start(relay_rx, shutdown_rx).await.unwrap();

        let service = n.service.clone();
        wait_for(|| !service.is_syncing()).await;
        assert_eq!(n.service.latest_queue_index().unwrap(), Some(2));
        assert_eq!(n.engine.head(), 3);

        shutdown_tx.send(true).unwrap();
    }

    #[tokio::test]
    async fn test_peer_blocks_are_relayed() {
        let mut config = config(NodeMode::Sequencer, Backend::L1);
        config.enable_sync = false;
        let signer = PrivateKeySigner::random();
        let n = node(config, MockEngine::new(), store_at(None), no_epochs(signer.address()), Some(signer));

        let (relay_tx, relay_rx) = mpsc::channel(8);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        n.service.clone().start(relay_rx, shutdown_rx).await.unwrap();

        let mut tx = user_transfer(0);
        tx.meta.index = Some(0);
        tx.meta.l1_timestamp = 1_700_000_000;
        relay_tx
            .send(RollupBlock { number: 1, timestamp: 1_700_000_000, state_root: B256::ZERO, transactions: vec![tx] })
            .await
            .unwrap();

        let engine = n.engine.clone();
        wait_for(|| engine.chain.lock().relayed.len() == 1).await;
        assert_eq!(n.service.latest_index().unwrap(), Some(0));

        shutdown_tx.send(true).unwrap();
    }
}
