//! Transaction application: tip commits, historical replay and the multi-transaction pool path

use alloy_primitives::{Address, U256};
use alloy_signer::SignerSync;
use rn_common::{
    db::StoreError,
    metrics::{CommitTimer, SyncMetrics},
    tx::{QueueOrigin, RollupBlock, RollupTransaction, SeqSign},
    utils::{fmt_index, utcnow_sec},
};
use tracing::{debug, error, info, warn};

use crate::{
    error::ApplyError,
    gas::{pays_enough, FeeError},
    service::SyncService,
};

impl SyncService {
    /// Routes a transaction to the indexed path if it already carries a canonical index,
    /// otherwise assigns the next one. `local` is false for blocks relayed by other replicas
    #[tracing::instrument(skip_all, name = "apply", fields(hash = %tx.hash(), local = local))]
    pub async fn apply_transaction(
        &self,
        tx: RollupTransaction,
        local: bool,
    ) -> Result<(), ApplyError> {
        let is_l1_to_l2 = tx.is_l1_to_l2();
        let _guard = self.apply_lock.lock().await;

        let result = match tx.meta.index {
            Some(_) => self.apply_indexed_transaction(tx, local).await,
            None => self.apply_transaction_to_tip(tx, local).await,
        };

        SyncMetrics::applied_tx(is_l1_to_l2, result.is_ok());
        result
    }

    /// Transaction posted in an L1 batch
    pub async fn apply_batched_transaction(&self, tx: RollupTransaction) -> Result<(), ApplyError> {
        if tx.meta.index.is_none() {
            return Err(ApplyError::MissingIndex(tx.hash()));
        }

        let _guard = self.apply_lock.lock().await;
        self.apply_indexed_transaction(tx, true).await
    }

    async fn apply_indexed_transaction(
        &self,
        tx: RollupTransaction,
        local: bool,
    ) -> Result<(), ApplyError> {
        let index = tx.meta.index.ok_or(ApplyError::MissingIndex(tx.hash()))?;
        let next = self.next_index()?;

        if index == next {
            return self.apply_transaction_to_tip(tx, local).await;
        }
        // peers relay every transaction of a multi-transaction block with the same index
        if !local && index + 1 == next && self.is_de_seq(index + 1) {
            return self.apply_transaction_to_tip(tx, local).await;
        }
        if index < next {
            return self.apply_historical_transaction(&tx).await;
        }
        // a peer may have inserted several blocks at once
        if !local {
            return self.apply_transaction_to_tip(tx, local).await;
        }

        Err(ApplyError::IndexAhead { index, next })
    }

    /// Compares a replayed transaction with the one already committed at its index. A
    /// mismatch is only logged until reorgs are handled
    async fn apply_historical_transaction(&self, tx: &RollupTransaction) -> Result<(), ApplyError> {
        let index = tx.meta.index.ok_or(ApplyError::MissingIndex(tx.hash()))?;
        let number = index + 1;

        let block =
            self.engine.block_by_number(number).await?.ok_or(ApplyError::BlockNotFound(number))?;
        if self.is_de_seq(number) {
            return Ok(());
        }

        let [committed] = block.transactions.as_slice() else {
            return Err(ApplyError::MultipleTransactions(number));
        };

        if tx.matches_committed(committed) {
            debug!(index, hash = %tx.hash(), "historical transaction matches");
        } else {
            error!(index, remote = %tx.hash(), local = %committed.hash(), "mismatched transaction");
        }
        Ok(())
    }

    /// Commits `tx` as the next block and waits for the engine to confirm it
    async fn apply_transaction_to_tip(
        &self,
        mut tx: RollupTransaction,
        local: bool,
    ) -> Result<(), ApplyError> {
        let hash = tx.hash();
        if tx.is_l1_to_l2() && tx.meta.l1_timestamp == 0 {
            return Err(ApplyError::MissingL1Timestamp(hash));
        }

        let head = self.engine.head_number().await?;
        let next_block = if local { head + 1 } else { head };
        if self.is_de_seq(next_block) {
            return self.apply_transaction_to_pool(tx, local).await;
        }

        let snapshot = self.ctx.snapshot();
        let index = self.store.latest_index()?;
        let block_number = index.map_or(1, |index| index + 2);

        let expected = self.epoch.resolve_signer(Some(&tx), block_number, head).await?;
        if local {
            self.make_or_verify_sequencer_sign(&mut tx, block_number, expected).await?;
        }

        self.assign_l1_context(&mut tx, local);
        let tx_index = *tx.meta.index.get_or_insert(index.map_or(0, |index| index + 1));
        let queue_index = tx.meta.queue_index;
        let is_owner = self.is_gas_oracle_owner(&tx);

        debug!(index = tx_index, %hash, origin = ?tx.meta.queue_origin, "applying transaction to tip");

        if !local {
            self.persist_commit(tx_index, queue_index)?;
            info!(index = tx_index, %hash, "sync from other node");
            self.engine.relay_other(vec![tx]);

            if is_owner {
                if let Err(err) = self.gas.refresh(self.engine.as_ref()).await {
                    warn!(restore = fmt_index(index), "gas oracle refresh failed, restoring index");
                    self.ctx.restore(snapshot);
                    self.store.set_latest_index(index)?;
                    self.store.set_latest_verified_index(index)?;
                    return Err(ApplyError::GasOracle(err));
                }
            }
            return Ok(());
        }

        let mut timer = CommitTimer::new();
        if let Err(err) = self.engine.mine(vec![tx]).wait().await {
            error!(%err, %hash, "got error when added to chain");
            self.ctx.restore(snapshot);
            return Err(err.into());
        }
        timer.record();

        self.persist_commit(tx_index, queue_index)?;
        if is_owner {
            self.gas.refresh(self.engine.as_ref()).await.map_err(ApplyError::GasOracle)?;
        }

        info!(index = tx_index, %hash, "applied transaction to tip");
        Ok(())
    }

    /// Multi-transaction blocks: forced inclusions, respans and gas oracle updates are still
    /// mined alone, everything else goes through the pool
    async fn apply_transaction_to_pool(
        &self,
        mut tx: RollupTransaction,
        local: bool,
    ) -> Result<(), ApplyError> {
        let hash = tx.hash();
        let head = self.engine.head_number().await?;
        let block_number = if local { head + 1 } else { head };
        let expected = self.epoch.resolve_signer(Some(&tx), block_number, head).await?;

        let mut is_respan = false;
        if local {
            is_respan = self.make_or_verify_sequencer_sign(&mut tx, block_number, expected).await?;

            if tx.meta.l1_timestamp == 0 {
                tx.meta.l1_timestamp = utcnow_sec();
            }
            tx.meta.l1_block_number.get_or_insert(self.ctx.block_number());
            tx.meta.index.get_or_insert(block_number.saturating_sub(1));
        }

        let tx_index = tx.meta.index.ok_or(ApplyError::MissingIndex(hash))?;
        let queue_index = tx.meta.queue_index;
        let is_owner = self.is_gas_oracle_owner(&tx);
        debug!(index = tx_index, %hash, origin = ?tx.meta.queue_origin, "applying transaction to pool");

        if !local {
            self.persist_commit(tx_index, queue_index)?;
            info!(index = tx_index, %hash, "sync from other node");
            self.engine.relay_other(vec![tx]);
            if is_owner {
                self.gas.refresh(self.engine.as_ref()).await.map_err(ApplyError::GasOracle)?;
            }
            return Ok(());
        }

        if !(is_respan || tx.is_l1_to_l2() || is_owner) {
            debug!(%hash, "use txpool");
            let saved = self.store.pointers()?;
            self.persist_commit(tx_index, queue_index)?;
            if let Err(err) = self.engine.add_local(tx).await {
                warn!(%err, %hash, restore = fmt_index(saved.index), "txpool rejected transaction, restoring pointers");
                self.store.restore_pointers(saved)?;
                return Err(err.into());
            }
            return Ok(());
        }

        let mut timer = CommitTimer::new();
        if let Err(err) = self.engine.mine(vec![tx]).wait().await {
            error!(%err, %hash, "got error when added to chain");
            return Err(err.into());
        }
        timer.record();

        self.persist_commit(tx_index, queue_index)?;
        if is_owner {
            self.gas.refresh(self.engine.as_ref()).await.map_err(ApplyError::GasOracle)?;
        }

        info!(index = tx_index, %hash, "applied solo transaction in pool mode");
        Ok(())
    }

    /// Applies a whole block, used once blocks may carry more than one transaction
    pub async fn apply_block(&self, block: RollupBlock) -> Result<(), ApplyError> {
        if block.transactions.is_empty() {
            return Ok(());
        }
        let Some(index) = block.index() else {
            return Ok(());
        };

        let _guard = self.apply_lock.lock().await;
        let next = self.next_index()?;
        info!(index, next, tx0 = %block.transactions[0].hash(), "start to apply block");

        if index > next {
            return Err(ApplyError::BlockAhead { index, next });
        }

        if index < next {
            let committed = self
                .engine
                .block_by_number(block.number)
                .await?
                .ok_or(ApplyError::BlockNotFound(block.number))?;

            if committed.transactions.len() != block.transactions.len() {
                return Err(ApplyError::BlockLengthMismatch {
                    number: block.number,
                    local: committed.transactions.len(),
                    remote: block.transactions.len(),
                });
            }

            if block.transactions[0].matches_committed(&committed.transactions[0]) {
                debug!(index, "historical block matches");
            } else {
                error!(index, "mismatched transaction 0");
            }
            return Ok(());
        }

        let RollupBlock { number, transactions: mut txs, .. } = block;
        let head = self.engine.head_number().await?;
        let expected = self.epoch.resolve_signer(Some(&txs[0]), number, head).await?;
        self.make_or_verify_sequencer_sign(&mut txs[0], number, expected).await?;

        let is_owner = self.is_gas_oracle_owner(&txs[0]);
        let queue_index = txs[0].meta.queue_index;

        let mut timer = CommitTimer::new();
        if let Err(err) = self.engine.mine(txs).wait().await {
            error!(%err, number, "got error when added block txs to chain");
            return Err(err.into());
        }
        timer.record();

        self.persist_commit(index, queue_index)?;
        if is_owner {
            self.gas.refresh(self.engine.as_ref()).await.map_err(ApplyError::GasOracle)?;
        }

        info!(index, "applied block");
        Ok(())
    }

    /// Signs `tx` as the active sequencer or checks the signature against the expected
    /// signer. Returns whether the transaction is a respan call
    pub(crate) async fn make_or_verify_sequencer_sign(
        &self,
        tx: &mut RollupTransaction,
        block_number: u64,
        expected: Address,
    ) -> Result<bool, ApplyError> {
        let sequencer_mode = self.is_sequencer_mode();
        let epochs_enabled = self.epoch.epochs_enabled();
        let local = self.local_signer();

        if sequencer_mode && epochs_enabled && local != Some(expected) {
            error!(%expected, local = ?local, block_number, "current sequencer incorrect");
            return Err(ApplyError::NotSequencer { expected, local });
        }

        if !epochs_enabled || block_number < self.epoch.valid_height() {
            return Ok(false);
        }

        // forced inclusions carry a zero signature
        if tx.is_l1_to_l2() {
            if sequencer_mode {
                tx.meta.seq_sign = Some(SeqSign::zero());
            }
            return Ok(false);
        }

        let is_respan = self.epoch.is_respan_call(tx).await;

        if sequencer_mode {
            self.epoch.authorize_local(expected, block_number).await?;
            match tx.meta.seq_sign {
                Some(sign) if !sign.is_zero() => self.check_seq_signature(tx, sign, expected)?,
                _ => self.add_seq_signature(tx)?,
            }
        } else {
            let sign = tx
                .meta
                .seq_sign
                .ok_or(ApplyError::MissingSignature { hash: tx.hash(), expected })?;
            self.check_seq_signature(tx, sign, expected)?;
        }

        Ok(is_respan)
    }

    fn check_seq_signature(
        &self,
        tx: &RollupTransaction,
        sign: SeqSign,
        expected: Address,
    ) -> Result<(), ApplyError> {
        let recovered = sign.recover(tx.hash())?;
        if recovered != expected {
            error!(%recovered, %expected, hash = %tx.hash(), "unexpected sequencer signature");
            return Err(ApplyError::SignerMismatch { recovered, expected });
        }
        Ok(())
    }

    fn add_seq_signature(&self, tx: &mut RollupTransaction) -> Result<(), ApplyError> {
        let signer = self.signer.as_ref().ok_or(ApplyError::NoSigningKey)?;
        let signature = signer.sign_hash_sync(&tx.hash())?;
        tx.meta.seq_sign = Some(signature.into());
        Ok(())
    }

    /// Fills the L1 context of `tx` from the current one and moves the current one forward
    fn assign_l1_context(&self, tx: &mut RollupTransaction, local: bool) {
        let ts = self.ctx.timestamp();
        let bn = self.ctx.block_number();
        let hash = tx.hash();

        if tx.meta.l1_timestamp == 0 {
            tx.meta.l1_timestamp = if ts == 0 { utcnow_sec() } else { ts };
        } else if tx.meta.l1_timestamp < ts && local {
            error!(%hash, latest = ts, tx = tx.meta.l1_timestamp, "timestamp monotonicity violation");
        }

        match tx.meta.l1_block_number {
            None => tx.meta.l1_block_number = Some(bn),
            Some(number) if number > bn => {
                self.ctx.set_block_number(number);
                SyncMetrics::l1_block_number(number);
            }
            Some(number) if number < bn && local => {
                error!(%hash, new = number, old = bn, "block number monotonicity violation");
            }
            Some(_) => {}
        }

        if tx.meta.l1_timestamp > ts {
            self.ctx.set_timestamp(tx.meta.l1_timestamp);
        }
    }

    fn is_gas_oracle_owner(&self, tx: &RollupTransaction) -> bool {
        tx.sender().is_ok_and(|sender| self.gas.is_owner(sender))
    }

    /// Persists the pointers of a committed transaction
    pub(crate) fn persist_commit(
        &self,
        index: u64,
        queue_index: Option<u64>,
    ) -> Result<(), StoreError> {
        self.store.commit_index(index, queue_index, utcnow_sec() as i64)?;

        SyncMetrics::latest_index(index);
        SyncMetrics::latest_verified_index(index);
        if let Some(queue_index) = self.store.latest_queue_index()? {
            SyncMetrics::latest_queue_index(queue_index);
        }
        Ok(())
    }

    /// Rejects zero or out of range gas prices. The gas oracle owner may send for free
    pub async fn verify_fee(&self, tx: &RollupTransaction) -> Result<(), ApplyError> {
        let from = tx.sender().map_err(ApplyError::InvalidSender)?;

        // the owner may have been changed by the l2 manager
        if self.gas.is_owner(from) {
            self.gas.refresh_owner(self.engine.as_ref()).await?;
        }

        let gas_price = tx.gas_price();
        if gas_price == 0 {
            if self.gas.is_owner(from) || !self.config.enforce_fees {
                return Ok(());
            }
            return Err(FeeError::ZeroGasPrice.into());
        }

        pays_enough(
            U256::from(gas_price),
            self.gas.l2_gas_price(),
            self.config.fee_threshold_up,
            self.config.fee_threshold_down,
        )?;
        Ok(())
    }

    /// Entry point for user transactions sent to the sequencer
    #[tracing::instrument(skip_all, name = "submit", fields(hash = %tx.hash()))]
    pub async fn validate_and_apply_sequencer_transaction(
        &self,
        tx: RollupTransaction,
    ) -> Result<(), ApplyError> {
        if self.config.is_verifier() {
            return Err(ApplyError::VerifierRejects);
        }
        if self.is_syncing() {
            return Err(ApplyError::Syncing);
        }

        if tx.meta.queue_origin != QueueOrigin::Sequencer {
            return Err(ApplyError::InvalidOrigin(tx.meta.queue_origin));
        }

        let _guard = self.tx_lock.lock().await;
        self.verify_fee(&tx).await?;

        let from = tx.sender().map_err(ApplyError::InvalidSender)?;
        let local = self.gas.is_owner(from);
        debug!(%from, local, "sequencer transaction validation");
        self.engine.validate_tx(&tx, local).await?;

        self.apply_transaction(tx, true).await
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::{Bytes, B256};
    use alloy_signer_local::PrivateKeySigner;
    use rn_common::{
        engine::CommitError,
        mock::{call, enqueue, transfer, MockEngine},
        types::NodeMode,
    };
    use rn_epoch::mock::{recommit_calldata, MockEpochSource};

    use super::*;
    use crate::{
        gas::GAS_PRICE_ORACLE,
        test_utils::{sync_config, Harness, SEQSET},
    };

    fn user_tx(nonce: u64) -> RollupTransaction {
        transfer(&PrivateKeySigner::random(), nonce, Address::with_last_byte(0xbb), U256::from(1))
    }

    #[tokio::test]
    async fn test_apply_to_tip_assigns_next_index() {
        let h = Harness::sequencer(MockEngine::with_head(42));
        h.service.store.commit_index(41, Some(41), 0).unwrap();
        h.service.ctx.set_timestamp(1_700_000_100);
        h.service.ctx.set_block_number(90);

        h.service.apply_transaction(user_tx(0), true).await.unwrap();

        assert_eq!(h.service.latest_index().unwrap(), Some(42));
        assert_eq!(h.service.latest_verified_index().unwrap(), Some(42));
        assert!(h.service.latest_index_time().unwrap().is_some());

        let block = h.engine.last_block().unwrap();
        assert_eq!(block.number, 43);
        let tx = &block.transactions[0];
        assert_eq!(tx.meta.index, Some(42));
        assert_eq!(tx.meta.l1_timestamp, 1_700_000_100);
        assert_eq!(tx.meta.l1_block_number, Some(90));
    }

    #[tokio::test]
    async fn test_genesis_index() {
        let h = Harness::sequencer(MockEngine::new());
        h.service.ctx.set_timestamp(1_700_000_000);

        h.service.apply_transaction(user_tx(0), true).await.unwrap();

        assert_eq!(h.service.latest_index().unwrap(), Some(0));
        assert_eq!(h.engine.last_block().unwrap().transactions[0].meta.index, Some(0));
    }

    #[tokio::test]
    async fn test_l1_context_moves_forward() {
        let h = Harness::sequencer(MockEngine::new());
        h.service.ctx.set_timestamp(1_700_000_000);
        h.service.ctx.set_block_number(100);

        h.service.apply_transaction(enqueue(0, 105, 1_700_000_500), true).await.unwrap();
        assert_eq!(h.service.latest_l1_block_number(), 105);
        assert_eq!(h.service.latest_l1_timestamp(), 1_700_000_500);
        assert_eq!(h.service.latest_queue_index().unwrap(), Some(0));

        // older context from a local source is kept as is but never moves the context back
        h.service.apply_transaction(enqueue(1, 101, 1_700_000_200), true).await.unwrap();
        assert_eq!(h.service.latest_l1_block_number(), 105);
        assert_eq!(h.service.latest_l1_timestamp(), 1_700_000_500);
        assert_eq!(h.service.latest_queue_index().unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_enqueue_requires_timestamp() {
        let h = Harness::sequencer(MockEngine::new());
        let tx = enqueue(0, 1, 0);

        let err = h.service.apply_transaction(tx, true).await.unwrap_err();
        assert!(matches!(err, ApplyError::MissingL1Timestamp(_)));
        assert_eq!(h.service.latest_index().unwrap(), None);
    }

    #[tokio::test]
    async fn test_commit_failure_restores_context() {
        let h = Harness::sequencer(MockEngine::with_head(5));
        h.service.store.commit_index(4, None, 0).unwrap();
        h.service.ctx.set_timestamp(1_000);
        h.service.ctx.set_block_number(10);
        h.engine.chain.lock().mine_error = Some("out of gas".into());

        let err = h.service.apply_transaction(enqueue(0, 20, 2_000), true).await.unwrap_err();

        assert!(matches!(err, ApplyError::Commit(CommitError::Execution(_))));
        assert_eq!(h.service.latest_index().unwrap(), Some(4));
        assert_eq!(h.service.latest_queue_index().unwrap(), None);
        assert_eq!(h.service.latest_l1_block_number(), 10);
        assert_eq!(h.service.latest_l1_timestamp(), 1_000);
        assert_eq!(h.engine.head(), 5);
    }

    #[tokio::test]
    async fn test_indexed_routing() {
        let h = Harness::sequencer(MockEngine::with_head(3));
        h.service.store.commit_index(2, None, 0).unwrap();

        // ahead of the local tip
        let mut ahead = user_tx(0);
        ahead.meta.index = Some(5);
        let err = h.service.apply_transaction(ahead.clone(), true).await.unwrap_err();
        assert!(matches!(err, ApplyError::IndexAhead { index: 5, next: 3 }));

        // historical replay never commits
        let committed = h.engine.chain.lock().blocks[1].transactions[0].clone();
        h.service.apply_transaction(committed, true).await.unwrap();
        let mut mismatched = user_tx(1);
        mismatched.meta.index = Some(0);
        h.service.apply_transaction(mismatched, true).await.unwrap();
        assert_eq!(h.engine.head(), 3);

        // at the tip
        let mut next = user_tx(2);
        next.meta.index = Some(3);
        next.meta.l1_timestamp = 1_700_000_000;
        h.service.apply_transaction(next, true).await.unwrap();
        assert_eq!(h.service.latest_index().unwrap(), Some(3));
        assert_eq!(h.engine.head(), 4);
    }

    #[tokio::test]
    async fn test_peer_transactions_are_relayed() {
        let h = Harness::sequencer(MockEngine::with_head(2));
        h.service.store.commit_index(1, None, 0).unwrap();

        // peers may be ahead of the local index
        let mut tx = user_tx(0);
        tx.meta.index = Some(4);
        tx.meta.l1_timestamp = 1_700_000_000;
        h.service.apply_transaction(tx.clone(), false).await.unwrap();

        assert_eq!(h.service.latest_index().unwrap(), Some(4));
        let relayed = h.engine.chain.lock().relayed.clone();
        assert_eq!(relayed.len(), 1);
        assert_eq!(relayed[0].hash(), tx.hash());
        assert_eq!(h.engine.head(), 3);
    }

    #[tokio::test]
    async fn test_sign_with_epochs() {
        let signer = PrivateKeySigner::random();
        let epochs = MockEpochSource::with_epochs(1_000, &[signer.address()]);
        let h = Harness::with_epochs(
            sync_config(NodeMode::Sequencer),
            MockEngine::new(),
            1,
            epochs,
            signer.clone(),
        );
        h.service.ctx.set_timestamp(1_700_000_000);

        for nonce in 0..3 {
            h.service.apply_transaction(user_tx(nonce), true).await.unwrap();
        }

        for block in h.engine.chain.lock().blocks.iter().skip(1) {
            let tx = &block.transactions[0];
            let sign = tx.meta.seq_sign.unwrap();
            assert_eq!(sign.recover(tx.hash()).unwrap(), signer.address());
        }
    }

    #[tokio::test]
    async fn test_not_the_sequencer() {
        let other = PrivateKeySigner::random();
        let epochs = MockEpochSource::with_epochs(1_000, &[other.address()]);
        let h = Harness::with_epochs(
            sync_config(NodeMode::Sequencer),
            MockEngine::with_head(5),
            2,
            epochs,
            PrivateKeySigner::random(),
        );
        h.service.store.commit_index(4, None, 0).unwrap();

        let err = h.service.apply_transaction(user_tx(0), true).await.unwrap_err();
        assert!(matches!(err, ApplyError::NotSequencer { expected, .. } if expected == other.address()));
        assert_eq!(h.service.latest_index().unwrap(), Some(4));
        assert_eq!(h.engine.head(), 5);
    }

    #[tokio::test]
    async fn test_verifier_checks_signature() {
        let sequencer = PrivateKeySigner::random();
        let epochs = MockEpochSource::with_epochs(1_000, &[sequencer.address()]);
        let h = Harness::with_epochs(
            sync_config(NodeMode::Verifier),
            MockEngine::with_head(5),
            2,
            epochs,
            PrivateKeySigner::random(),
        );
        h.service.store.commit_index(4, None, 0).unwrap();

        let mut unsigned = user_tx(0);
        unsigned.meta.l1_timestamp = 1_700_000_000;
        let err = h.service.apply_transaction(unsigned.clone(), true).await.unwrap_err();
        assert!(matches!(err, ApplyError::MissingSignature { .. }));

        let mut forged = unsigned.clone();
        forged.meta.seq_sign =
            Some(PrivateKeySigner::random().sign_hash_sync(&forged.hash()).unwrap().into());
        let err = h.service.apply_transaction(forged, true).await.unwrap_err();
        assert!(matches!(err, ApplyError::SignerMismatch { .. }));

        let mut signed = unsigned;
        signed.meta.seq_sign = Some(sequencer.sign_hash_sync(&signed.hash()).unwrap().into());
        h.service.apply_transaction(signed, true).await.unwrap();
        assert_eq!(h.service.latest_index().unwrap(), Some(5));
    }

    #[tokio::test]
    async fn test_pre_respan_stops_local_signing() {
        let signer = PrivateKeySigner::random();
        let next = Address::with_last_byte(0x99);
        let epochs = MockEpochSource::with_epochs(1_000, &[signer.address()]);
        let h = Harness::with_epochs(
            sync_config(NodeMode::Sequencer),
            MockEngine::with_head(5),
            2,
            epochs,
            signer.clone(),
        );
        h.service.store.commit_index(4, None, 0).unwrap();
        h.service.set_pre_respan(signer.address(), next, 6).await;

        let err = h.service.apply_transaction(user_tx(0), true).await.unwrap_err();
        assert!(matches!(err, ApplyError::Epoch(_)));
        assert_eq!(h.service.latest_index().unwrap(), Some(4));
    }

    #[tokio::test]
    async fn test_pool_mode() {
        let mpc = PrivateKeySigner::random();
        let signer = PrivateKeySigner::random();
        let epochs = MockEpochSource::with_epochs(1_000, &[signer.address()]);
        epochs.set_mpc(mpc.address(), U256::ZERO);

        let mut config = sync_config(NodeMode::Sequencer);
        config.de_seq_block = 4;
        let h = Harness::with_epochs(config, MockEngine::with_head(3), 2, epochs, signer.clone());
        h.service.store.commit_index(2, None, 0).unwrap();

        // regular transactions are queued to the pool
        h.service.apply_transaction(user_tx(0), true).await.unwrap();
        let pooled = h.engine.chain.lock().pool.clone();
        assert_eq!(pooled.len(), 1);
        assert_eq!(pooled[0].meta.index, Some(3));
        assert!(pooled[0].meta.seq_sign.is_some());
        assert_eq!(h.engine.head(), 3);
        assert_eq!(h.service.latest_index().unwrap(), Some(3));

        // respans are mined alone
        let respan = call(&mpc, 0, SEQSET, U256::ZERO, recommit_calldata(10, 20, signer.address()));
        h.service.apply_transaction(respan.clone(), true).await.unwrap();
        assert_eq!(h.engine.head(), 4);
        assert_eq!(h.engine.last_block().unwrap().transactions[0].hash(), respan.hash());
    }

    #[tokio::test]
    async fn test_pool_commit_failure_restores_index() {
        let mut config = sync_config(NodeMode::Sequencer);
        config.de_seq_block = 1;
        let h = Harness::new(config, MockEngine::with_head(3));
        h.service.store.commit_index(2, Some(2), 1_700_000_000).unwrap();
        h.engine.chain.lock().mine_error = Some("boom".into());

        let err = h.service.apply_transaction(enqueue(3, 1, 1_700_000_000), true).await.unwrap_err();
        assert!(matches!(err, ApplyError::Commit(_)));
        assert_eq!(h.service.latest_index().unwrap(), Some(2));
        assert_eq!(h.service.latest_verified_index().unwrap(), Some(2));
        assert_eq!(h.service.latest_queue_index().unwrap(), Some(2));
        assert_eq!(h.service.latest_index_time().unwrap(), Some(1_700_000_000));

        // the enqueue is retried from the same queue index
        h.service.apply_transaction(enqueue(3, 1, 1_700_000_000), true).await.unwrap();
        assert_eq!(h.service.latest_index().unwrap(), Some(3));
        assert_eq!(h.service.latest_queue_index().unwrap(), Some(3));
    }

    #[tokio::test]
    async fn test_pool_rejection_restores_pointers() {
        let mut config = sync_config(NodeMode::Sequencer);
        config.de_seq_block = 1;
        let h = Harness::new(config, MockEngine::with_head(3));
        h.service.store.commit_index(2, Some(2), 1_700_000_000).unwrap();
        h.engine.chain.lock().reject = Some("nonce too low".into());

        let err = h.service.apply_transaction(user_tx(0), true).await.unwrap_err();
        assert!(matches!(err, ApplyError::Engine(_)));
        assert_eq!(h.service.store.pointers().unwrap().index, Some(2));
        assert_eq!(h.service.latest_verified_index().unwrap(), Some(2));
        assert_eq!(h.service.latest_queue_index().unwrap(), Some(2));
        assert_eq!(h.service.latest_index_time().unwrap(), Some(1_700_000_000));
        assert!(h.engine.chain.lock().pool.is_empty());
    }

    #[tokio::test]
    async fn test_apply_block() {
        let mut config = sync_config(NodeMode::Verifier);
        config.de_seq_block = 1;
        let h = Harness::new(config, MockEngine::with_head(2));
        h.service.store.commit_index(1, Some(1), 0).unwrap();

        let block = |number: u64, txs: Vec<RollupTransaction>| RollupBlock {
            number,
            timestamp: 1_700_000_000,
            state_root: B256::ZERO,
            transactions: txs,
        };

        let err = h.service.apply_block(block(5, vec![user_tx(0)])).await.unwrap_err();
        assert!(matches!(err, ApplyError::BlockAhead { index: 4, next: 2 }));

        let err = h.service.apply_block(block(2, vec![user_tx(0), user_tx(1)])).await.unwrap_err();
        assert!(matches!(err, ApplyError::BlockLengthMismatch { number: 2, local: 1, remote: 2 }));

        h.service.apply_block(block(3, vec![user_tx(0), user_tx(1), enqueue(2, 1, 1)])).await.unwrap();
        assert_eq!(h.engine.head(), 3);
        assert_eq!(h.engine.last_block().unwrap().transactions.len(), 3);
        assert_eq!(h.service.latest_index().unwrap(), Some(2));

        // empty blocks are skipped
        h.service.apply_block(block(4, vec![])).await.unwrap();
        assert_eq!(h.engine.head(), 3);
    }

    #[tokio::test]
    async fn test_verify_fee() {
        let mut config = sync_config(NodeMode::Sequencer);
        config.enforce_fees = true;
        config.fee_threshold_down = Some(0.9);
        let h = Harness::new(config, MockEngine::new());
        h.engine.set_storage(GAS_PRICE_ORACLE, 1, U256::from(2_000_000_000u64));
        h.service.gas.refresh(h.engine.as_ref()).await.unwrap();

        // mock transactions pay 1 gwei
        let err = h.service.verify_fee(&user_tx(0)).await.unwrap_err();
        assert!(matches!(err, ApplyError::Fee(FeeError::GasPriceTooLow { .. })));

        h.engine.set_storage(GAS_PRICE_ORACLE, 1, U256::from(1_000_000_000u64));
        h.service.gas.refresh(h.engine.as_ref()).await.unwrap();
        h.service.verify_fee(&user_tx(0)).await.unwrap();
    }

    #[tokio::test]
    async fn test_submission_rules() {
        let mut config = sync_config(NodeMode::Verifier);
        let h = Harness::new(config.clone(), MockEngine::new());
        let err = h.service.validate_and_apply_sequencer_transaction(user_tx(0)).await.unwrap_err();
        assert!(matches!(err, ApplyError::VerifierRejects));

        config.mode = NodeMode::Sequencer;
        let h = Harness::new(config, MockEngine::new());
        h.service.ctx.set_timestamp(1_700_000_000);

        h.service.set_syncing(true);
        let err = h.service.validate_and_apply_sequencer_transaction(user_tx(0)).await.unwrap_err();
        assert!(matches!(err, ApplyError::Syncing));
        h.service.set_syncing(false);

        let err = h
            .service
            .validate_and_apply_sequencer_transaction(enqueue(0, 1, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, ApplyError::InvalidOrigin(QueueOrigin::L1ToL2)));

        h.engine.chain.lock().reject = Some("nonce too low".into());
        let err = h.service.validate_and_apply_sequencer_transaction(user_tx(0)).await.unwrap_err();
        assert!(matches!(err, ApplyError::Engine(_)));
        h.engine.chain.lock().reject = None;

        h.service.validate_and_apply_sequencer_transaction(user_tx(0)).await.unwrap();
        assert_eq!(h.service.latest_index().unwrap(), Some(0));
    }

    #[tokio::test]
    async fn test_owner_tx_refreshes_gas_cache() {
        let owner = PrivateKeySigner::random();
        let h = Harness::sequencer(MockEngine::new());
        h.engine.set_storage(GAS_PRICE_ORACLE, 0, U256::from_be_slice(owner.address().as_slice()));
        h.service.gas.refresh(h.engine.as_ref()).await.unwrap();
        h.service.ctx.set_timestamp(1_700_000_000);

        h.engine.set_storage(GAS_PRICE_ORACLE, 1, U256::from(7));
        let tx = call(&owner, 0, GAS_PRICE_ORACLE, U256::ZERO, Bytes::from_static(&[1]));
        h.service.apply_transaction(tx, true).await.unwrap();

        assert_eq!(h.service.gas.l2_gas_price(), U256::from(7));
    }
}
