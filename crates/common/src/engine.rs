//! Block production and chain state collaborator. The sync service hands committed
//! transactions to the engine and reads back the canonical chain.

use alloy_eips::BlockNumberOrTag;
use alloy_primitives::{Address, Bytes, B256, U256, U64};
use alloy_provider::{Provider, ProviderBuilder, RootProvider};
use alloy_rpc_types::BlockTransactionsKind;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::error;
use url::Url;

use crate::{
    runtime::spawn,
    tx::{QueueOrigin, RollupBlock, RollupTransaction, SeqSign, TransactionMeta},
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommitError {
    #[error("execution failed: {0}")]
    Execution(String),

    #[error("commit dropped before confirmation")]
    Dropped,
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("engine request failed: {0}")]
    Request(String),

    #[error("transaction rejected: {0}")]
    Rejected(String),
}

pub type CommitResult = Result<(), CommitError>;

/// Resolves once the engine confirms or fails a submission
#[derive(Debug)]
pub struct PendingCommit(oneshot::Receiver<CommitResult>);

impl PendingCommit {
    pub fn channel() -> (oneshot::Sender<CommitResult>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self(rx))
    }

    pub fn ready(result: CommitResult) -> Self {
        let (tx, pending) = Self::channel();
        let _ = tx.send(result);
        pending
    }

    pub async fn wait(self) -> CommitResult {
        self.0.await.unwrap_or(Err(CommitError::Dropped))
    }
}

#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    async fn head_number(&self) -> Result<u64, EngineError>;
    async fn head_state_root(&self) -> Result<B256, EngineError>;
    async fn block_by_number(&self, number: u64) -> Result<Option<RollupBlock>, EngineError>;
    async fn storage_at(&self, address: Address, slot: U256) -> Result<U256, EngineError>;
    async fn contains_transaction(&self, hash: B256) -> Result<bool, EngineError>;
    async fn validate_tx(&self, tx: &RollupTransaction, local: bool) -> Result<(), EngineError>;
    /// Queues a transaction for the next multi-transaction block
    async fn add_local(&self, tx: RollupTransaction) -> Result<(), EngineError>;

    /// Mines `txs` as one block
    fn mine(&self, txs: Vec<RollupTransaction>) -> PendingCommit;
    /// Feeds transactions produced by another replica into block production
    fn relay_other(&self, txs: Vec<RollupTransaction>);
}

#[derive(Debug, Clone, Serialize)]
struct EngineTransaction<'a> {
    raw: &'a Bytes,
    meta: &'a TransactionMeta,
}

impl<'a> From<&'a RollupTransaction> for EngineTransaction<'a> {
    fn from(tx: &'a RollupTransaction) -> Self {
        Self { raw: &tx.meta.raw_transaction, meta: &tx.meta }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct L2Block {
    number: U64,
    timestamp: U64,
    state_root: B256,
    transactions: Vec<L2Transaction>,
}

/// Transaction as returned by the L2 node, with rollup metadata next to the usual fields
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct L2Transaction {
    #[serde(flatten)]
    inner: alloy_rpc_types::Transaction,
    l1_block_number: Option<U64>,
    l1_timestamp: Option<U64>,
    l1_tx_origin: Option<Address>,
    #[serde(default)]
    queue_origin: QueueOrigin,
    index: Option<U64>,
    queue_index: Option<U64>,
    seq_r: Option<U256>,
    seq_s: Option<U256>,
    seq_v: Option<U64>,
}

impl From<L2Transaction> for RollupTransaction {
    fn from(tx: L2Transaction) -> Self {
        let seq_sign = match (tx.seq_r, tx.seq_s, tx.seq_v) {
            (Some(r), Some(s), Some(v)) => Some(SeqSign { r, s, v: v.to() }),
            _ => None,
        };

        let mut rollup_tx = RollupTransaction::sequencer(tx.inner.inner);
        rollup_tx.meta.l1_block_number = tx.l1_block_number.map(|n| n.to());
        rollup_tx.meta.l1_timestamp = tx.l1_timestamp.map(|n| n.to()).unwrap_or_default();
        rollup_tx.meta.l1_message_sender = tx.l1_tx_origin;
        rollup_tx.meta.queue_origin = tx.queue_origin;
        rollup_tx.meta.index = tx.index.map(|n| n.to());
        rollup_tx.meta.queue_index = tx.queue_index.map(|n| n.to());
        rollup_tx.meta.seq_sign = seq_sign;
        rollup_tx
    }
}

impl From<L2Block> for RollupBlock {
    fn from(block: L2Block) -> Self {
        Self {
            number: block.number.to(),
            timestamp: block.timestamp.to(),
            state_root: block.state_root,
            transactions: block.transactions.into_iter().map(Into::into).collect(),
        }
    }
}

/// [`ExecutionEngine`] backed by the local L2 node JSON-RPC
#[derive(Clone)]
pub struct RpcEngine {
    provider: RootProvider,
}

impl RpcEngine {
    pub fn new(url: Url) -> Self {
        let provider = ProviderBuilder::new().disable_recommended_fillers().on_http(url);
        Self { provider }
    }

    fn request_err(err: impl std::fmt::Display) -> EngineError {
        EngineError::Request(err.to_string())
    }
}

#[async_trait]
impl ExecutionEngine for RpcEngine {
    async fn head_number(&self) -> Result<u64, EngineError> {
        self.provider.get_block_number().await.map_err(Self::request_err)
    }

    async fn head_state_root(&self) -> Result<B256, EngineError> {
        let block = self
            .provider
            .get_block_by_number(BlockNumberOrTag::Latest, BlockTransactionsKind::Hashes)
            .await
            .map_err(Self::request_err)?
            .ok_or_else(|| EngineError::Request("missing latest block".into()))?;

        Ok(block.header.state_root)
    }

    async fn block_by_number(&self, number: u64) -> Result<Option<RollupBlock>, EngineError> {
        let block: Option<L2Block> = self
            .provider
            .raw_request("eth_getBlockByNumber".into(), (BlockNumberOrTag::Number(number), true))
            .await
            .map_err(Self::request_err)?;

        Ok(block.map(Into::into))
    }

    async fn storage_at(&self, address: Address, slot: U256) -> Result<U256, EngineError> {
        self.provider.get_storage_at(address, slot).await.map_err(Self::request_err)
    }

    async fn contains_transaction(&self, hash: B256) -> Result<bool, EngineError> {
        let tx = self.provider.get_transaction_by_hash(hash).await.map_err(Self::request_err)?;
        Ok(tx.is_some())
    }

    async fn validate_tx(&self, tx: &RollupTransaction, local: bool) -> Result<(), EngineError> {
        let _: Option<serde_json::Value> = self
            .provider
            .raw_request("rollup_validateTransaction".into(), (EngineTransaction::from(tx), local))
            .await
            .map_err(|err| EngineError::Rejected(err.to_string()))?;
        Ok(())
    }

    async fn add_local(&self, tx: RollupTransaction) -> Result<(), EngineError> {
        let _: Option<serde_json::Value> = self
            .provider
            .raw_request("rollup_addPoolTransaction".into(), [EngineTransaction::from(&tx)])
            .await
            .map_err(|err| EngineError::Rejected(err.to_string()))?;
        Ok(())
    }

    fn mine(&self, txs: Vec<RollupTransaction>) -> PendingCommit {
        let (result_tx, pending) = PendingCommit::channel();
        let provider = self.provider.clone();

        spawn(async move {
            let params: Vec<EngineTransaction> = txs.iter().map(Into::into).collect();
            let result = provider
                .raw_request::<_, Option<serde_json::Value>>(
                    "rollup_applyTransactions".into(),
                    [params],
                )
                .await
                .map(|_| ())
                .map_err(|err| CommitError::Execution(err.to_string()));
            let _ = result_tx.send(result);
        });

        pending
    }

    fn relay_other(&self, txs: Vec<RollupTransaction>) {
        let provider = self.provider.clone();

        spawn(async move {
            let params: Vec<EngineTransaction> = txs.iter().map(Into::into).collect();
            if let Err(err) = provider
                .raw_request::<_, Option<serde_json::Value>>(
                    "rollup_applyOtherTransactions".into(),
                    [params],
                )
                .await
            {
                error!(%err, "failed to relay peer transactions");
            }
        });
    }
}
