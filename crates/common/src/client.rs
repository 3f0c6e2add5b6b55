//! Remote data source the sync service drains: enqueues, transactions, blocks and batches
//! indexed by the data transport layer, plus the state roots posted to L1.

use alloy_primitives::{Address, Bytes, B256};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};
use tracing::debug;
use url::Url;

use crate::{
    tx::{QueueOrigin, RollupBlock, RollupTransaction, SeqSign},
    types::{Backend, EthContext, SyncStatus},
};

const USE_INBOX_BATCH_INDEX: &str = "USE_INBOX_BATCH_INDEX";

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The source has no item at this position, not a failure
    #[error("element not found")]
    NotFound,

    #[error("batch {0} was posted through the batch inbox")]
    UseInboxBatch(u64),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("remote error: {0}")]
    Remote(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl ClientError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Batch {
    pub index: u64,
    pub root: B256,
    pub size: u64,
    pub prev_total_elements: u64,
    pub block_number: u64,
    pub timestamp: u64,
}

#[async_trait]
pub trait RollupClient: Send + Sync {
    async fn sync_status(&self, backend: Backend) -> Result<SyncStatus, ClientError>;
    async fn latest_eth_context(&self) -> Result<EthContext, ClientError>;
    async fn eth_context(&self, height: u64) -> Result<EthContext, ClientError>;

    async fn enqueue(&self, index: u64) -> Result<RollupTransaction, ClientError>;
    async fn latest_enqueue(&self) -> Result<RollupTransaction, ClientError>;

    async fn transaction(
        &self,
        index: u64,
        backend: Backend,
    ) -> Result<RollupTransaction, ClientError>;
    async fn latest_transaction_index(&self, backend: Backend)
        -> Result<Option<u64>, ClientError>;
    /// Batch index of the transaction at `index`, if it was batched
    async fn raw_transaction_batch_index(
        &self,
        index: u64,
        backend: Backend,
    ) -> Result<Option<u64>, ClientError>;
    async fn transaction_batch(
        &self,
        index: u64,
    ) -> Result<(Batch, Vec<RollupTransaction>), ClientError>;
    async fn latest_transaction_batch_index(&self) -> Result<Option<u64>, ClientError>;

    async fn block(&self, index: u64, backend: Backend) -> Result<RollupBlock, ClientError>;
    /// Batch holding the block at `index`, `None` while it is not batched
    async fn raw_block_batch_index(
        &self,
        index: u64,
        backend: Backend,
    ) -> Result<Option<u64>, ClientError>;
    async fn latest_block_index(&self, backend: Backend) -> Result<Option<u64>, ClientError>;
    async fn block_batch(&self, index: u64) -> Result<(Batch, Vec<RollupBlock>), ClientError>;

    /// Posted state root at `index`, zero if not posted yet
    async fn state_root(&self, index: u64) -> Result<B256, ClientError>;
    async fn set_last_verifier(
        &self,
        index: u64,
        state_root: B256,
        verifier_root: B256,
        success: bool,
    ) -> Result<(), ClientError>;

    async fn latest_enqueue_index(&self) -> Result<Option<u64>, ClientError> {
        let enqueue = self.latest_enqueue().await?;
        enqueue
            .meta
            .queue_index
            .map(Some)
            .ok_or_else(|| ClientError::InvalidResponse("latest enqueue has no index".into()))
    }

    /// Newest enqueue that was included in the canonical chain
    async fn last_confirmed_enqueue(&self) -> Result<RollupTransaction, ClientError> {
        let mut enqueue = self.latest_enqueue().await?;
        loop {
            if enqueue.meta.index.is_some() {
                return Ok(enqueue);
            }
            match enqueue.meta.queue_index {
                Some(0) | None => return Err(ClientError::NotFound),
                Some(queue_index) => enqueue = self.enqueue(queue_index - 1).await?,
            }
        }
    }
}

// Data transport layer responses

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Numeric {
    Number(u64),
    Text(String),
}

impl Numeric {
    fn parse(&self) -> Result<u64, ClientError> {
        match self {
            Numeric::Number(n) => Ok(*n),
            Numeric::Text(s) => {
                let parsed = match s.strip_prefix("0x") {
                    Some(hex) => u64::from_str_radix(hex, 16),
                    None => s.parse(),
                };
                parsed.map_err(|_| ClientError::InvalidResponse(format!("invalid number {s}")))
            }
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnqueueEntry {
    index: u64,
    target: Address,
    data: Bytes,
    gas_limit: Numeric,
    origin: Address,
    block_number: u64,
    timestamp: u64,
    ctc_index: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionEntry {
    index: u64,
    batch_index: Option<u64>,
    block_number: u64,
    timestamp: u64,
    gas_limit: Numeric,
    target: Option<Address>,
    origin: Option<Address>,
    data: Bytes,
    queue_origin: QueueOrigin,
    queue_index: Option<u64>,
    seq_sign: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlockEntry {
    index: u64,
    batch_index: Option<u64>,
    timestamp: u64,
    transactions: Vec<TransactionEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchEntry {
    index: u64,
    root: B256,
    size: u64,
    prev_total_elements: u64,
    block_number: u64,
    timestamp: u64,
}

#[derive(Debug, Deserialize)]
struct TransactionResponse {
    transaction: Option<TransactionEntry>,
}

#[derive(Debug, Deserialize)]
struct TransactionBatchResponse {
    batch: Option<BatchEntry>,
    #[serde(default)]
    transactions: Vec<TransactionEntry>,
}

#[derive(Debug, Deserialize)]
struct BlockResponse {
    block: Option<BlockEntry>,
}

#[derive(Debug, Deserialize)]
struct BlockBatchResponse {
    batch: Option<BatchEntry>,
    #[serde(default)]
    blocks: Vec<BlockEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StateRootResponse {
    state_root: Option<StateRootEntry>,
}

#[derive(Debug, Deserialize)]
struct StateRootEntry {
    value: B256,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

impl From<BatchEntry> for Batch {
    fn from(entry: BatchEntry) -> Self {
        Self {
            index: entry.index,
            root: entry.root,
            size: entry.size,
            prev_total_elements: entry.prev_total_elements,
            block_number: entry.block_number,
            timestamp: entry.timestamp,
        }
    }
}

impl EnqueueEntry {
    fn into_transaction(self, chain_id: u64) -> Result<RollupTransaction, ClientError> {
        let mut tx = RollupTransaction::enqueue(
            chain_id,
            self.index,
            self.target,
            self.gas_limit.parse()?,
            self.data,
            self.origin,
            self.block_number,
            self.timestamp,
        );
        tx.meta.index = self.ctc_index;
        Ok(tx)
    }
}

impl TransactionEntry {
    fn into_transaction(self, chain_id: u64) -> Result<RollupTransaction, ClientError> {
        let mut tx = match self.queue_origin {
            QueueOrigin::Sequencer => RollupTransaction::decode_sequencer(&self.data)
                .map_err(|err| ClientError::InvalidResponse(err.to_string()))?,
            QueueOrigin::L1ToL2 => {
                let queue_index = self.queue_index.ok_or_else(|| {
                    ClientError::InvalidResponse(format!("enqueue {} has no queue index", self.index))
                })?;
                RollupTransaction::enqueue(
                    chain_id,
                    queue_index,
                    self.target.unwrap_or_default(),
                    self.gas_limit.parse()?,
                    self.data,
                    self.origin.unwrap_or_default(),
                    self.block_number,
                    self.timestamp,
                )
            }
        };

        tx.meta.index = Some(self.index);
        tx.meta.l1_block_number = Some(self.block_number);
        tx.meta.l1_timestamp = self.timestamp;
        tx.meta.seq_sign = self.seq_sign.as_deref().and_then(SeqSign::parse);
        Ok(tx)
    }
}

impl BlockEntry {
    fn into_block(self, chain_id: u64) -> Result<RollupBlock, ClientError> {
        let transactions = self
            .transactions
            .into_iter()
            .map(|tx| tx.into_transaction(chain_id))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(RollupBlock {
            number: self.index + 1,
            timestamp: self.timestamp,
            state_root: B256::ZERO,
            transactions,
        })
    }
}

/// [`RollupClient`] over the data transport layer REST API
#[derive(Clone)]
pub struct HttpRollupClient {
    client: Client,
    url: Url,
    chain_id: u64,
}

impl HttpRollupClient {
    pub fn new(url: Url, chain_id: u64) -> Self {
        Self { client: Client::new(), url, chain_id }
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        backend: Option<Backend>,
    ) -> Result<Option<T>, ClientError> {
        let mut url = self
            .url
            .join(path)
            .map_err(|err| ClientError::InvalidResponse(format!("invalid path {path}: {err}")))?;
        if let Some(backend) = backend {
            url.query_pairs_mut().append_pair("backend", backend.as_str());
        }

        debug!(%url, "rollup client request");

        let response = self.client.get(url).send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        if status == StatusCode::BAD_REQUEST {
            let err = serde_json::from_slice::<ErrorResponse>(&body)
                .map(|res| res.error)
                .unwrap_or_else(|_| String::from_utf8_lossy(&body).into_owned());
            return Err(ClientError::Remote(err));
        }
        if !status.is_success() {
            return Err(ClientError::Remote(format!("status {status}")));
        }

        serde_json::from_slice::<Option<T>>(&body)
            .map_err(|err| ClientError::InvalidResponse(err.to_string()))
    }

    async fn get_some<T: DeserializeOwned>(
        &self,
        path: &str,
        backend: Option<Backend>,
    ) -> Result<T, ClientError> {
        self.get(path, backend).await?.ok_or(ClientError::NotFound)
    }
}

#[async_trait]
impl RollupClient for HttpRollupClient {
    async fn sync_status(&self, backend: Backend) -> Result<SyncStatus, ClientError> {
        self.get_some(&format!("eth/syncing/{}", self.chain_id), Some(backend)).await
    }

    async fn latest_eth_context(&self) -> Result<EthContext, ClientError> {
        self.get_some("eth/context/latest", None).await
    }

    async fn eth_context(&self, height: u64) -> Result<EthContext, ClientError> {
        self.get_some(&format!("eth/context/blocknumber/{height}"), None).await
    }

    async fn enqueue(&self, index: u64) -> Result<RollupTransaction, ClientError> {
        let entry: EnqueueEntry =
            self.get_some(&format!("enqueue/index/{index}/{}", self.chain_id), None).await?;
        entry.into_transaction(self.chain_id)
    }

    async fn latest_enqueue(&self) -> Result<RollupTransaction, ClientError> {
        let entry: EnqueueEntry =
            self.get_some(&format!("enqueue/latest/{}", self.chain_id), None).await?;
        entry.into_transaction(self.chain_id)
    }

    async fn transaction(
        &self,
        index: u64,
        backend: Backend,
    ) -> Result<RollupTransaction, ClientError> {
        let res: TransactionResponse = self
            .get_some(&format!("transaction/index/{index}/{}", self.chain_id), Some(backend))
            .await?;
        res.transaction.ok_or(ClientError::NotFound)?.into_transaction(self.chain_id)
    }

    async fn latest_transaction_index(
        &self,
        backend: Backend,
    ) -> Result<Option<u64>, ClientError> {
        let res: TransactionResponse = self
            .get_some(&format!("transaction/latest/{}", self.chain_id), Some(backend))
            .await?;
        Ok(Some(res.transaction.ok_or(ClientError::NotFound)?.index))
    }

    async fn raw_transaction_batch_index(
        &self,
        index: u64,
        backend: Backend,
    ) -> Result<Option<u64>, ClientError> {
        let res: TransactionResponse = self
            .get_some(&format!("transaction/index/{index}/{}", self.chain_id), Some(backend))
            .await?;
        Ok(res.transaction.ok_or(ClientError::NotFound)?.batch_index)
    }

    async fn transaction_batch(
        &self,
        index: u64,
    ) -> Result<(Batch, Vec<RollupTransaction>), ClientError> {
        let res: TransactionBatchResponse = self
            .get_some(&format!("batch/transaction/index/{index}/{}", self.chain_id), None)
            .await
            .map_err(|err| match err {
                ClientError::Remote(msg) if msg.contains(USE_INBOX_BATCH_INDEX) => {
                    ClientError::UseInboxBatch(index)
                }
                err => err,
            })?;

        let batch = res.batch.ok_or(ClientError::NotFound)?;
        let txs = res
            .transactions
            .into_iter()
            .map(|tx| tx.into_transaction(self.chain_id))
            .collect::<Result<Vec<_>, _>>()?;

        Ok((batch.into(), txs))
    }

    async fn latest_transaction_batch_index(&self) -> Result<Option<u64>, ClientError> {
        let res: TransactionBatchResponse = self
            .get_some(&format!("batch/transaction/latest/{}", self.chain_id), None)
            .await?;
        Ok(Some(res.batch.ok_or(ClientError::NotFound)?.index))
    }

    async fn block(&self, index: u64, backend: Backend) -> Result<RollupBlock, ClientError> {
        let res: BlockResponse = self
            .get_some(&format!("block/index/{index}/{}", self.chain_id), Some(backend))
            .await?;
        res.block.ok_or(ClientError::NotFound)?.into_block(self.chain_id)
    }

    async fn raw_block_batch_index(
        &self,
        index: u64,
        backend: Backend,
    ) -> Result<Option<u64>, ClientError> {
        let res: BlockResponse = self
            .get_some(&format!("block/index/{index}/{}", self.chain_id), Some(backend))
            .await?;
        Ok(res.block.ok_or(ClientError::NotFound)?.batch_index)
    }

    async fn latest_block_index(&self, backend: Backend) -> Result<Option<u64>, ClientError> {
        let res: BlockResponse = self
            .get_some(&format!("block/latest/{}", self.chain_id), Some(backend))
            .await?;
        Ok(Some(res.block.ok_or(ClientError::NotFound)?.index))
    }

    async fn block_batch(&self, index: u64) -> Result<(Batch, Vec<RollupBlock>), ClientError> {
        let res: BlockBatchResponse =
            self.get_some(&format!("batch/block/index/{index}/{}", self.chain_id), None).await?;

        let batch = res.batch.ok_or(ClientError::NotFound)?;
        let blocks = res
            .blocks
            .into_iter()
            .map(|block| block.into_block(self.chain_id))
            .collect::<Result<Vec<_>, _>>()?;

        Ok((batch.into(), blocks))
    }

    async fn state_root(&self, index: u64) -> Result<B256, ClientError> {
        let res: Option<StateRootResponse> =
            self.get(&format!("stateroot/index/{index}/{}", self.chain_id), None).await?;
        Ok(res.and_then(|res| res.state_root).map(|root| root.value).unwrap_or_default())
    }

    async fn set_last_verifier(
        &self,
        index: u64,
        state_root: B256,
        verifier_root: B256,
        success: bool,
    ) -> Result<(), ClientError> {
        let path = format!(
            "verifier/set/{success}/{}/{index}/{state_root}/{verifier_root}",
            self.chain_id
        );
        let _: Option<serde_json::Value> = self.get(&path, None).await?;
        Ok(())
    }
}
