use alloy_primitives::{Address, Bytes, B256};
use jsonrpsee::{core::RpcResult, proc_macros::rpc};
use serde::{Deserialize, Serialize};

/// Subset of the Ethereum JSON-RPC API served by the node, other methods are expected to be
/// routed to the execution node
#[rpc(client, server, namespace = "eth")]
pub trait EthApi {
    /// Sends signed transaction, returning its hash
    #[method(name = "sendRawTransaction")]
    async fn send_raw_transaction(&self, bytes: Bytes) -> RpcResult<B256>;
}

#[rpc(client, server, namespace = "rollup")]
pub trait RollupApi {
    /// Sync pointers and whether the node is still catching up
    #[method(name = "syncStatus")]
    async fn sync_status(&self) -> RpcResult<SyncStatusResponse>;

    /// Called by the bridge ahead of a respan so this node stops producing blocks it will no
    /// longer be authorized for
    #[method(name = "setPreRespan")]
    async fn set_pre_respan(
        &self,
        pre_signer: Address,
        new_signer: Address,
        start_block: u64,
    ) -> RpcResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatusResponse {
    pub syncing: bool,
    #[serde(with = "alloy_serde::quantity::opt")]
    pub latest_index: Option<u64>,
    #[serde(with = "alloy_serde::quantity::opt")]
    pub latest_queue_index: Option<u64>,
    #[serde(with = "alloy_serde::quantity::opt")]
    pub latest_batch_index: Option<u64>,
    #[serde(with = "alloy_serde::quantity::opt")]
    pub latest_verified_index: Option<u64>,
}
