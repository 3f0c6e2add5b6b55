use std::sync::Arc;

use alloy_primitives::{Address, Bytes, B256};
use jsonrpsee::{
    core::{RegisterMethodError, RpcResult},
    server::ServerBuilder,
    RpcModule,
};
use rn_common::{
    api::{EthApiServer, RollupApiServer, SyncStatusResponse},
    config::RpcConfig,
    metrics::RpcMetrics,
    tx::RollupTransaction,
};
use rn_sync::SyncService;
use tracing::{error, info, Level};

use super::error::RpcError;

#[derive(Clone)]
pub struct RpcServer {
    /// Port to open the RPC server on
    port: u16,
    sync: Arc<SyncService>,
}

impl RpcServer {
    pub fn new(config: RpcConfig, sync: Arc<SyncService>) -> Self {
        Self { port: config.port, sync }
    }

    pub fn into_module(self) -> Result<RpcModule<()>, RegisterMethodError> {
        let mut module = RpcModule::new(());
        module.merge(EthApiServer::into_rpc(self.clone()))?;
        module.merge(RollupApiServer::into_rpc(self))?;
        Ok(module)
    }

    #[tracing::instrument(skip_all, name = "rpc")]
    pub async fn run(self) {
        let addr = format!("0.0.0.0:{}", self.port);
        info!(addr, "starting RPC server");

        let server = match ServerBuilder::default().build(&addr).await {
            Ok(server) => server,
            Err(err) => {
                error!(%err, addr, "failed to create RPC server");
                return;
            }
        };
        let module = match self.into_module() {
            Ok(module) => module,
            Err(err) => {
                error!(%err, "failed to register RPC methods");
                return;
            }
        };

        let server_handle = server.start(module);
        server_handle.stopped().await;

        error!("RPC server stopped");
    }
}

#[async_trait::async_trait]
impl EthApiServer for RpcServer {
    #[tracing::instrument(skip_all, name = "raw_transaction", err, ret(level = Level::DEBUG))]
    async fn send_raw_transaction(&self, raw_tx: Bytes) -> RpcResult<B256> {
        let tx = RollupTransaction::decode_sequencer(&raw_tx).map_err(|_| RpcError::FailedParsing)?;
        let tx_hash = tx.hash();

        let result = self.sync.validate_and_apply_sequencer_transaction(tx).await;
        RpcMetrics::submission(result.is_ok());
        result.map_err(RpcError::from)?;

        Ok(tx_hash)
    }
}

#[async_trait::async_trait]
impl RollupApiServer for RpcServer {
    async fn sync_status(&self) -> RpcResult<SyncStatusResponse> {
        Ok(self.sync.sync_status().map_err(RpcError::from)?)
    }

    async fn set_pre_respan(
        &self,
        pre_signer: Address,
        new_signer: Address,
        start_block: u64,
    ) -> RpcResult<()> {
        info!(%pre_signer, %new_signer, start_block, "set pre respan");
        self.sync.set_pre_respan(pre_signer, new_signer, start_block).await;
        Ok(())
    }
}
