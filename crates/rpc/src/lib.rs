use std::sync::Arc;

use rn_common::{
    config::{RpcConfig, StaticConfig},
    runtime::spawn,
};
use rn_sync::SyncService;
use tracing::info;

mod error;
mod server;

pub use error::RpcError;
pub use server::RpcServer;

pub fn start_rpc(config: &StaticConfig, sync: Arc<SyncService>) {
    let rpc_config: RpcConfig = config.into();

    info!(port = rpc_config.port, "starting RPC server");

    let rpc_server = RpcServer::new(rpc_config, sync);
    spawn(rpc_server.run());
}
