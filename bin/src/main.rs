use std::sync::Arc;

use eyre::WrapErr;
use rn_common::{
    client::HttpRollupClient,
    config::{load_env_vars, load_static_config, EnvConfig, StaticConfig, SyncConfig},
    db::IndexStore,
    engine::RpcEngine,
    metrics::{record_info, start_metrics_server},
    runtime::init_runtime,
    utils::{initialize_panic_hook, initialize_tracing_log},
};
use rn_epoch::{AlloyEpochSource, EpochOracle};
use rn_rpc::start_rpc;
use rn_sync::SyncService;
use tokio::{
    signal::unix::SignalKind,
    sync::{mpsc, watch},
};
use tracing::{error, info};

/// Blocks from other replicas waiting to be applied
const RELAY_CAPACITY: usize = 1024;

#[tokio::main]
async fn main() {
    initialize_panic_hook();

    let config = load_static_config();
    let envs = load_env_vars();

    let _guard = initialize_tracing_log();
    init_runtime();
    start_metrics_server();

    info!("starting rollup node");

    match run(config, envs).await {
        Ok(_) => info!("rollup node exited"),
        Err(err) => {
            error!(%err, "rollup node exited with error");
            eprintln!("rollup node exited with error: {err}");
        }
    }
}

async fn run(config: StaticConfig, envs: EnvConfig) -> eyre::Result<()> {
    info!("{}", serde_json::to_string_pretty(&config)?);

    let sync_config = SyncConfig::try_from(&config)?;
    let signer = envs.sequencer_signer_key;
    record_info(
        sync_config.chain_id,
        sync_config.mode,
        sync_config.backend,
        signer.as_ref().map(|signer| signer.address()),
    );

    let client = Arc::new(HttpRollupClient::new(
        config.node.rollup_client_url.clone(),
        sync_config.chain_id,
    ));
    let engine = Arc::new(RpcEngine::new(config.l2.rpc_url.clone()));
    let epoch = Arc::new(EpochOracle::new(
        Arc::new(AlloyEpochSource::new(config.l2.rpc_url.clone(), config.epoch.seqset_contract)),
        config.epoch.seqset_contract,
        config.epoch.seqset_valid_height,
        config.epoch.default_signer,
    ));
    let store = IndexStore::open(&config.node.db_path)
        .wrap_err_with(|| format!("failed to open index store at {}", config.node.db_path))?;

    let sync = Arc::new(SyncService::new(sync_config, client, engine, epoch, store, signer));
    sync.initialize().await?;

    // held until shutdown, dropping it ends the relay loop
    let (relay_tx, relay_rx) = mpsc::channel(RELAY_CAPACITY);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    sync.clone().start(relay_rx, shutdown_rx).await?;

    start_rpc(&config, sync);

    // Wait for SIGTERM or SIGINT
    let mut sigint = tokio::signal::unix::signal(SignalKind::interrupt())?;
    let mut sigterm = tokio::signal::unix::signal(SignalKind::terminate())?;

    tokio::select! {
        _ = sigint.recv() => {}
        _ = sigterm.recv() => {}
    }

    info!("shutting down");
    drop(relay_tx);
    let _ = shutdown_tx.send(true);

    Ok(())
}
