use std::{
    net::SocketAddr,
    time::{Duration, Instant},
};

use alloy_primitives::Address;
use axum::{
    body::Body,
    http::{header::CONTENT_TYPE, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
};
use eyre::bail;
use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, register_histogram_with_registry, register_int_counter_vec_with_registry,
    register_int_counter_with_registry, register_int_gauge_vec_with_registry,
    register_int_gauge_with_registry, Encoder, Histogram, IntCounter, IntCounterVec, IntGauge,
    IntGaugeVec, Opts, Registry, TextEncoder,
};
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::{
    runtime::spawn,
    types::{Backend, NodeMode},
    COMMIT_HASH,
};

pub fn start_metrics_server() {
    let port =
        std::env::var("METRICS_PORT").map(|s| s.parse().expect("invalid port")).unwrap_or(9500);

    spawn(async move {
        if let Err(err) = run_metrics(port).await {
            error!("metrics server error {}", err);
        }
    });
}

pub fn record_info(chain_id: u64, mode: NodeMode, backend: Backend, signer: Option<Address>) {
    let mode = match mode {
        NodeMode::Sequencer => "sequencer",
        NodeMode::Verifier => "verifier",
    };
    let opts = Opts::new("info", "Rollup node info")
        .const_label("version", env!("CARGO_PKG_VERSION"))
        .const_label("commit", COMMIT_HASH)
        .const_label("chain_id", chain_id.to_string())
        .const_label("mode", mode)
        .const_label("backend", backend.as_str())
        .const_label("signer", signer.unwrap_or_default().to_string());

    let info = IntGauge::with_opts(opts).unwrap();
    info.set(1);

    REGISTRY.register(Box::new(info)).unwrap();
}

pub async fn run_metrics(port: u16) -> eyre::Result<()> {
    info!("starting metrics server on port {}", port);

    let router = axum::Router::new()
        .route("/status", get(|| async { StatusCode::OK }))
        .route("/metrics", get(handle_metrics));
    let address = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(&address).await?;

    axum::serve(listener, router).await?;

    bail!("metrics server stopped")
}

async fn handle_metrics() -> Response {
    match prepare_metrics() {
        Ok(response) => response,
        Err(err) => {
            error!(%err, "failed to prepare metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn prepare_metrics() -> Result<Response, MetricsError> {
    let metrics = REGISTRY.gather();
    let encoder = TextEncoder::new();
    let s = encoder.encode_to_string(&metrics)?;

    Response::builder()
        .status(200)
        .header(CONTENT_TYPE, encoder.format_type())
        .body(Body::from(s))
        .map_err(MetricsError::FailedBody)
}

#[derive(Debug, thiserror::Error)]
enum MetricsError {
    #[error("failed encoding metrics {0}")]
    FailedEncoding(#[from] prometheus::Error),

    #[error("failed encoding body {0}")]
    FailedBody(#[from] axum::http::Error),
}

lazy_static! {
    static ref REGISTRY: Registry =
        Registry::new_custom(Some("rollup".to_string()), None).unwrap();

    /////////////////////// SYNC ///////////////////////

    /// Persisted sync pointers
    static ref SYNC_POINTERS: IntGaugeVec =
        register_int_gauge_vec_with_registry!("sync_pointer", "Latest applied index by pointer", &["pointer"], &REGISTRY).unwrap();

    static ref SYNC_SYNCING: IntGauge =
        register_int_gauge_with_registry!("sync_syncing", "Node is catching up to the remote tip", &REGISTRY).unwrap();

    static ref SYNC_L1_BLOCK_NUMBER: IntGauge =
        register_int_gauge_with_registry!("sync_l1_block_number", "L1 block number of the current context", &REGISTRY).unwrap();

    /// Applied transactions
    static ref APPLIED_TXS: IntCounterVec =
        register_int_counter_vec_with_registry!("sync_applied_txs", "Applied transactions", &["origin", "result"], &REGISTRY).unwrap();

    static ref SYNC_ERRORS: IntCounterVec =
        register_int_counter_vec_with_registry!("sync_errors", "Sync pass failures by source", &["source"], &REGISTRY).unwrap();

    /// Time from submission to commit confirmation
    static ref COMMIT_LATENCY: Histogram =
        register_histogram_with_registry!("sync_commit_latency_secs", "Commit latency in seconds", exponential_buckets(0.001, 2.0, 16).unwrap(), &REGISTRY).unwrap();

    /////////////////////// EPOCH ///////////////////////

    static ref EPOCH_REFRESHES: IntCounter =
        register_int_counter_with_registry!("epoch_cache_refreshes", "Epoch cache refreshes", &REGISTRY).unwrap();

    static ref EPOCH_RESPANS: IntCounter =
        register_int_counter_with_registry!("epoch_respans", "Respan calls seen", &REGISTRY).unwrap();

    static ref EPOCH_FALLBACKS: IntCounter =
        register_int_counter_with_registry!("epoch_fallbacks", "Signer resolved through the low balance fallback", &REGISTRY).unwrap();

    static ref EPOCH_NUMBER: IntGauge =
        register_int_gauge_with_registry!("epoch_number", "Cached epoch number", &REGISTRY).unwrap();

    /////////////////////// VERIFIER ///////////////////////

    static ref STATE_ROOT_RESULTS: IntCounterVec =
        register_int_counter_vec_with_registry!("verifier_state_roots", "State root checks", &["result"], &REGISTRY).unwrap();

    /////////////////////// RPC ///////////////////////

    static ref RPC_SUBMISSIONS: IntCounterVec =
        register_int_counter_vec_with_registry!("rpc_submissions", "Submitted transactions", &["result"], &REGISTRY).unwrap();
}

fn result_label(is_success: bool) -> &'static str {
    if is_success {
        "success"
    } else {
        "failed"
    }
}

pub struct SyncMetrics;

impl SyncMetrics {
    pub fn latest_index(index: u64) {
        SYNC_POINTERS.with_label_values(&["index"]).set(index as i64);
    }

    pub fn latest_queue_index(index: u64) {
        SYNC_POINTERS.with_label_values(&["queue_index"]).set(index as i64);
    }

    pub fn latest_batch_index(index: u64) {
        SYNC_POINTERS.with_label_values(&["batch_index"]).set(index as i64);
    }

    pub fn latest_verified_index(index: u64) {
        SYNC_POINTERS.with_label_values(&["verified_index"]).set(index as i64);
    }

    pub fn set_syncing(syncing: bool) {
        SYNC_SYNCING.set(if syncing { 1 } else { 0 });
    }

    pub fn l1_block_number(block_number: u64) {
        SYNC_L1_BLOCK_NUMBER.set(block_number as i64);
    }

    pub fn applied_tx(is_l1_to_l2: bool, is_success: bool) {
        let origin = if is_l1_to_l2 { "l1" } else { "sequencer" };
        APPLIED_TXS.with_label_values(&[origin, result_label(is_success)]).inc();
    }

    pub fn sync_error(source: &str) {
        SYNC_ERRORS.with_label_values(&[source]).inc();
    }

    pub fn commit_latency(latency: Duration) {
        COMMIT_LATENCY.observe(latency.as_secs_f64());
    }
}

pub struct EpochMetrics;

impl EpochMetrics {
    pub fn cache_refresh(epoch_number: u64) {
        EPOCH_REFRESHES.inc();
        EPOCH_NUMBER.set(epoch_number as i64);
    }

    pub fn respan() {
        EPOCH_RESPANS.inc();
    }

    pub fn fallback() {
        EPOCH_FALLBACKS.inc();
    }
}

pub struct VerifierMetrics;

impl VerifierMetrics {
    pub fn state_root(is_match: bool) {
        STATE_ROOT_RESULTS.with_label_values(&[if is_match { "match" } else { "mismatch" }]).inc();
    }
}

pub struct RpcMetrics;

impl RpcMetrics {
    pub fn submission(is_success: bool) {
        RPC_SUBMISSIONS.with_label_values(&[result_label(is_success)]).inc();
    }
}

/// Records commit latency when dropped after [`CommitTimer::record`]
pub struct CommitTimer {
    has_completed: bool,
    start: Instant,
}

impl CommitTimer {
    pub fn new() -> Self {
        Self { has_completed: false, start: Instant::now() }
    }

    pub fn record(&mut self) {
        self.has_completed = true;
    }
}

impl Default for CommitTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CommitTimer {
    fn drop(&mut self) {
        if self.has_completed {
            SyncMetrics::commit_latency(self.start.elapsed());
        }
    }
}
