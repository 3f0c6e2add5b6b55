use std::time::{SystemTime, UNIX_EPOCH};

use ::backtrace::Backtrace;
use tracing::error;
use tracing_appender::{non_blocking::WorkerGuard, rolling::Rotation};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

// Time

/// Seconds
pub fn utcnow_sec() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs()
}

/// Renders an optional pointer for logs, `none` when unset
pub fn fmt_index(index: Option<u64>) -> String {
    index.map_or_else(|| "none".to_string(), |i| i.to_string())
}

// Alerts

pub fn alert_discord(message: &str) {
    error!("ALERT: {}", message);
}

const fn is_test_env() -> bool {
    cfg!(test) || cfg!(debug_assertions)
}

pub fn initialize_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let backtrace = Backtrace::new();
        let crash_log = format!("panic: {info}\nfull backtrace:\n{backtrace:?}\n");
        error!("{crash_log}");
        eprintln!("{crash_log}");
        alert_discord(&crash_log);
    }));
}

// Tracing

pub fn initialize_tracing_log() -> WorkerGuard {
    let log_level = std::env::var("RUST_LOG")
        .map(|lev| lev.parse().expect("invalid RUST_LOG, change to eg 'info'"))
        .unwrap_or(tracing::Level::INFO);

    let (writer, guard) = if is_test_env() {
        tracing_appender::non_blocking(std::io::stdout())
    } else {
        let log_path = std::env::var("LOG_PATH").unwrap_or("/logs".into());
        let file_appender = tracing_appender::rolling::Builder::new()
            .max_log_files(30)
            .rotation(Rotation::DAILY)
            .build(log_path)
            .expect("failed to create log appender!");

        tracing_appender::non_blocking(file_appender)
    };

    let filter = get_crate_filter(log_level);
    let layer =
        tracing_subscriber::fmt::layer().with_target(false).with_writer(writer).with_filter(filter);
    tracing_subscriber::registry().with(layer).init();

    guard
}

pub const OUR_CRATES: [&str; 4] = ["common", "epoch", "rpc", "sync"];

/// Make sure we only get logs for our crates and exlude the others
fn get_crate_filter(crates_level: tracing::Level) -> EnvFilter {
    let mut env_filter = EnvFilter::new("info");

    for our_crate in OUR_CRATES {
        env_filter =
            env_filter.add_directive(format!("rn_{our_crate}={crates_level}").parse().unwrap())
    }

    env_filter
}
