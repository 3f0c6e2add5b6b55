pub mod api;
pub mod client;
pub mod config;
pub mod db;
pub mod engine;
pub mod metrics;
#[cfg(any(test, feature = "test-utils"))]
pub mod mock;
pub mod runtime;
pub mod tx;
pub mod types;
pub mod utils;

pub const COMMIT_HASH: &str = env!("GIT_HASH");
