mod cache;
mod contract;
mod error;
#[cfg(any(test, feature = "test-utils"))]
pub mod mock;
mod oracle;
mod respan;

pub use cache::{CachedEpoch, PreRespan};
pub use contract::{AlloyEpochSource, Epoch, EpochSource};
pub use error::EpochError;
pub use oracle::{EpochOracle, FALLBACK_MAX_MPC_BALANCE, FALLBACK_MIN_TRANSFER};
pub use respan::{decode_recommit, RespanCall, RespanQueue, RECOMMIT_EPOCH_SELECTOR};
