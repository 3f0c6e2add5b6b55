//! Ingests transactions from the data transport layer, the RPC and peer sequencers,
//! and commits them to the chain in order

mod apply;
mod error;
mod gas;
mod service;
mod syncer;
#[cfg(test)]
mod test_utils;
mod tip;
mod verify;

pub use error::{ApplyError, SyncError};
pub use gas::{pays_enough, FeeError, GasPriceCache, GasPrices, GAS_PRICE_ORACLE};
pub use service::SyncService;
pub use tip::{is_at_tip, sync_range, sync_to_tip};
pub use verify::{StateRootVerifier, VerifyError};
