use alloy_primitives::{address, Address, B256, U256};
use parking_lot::RwLock;
use rn_common::engine::{EngineError, ExecutionEngine};
use tracing::debug;

/// Gas price oracle predeploy
pub const GAS_PRICE_ORACLE: Address = address!("420000000000000000000000000000000000000F");

const OWNER_SLOT: u64 = 0;
const L2_GAS_PRICE_SLOT: u64 = 1;
const L1_GAS_PRICE_SLOT: u64 = 2;
const OVERHEAD_SLOT: u64 = 3;
const SCALAR_SLOT: u64 = 4;
const DECIMALS_SLOT: u64 = 5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GasPrices {
    pub owner: Address,
    pub l2_gas_price: U256,
    pub l1_gas_price: U256,
    pub overhead: U256,
    pub scalar: U256,
    pub decimals: U256,
}

/// Snapshot of the gas price oracle storage at the chain head
#[derive(Debug, Default)]
pub struct GasPriceCache {
    prices: RwLock<GasPrices>,
}

async fn read_slot(engine: &dyn ExecutionEngine, slot: u64) -> Result<U256, EngineError> {
    engine.storage_at(GAS_PRICE_ORACLE, U256::from(slot)).await
}

fn slot_address(value: U256) -> Address {
    Address::from_word(B256::from(value.to_be_bytes::<32>()))
}

impl GasPriceCache {
    pub async fn refresh(&self, engine: &dyn ExecutionEngine) -> Result<(), EngineError> {
        let prices = GasPrices {
            owner: slot_address(read_slot(engine, OWNER_SLOT).await?),
            l2_gas_price: read_slot(engine, L2_GAS_PRICE_SLOT).await?,
            l1_gas_price: read_slot(engine, L1_GAS_PRICE_SLOT).await?,
            overhead: read_slot(engine, OVERHEAD_SLOT).await?,
            scalar: read_slot(engine, SCALAR_SLOT).await?,
            decimals: read_slot(engine, DECIMALS_SLOT).await?,
        };
        debug!(?prices, "refreshed gas price oracle cache");
        *self.prices.write() = prices;
        Ok(())
    }

    /// Re-reads only the owner, it may be changed by the l2 manager
    pub async fn refresh_owner(&self, engine: &dyn ExecutionEngine) -> Result<(), EngineError> {
        let owner = slot_address(read_slot(engine, OWNER_SLOT).await?);
        self.prices.write().owner = owner;
        Ok(())
    }

    pub fn prices(&self) -> GasPrices {
        *self.prices.read()
    }

    pub fn owner(&self) -> Address {
        self.prices.read().owner
    }

    pub fn is_owner(&self, address: Address) -> bool {
        let owner = self.owner();
        !owner.is_zero() && owner == address
    }

    pub fn l2_gas_price(&self) -> U256 {
        self.prices.read().l2_gas_price
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FeeError {
    #[error("cannot accept 0 gas price transaction")]
    ZeroGasPrice,

    #[error("gas price too low: {user} wei, use at least tx.gasPrice = {expected} wei")]
    GasPriceTooLow { user: U256, expected: U256 },

    #[error("gas price too high: {user} wei, use at most tx.gasPrice = {expected} wei")]
    GasPriceTooHigh { user: U256, expected: U256 },
}

fn scale(value: U256, factor: f64) -> U256 {
    let scaled = value.saturating_to::<u128>() as f64 * factor;
    U256::from(scaled as u128)
}

/// Checks the user gas price against the oracle price, allowing `down` below and `up` above
pub fn pays_enough(
    user: U256,
    expected: U256,
    up: Option<f64>,
    down: Option<f64>,
) -> Result<(), FeeError> {
    let floor = down.map_or(expected, |down| scale(expected, down));
    if user < floor {
        return Err(FeeError::GasPriceTooLow { user, expected });
    }

    if let Some(up) = up {
        if user > scale(expected, up) {
            return Err(FeeError::GasPriceTooHigh { user, expected });
        }
    }
    Ok(())
}
