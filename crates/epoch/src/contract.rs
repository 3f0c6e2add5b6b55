use alloy_primitives::{Address, U256};
use alloy_provider::{Provider, ProviderBuilder, RootProvider};
use alloy_sol_types::sol;
use async_trait::async_trait;
use url::Url;

use crate::error::EpochError;

sol! {
    #[sol(rpc)]
    #[derive(Debug)]
    interface SeqSet {
        struct EpochInfo {
            uint256 number;
            address signer;
            uint256 startBlock;
            uint256 endBlock;
        }

        function currentEpochNumber() external view returns (uint256);
        function epochs(uint256) external view returns (uint256 number, address signer, uint256 startBlock, uint256 endBlock);
        function getEpochByBlock(uint256 _number) external view returns (uint256);
        function finalizedEpoch() external view returns (EpochInfo memory epoch);
        function mpcAddress() external view returns (address);
    }
}

type SeqSetClient = SeqSet::SeqSetInstance<(), RootProvider>;

/// Block range with one authorized signer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Epoch {
    pub number: u64,
    pub signer: Address,
    pub start_block: u64,
    pub end_block: u64,
}

impl Epoch {
    pub fn contains(&self, height: u64) -> bool {
        (self.start_block..=self.end_block).contains(&height)
    }
}

/// Read access to the sequencer set contract
#[async_trait]
pub trait EpochSource: Send + Sync {
    async fn current_epoch_number(&self) -> Result<u64, EpochError>;
    async fn epoch(&self, number: u64) -> Result<Epoch, EpochError>;
    /// Number of the epoch covering `height`, may be past the current epoch
    async fn epoch_by_block(&self, height: u64) -> Result<u64, EpochError>;
    async fn finalized_block(&self) -> Result<u64, EpochError>;
    async fn mpc_address(&self) -> Result<Address, EpochError>;
    async fn balance(&self, address: Address) -> Result<U256, EpochError>;
}

/// [`EpochSource`] reading the contract through the local L2 node
pub struct AlloyEpochSource {
    seqset: SeqSetClient,
}

impl AlloyEpochSource {
    pub fn new(l2_rpc: Url, seqset_contract: Address) -> Self {
        let provider = ProviderBuilder::new().disable_recommended_fillers().on_http(l2_rpc);
        Self { seqset: SeqSet::new(seqset_contract, provider) }
    }
}

fn contract_err(err: impl std::fmt::Display) -> EpochError {
    EpochError::Contract(err.to_string())
}

#[async_trait]
impl EpochSource for AlloyEpochSource {
    async fn current_epoch_number(&self) -> Result<u64, EpochError> {
        let number = self.seqset.currentEpochNumber().call().await.map_err(contract_err)?._0;
        Ok(number.saturating_to())
    }

    async fn epoch(&self, number: u64) -> Result<Epoch, EpochError> {
        let epoch = self.seqset.epochs(U256::from(number)).call().await.map_err(contract_err)?;
        Ok(Epoch {
            number: epoch.number.saturating_to(),
            signer: epoch.signer,
            start_block: epoch.startBlock.saturating_to(),
            end_block: epoch.endBlock.saturating_to(),
        })
    }

    async fn epoch_by_block(&self, height: u64) -> Result<u64, EpochError> {
        let number = self
            .seqset
            .getEpochByBlock(U256::from(height))
            .call()
            .await
            .map_err(contract_err)?
            ._0;
        Ok(number.saturating_to())
    }

    async fn finalized_block(&self) -> Result<u64, EpochError> {
        let epoch = self.seqset.finalizedEpoch().call().await.map_err(contract_err)?.epoch;
        Ok(epoch.endBlock.saturating_to())
    }

    async fn mpc_address(&self) -> Result<Address, EpochError> {
        Ok(self.seqset.mpcAddress().call().await.map_err(contract_err)?._0)
    }

    async fn balance(&self, address: Address) -> Result<U256, EpochError> {
        self.seqset.provider().get_balance(address).await.map_err(contract_err)
    }
}
