use std::{fs, time::Duration};

use alloy_primitives::Address;
use alloy_signer_local::PrivateKeySigner;
use eyre::{ensure, OptionExt};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::types::{Backend, NodeMode};

/// Config to deserialize toml config file
#[derive(Debug, Deserialize, Serialize)]
pub struct StaticConfig {
    pub app_id: String,
    pub node: NodeConfig,
    pub l2: L2ChainConfig,
    pub epoch: EpochConfig,
    #[serde(default)]
    pub fees: FeeConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NodeConfig {
    pub mode: NodeMode,
    pub backend: Backend,
    /// If false, only peer-relayed blocks are applied
    #[serde(default = "default_bool::<true>")]
    pub enable_sync: bool,
    #[serde(default = "default_u64::<15>")]
    pub poll_interval_secs: u64,
    /// Adopt a new L1 context once it is this much newer than the current one
    #[serde(default = "default_u64::<180>")]
    pub timestamp_refresh_threshold_secs: u64,
    /// L1 height of the canonical transaction chain deployment, required on a fresh node
    pub ctc_deploy_height: Option<u64>,
    /// First L2 block allowed to carry more than one transaction, 0 disables
    #[serde(default)]
    pub de_seq_block: u64,
    pub db_path: String,
    pub rpc_port: u16,
    /// Data transport layer
    pub rollup_client_url: Url,
    /// Upstream sequencer, used to find the height at which this node may start sequencing
    pub sequencer_client_url: Option<Url>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct L2ChainConfig {
    pub chain_id: Option<u64>,
    /// Local execution node
    pub rpc_url: Url,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EpochConfig {
    pub seqset_contract: Address,
    /// At or below this height the default signer produces every block, 0 disables epochs
    #[serde(default)]
    pub seqset_valid_height: u64,
    pub default_signer: Address,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct FeeConfig {
    #[serde(default)]
    pub enforce_fees: bool,
    pub fee_threshold_up: Option<f64>,
    pub fee_threshold_down: Option<f64>,
}

pub const fn default_bool<const U: bool>() -> bool {
    U
}

pub const fn default_u64<const U: u64>() -> u64 {
    U
}

pub fn load_static_config() -> StaticConfig {
    let path = std::env::args()
        .nth(1)
        .expect("missing config path. Run with 'rollup-node my_config.toml'");
    let config_file = fs::read_to_string(&path)
        .unwrap_or_else(|_| panic!("unable to find config file: '{}'", path));
    let config: StaticConfig = toml::from_str(&config_file).expect("failed to parse toml");

    config
}

/// Config with all ENV variables
pub struct EnvConfig {
    /// Key used to sign produced transactions, verifiers can run without it
    pub sequencer_signer_key: Option<PrivateKeySigner>,
}

pub fn load_env_vars() -> EnvConfig {
    let sequencer_signer_key = std::env::var("SEQUENCER_SIGNER_KEY")
        .ok()
        .map(|key| key.parse().expect("invalid sequencer private key"));

    EnvConfig { sequencer_signer_key }
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub chain_id: u64,
    pub mode: NodeMode,
    pub backend: Backend,
    pub enable_sync: bool,
    pub poll_interval: Duration,
    pub timestamp_refresh_threshold: Duration,
    pub ctc_deploy_height: Option<u64>,
    pub de_seq_block: u64,
    pub sequencer_client_url: Option<Url>,
    pub enforce_fees: bool,
    pub fee_threshold_up: Option<f64>,
    pub fee_threshold_down: Option<f64>,
}

impl SyncConfig {
    pub fn is_verifier(&self) -> bool {
        self.mode == NodeMode::Verifier
    }
}

impl TryFrom<&StaticConfig> for SyncConfig {
    type Error = eyre::Report;

    fn try_from(config: &StaticConfig) -> Result<Self, Self::Error> {
        let chain_id = config.l2.chain_id.ok_or_eyre("must configure l2 chain id")?;

        if let Some(down) = config.fees.fee_threshold_down {
            ensure!(down < 1.0, "fee threshold down not lower than 1: {down}");
        }
        if let Some(up) = config.fees.fee_threshold_up {
            ensure!(up > 1.0, "fee threshold up not higher than 1: {up}");
        }
        ensure!(config.node.poll_interval_secs > 0, "poll interval must be non-zero");

        Ok(Self {
            chain_id,
            mode: config.node.mode,
            backend: config.node.backend,
            enable_sync: config.node.enable_sync,
            poll_interval: Duration::from_secs(config.node.poll_interval_secs),
            timestamp_refresh_threshold: Duration::from_secs(
                config.node.timestamp_refresh_threshold_secs,
            ),
            ctc_deploy_height: config.node.ctc_deploy_height,
            de_seq_block: config.node.de_seq_block,
            sequencer_client_url: config.node.sequencer_client_url.clone(),
            enforce_fees: config.fees.enforce_fees,
            fee_threshold_up: config.fees.fee_threshold_up,
            fee_threshold_down: config.fees.fee_threshold_down,
        })
    }
}

pub struct RpcConfig {
    /// Port to open the RPC server on
    pub port: u16,
}

impl From<&StaticConfig> for RpcConfig {
    fn from(config: &StaticConfig) -> Self {
        Self { port: config.node.rpc_port }
    }
}
