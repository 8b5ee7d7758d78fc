use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub chain: ChainConfig,
    pub cache: CacheConfig,
    pub mempool: MempoolConfig,
    #[serde(default)]
    pub venues: Vec<VenueConfig>,
    #[serde(default)]
    pub tokens: Vec<TokenConfig>,
    #[serde(default)]
    pub pairs: Vec<PairConfig>,
    pub mev: MevConfig,
    pub sim: SimConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    pub network: String,
    pub mainnet: NetworkConfig,
    pub testnet: NetworkConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub chain_id: u64,
    pub rpc_http: String,
    pub rpc_ws: String,
    pub health_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub url: String,
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MempoolConfig {
    #[serde(default = "default_tx_fetch_timeout_ms")]
    pub tx_fetch_timeout_ms: u64,
    #[serde(default = "default_dedup_max_entries")]
    pub dedup_max_entries: usize,
    #[serde(default = "default_mempool_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_ws_reconnect_ms")]
    pub ws_reconnect_ms: u64,
    #[serde(default = "default_channel_size")]
    pub channel_size: usize,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    #[serde(default = "default_swap_queue_max")]
    pub swap_queue_max: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenueConfig {
    pub name: String,
    pub factory: String,
    pub router: String,
    #[serde(default = "default_venue_family")]
    pub family: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    pub address: String,
    pub symbol: String,
    #[serde(default = "default_token_decimals")]
    pub decimals: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairConfig {
    pub token_a: String,
    pub token_b: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MevConfig {
    pub wrapped_native: String,
    pub min_profit_native: f64,
    #[serde(default = "default_max_slippage_bps")]
    pub max_slippage_bps: u32,
    #[serde(default = "default_gas_limit")]
    pub default_gas_limit: u64,
    #[serde(default = "default_gas_price_gwei")]
    pub gas_price_gwei: u64,
    #[serde(default = "default_priority_fee_multiplier")]
    pub priority_fee_multiplier: f64,
    #[serde(default = "default_detect_interval_ms")]
    pub detect_interval_ms: u64,
    #[serde(default = "default_refresh_interval_ms")]
    pub refresh_interval_ms: u64,
    #[serde(default = "default_min_profit_percent")]
    pub min_profit_percent: f64,
    #[serde(default = "default_publish_profit_percent")]
    pub publish_profit_percent: f64,
    #[serde(default = "default_hysteresis_pp")]
    pub hysteresis_pp: f64,
    #[serde(default = "default_opportunity_ttl_secs")]
    pub opportunity_ttl_secs: u64,
    #[serde(default = "default_reserves_ttl_secs")]
    pub reserves_ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    #[serde(default = "default_anvil_path")]
    pub anvil_path: String,
    #[serde(default = "default_base_port")]
    pub base_port: u16,
    #[serde(default = "default_sim_host")]
    pub host: String,
    #[serde(default = "default_sim_accounts")]
    pub accounts: u32,
    #[serde(default = "default_sim_balance")]
    pub balance_native: u64,
    #[serde(default = "default_fork_block_offset")]
    pub fork_block_offset: u64,
    #[serde(default = "default_startup_timeout_secs")]
    pub startup_timeout_secs: u64,
    #[serde(default = "default_simulation_timeout_ms")]
    pub simulation_timeout_ms: u64,
    #[serde(default = "default_fast_simulation")]
    pub fast_simulation: bool,
    #[serde(default = "default_trade_amount_native")]
    pub trade_amount_native: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    pub metrics_enabled: bool,
    pub metrics_bind: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl AppConfig {
    pub fn load(path: &str) -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(
                config::Environment::with_prefix("GLACIER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Ok(cfg.try_deserialize()?)
    }
}

impl ChainConfig {
    pub fn selected(&self) -> Result<&NetworkConfig> {
        match self.network.trim().to_ascii_lowercase().as_str() {
            "mainnet" => Ok(&self.mainnet),
            "testnet" | "fuji" => Ok(&self.testnet),
            other => Err(anyhow::anyhow!("unsupported chain.network: {other}").into()),
        }
    }
}

fn default_key_prefix() -> String {
    "mev:".to_string()
}

fn default_tx_fetch_timeout_ms() -> u64 {
    2_000
}

fn default_dedup_max_entries() -> usize {
    10_000
}

fn default_mempool_ttl_secs() -> u64 {
    300
}

fn default_ws_reconnect_ms() -> u64 {
    5_000
}

fn default_channel_size() -> usize {
    4_096
}

fn default_sweep_interval_secs() -> u64 {
    300
}

fn default_swap_queue_max() -> usize {
    1_000
}

fn default_venue_family() -> String {
    "constant_product_v2".to_string()
}

fn default_token_decimals() -> u8 {
    18
}

fn default_max_slippage_bps() -> u32 {
    50
}

fn default_gas_limit() -> u64 {
    300_000
}

fn default_gas_price_gwei() -> u64 {
    25
}

fn default_priority_fee_multiplier() -> f64 {
    1.0
}

fn default_detect_interval_ms() -> u64 {
    2_000
}

fn default_refresh_interval_ms() -> u64 {
    5_000
}

fn default_min_profit_percent() -> f64 {
    0.1
}

fn default_publish_profit_percent() -> f64 {
    0.5
}

fn default_hysteresis_pp() -> f64 {
    0.1
}

fn default_opportunity_ttl_secs() -> u64 {
    60
}

fn default_reserves_ttl_secs() -> u64 {
    60
}

fn default_anvil_path() -> String {
    "anvil".to_string()
}

fn default_base_port() -> u16 {
    8545
}

fn default_sim_host() -> String {
    "127.0.0.1".to_string()
}

fn default_sim_accounts() -> u32 {
    10
}

fn default_sim_balance() -> u64 {
    10_000
}

fn default_fork_block_offset() -> u64 {
    2
}

fn default_startup_timeout_secs() -> u64 {
    30
}

fn default_simulation_timeout_ms() -> u64 {
    150
}

fn default_fast_simulation() -> bool {
    true
}

fn default_trade_amount_native() -> f64 {
    1.0
}

fn default_log_level() -> String {
    "info".to_string()
}
