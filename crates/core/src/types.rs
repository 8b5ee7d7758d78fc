use alloy::primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};

/// Immutable token metadata from configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub address: Address,
    pub decimals: u8,
    pub symbol: Option<String>,
}

impl Token {
    /// Stable label used in cache keys: symbol when configured, hex otherwise.
    pub fn label(&self) -> String {
        match &self.symbol {
            Some(symbol) => symbol.clone(),
            None => format!("{:#x}", self.address),
        }
    }
}

/// Venue protocol family. Constant-product V2 is the only supported family;
/// decoding and pair access dispatch on this tag rather than on trait objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VenueFamily {
    ConstantProductV2,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Venue {
    pub name: String,
    pub factory: Address,
    pub router: Address,
    pub family: VenueFamily,
}

/// A discovered pair on one venue. token0/token1 record the on-chain storage
/// order, which is not assumed to match the configured (token_a, token_b).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairDescriptor {
    pub venue: String,
    pub token_a: Address,
    pub token_b: Address,
    pub token0: Address,
    pub token1: Address,
    pub pair: Address,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolReserves {
    pub descriptor: PairDescriptor,
    pub reserve0: U256,
    pub reserve1: U256,
    pub block_number: u64,
    pub fetched_ms: u64,
}

impl PoolReserves {
    pub fn is_empty(&self) -> bool {
        self.reserve0.is_zero() || self.reserve1.is_zero()
    }
}

/// A pending transaction after enrichment. Written once to the cache under
/// `tx:<hash>`, never mutated, expires by TTL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedTx {
    pub hash: B256,
    pub from: Address,
    pub to: Option<Address>,
    pub value: U256,
    pub gas_limit: u64,
    pub gas_price: Option<u128>,
    pub max_fee_per_gas: Option<u128>,
    pub max_priority_fee_per_gas: Option<u128>,
    pub nonce: u64,
    pub input: Bytes,
    pub first_seen_ms: u64,
    pub block_number: Option<u64>,
    pub swap: Option<DecodedSwap>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecodedSwap {
    pub router: Address,
    pub function: String,
    pub is_swap: bool,
    pub token_in: Address,
    pub token_out: Address,
    pub amount_in: Option<U256>,
    pub amount_out_or_min: Option<U256>,
    pub path: Vec<Address>,
}

/// Cross-venue price gap that survived every gate. Prices are mid-prices in
/// tokenB per tokenA; trade bounds are human units of tokenA.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Opportunity {
    pub token_a: Address,
    pub token_b: Address,
    pub buy_venue: String,
    pub sell_venue: String,
    pub buy_price: f64,
    pub sell_price: f64,
    pub price_gap: f64,
    pub profit_percent: f64,
    pub estimated_gas: u64,
    pub min_trade: f64,
    pub max_trade: f64,
    pub discovered_ms: u64,
}
