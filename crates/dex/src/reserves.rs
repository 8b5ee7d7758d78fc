use crate::pair::VenuePairOps;
use alloy::primitives::Address;
use alloy::providers::{DynProvider, Provider};
use anyhow::Result;
use futures_util::stream::FuturesUnordered;
use futures_util::StreamExt;
use glacier_cache::CacheClient;
use glacier_core::types::{PairDescriptor, PoolReserves};
use glacier_core::utils::{now_ms, to_units, u256_to_f64};
use glacier_core::Registry;
use std::collections::HashMap;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReserveKey {
    pub venue: String,
    pub token_a: Address,
    pub token_b: Address,
}

impl ReserveKey {
    pub fn of(descriptor: &PairDescriptor) -> Self {
        Self {
            venue: descriptor.venue.clone(),
            token_a: descriptor.token_a,
            token_b: descriptor.token_b,
        }
    }
}

/// Live view of pool reserves across every configured venue/pair. Discovery
/// runs once at startup; the refresh loop replaces whole records, so readers
/// may see a mix of old and new records across keys but never a torn one.
pub struct ReserveView {
    provider: DynProvider,
    registry: Registry,
    reserves_ttl_secs: u64,
    descriptors: Vec<PairDescriptor>,
    reserves: HashMap<ReserveKey, PoolReserves>,
}

impl ReserveView {
    pub fn new(provider: DynProvider, registry: Registry, reserves_ttl_secs: u64) -> Self {
        Self {
            provider,
            registry,
            reserves_ttl_secs,
            descriptors: Vec::new(),
            reserves: HashMap::new(),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn descriptors(&self) -> &[PairDescriptor] {
        &self.descriptors
    }

    pub fn snapshot(&self) -> HashMap<ReserveKey, PoolReserves> {
        self.reserves.clone()
    }

    /// Factory walk over the configured pair × venue grid. A zero-address
    /// answer means the venue does not list the pair; discovery failures on
    /// one pair never abort the rest. Running discovery again rebuilds the
    /// same descriptor set as long as the factories are unchanged.
    pub async fn discover(&mut self) -> Result<usize> {
        let block_number = self.provider.get_block_number().await?;
        let mut descriptors = Vec::new();
        let mut reserves = HashMap::new();

        for &(token_a, token_b) in &self.registry.pairs.clone() {
            for venue in self.registry.venues.clone() {
                let ops = VenuePairOps::new(&self.provider, &venue);
                let pair = match ops.pair_address(token_a, token_b).await {
                    Ok(Some(pair)) => pair,
                    Ok(None) => {
                        debug!(
                            venue = %venue.name,
                            token_a = %token_a,
                            token_b = %token_b,
                            "pair not listed on venue"
                        );
                        continue;
                    }
                    Err(err) => {
                        warn!(venue = %venue.name, ?err, "pair discovery failed; skipping");
                        continue;
                    }
                };

                let (token0, token1) = match ops.pair_tokens(pair).await {
                    Ok(tokens) => tokens,
                    Err(err) => {
                        warn!(venue = %venue.name, %pair, ?err, "token order lookup failed; skipping");
                        continue;
                    }
                };

                let descriptor = PairDescriptor {
                    venue: venue.name.clone(),
                    token_a,
                    token_b,
                    token0,
                    token1,
                    pair,
                };

                match ops.reserves(pair).await {
                    Ok((reserve0, reserve1)) => {
                        if reserve0.is_zero() || reserve1.is_zero() {
                            debug!(venue = %venue.name, %pair, "pool empty at discovery");
                        } else {
                            reserves.insert(
                                ReserveKey::of(&descriptor),
                                PoolReserves {
                                    descriptor: descriptor.clone(),
                                    reserve0,
                                    reserve1,
                                    block_number,
                                    fetched_ms: now_ms(),
                                },
                            );
                        }
                    }
                    Err(err) => {
                        warn!(venue = %venue.name, %pair, ?err, "initial reserve fetch failed");
                    }
                }

                descriptors.push(descriptor);
            }
        }

        info!(pairs = descriptors.len(), "pair discovery complete");
        self.descriptors = descriptors;
        self.reserves = reserves;
        Ok(self.descriptors.len())
    }

    /// One refresh batch: every descriptor in parallel, each fresh record
    /// swapped in whole. Best-effort mirror of each record to the cache.
    pub async fn refresh(&mut self, cache: &mut CacheClient) -> usize {
        let block_number = match self.provider.get_block_number().await {
            Ok(number) => number,
            Err(err) => {
                warn!(?err, "block number fetch failed; skipping refresh");
                return 0;
            }
        };

        let mut fetches = FuturesUnordered::new();
        for descriptor in self.descriptors.clone() {
            let Some(venue) = self.registry.venue(&descriptor.venue).cloned() else {
                continue;
            };
            let provider = self.provider.clone();
            fetches.push(async move {
                let ops = VenuePairOps::new(&provider, &venue);
                let result = ops.reserves(descriptor.pair).await;
                (descriptor, result)
            });
        }

        let mut fresh = Vec::new();
        while let Some((descriptor, result)) = fetches.next().await {
            match result {
                Ok((reserve0, reserve1)) => {
                    if reserve0.is_zero() || reserve1.is_zero() {
                        debug!(venue = %descriptor.venue, pair = %descriptor.pair, "pool empty; skipped");
                        continue;
                    }
                    fresh.push(PoolReserves {
                        descriptor,
                        reserve0,
                        reserve1,
                        block_number,
                        fetched_ms: now_ms(),
                    });
                }
                Err(err) => {
                    warn!(venue = %descriptor.venue, pair = %descriptor.pair, ?err, "reserve fetch failed");
                }
            }
        }

        let refreshed = fresh.len();
        for record in fresh {
            let key = reserves_key(&self.registry, &record.descriptor);
            if let Ok(body) = serde_json::to_string(&record) {
                if let Err(err) = cache
                    .set_with_ttl(&key, &body, self.reserves_ttl_secs)
                    .await
                {
                    debug!(?err, %key, "reserves mirror write dropped");
                }
            }
            self.reserves.insert(ReserveKey::of(&record.descriptor), record);
        }
        refreshed
    }

    /// All venues holding the given pair, for the detector's pairwise pass.
    pub fn records_for_pair(&self, token_a: Address, token_b: Address) -> Vec<&PoolReserves> {
        self.descriptors
            .iter()
            .filter(|d| d.token_a == token_a && d.token_b == token_b)
            .filter_map(|d| self.reserves.get(&ReserveKey::of(d)))
            .collect()
    }
}

pub fn reserves_key(registry: &Registry, descriptor: &PairDescriptor) -> String {
    format!(
        "reserves:{}-{}-{}",
        descriptor.venue,
        registry.label(descriptor.token_a),
        registry.label(descriptor.token_b)
    )
}

/// Mid-price of token_b per token_a, decimal-adjusted. `None` when the
/// record does not hold the requested direction or either reserve is zero.
/// Float precision is acceptable here: prices feed comparisons only, never
/// settlement amounts.
pub fn mid_price(
    record: &PoolReserves,
    token_a: Address,
    token_b: Address,
    decimals_a: u8,
    decimals_b: u8,
) -> Option<f64> {
    let descriptor = &record.descriptor;
    let (r_in, r_out) = if descriptor.token0 == token_a && descriptor.token1 == token_b {
        (record.reserve0, record.reserve1)
    } else if descriptor.token0 == token_b && descriptor.token1 == token_a {
        (record.reserve1, record.reserve0)
    } else {
        return None;
    };

    if r_in.is_zero() || r_out.is_zero() {
        return None;
    }

    let r_in = u256_to_f64(r_in)?;
    let r_out = u256_to_f64(r_out)?;
    Some(r_out / r_in * 10f64.powi(decimals_a as i32 - decimals_b as i32))
}

/// Trade-size ceiling for one side, in human units of token_a. Deeper pools
/// allow a smaller fraction; the result is clamped to [0.001, 10] for the
/// wrapped native token and [0.001, 1000] otherwise. Zero disables the pair.
pub fn max_trade_amount(
    record: &PoolReserves,
    token_a: Address,
    decimals_a: u8,
    is_wrapped_native: bool,
) -> f64 {
    let descriptor = &record.descriptor;
    let reserve = if descriptor.token0 == token_a {
        record.reserve0
    } else if descriptor.token1 == token_a {
        record.reserve1
    } else {
        return 0.0;
    };

    let Some(units) = to_units(reserve, decimals_a) else {
        return 0.0;
    };
    if units <= 0.0 {
        return 0.0;
    }

    let fraction = if units >= 1_000.0 {
        0.02
    } else if units >= 100.0 {
        0.05
    } else {
        0.10
    };

    let cap = if is_wrapped_native { 10.0 } else { 1_000.0 };
    (units * fraction).clamp(0.001, cap)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{address, U256};
    use glacier_core::types::PairDescriptor;

    const WAVAX: Address = address!("0xB31f66AA3C1e785363F0875A1B74E27b85FD66c7");
    const USDC: Address = address!("0xB97EF9Ef8734C71904D8002F8b6Bc66Dd9c48a6E");

    fn record(reserve0: U256, reserve1: U256) -> PoolReserves {
        PoolReserves {
            descriptor: PairDescriptor {
                venue: "TraderJoe".to_string(),
                token_a: WAVAX,
                token_b: USDC,
                token0: WAVAX,
                token1: USDC,
                pair: address!("0x4000000000000000000000000000000000000004"),
            },
            reserve0,
            reserve1,
            block_number: 100,
            fetched_ms: 0,
        }
    }

    #[test]
    fn mid_price_forward_and_reverse() {
        // 10^6 WAVAX against 42 * 10^6 USDC (raw units)
        let rec = record(U256::from(10u128.pow(24)), U256::from(42u128 * 10u128.pow(12)));
        let forward = mid_price(&rec, WAVAX, USDC, 18, 6).unwrap();
        assert!((forward - 42.0).abs() < 1e-9);

        let reverse = mid_price(&rec, USDC, WAVAX, 6, 18).unwrap();
        assert!((reverse - 1.0 / 42.0).abs() < 1e-12);
    }

    #[test]
    fn price_symmetry() {
        let rec = record(U256::from(987_654_321u64), U256::from(123_456_789u64));
        let forward = mid_price(&rec, WAVAX, USDC, 18, 6).unwrap();
        let reverse = mid_price(&rec, USDC, WAVAX, 6, 18).unwrap();
        let product = forward * reverse;
        assert!((product - 1.0).abs() <= 4.0 * f64::EPSILON);
    }

    #[test]
    fn mid_price_rejects_zero_reserves_and_foreign_tokens() {
        let empty = record(U256::ZERO, U256::ZERO);
        assert!(mid_price(&empty, WAVAX, USDC, 18, 6).is_none());

        let rec = record(U256::from(1u64), U256::from(1u64));
        let other = address!("0x9702230A8Ea53601f5cD2dc00fDBc13d4dF4A8c7");
        assert!(mid_price(&rec, WAVAX, other, 18, 6).is_none());
    }

    #[test]
    fn max_trade_uses_depth_bins() {
        // 10^6 WAVAX in reserve: deep pool, 2% bin, clamped to 10 native
        let deep = record(U256::from(10u128.pow(24)), U256::from(1u64));
        assert_eq!(max_trade_amount(&deep, WAVAX, 18, true), 10.0);
        // same depth without the native cap: 2% of 10^6
        assert_eq!(max_trade_amount(&deep, WAVAX, 18, false), 1_000.0);

        // 500 units: 5% bin
        let mid = record(U256::from(500u128 * 10u128.pow(18)), U256::from(1u64));
        assert!((max_trade_amount(&mid, WAVAX, 18, false) - 25.0).abs() < 1e-9);

        // 50 units: 10% bin
        let shallow = record(U256::from(50u128 * 10u128.pow(18)), U256::from(1u64));
        assert!((max_trade_amount(&shallow, WAVAX, 18, false) - 5.0).abs() < 1e-9);
    }

    use alloy::primitives::Bytes;
    use alloy::providers::ProviderBuilder;
    use alloy::transports::mock::Asserter;
    use glacier_core::types::{Token, Venue, VenueFamily};
    use std::collections::HashMap as StdHashMap;

    const PAIR: Address = address!("0x4000000000000000000000000000000000000004");

    fn word_address(addr: Address) -> Bytes {
        let mut word = [0u8; 32];
        word[12..].copy_from_slice(addr.as_slice());
        Bytes::from(word.to_vec())
    }

    fn words_reserves(reserve0: u128, reserve1: u128) -> Bytes {
        let mut out = Vec::with_capacity(96);
        out.extend_from_slice(&U256::from(reserve0).to_be_bytes::<32>());
        out.extend_from_slice(&U256::from(reserve1).to_be_bytes::<32>());
        out.extend_from_slice(&U256::from(1_700_000_000u64).to_be_bytes::<32>());
        Bytes::from(out)
    }

    fn test_registry() -> Registry {
        let wavax = Token {
            address: WAVAX,
            decimals: 18,
            symbol: Some("WAVAX".to_string()),
        };
        let usdc = Token {
            address: USDC,
            decimals: 6,
            symbol: Some("USDC".to_string()),
        };
        let mut by_address = StdHashMap::new();
        by_address.insert(WAVAX, wavax.clone());
        by_address.insert(USDC, usdc.clone());
        let mut by_symbol = StdHashMap::new();
        by_symbol.insert("WAVAX".to_string(), wavax);
        by_symbol.insert("USDC".to_string(), usdc);
        Registry {
            venues: vec![Venue {
                name: "TraderJoe".to_string(),
                factory: address!("0x9Ad6C38BE94206cA50bb0d90783181662f0Cfa10"),
                router: address!("0x60aE616a2155Ee3d9A68541Ba4544862310933d4"),
                family: VenueFamily::ConstantProductV2,
            }],
            tokens_by_address: by_address,
            tokens_by_symbol: by_symbol,
            pairs: vec![(WAVAX, USDC)],
            wrapped_native: WAVAX,
        }
    }

    #[tokio::test]
    async fn discovery_is_idempotent() {
        let asserter = Asserter::new();
        let provider = ProviderBuilder::new()
            .connect_mocked_client(asserter.clone())
            .erased();
        let mut view = ReserveView::new(provider, test_registry(), 60);

        for _ in 0..2 {
            asserter.push_success(&100u64);
            asserter.push_success(&word_address(PAIR));
            asserter.push_success(&word_address(WAVAX));
            asserter.push_success(&word_address(USDC));
            asserter.push_success(&words_reserves(10u128.pow(24), 42 * 10u128.pow(12)));
        }

        assert_eq!(view.discover().await.unwrap(), 1);
        let first: Vec<_> = view
            .descriptors()
            .iter()
            .map(|d| (d.venue.clone(), d.pair, d.token0, d.token1))
            .collect();

        assert_eq!(view.discover().await.unwrap(), 1);
        let second: Vec<_> = view
            .descriptors()
            .iter()
            .map(|d| (d.venue.clone(), d.pair, d.token0, d.token1))
            .collect();

        assert_eq!(first, second);
        assert!(asserter.read_q().is_empty());
    }

    #[tokio::test]
    async fn zero_address_factory_answer_creates_no_descriptor() {
        let asserter = Asserter::new();
        let provider = ProviderBuilder::new()
            .connect_mocked_client(asserter.clone())
            .erased();
        let mut view = ReserveView::new(provider, test_registry(), 60);

        asserter.push_success(&100u64);
        asserter.push_success(&word_address(Address::ZERO));

        assert_eq!(view.discover().await.unwrap(), 0);
        assert!(view.descriptors().is_empty());
        assert!(view.snapshot().is_empty());
    }

    #[test]
    fn max_trade_clamps_and_disables() {
        // dust reserve clamps up to the floor
        let dust = record(U256::from(10u128.pow(15)), U256::from(1u64));
        assert_eq!(max_trade_amount(&dust, WAVAX, 18, false), 0.001);

        // token not in the pair disables
        let rec = record(U256::from(1u64), U256::from(1u64));
        let other = address!("0x9702230A8Ea53601f5cD2dc00fDBc13d4dF4A8c7");
        assert_eq!(max_trade_amount(&rec, other, 18, false), 0.0);
    }
}
