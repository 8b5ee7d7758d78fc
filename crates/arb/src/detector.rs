use alloy::primitives::Address;
use glacier_core::types::{Opportunity, PoolReserves};
use glacier_core::utils::now_ms;
use glacier_core::Registry;
use glacier_dex::{max_trade_amount, mid_price, ReserveKey};
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone, Copy)]
pub struct DetectorParams {
    pub gas_units: u64,
    pub gas_price_gwei: u64,
    pub min_profit_percent: f64,
}

/// Pairwise cross-venue comparison over one reserves snapshot. Pure CPU:
/// the caller hands in a snapshot taken without locking, so a tick may see
/// records from two different refresh batches; bounded staleness is the
/// accepted trade for never stalling the loop.
pub struct Detector {
    params: DetectorParams,
}

impl Detector {
    pub fn new(params: DetectorParams) -> Self {
        Self { params }
    }

    pub fn scan(
        &self,
        registry: &Registry,
        snapshot: &HashMap<ReserveKey, PoolReserves>,
    ) -> Vec<Opportunity> {
        let mut found = Vec::new();
        for &(token_a, token_b) in &registry.pairs {
            let records: Vec<&PoolReserves> = snapshot
                .values()
                .filter(|r| r.descriptor.token_a == token_a && r.descriptor.token_b == token_b)
                .collect();

            for i in 0..records.len() {
                for j in (i + 1)..records.len() {
                    if let Some(opp) =
                        self.compare(registry, token_a, token_b, records[i], records[j])
                    {
                        found.push(opp);
                    }
                }
            }
        }
        found
    }

    fn compare(
        &self,
        registry: &Registry,
        token_a: Address,
        token_b: Address,
        first: &PoolReserves,
        second: &PoolReserves,
    ) -> Option<Opportunity> {
        let decimals_a = registry.decimals(token_a)?;
        let decimals_b = registry.decimals(token_b)?;

        let price_first = mid_price(first, token_a, token_b, decimals_a, decimals_b)?;
        let price_second = mid_price(second, token_a, token_b, decimals_a, decimals_b)?;
        if price_first == price_second {
            return None;
        }

        let (buy_record, sell_record, buy_price, sell_price) = if price_first < price_second {
            (first, second, price_first, price_second)
        } else {
            (second, first, price_second, price_first)
        };

        let price_gap = sell_price - buy_price;
        let profit_percent = price_gap / buy_price * 100.0;

        let is_native = registry.is_wrapped_native(token_a);
        // flat gas estimate converted into tokenA units; for non-native
        // tokenA the buy price is a rough change-of-basis
        let gas_native =
            self.params.gas_units as f64 * self.params.gas_price_gwei as f64 * 1e-9;
        let gas_in_token_a = if is_native {
            gas_native
        } else {
            gas_native / buy_price
        };

        let max_trade = f64::min(
            max_trade_amount(buy_record, token_a, decimals_a, is_native),
            max_trade_amount(sell_record, token_a, decimals_a, is_native),
        );
        if max_trade <= 0.0 {
            debug!(venue = %buy_record.descriptor.venue, "pair disabled by trade sizing");
            return None;
        }

        let profit_margin = price_gap / buy_price;
        let min_trade = f64::max(gas_in_token_a / profit_margin, 0.01 * max_trade);
        if min_trade > max_trade {
            return None;
        }

        if profit_percent <= self.params.min_profit_percent {
            return None;
        }

        Some(Opportunity {
            token_a,
            token_b,
            buy_venue: buy_record.descriptor.venue.clone(),
            sell_venue: sell_record.descriptor.venue.clone(),
            buy_price,
            sell_price,
            price_gap,
            profit_percent,
            estimated_gas: self.params.gas_units,
            min_trade,
            max_trade,
            discovered_ms: now_ms(),
        })
    }
}
