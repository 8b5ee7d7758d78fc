use glacier_cache::CacheClient;
use glacier_core::types::Opportunity;
use glacier_core::Registry;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Written,
    Suppressed,
    BelowThreshold,
    CacheDown,
}

/// Stable key per (pair, venue ordering): later finds of the same gap land
/// on the same entry instead of piling up new ones.
pub fn opportunity_key(registry: &Registry, opp: &Opportunity) -> String {
    format!(
        "opportunity:{}-{}-{}-{}",
        registry.label(opp.token_a),
        registry.label(opp.token_b),
        opp.buy_venue,
        opp.sell_venue
    )
}

/// Hysteresis gate: a fresh key always writes; an existing one only when the
/// profit moved by at least the threshold, damping rewrite storms while a
/// price oscillates around a gap.
pub fn should_overwrite(prior_profit: Option<f64>, new_profit: f64, hysteresis_pp: f64) -> bool {
    match prior_profit {
        None => true,
        Some(prior) => (new_profit - prior).abs() >= hysteresis_pp,
    }
}

pub async fn publish_opportunity(
    cache: &mut CacheClient,
    registry: &Registry,
    opp: &Opportunity,
    publish_profit_percent: f64,
    hysteresis_pp: f64,
    ttl_secs: u64,
) -> PublishOutcome {
    if opp.profit_percent <= publish_profit_percent {
        return PublishOutcome::BelowThreshold;
    }

    let key = opportunity_key(registry, opp);
    let prior_profit = match cache.get(&key).await {
        Ok(Some(body)) => serde_json::from_str::<Opportunity>(&body)
            .ok()
            .map(|prior| prior.profit_percent),
        Ok(None) => None,
        Err(err) => {
            debug!(?err, %key, "opportunity read failed; write dropped");
            return PublishOutcome::CacheDown;
        }
    };

    if !should_overwrite(prior_profit, opp.profit_percent, hysteresis_pp) {
        return PublishOutcome::Suppressed;
    }

    let body = match serde_json::to_string(opp) {
        Ok(body) => body,
        Err(err) => {
            warn!(?err, "opportunity failed to serialize");
            return PublishOutcome::CacheDown;
        }
    };
    match cache.set_with_ttl(&key, &body, ttl_secs).await {
        Ok(()) => PublishOutcome::Written,
        Err(err) => {
            debug!(?err, %key, "opportunity write dropped");
            PublishOutcome::CacheDown
        }
    }
}

/// Everything currently published, best profit first. An unavailable cache
/// degrades to an empty set.
pub async fn get_current_opportunities(cache: &mut CacheClient) -> Vec<Opportunity> {
    let keys = match cache.keys_by_prefix("opportunity:").await {
        Ok(keys) => keys,
        Err(err) => {
            debug!(?err, "opportunity scan failed");
            return Vec::new();
        }
    };

    let mut opportunities = Vec::with_capacity(keys.len());
    for key in keys {
        match cache.get(&key).await {
            Ok(Some(body)) => match serde_json::from_str::<Opportunity>(&body) {
                Ok(opp) => opportunities.push(opp),
                Err(err) => debug!(?err, %key, "opportunity failed to parse"),
            },
            Ok(None) => {} // expired between scan and read
            Err(err) => {
                debug!(?err, %key, "opportunity read failed");
                break;
            }
        }
    }

    opportunities.sort_by(|a, b| {
        b.profit_percent
            .partial_cmp(&a.profit_percent)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    opportunities
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;
    use glacier_core::types::Opportunity;

    #[test]
    fn fresh_key_always_writes() {
        assert!(should_overwrite(None, 0.71, 0.1));
    }

    #[test]
    fn small_oscillation_is_suppressed() {
        assert!(!should_overwrite(Some(0.71), 0.73, 0.1));
        assert!(!should_overwrite(Some(0.71), 0.65, 0.1));
    }

    #[test]
    fn real_moves_overwrite() {
        assert!(should_overwrite(Some(0.71), 0.85, 0.1));
        assert!(should_overwrite(Some(0.71), 0.55, 0.1));
    }

    fn sample_opportunity() -> Opportunity {
        Opportunity {
            token_a: address!("0xB31f66AA3C1e785363F0875A1B74E27b85FD66c7"),
            token_b: address!("0xB97EF9Ef8734C71904D8002F8b6Bc66Dd9c48a6E"),
            buy_venue: "TraderJoe".to_string(),
            sell_venue: "Pangolin".to_string(),
            buy_price: 42.0,
            sell_price: 42.3,
            price_gap: 0.3,
            profit_percent: 0.714,
            estimated_gas: 300_000,
            min_trade: 1.05,
            max_trade: 10.0,
            discovered_ms: 0,
        }
    }

    // nothing listens on port 1; the client comes up degraded and every
    // operation falls back without crashing
    #[tokio::test]
    async fn cache_down_degrades_to_empty() {
        let mut cache = CacheClient::connect("redis://127.0.0.1:1/", "mev:")
            .await
            .unwrap();
        assert!(get_current_opportunities(&mut cache).await.is_empty());
    }

    #[tokio::test]
    async fn cache_down_drops_publishes() {
        let mut cache = CacheClient::connect("redis://127.0.0.1:1/", "mev:")
            .await
            .unwrap();
        let registry = glacier_core::Registry {
            venues: Vec::new(),
            tokens_by_address: std::collections::HashMap::new(),
            tokens_by_symbol: std::collections::HashMap::new(),
            pairs: Vec::new(),
            wrapped_native: address!("0xB31f66AA3C1e785363F0875A1B74E27b85FD66c7"),
        };
        let outcome = publish_opportunity(
            &mut cache,
            &registry,
            &sample_opportunity(),
            0.5,
            0.1,
            60,
        )
        .await;
        assert_eq!(outcome, PublishOutcome::CacheDown);
    }

    #[tokio::test]
    async fn below_threshold_never_touches_the_cache() {
        let mut cache = CacheClient::connect("redis://127.0.0.1:1/", "mev:")
            .await
            .unwrap();
        let registry = glacier_core::Registry {
            venues: Vec::new(),
            tokens_by_address: std::collections::HashMap::new(),
            tokens_by_symbol: std::collections::HashMap::new(),
            pairs: Vec::new(),
            wrapped_native: address!("0xB31f66AA3C1e785363F0875A1B74E27b85FD66c7"),
        };
        let mut opp = sample_opportunity();
        opp.profit_percent = 0.4;
        let outcome = publish_opportunity(&mut cache, &registry, &opp, 0.5, 0.1, 60).await;
        assert_eq!(outcome, PublishOutcome::BelowThreshold);
    }
}
