use crate::config::AppConfig;
use crate::types::{Token, Venue, VenueFamily};
use crate::utils::parse_address;
use alloy::primitives::Address;
use anyhow::{anyhow, Result};
use std::collections::HashMap;

/// Typed view of the venue/token/pair tables. Built once at startup; any
/// inconsistency (unknown symbol in a pair, bad address, missing wrapped
/// native) refuses to start the stage.
#[derive(Debug, Clone)]
pub struct Registry {
    pub venues: Vec<Venue>,
    pub tokens_by_address: HashMap<Address, Token>,
    pub tokens_by_symbol: HashMap<String, Token>,
    pub pairs: Vec<(Address, Address)>,
    pub wrapped_native: Address,
}

impl Registry {
    pub fn from_config(cfg: &AppConfig) -> Result<Self> {
        let mut venues = Vec::with_capacity(cfg.venues.len());
        for venue in &cfg.venues {
            let family = match venue.family.trim().to_ascii_lowercase().as_str() {
                "constant_product_v2" | "v2" => VenueFamily::ConstantProductV2,
                other => return Err(anyhow!("unsupported venue family for {}: {other}", venue.name)),
            };
            venues.push(Venue {
                name: venue.name.clone(),
                factory: parse_address(&venue.factory)?,
                router: parse_address(&venue.router)?,
                family,
            });
        }
        if venues.is_empty() {
            return Err(anyhow!("no venues configured"));
        }

        let mut tokens_by_address = HashMap::new();
        let mut tokens_by_symbol = HashMap::new();
        for token in &cfg.tokens {
            if token.decimals > 36 {
                return Err(anyhow!(
                    "token {} decimals {} out of range",
                    token.symbol,
                    token.decimals
                ));
            }
            let parsed = Token {
                address: parse_address(&token.address)?,
                decimals: token.decimals,
                symbol: Some(token.symbol.clone()),
            };
            tokens_by_address.insert(parsed.address, parsed.clone());
            tokens_by_symbol.insert(token.symbol.clone(), parsed);
        }

        let mut pairs = Vec::with_capacity(cfg.pairs.len());
        for pair in &cfg.pairs {
            let a = tokens_by_symbol
                .get(&pair.token_a)
                .ok_or_else(|| anyhow!("pair references unknown token {}", pair.token_a))?;
            let b = tokens_by_symbol
                .get(&pair.token_b)
                .ok_or_else(|| anyhow!("pair references unknown token {}", pair.token_b))?;
            if a.address == b.address {
                return Err(anyhow!("pair {}/{} is degenerate", pair.token_a, pair.token_b));
            }
            pairs.push((a.address, b.address));
        }

        let wrapped_native = parse_address(&cfg.mev.wrapped_native)?;
        if !tokens_by_address.contains_key(&wrapped_native) {
            return Err(anyhow!("wrapped native token missing from token table"));
        }

        Ok(Self {
            venues,
            tokens_by_address,
            tokens_by_symbol,
            pairs,
            wrapped_native,
        })
    }

    pub fn token(&self, address: Address) -> Option<&Token> {
        self.tokens_by_address.get(&address)
    }

    pub fn decimals(&self, address: Address) -> Option<u8> {
        self.tokens_by_address.get(&address).map(|t| t.decimals)
    }

    pub fn label(&self, address: Address) -> String {
        match self.tokens_by_address.get(&address) {
            Some(token) => token.label(),
            None => format!("{address:#x}"),
        }
    }

    pub fn venue(&self, name: &str) -> Option<&Venue> {
        self.venues.iter().find(|v| v.name == name)
    }

    pub fn router_set(&self) -> std::collections::HashSet<Address> {
        self.venues.iter().map(|v| v.router).collect()
    }

    pub fn is_wrapped_native(&self, address: Address) -> bool {
        address == self.wrapped_native
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PairConfig, TokenConfig, VenueConfig};

    fn base_config() -> AppConfig {
        let toml = r#"
            [chain]
            network = "mainnet"
            [chain.mainnet]
            chain_id = 43114
            rpc_http = "http://localhost:9650/ext/bc/C/rpc"
            rpc_ws = "ws://localhost:9650/ext/bc/C/ws"
            health_url = "http://localhost:9650/ext/health"
            [chain.testnet]
            chain_id = 43113
            rpc_http = "http://localhost:9650/ext/bc/C/rpc"
            rpc_ws = "ws://localhost:9650/ext/bc/C/ws"
            health_url = "http://localhost:9650/ext/health"
            [cache]
            url = "redis://127.0.0.1/"
            [mempool]
            [mev]
            wrapped_native = "0xB31f66AA3C1e785363F0875A1B74E27b85FD66c7"
            min_profit_native = 0.01
            [sim]
            [observability]
            metrics_enabled = false
            metrics_bind = "127.0.0.1:9464"
        "#;
        let cfg = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()
            .unwrap();
        let mut app: AppConfig = cfg.try_deserialize().unwrap();
        app.venues = vec![VenueConfig {
            name: "TraderJoe".into(),
            factory: "0x9Ad6C38BE94206cA50bb0d90783181662f0Cfa10".into(),
            router: "0x60aE616a2155Ee3d9A68541Ba4544862310933d4".into(),
            family: "constant_product_v2".into(),
        }];
        app.tokens = vec![
            TokenConfig {
                address: "0xB31f66AA3C1e785363F0875A1B74E27b85FD66c7".into(),
                symbol: "WAVAX".into(),
                decimals: 18,
            },
            TokenConfig {
                address: "0xB97EF9Ef8734C71904D8002F8b6Bc66Dd9c48a6E".into(),
                symbol: "USDC".into(),
                decimals: 6,
            },
        ];
        app.pairs = vec![PairConfig {
            token_a: "WAVAX".into(),
            token_b: "USDC".into(),
        }];
        app
    }

    #[test]
    fn builds_from_valid_config() {
        let registry = Registry::from_config(&base_config()).unwrap();
        assert_eq!(registry.venues.len(), 1);
        assert_eq!(registry.pairs.len(), 1);
        assert!(registry.is_wrapped_native(registry.pairs[0].0));
        assert_eq!(registry.decimals(registry.pairs[0].1), Some(6));
    }

    #[test]
    fn rejects_pair_with_unknown_token() {
        let mut cfg = base_config();
        cfg.pairs.push(PairConfig {
            token_a: "WAVAX".into(),
            token_b: "DAI".into(),
        });
        assert!(Registry::from_config(&cfg).is_err());
    }

    #[test]
    fn rejects_unknown_venue_family() {
        let mut cfg = base_config();
        cfg.venues[0].family = "concentrated_v3".into();
        assert!(Registry::from_config(&cfg).is_err());
    }

    #[test]
    fn rejects_wrapped_native_missing_from_tokens() {
        let mut cfg = base_config();
        cfg.mev.wrapped_native = "0x0d500B1d8E8eF31E21C99d1Db9A6444d3ADf1270".into();
        assert!(Registry::from_config(&cfg).is_err());
    }
}
