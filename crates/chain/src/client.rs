use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use anyhow::Result;
use glacier_core::config::NetworkConfig;
use glacier_core::utils::gwei_to_wei;

/// WS for subscriptions, HTTP for request/response. Both erased so the rest
/// of the pipeline is transport-agnostic.
#[derive(Clone)]
pub struct NodeClient {
    pub ws: DynProvider,
    pub http: DynProvider,
    pub chain_id: u64,
}

/// Gas-price hint for replay; max-fee/priority pair when the node reports
/// EIP-1559 data, legacy gas price otherwise.
#[derive(Debug, Clone, Copy)]
pub struct FeeData {
    pub gas_price: Option<u128>,
    pub max_priority_fee_per_gas: Option<u128>,
}

impl FeeData {
    pub fn gas_price_or(&self, default_gwei: u64) -> u128 {
        match self.gas_price {
            Some(price) if price > 0 => price,
            _ => gwei_to_wei(default_gwei),
        }
    }
}

impl NodeClient {
    pub async fn connect(cfg: &NetworkConfig) -> Result<Self> {
        let ws = ProviderBuilder::new().connect(&cfg.rpc_ws).await?.erased();
        let http = ProviderBuilder::new()
            .connect(&cfg.rpc_http)
            .await?
            .erased();
        Ok(Self {
            ws,
            http,
            chain_id: cfg.chain_id,
        })
    }

    pub async fn block_number(&self) -> Result<u64> {
        Ok(self.http.get_block_number().await?)
    }

    pub async fn fee_data(&self) -> Result<FeeData> {
        let gas_price = self.http.get_gas_price().await.ok();
        let max_priority_fee_per_gas = self.http.get_max_priority_fee_per_gas().await.ok();
        Ok(FeeData {
            gas_price,
            max_priority_fee_per_gas,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::FeeData;

    #[test]
    fn fee_data_falls_back_to_default() {
        let fees = FeeData {
            gas_price: None,
            max_priority_fee_per_gas: None,
        };
        assert_eq!(fees.gas_price_or(25), 25_000_000_000u128);

        let zero = FeeData {
            gas_price: Some(0),
            max_priority_fee_per_gas: None,
        };
        assert_eq!(zero.gas_price_or(25), 25_000_000_000u128);

        let live = FeeData {
            gas_price: Some(30_000_000_000),
            max_priority_fee_per_gas: None,
        };
        assert_eq!(live.gas_price_or(25), 30_000_000_000u128);
    }
}
