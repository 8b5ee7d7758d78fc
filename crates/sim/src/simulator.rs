use crate::bundle::Bundle;
use crate::sandbox::Sandbox;
use alloy::primitives::{Address, TxKind, U256};
use alloy::providers::Provider;
use alloy::rpc::types::transaction::TransactionInput;
use alloy::rpc::types::TransactionRequest;
use anyhow::{anyhow, Result};
use glacier_chain::client::FeeData;
use glacier_chain::NodeClient;
use glacier_core::config::SimConfig;
use serde::Serialize;
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};
use tracing::{info, warn};

// anvil's first funded dev account; auto-impersonation makes it usable
// without key material in this process
const TEST_ACCOUNT: Address =
    alloy::primitives::address!("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266");

const DEFAULT_GAS_PRICE_GWEI: u64 = 25;
const RECEIPT_WAIT: Duration = Duration::from_secs(10);
const BALANCE_SETTLE: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Serialize)]
pub struct SimulationResult {
    pub success: bool,
    pub gas_used: u64,
    pub profit_wei: i128,
    pub error: Option<String>,
    pub execution_ms: u64,
}

impl SimulationResult {
    fn failed(error: String, gas_used: u64, execution_ms: u64) -> Self {
        Self {
            success: false,
            gas_used,
            profit_wei: 0,
            error: Some(error),
            execution_ms,
        }
    }
}

/// Replays bundles against the owned sandbox, one at a time. Fast profit
/// mode computes from the expected profit and observed gas; precise mode
/// pays for a second balance read.
pub struct BundleSimulator {
    chain: NodeClient,
    sandbox: Sandbox,
    fast: bool,
    soft_budget_ms: u64,
    funding_wei: U256,
}

impl BundleSimulator {
    pub fn new(chain: NodeClient, cfg: &SimConfig, fork_url: String) -> Self {
        let funding_wei = U256::from(cfg.balance_native).saturating_mul(U256::from(10u128.pow(18)));
        Self {
            chain,
            sandbox: Sandbox::new(cfg, fork_url),
            fast: cfg.fast_simulation,
            soft_budget_ms: cfg.simulation_timeout_ms,
            funding_wei,
        }
    }

    pub fn account(&self) -> Address {
        TEST_ACCOUNT
    }

    pub async fn start(&mut self) -> Result<()> {
        let head = self.chain.block_number().await?;
        let fees = self.chain.fee_data().await?;
        info!(head, gas_price = ?fees.gas_price, "forking from live chain");
        self.sandbox.start(head).await
    }

    pub async fn stop(&mut self) {
        self.sandbox.stop().await;
    }

    /// Repins the fork to fresh chain state and re-funds the test account.
    /// Required between bundles: balances, approvals, and pool drift from
    /// the last replay would otherwise leak into the next.
    pub async fn reset(&mut self) -> Result<()> {
        let head = self.chain.block_number().await?;
        self.sandbox.reset(head).await?;
        self.sandbox.set_balance(TEST_ACCOUNT, self.funding_wei).await
    }

    pub async fn simulate(&mut self, bundle: &Bundle) -> SimulationResult {
        let started = Instant::now();
        if !self.sandbox.is_alive() {
            return SimulationResult::failed("sandbox not running".to_string(), 0, 0);
        }

        let result = self.replay(bundle, started).await;
        let execution_ms = started.elapsed().as_millis() as u64;
        if execution_ms > self.soft_budget_ms {
            // soft signal only; the result carries the time for gating
            warn!(execution_ms, budget_ms = self.soft_budget_ms, "bundle over time budget");
        }

        match result {
            Ok(result) => result,
            Err(err) => SimulationResult::failed(err.to_string(), 0, execution_ms),
        }
    }

    async fn replay(&mut self, bundle: &Bundle, started: Instant) -> Result<SimulationResult> {
        let provider = self.sandbox.provider()?.clone();

        let initial_balance = if self.fast {
            None
        } else {
            Some(provider.get_balance(TEST_ACCOUNT).await?)
        };

        let base_nonce = provider.get_transaction_count(TEST_ACCOUNT).await?;
        let fees = FeeData {
            gas_price: provider.get_gas_price().await.ok(),
            max_priority_fee_per_gas: None,
        };
        let gas_price = fees.gas_price_or(DEFAULT_GAS_PRICE_GWEI);

        let mut gas_used = 0u64;
        for (index, leg) in bundle.txs.iter().enumerate() {
            let request = TransactionRequest {
                from: Some(TEST_ACCOUNT),
                to: Some(TxKind::Call(leg.to)),
                value: Some(leg.value),
                input: TransactionInput::new(leg.input.clone()),
                gas: Some(leg.gas_limit),
                gas_price: Some(gas_price),
                nonce: Some(base_nonce + index as u64),
                ..Default::default()
            };

            let pending = provider
                .send_transaction(request)
                .await
                .map_err(|err| anyhow!("leg {index} broadcast failed: {err}"))?;

            let receipt = match timeout(RECEIPT_WAIT, pending.get_receipt()).await {
                Ok(Ok(receipt)) => receipt,
                Ok(Err(err)) => {
                    return Ok(SimulationResult::failed(
                        format!("leg {index} receipt missing: {err}"),
                        gas_used,
                        started.elapsed().as_millis() as u64,
                    ))
                }
                Err(_) => {
                    return Ok(SimulationResult::failed(
                        format!("leg {index} receipt timed out"),
                        gas_used,
                        started.elapsed().as_millis() as u64,
                    ))
                }
            };

            gas_used = gas_used.saturating_add(receipt.gas_used);
            if !receipt.status() {
                return Ok(SimulationResult::failed(
                    format!("leg {index} reverted"),
                    gas_used,
                    started.elapsed().as_millis() as u64,
                ));
            }
        }

        let profit_wei = if let Some(initial) = initial_balance {
            sleep(BALANCE_SETTLE).await;
            let final_balance = provider.get_balance(TEST_ACCOUNT).await?;
            signed_diff(final_balance, initial)
        } else {
            let gas_cost = (gas_used as u128).saturating_mul(gas_price);
            let total_value: U256 = bundle
                .txs
                .iter()
                .fold(U256::ZERO, |acc, leg| acc.saturating_add(leg.value));
            to_i128(bundle.expected_profit_wei)
                .saturating_sub(i128::try_from(gas_cost).unwrap_or(i128::MAX))
                .saturating_sub(to_i128(total_value))
        };

        let execution_ms = started.elapsed().as_millis() as u64;
        info!(
            gas_used,
            profit_wei,
            execution_ms,
            description = %bundle.description,
            "bundle replayed"
        );

        Ok(SimulationResult {
            success: true,
            gas_used,
            profit_wei,
            error: None,
            execution_ms,
        })
    }
}

fn to_i128(value: U256) -> i128 {
    i128::try_from(value).unwrap_or(i128::MAX)
}

fn signed_diff(after: U256, before: U256) -> i128 {
    if after >= before {
        to_i128(after - before)
    } else {
        to_i128(before - after).saturating_neg()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_diff_handles_both_directions() {
        assert_eq!(signed_diff(U256::from(10u64), U256::from(4u64)), 6);
        assert_eq!(signed_diff(U256::from(4u64), U256::from(10u64)), -6);
        assert_eq!(signed_diff(U256::from(7u64), U256::from(7u64)), 0);
    }
}
