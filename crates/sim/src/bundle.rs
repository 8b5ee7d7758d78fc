use alloy::primitives::{Address, Bytes, U256};
use alloy::sol_types::SolCall;
use anyhow::{anyhow, Result};
use glacier_core::types::Opportunity;
use glacier_core::utils::from_units;
use glacier_core::Registry;
use glacier_dex::abi::{IAvaxV2Router, IERC20};

const DEADLINE_SECS: u64 = 300;

/// One transaction of a replay bundle, already encoded.
#[derive(Debug, Clone)]
pub struct BundleTx {
    pub to: Address,
    pub value: U256,
    pub input: Bytes,
    pub gas_limit: u64,
}

/// Ordered, nonce-consecutive sequence replayed against the sandbox. Failure
/// of any leg aborts the rest. Never persisted.
#[derive(Debug, Clone)]
pub struct Bundle {
    pub txs: Vec<BundleTx>,
    pub expected_profit_wei: U256,
    pub description: String,
}

/// Builds the buy-approve-sell cycle for an opportunity. `trade_units` is
/// the trade size in human units of tokenA; `self_address` is the funded
/// sandbox account that both sends and receives.
///
/// When tokenA is the wrapped native token the cycle is three legs:
/// native -> tokenB on the buy venue, a max approval, tokenB -> native on
/// the sell venue. Otherwise a native -> tokenA funding swap is prepended
/// and the cycle runs on token legs, ending still in tokenA; unwinding that
/// position back to native is not built yet.
pub fn build_cycle_bundle(
    registry: &Registry,
    opp: &Opportunity,
    trade_units: f64,
    native_budget_units: f64,
    gas_limit: u64,
    self_address: Address,
    now_secs: u64,
) -> Result<Bundle> {
    let buy = registry
        .venue(&opp.buy_venue)
        .ok_or_else(|| anyhow!("unknown buy venue {}", opp.buy_venue))?;
    let sell = registry
        .venue(&opp.sell_venue)
        .ok_or_else(|| anyhow!("unknown sell venue {}", opp.sell_venue))?;
    let token_a = registry
        .token(opp.token_a)
        .ok_or_else(|| anyhow!("token {} missing from table", opp.token_a))?;
    let token_b = registry
        .token(opp.token_b)
        .ok_or_else(|| anyhow!("token {} missing from table", opp.token_b))?;
    if trade_units <= 0.0 {
        return Err(anyhow!("non-positive trade size"));
    }

    let deadline = U256::from(now_secs + DEADLINE_SECS);
    let amount_in = from_units(trade_units, token_a.decimals);
    if amount_in.is_zero() {
        return Err(anyhow!("trade size rounds to zero"));
    }

    // offline estimate of the buy leg's output; acknowledged approximate and
    // the usual culprit when the sell leg reverts
    let estimated_token_b = from_units(trade_units * opp.buy_price, token_b.decimals);

    let mut txs = Vec::new();

    if !registry.is_wrapped_native(opp.token_a) {
        let native_budget = from_units(native_budget_units, 18);
        if native_budget.is_zero() {
            return Err(anyhow!("native funding budget rounds to zero"));
        }
        txs.push(BundleTx {
            to: buy.router,
            value: native_budget,
            input: IAvaxV2Router::swapExactAVAXForTokensCall {
                amountOutMin: U256::ZERO,
                path: vec![registry.wrapped_native, token_a.address],
                to: self_address,
                deadline,
            }
            .abi_encode()
            .into(),
            gas_limit,
        });
        txs.push(approve_tx(token_a.address, buy.router, gas_limit));
        txs.push(BundleTx {
            to: buy.router,
            value: U256::ZERO,
            input: IAvaxV2Router::swapExactTokensForTokensCall {
                amountIn: amount_in,
                amountOutMin: U256::ZERO,
                path: vec![token_a.address, token_b.address],
                to: self_address,
                deadline,
            }
            .abi_encode()
            .into(),
            gas_limit,
        });
        txs.push(approve_tx(token_b.address, sell.router, gas_limit));
        txs.push(BundleTx {
            to: sell.router,
            value: U256::ZERO,
            input: IAvaxV2Router::swapExactTokensForTokensCall {
                amountIn: estimated_token_b,
                amountOutMin: U256::ZERO,
                path: vec![token_b.address, token_a.address],
                to: self_address,
                deadline,
            }
            .abi_encode()
            .into(),
            gas_limit,
        });
    } else {
        txs.push(BundleTx {
            to: buy.router,
            value: amount_in,
            input: IAvaxV2Router::swapExactAVAXForTokensCall {
                amountOutMin: U256::ZERO,
                path: vec![token_a.address, token_b.address],
                to: self_address,
                deadline,
            }
            .abi_encode()
            .into(),
            gas_limit,
        });
        txs.push(approve_tx(token_b.address, sell.router, gas_limit));
        txs.push(BundleTx {
            to: sell.router,
            value: U256::ZERO,
            input: IAvaxV2Router::swapExactTokensForAVAXCall {
                amountIn: estimated_token_b,
                amountOutMin: U256::ZERO,
                path: vec![token_b.address, token_a.address],
                to: self_address,
                deadline,
            }
            .abi_encode()
            .into(),
            gas_limit,
        });
    }

    let profit_units = trade_units * (opp.sell_price - opp.buy_price) / opp.buy_price;
    let expected_profit_wei = from_units(profit_units, token_a.decimals);

    Ok(Bundle {
        txs,
        expected_profit_wei,
        description: format!(
            "{} {:.4} {} on {} -> {} ({:.3}% gap)",
            registry.label(opp.token_a),
            trade_units,
            registry.label(opp.token_b),
            opp.buy_venue,
            opp.sell_venue,
            opp.profit_percent
        ),
    })
}

fn approve_tx(token: Address, spender: Address, gas_limit: u64) -> BundleTx {
    BundleTx {
        to: token,
        value: U256::ZERO,
        input: IERC20::approveCall {
            spender,
            amount: U256::MAX,
        }
        .abi_encode()
        .into(),
        gas_limit,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;
    use glacier_core::types::{Token, Venue, VenueFamily};
    use std::collections::HashMap;

    const WAVAX: Address = address!("0xB31f66AA3C1e785363F0875A1B74E27b85FD66c7");
    const USDC: Address = address!("0xB97EF9Ef8734C71904D8002F8b6Bc66Dd9c48a6E");
    const USDT: Address = address!("0x9702230A8Ea53601f5cD2dc00fDBc13d4dF4A8c7");
    const JOE_ROUTER: Address = address!("0x60aE616a2155Ee3d9A68541Ba4544862310933d4");
    const PNG_ROUTER: Address = address!("0xE54Ca86531e17Ef3616d22Ca28b0D458b6C89106");
    const SELF: Address = address!("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266");

    fn registry() -> Registry {
        let mk = |address, decimals, symbol: &str| Token {
            address,
            decimals,
            symbol: Some(symbol.to_string()),
        };
        let tokens = vec![
            mk(WAVAX, 18, "WAVAX"),
            mk(USDC, 6, "USDC"),
            mk(USDT, 6, "USDT"),
        ];
        let mut by_address = HashMap::new();
        let mut by_symbol = HashMap::new();
        for token in tokens {
            by_symbol.insert(token.symbol.clone().unwrap(), token.clone());
            by_address.insert(token.address, token);
        }
        Registry {
            venues: vec![
                Venue {
                    name: "TraderJoe".to_string(),
                    factory: address!("0x9Ad6C38BE94206cA50bb0d90783181662f0Cfa10"),
                    router: JOE_ROUTER,
                    family: VenueFamily::ConstantProductV2,
                },
                Venue {
                    name: "Pangolin".to_string(),
                    factory: address!("0xefa94DE7a4656D787667C749f7E1223D71E9FD88"),
                    router: PNG_ROUTER,
                    family: VenueFamily::ConstantProductV2,
                },
            ],
            tokens_by_address: by_address,
            tokens_by_symbol: by_symbol,
            pairs: vec![(WAVAX, USDC)],
            wrapped_native: WAVAX,
        }
    }

    fn opportunity(token_a: Address, token_b: Address) -> Opportunity {
        Opportunity {
            token_a,
            token_b,
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

    #[test]
    fn native_cycle_is_three_legs() {
        let bundle = build_cycle_bundle(
            &registry(),
            &opportunity(WAVAX, USDC),
            1.0,
            1.0,
            300_000,
            SELF,
            1_700_000_000,
        )
        .unwrap();

        assert_eq!(bundle.txs.len(), 3);
        // buy leg carries the native value and targets the buy router
        assert_eq!(bundle.txs[0].to, JOE_ROUTER);
        assert_eq!(bundle.txs[0].value, U256::from(10u128.pow(18)));
        // approval targets the token contract, spender is the sell router
        assert_eq!(bundle.txs[1].to, USDC);
        let approve = IERC20::approveCall::abi_decode(&bundle.txs[1].input).unwrap();
        assert_eq!(approve.spender, PNG_ROUTER);
        assert_eq!(approve.amount, U256::MAX);
        // sell leg swaps the estimated buy output back to native
        assert_eq!(bundle.txs[2].to, PNG_ROUTER);
        let sell =
            IAvaxV2Router::swapExactTokensForAVAXCall::abi_decode(&bundle.txs[2].input).unwrap();
        assert_eq!(sell.amountIn, U256::from(42_000_000u64)); // 1 * 42.0 in 6 decimals
        assert_eq!(sell.path, vec![USDC, WAVAX]);
        assert_eq!(sell.deadline, U256::from(1_700_000_300u64));
    }

    #[test]
    fn non_native_cycle_prepends_funding_leg() {
        let bundle = build_cycle_bundle(
            &registry(),
            &opportunity(USDT, USDC),
            100.0,
            1.0,
            300_000,
            SELF,
            1_700_000_000,
        )
        .unwrap();

        assert_eq!(bundle.txs.len(), 5);
        let funding =
            IAvaxV2Router::swapExactAVAXForTokensCall::abi_decode(&bundle.txs[0].input).unwrap();
        assert_eq!(funding.path, vec![WAVAX, USDT]);
        assert_eq!(bundle.txs[0].value, U256::from(10u128.pow(18)));
    }

    #[test]
    fn expected_profit_tracks_the_gap() {
        let bundle = build_cycle_bundle(
            &registry(),
            &opportunity(WAVAX, USDC),
            1.0,
            1.0,
            300_000,
            SELF,
            1_700_000_000,
        )
        .unwrap();
        // the gap over the buy price, for one token, in wei
        let expected = from_units((42.3 - 42.0) / 42.0, 18);
        assert_eq!(bundle.expected_profit_wei, expected);
    }

    #[test]
    fn unknown_venue_is_rejected() {
        let mut opp = opportunity(WAVAX, USDC);
        opp.sell_venue = "SushiSwap".to_string();
        assert!(build_cycle_bundle(
            &registry(),
            &opp,
            1.0,
            1.0,
            300_000,
            SELF,
            1_700_000_000
        )
        .is_err());
    }

    #[test]
    fn zero_trade_is_rejected() {
        assert!(build_cycle_bundle(
            &registry(),
            &opportunity(WAVAX, USDC),
            0.0,
            1.0,
            300_000,
            SELF,
            1_700_000_000
        )
        .is_err());
    }
}
