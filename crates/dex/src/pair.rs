use crate::abi::{IUniswapV2Factory, IUniswapV2Pair};
use alloy::primitives::{Address, TxKind, U256};
use alloy::providers::{DynProvider, Provider};
use alloy::rpc::types::transaction::TransactionInput;
use alloy::rpc::types::TransactionRequest;
use alloy::sol_types::SolCall;
use anyhow::{anyhow, Result};
use glacier_core::types::{Venue, VenueFamily};

/// View-call access to one venue's factory and pairs. Dispatch is on the
/// venue's protocol family tag; constant-product V2 is the only family.
pub struct VenuePairOps<'a> {
    provider: &'a DynProvider,
    venue: &'a Venue,
}

impl<'a> VenuePairOps<'a> {
    pub fn new(provider: &'a DynProvider, venue: &'a Venue) -> Self {
        Self { provider, venue }
    }

    /// Factory lookup. `None` when the factory answers the zero address,
    /// i.e. the pair does not exist on this venue.
    pub async fn pair_address(&self, token_a: Address, token_b: Address) -> Result<Option<Address>> {
        match self.venue.family {
            VenueFamily::ConstantProductV2 => {
                let call = IUniswapV2Factory::getPairCall {
                    tokenA: token_a,
                    tokenB: token_b,
                };
                let data = self.view_call(self.venue.factory, call.abi_encode()).await?;
                let pair = IUniswapV2Factory::getPairCall::abi_decode_returns(&data)?;
                Ok((pair != Address::ZERO).then_some(pair))
            }
        }
    }

    /// On-chain storage order of the pair's tokens.
    pub async fn pair_tokens(&self, pair: Address) -> Result<(Address, Address)> {
        let data0 = self
            .view_call(pair, IUniswapV2Pair::token0Call {}.abi_encode())
            .await?;
        let token0 = IUniswapV2Pair::token0Call::abi_decode_returns(&data0)?;

        let data1 = self
            .view_call(pair, IUniswapV2Pair::token1Call {}.abi_encode())
            .await?;
        let token1 = IUniswapV2Pair::token1Call::abi_decode_returns(&data1)?;

        if token0 == Address::ZERO || token1 == Address::ZERO {
            return Err(anyhow!("pair {pair} reports a zero token"));
        }
        Ok((token0, token1))
    }

    pub async fn reserves(&self, pair: Address) -> Result<(U256, U256)> {
        let data = self
            .view_call(pair, IUniswapV2Pair::getReservesCall {}.abi_encode())
            .await?;
        let ret = IUniswapV2Pair::getReservesCall::abi_decode_returns(&data)?;
        Ok((U256::from(ret.reserve0), U256::from(ret.reserve1)))
    }

    async fn view_call(&self, to: Address, calldata: Vec<u8>) -> Result<alloy::primitives::Bytes> {
        let tx = TransactionRequest {
            to: Some(TxKind::Call(to)),
            input: TransactionInput::new(calldata.into()),
            ..Default::default()
        };
        Ok(self.provider.call(tx).await?)
    }
}
