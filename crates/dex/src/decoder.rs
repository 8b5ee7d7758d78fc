use crate::abi::IAvaxV2Router;
use alloy::primitives::{Address, U256};
use alloy::sol_types::SolCall;
use anyhow::Result;
use glacier_core::types::DecodedSwap;

/// Decodes router calldata into swap metadata. Returns `Ok(None)` for
/// anything that is not a recognized swap selector; decode errors on a
/// matched selector propagate so the caller can log them, and the
/// transaction is still stored without a decoded call.
pub fn decode_swap_calldata(router: Address, input: &[u8]) -> Result<Option<DecodedSwap>> {
    if input.len() < 4 {
        return Ok(None);
    }

    let selector = &input[..4];
    let decoded = if selector == IAvaxV2Router::swapExactTokensForTokensCall::SELECTOR {
        let call = IAvaxV2Router::swapExactTokensForTokensCall::abi_decode(input)?;
        swap_from_path(
            router,
            "swapExactTokensForTokens",
            Some(call.amountIn),
            Some(call.amountOutMin),
            call.path,
        )
    } else if selector == IAvaxV2Router::swapTokensForExactTokensCall::SELECTOR {
        let call = IAvaxV2Router::swapTokensForExactTokensCall::abi_decode(input)?;
        swap_from_path(
            router,
            "swapTokensForExactTokens",
            Some(call.amountInMax),
            Some(call.amountOut),
            call.path,
        )
    } else if selector == IAvaxV2Router::swapExactAVAXForTokensCall::SELECTOR {
        let call = IAvaxV2Router::swapExactAVAXForTokensCall::abi_decode(input)?;
        // the exact input amount rides on tx.value, not in the calldata
        swap_from_path(
            router,
            "swapExactAVAXForTokens",
            None,
            Some(call.amountOutMin),
            call.path,
        )
    } else if selector == IAvaxV2Router::swapAVAXForExactTokensCall::SELECTOR {
        let call = IAvaxV2Router::swapAVAXForExactTokensCall::abi_decode(input)?;
        swap_from_path(
            router,
            "swapAVAXForExactTokens",
            None,
            Some(call.amountOut),
            call.path,
        )
    } else if selector == IAvaxV2Router::swapExactTokensForAVAXCall::SELECTOR {
        let call = IAvaxV2Router::swapExactTokensForAVAXCall::abi_decode(input)?;
        swap_from_path(
            router,
            "swapExactTokensForAVAX",
            Some(call.amountIn),
            Some(call.amountOutMin),
            call.path,
        )
    } else if selector == IAvaxV2Router::swapTokensForExactAVAXCall::SELECTOR {
        let call = IAvaxV2Router::swapTokensForExactAVAXCall::abi_decode(input)?;
        swap_from_path(
            router,
            "swapTokensForExactAVAX",
            Some(call.amountInMax),
            Some(call.amountOut),
            call.path,
        )
    } else {
        return Ok(None);
    };

    Ok(decoded)
}

fn swap_from_path(
    router: Address,
    function: &str,
    amount_in: Option<U256>,
    amount_out_or_min: Option<U256>,
    path: Vec<Address>,
) -> Option<DecodedSwap> {
    let (&token_in, &token_out) = match (path.first(), path.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => return None,
    };
    Some(DecodedSwap {
        router,
        function: function.to_string(),
        is_swap: function.to_ascii_lowercase().contains("swap"),
        token_in,
        token_out,
        amount_in,
        amount_out_or_min,
        path,
    })
}
