use alloy::consensus::Transaction as TransactionTrait;
use alloy::network::TransactionResponse;
use alloy::primitives::B256;
use alloy::providers::{DynProvider, Provider};
use anyhow::Result;
use glacier_core::types::EnrichedTx;
use glacier_core::utils::now_ms;
use std::time::Duration;

/// Point lookup for a pending hash. `None` means the transaction vanished
/// before propagation reached this node; callers drop those silently.
pub struct TxFetcher {
    provider: DynProvider,
    timeout: Duration,
}

impl TxFetcher {
    pub fn new(provider: DynProvider, timeout_ms: u64) -> Self {
        Self {
            provider,
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    pub async fn fetch(&self, hash: B256) -> Result<Option<EnrichedTx>> {
        let fut = self.provider.get_transaction_by_hash(hash);
        let tx_opt = tokio::time::timeout(self.timeout, fut).await??;
        Ok(tx_opt.map(|tx| Self::map_tx(tx, now_ms())))
    }

    fn map_tx<T>(tx: T, first_seen_ms: u64) -> EnrichedTx
    where
        T: TransactionTrait + TransactionResponse,
    {
        EnrichedTx {
            hash: tx.tx_hash(),
            from: tx.from(),
            to: tx.to(),
            value: tx.value(),
            gas_limit: tx.gas_limit(),
            gas_price: TransactionTrait::gas_price(&tx),
            max_fee_per_gas: Some(TransactionTrait::max_fee_per_gas(&tx)),
            max_priority_fee_per_gas: tx.max_priority_fee_per_gas(),
            nonce: tx.nonce(),
            input: tx.input().clone(),
            first_seen_ms,
            block_number: tx.block_number(),
            swap: None,
        }
    }
}
