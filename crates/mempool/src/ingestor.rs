use crate::metrics::{spawn_metrics_server, IngestorMetrics};
use alloy::primitives::{Address, B256};
use anyhow::Result;
use glacier_cache::CacheClient;
use glacier_chain::{NodeClient, PendingTxStream, ReconnectConfig, TrackedReceiver, TxFetcher};
use glacier_core::config::AppConfig;
use glacier_core::dedupe::DedupeSet;
use glacier_core::types::{DecodedSwap, EnrichedTx};
use glacier_core::utils::now_ms;
use glacier_core::Registry;
use glacier_dex::decode_swap_calldata;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info, warn};

const SUMMARY_INTERVAL_MS: u64 = 30_000;
const SLOW_TX_BUDGET_MS: u64 = 150;
const SWAP_QUEUE_KEY: &str = "swap_queue";

#[derive(Default, Clone, Copy)]
struct Counters {
    hashes_seen: u64,
    dedupe_dropped: u64,
    tx_missing: u64,
    stored: u64,
    decoded: u64,
    swaps: u64,
    decode_failures: u64,
    cache_errors: u64,
    slow: u64,
}

impl Counters {
    fn delta(&self, previous: &Counters) -> Counters {
        Counters {
            hashes_seen: self.hashes_seen.saturating_sub(previous.hashes_seen),
            dedupe_dropped: self.dedupe_dropped.saturating_sub(previous.dedupe_dropped),
            tx_missing: self.tx_missing.saturating_sub(previous.tx_missing),
            stored: self.stored.saturating_sub(previous.stored),
            decoded: self.decoded.saturating_sub(previous.decoded),
            swaps: self.swaps.saturating_sub(previous.swaps),
            decode_failures: self.decode_failures.saturating_sub(previous.decode_failures),
            cache_errors: self.cache_errors.saturating_sub(previous.cache_errors),
            slow: self.slow.saturating_sub(previous.slow),
        }
    }
}

/// Pipeline stage one: pending hashes in, enriched records out to the cache.
/// Owns the dedup set and the subscription; shares nothing in-process with
/// the other stages.
pub struct MempoolIngestor {
    chain: NodeClient,
    cache: CacheClient,
    fetcher: TxFetcher,
    routers: HashSet<Address>,
    dedupe: DedupeSet<B256>,
    hashes: Option<TrackedReceiver<B256>>,
    channel_size: usize,
    reconnect_ms: u64,
    ttl_secs: u64,
    swap_queue_max: usize,
    sweep_interval_secs: u64,
    metrics: Option<Arc<IngestorMetrics>>,
    counters: Counters,
    last_summary: Counters,
}

impl MempoolIngestor {
    pub async fn new(cfg: &AppConfig, registry: &Registry) -> Result<Self> {
        let network = cfg.chain.selected()?;
        let chain = NodeClient::connect(network).await?;
        let cache = CacheClient::connect(&cfg.cache.url, &cfg.cache.key_prefix).await?;
        let fetcher = TxFetcher::new(chain.http.clone(), cfg.mempool.tx_fetch_timeout_ms);

        let metrics = if cfg.observability.metrics_enabled {
            let metrics = Arc::new(IngestorMetrics::new()?);
            if let Err(err) = spawn_metrics_server(&cfg.observability.metrics_bind, metrics.clone())
            {
                warn!(?err, "metrics server failed to start");
            }
            Some(metrics)
        } else {
            None
        };

        Ok(Self {
            chain,
            cache,
            fetcher,
            routers: registry.router_set(),
            dedupe: DedupeSet::new(cfg.mempool.dedup_max_entries),
            hashes: None,
            channel_size: cfg.mempool.channel_size,
            reconnect_ms: cfg.mempool.ws_reconnect_ms,
            ttl_secs: cfg.mempool.ttl_secs,
            swap_queue_max: cfg.mempool.swap_queue_max,
            sweep_interval_secs: cfg.mempool.sweep_interval_secs,
            metrics,
            counters: Counters::default(),
            last_summary: Counters::default(),
        })
    }

    /// Opens the pending-tx subscription. Idempotent: a second call replaces
    /// the previous receiver, ending the old subscription task.
    pub fn start(&mut self) {
        let receiver = PendingTxStream::spawn(
            self.chain.ws.clone(),
            self.channel_size,
            ReconnectConfig::fixed(self.reconnect_ms),
            self.metrics.as_ref().map(|m| m.pending.clone()),
        );
        self.hashes = Some(receiver);
        info!("mempool ingestor started");
    }

    /// Drops the subscription; the stream task exits on its next send.
    pub fn stop(&mut self) {
        self.hashes = None;
        info!("mempool ingestor stopped");
    }

    pub async fn run(&mut self) -> Result<()> {
        self.start();
        let Some(mut hashes) = self.hashes.take() else {
            return Ok(());
        };

        let mut sweep = interval(Duration::from_secs(self.sweep_interval_secs.max(1)));
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
        sweep.tick().await; // first tick is immediate; skip it

        let mut summary = interval(Duration::from_millis(SUMMARY_INTERVAL_MS));
        summary.set_missed_tick_behavior(MissedTickBehavior::Delay);
        summary.tick().await;

        loop {
            tokio::select! {
                maybe_hash = hashes.recv() => {
                    match maybe_hash {
                        Some(hash) => self.process_hash(hash).await,
                        None => {
                            warn!("pending stream closed");
                            break;
                        }
                    }
                }
                _ = sweep.tick() => {
                    self.sweep_expired().await;
                }
                _ = summary.tick() => {
                    self.log_summary();
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("shutdown signal received");
                    break;
                }
            }
        }

        drop(hashes);
        self.stop();
        Ok(())
    }

    async fn process_hash(&mut self, hash: B256) {
        let started_ms = now_ms();
        self.counters.hashes_seen += 1;

        if self.dedupe.contains(&hash) {
            self.counters.dedupe_dropped += 1;
            if let Some(metrics) = &self.metrics {
                metrics.dedup_hits.inc();
            }
            return;
        }

        let mut tx = match self.fetcher.fetch(hash).await {
            Ok(Some(tx)) => tx,
            Ok(None) => {
                // propagation race: the hash arrived before the body
                self.counters.tx_missing += 1;
                return;
            }
            Err(err) => {
                debug!(%hash, ?err, "tx fetch failed");
                self.counters.tx_missing += 1;
                return;
            }
        };

        self.dedupe.insert(hash);
        tx.swap = self.decode_if_router(&tx);
        if tx.swap.is_some() {
            self.counters.decoded += 1;
        }

        self.store(&tx).await;

        let elapsed = now_ms().saturating_sub(started_ms);
        if elapsed > SLOW_TX_BUDGET_MS {
            self.counters.slow += 1;
            debug!(%hash, elapsed_ms = elapsed, "slow enrichment");
        }
    }

    fn decode_if_router(&mut self, tx: &EnrichedTx) -> Option<DecodedSwap> {
        match decode_router_swap(&self.routers, tx) {
            Ok(swap) => swap,
            Err(err) => {
                self.counters.decode_failures += 1;
                info!(hash = %tx.hash, ?err, "router calldata did not parse; storing undecoded");
                None
            }
        }
    }

    async fn store(&mut self, tx: &EnrichedTx) {
        let body = match serde_json::to_string(tx) {
            Ok(body) => body,
            Err(err) => {
                warn!(hash = %tx.hash, ?err, "enriched tx failed to serialize");
                return;
            }
        };

        let tx_key = format!("tx:{}", tx.hash);
        if let Err(err) = self.cache.set_with_ttl(&tx_key, &body, self.ttl_secs).await {
            self.counters.cache_errors += 1;
            warn!(?err, key = %tx_key, "cache write dropped");
            return;
        }
        self.counters.stored += 1;

        let is_swap = tx.swap.as_ref().map(|s| s.is_swap).unwrap_or(false);
        if !is_swap {
            return;
        }

        let swap_key = format!("swaps:{}", tx.hash);
        if let Err(err) = self.cache.set_with_ttl(&swap_key, &body, self.ttl_secs).await {
            self.counters.cache_errors += 1;
            warn!(?err, key = %swap_key, "swap write dropped");
            return;
        }

        let hash_str = tx.hash.to_string();
        if let Err(err) = self.cache.list_push_left(SWAP_QUEUE_KEY, &hash_str).await {
            self.counters.cache_errors += 1;
            warn!(?err, "swap queue push dropped");
            return;
        }
        if let Err(err) = self
            .cache
            .list_trim(SWAP_QUEUE_KEY, 0, self.swap_queue_max as isize - 1)
            .await
        {
            self.counters.cache_errors += 1;
            warn!(?err, "swap queue trim dropped");
        }
        self.counters.swaps += 1;
        if let Some(metrics) = &self.metrics {
            metrics.swaps_stored.inc();
        }
    }

    /// Belt-and-braces cleanup: the store expires keys by TTL on its own,
    /// but a key written without an expiry would otherwise live forever.
    async fn sweep_expired(&mut self) {
        let keys = match self.cache.keys_by_prefix("").await {
            Ok(keys) => keys,
            Err(err) => {
                debug!(?err, "sweep skipped; cache unavailable");
                return;
            }
        };

        let mut removed = 0u64;
        for key in keys {
            let ttl = match self.cache.ttl(&key).await {
                Ok(ttl) => ttl,
                Err(_) => continue,
            };
            if ttl <= 0 && self.cache.delete(&key).await.is_ok() {
                removed += 1;
            }
        }
        if removed > 0 {
            info!(removed, "swept expired cache entries");
        }
    }

    fn log_summary(&mut self) {
        let delta = self.counters.delta(&self.last_summary);
        self.last_summary = self.counters;
        info!(
            hashes = delta.hashes_seen,
            dedupe_dropped = delta.dedupe_dropped,
            tx_missing = delta.tx_missing,
            stored = delta.stored,
            decoded = delta.decoded,
            swaps = delta.swaps,
            decode_failures = delta.decode_failures,
            cache_errors = delta.cache_errors,
            slow = delta.slow,
            dedupe_size = self.dedupe.len(),
            "ingestor summary (last 30s)"
        );
    }

    /// Newest-first swaps from the shared queue. Cache trouble degrades to
    /// an empty answer.
    pub async fn get_pending_swaps(&mut self, n: usize) -> Vec<EnrichedTx> {
        if n == 0 {
            return Vec::new();
        }
        let stop = n.saturating_sub(1) as isize;
        let hashes = match self.cache.list_range(SWAP_QUEUE_KEY, 0, stop).await {
            Ok(hashes) => hashes,
            Err(err) => {
                debug!(?err, "swap queue read failed");
                return Vec::new();
            }
        };

        let mut swaps = Vec::with_capacity(hashes.len());
        for hash in hashes {
            let key = format!("swaps:{hash}");
            match self.cache.get(&key).await {
                Ok(Some(body)) => match serde_json::from_str::<EnrichedTx>(&body) {
                    Ok(tx) => swaps.push(tx),
                    Err(err) => debug!(?err, %key, "swap record failed to parse"),
                },
                Ok(None) => {} // expired between queue read and lookup
                Err(err) => {
                    debug!(?err, %key, "swap record read failed");
                    return swaps;
                }
            }
        }
        swaps
    }
}

/// Swap metadata for a transaction aimed at a known router; `None` for
/// everything else, including contract creations (no recipient at all).
fn decode_router_swap(
    routers: &HashSet<Address>,
    tx: &EnrichedTx,
) -> anyhow::Result<Option<DecodedSwap>> {
    let Some(to) = tx.to else {
        return Ok(None);
    };
    if !routers.contains(&to) {
        return Ok(None);
    }
    decode_swap_calldata(to, &tx.input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{address, Bytes, U256};
    use alloy::sol_types::SolCall;
    use glacier_dex::abi::IAvaxV2Router;

    const ROUTER: Address = address!("0x60aE616a2155Ee3d9A68541Ba4544862310933d4");
    const WAVAX: Address = address!("0xB31f66AA3C1e785363F0875A1B74E27b85FD66c7");
    const USDC: Address = address!("0xB97EF9Ef8734C71904D8002F8b6Bc66Dd9c48a6E");

    fn pending_tx(to: Option<Address>, input: Bytes) -> EnrichedTx {
        EnrichedTx {
            hash: B256::repeat_byte(0xaa),
            from: address!("0x1000000000000000000000000000000000000001"),
            to,
            value: U256::ZERO,
            gas_limit: 200_000,
            gas_price: Some(25_000_000_000),
            max_fee_per_gas: None,
            max_priority_fee_per_gas: None,
            nonce: 7,
            input,
            first_seen_ms: 0,
            block_number: None,
            swap: None,
        }
    }

    fn swap_input() -> Bytes {
        IAvaxV2Router::swapExactTokensForTokensCall {
            amountIn: U256::from(10u128.pow(18)),
            amountOutMin: U256::ZERO,
            path: vec![WAVAX, USDC],
            to: address!("0x3000000000000000000000000000000000000003"),
            deadline: U256::from(1_700_000_000u64),
        }
        .abi_encode()
        .into()
    }

    fn routers() -> HashSet<Address> {
        let mut set = HashSet::new();
        set.insert(ROUTER);
        set
    }

    #[test]
    fn router_swap_is_decoded() {
        let tx = pending_tx(Some(ROUTER), swap_input());
        let swap = decode_router_swap(&routers(), &tx).unwrap().unwrap();
        assert!(swap.is_swap);
        assert_eq!(swap.token_in, WAVAX);
        assert_eq!(swap.token_out, USDC);
        assert_eq!(swap.amount_in, Some(U256::from(10u128.pow(18))));
        assert_eq!(swap.path, vec![WAVAX, USDC]);
    }

    #[test]
    fn contract_creation_tx_stays_undecoded() {
        let tx = pending_tx(None, swap_input());
        assert!(decode_router_swap(&routers(), &tx).unwrap().is_none());
    }

    #[test]
    fn non_router_recipient_stays_undecoded() {
        let tx = pending_tx(Some(USDC), swap_input());
        assert!(decode_router_swap(&routers(), &tx).unwrap().is_none());
    }

    #[test]
    fn malformed_router_calldata_errors_for_the_caller_to_swallow() {
        let mut bad = IAvaxV2Router::swapExactTokensForTokensCall::SELECTOR.to_vec();
        bad.extend_from_slice(&[0u8; 3]);
        let tx = pending_tx(Some(ROUTER), bad.into());
        assert!(decode_router_swap(&routers(), &tx).is_err());
    }
}
