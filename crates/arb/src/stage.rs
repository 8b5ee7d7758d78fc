use crate::detector::{Detector, DetectorParams};
use crate::publish::{publish_opportunity, PublishOutcome};
use anyhow::Result;
use glacier_cache::CacheClient;
use glacier_chain::NodeClient;
use glacier_core::config::AppConfig;
use glacier_core::Registry;
use glacier_dex::ReserveView;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{info, warn};

const SUMMARY_INTERVAL_MS: u64 = 30_000;

#[derive(Default, Clone, Copy)]
struct Counters {
    refreshes: u64,
    ticks: u64,
    found: u64,
    written: u64,
    suppressed: u64,
    cache_errors: u64,
}

impl Counters {
    fn delta(&self, previous: &Counters) -> Counters {
        Counters {
            refreshes: self.refreshes.saturating_sub(previous.refreshes),
            ticks: self.ticks.saturating_sub(previous.ticks),
            found: self.found.saturating_sub(previous.found),
            written: self.written.saturating_sub(previous.written),
            suppressed: self.suppressed.saturating_sub(previous.suppressed),
            cache_errors: self.cache_errors.saturating_sub(previous.cache_errors),
        }
    }
}

/// Pipeline stage two: reserve refresh plus the detection tick, publishing
/// gated opportunities to the cache. Reserve records live in this process;
/// the cache copies are advisory mirrors for the other stages.
pub struct ArbStage {
    cache: CacheClient,
    view: ReserveView,
    detector: Detector,
    refresh_interval_ms: u64,
    detect_interval_ms: u64,
    publish_profit_percent: f64,
    hysteresis_pp: f64,
    opportunity_ttl_secs: u64,
    counters: Counters,
    last_summary: Counters,
}

impl ArbStage {
    pub async fn new(cfg: &AppConfig, registry: Registry) -> Result<Self> {
        let network = cfg.chain.selected()?;
        let chain = NodeClient::connect(network).await?;
        let cache = CacheClient::connect(&cfg.cache.url, &cfg.cache.key_prefix).await?;
        let view = ReserveView::new(chain.http.clone(), registry, cfg.mev.reserves_ttl_secs);
        let detector = Detector::new(DetectorParams {
            gas_units: cfg.mev.default_gas_limit,
            gas_price_gwei: cfg.mev.gas_price_gwei,
            min_profit_percent: cfg.mev.min_profit_percent,
        });

        Ok(Self {
            cache,
            view,
            detector,
            refresh_interval_ms: cfg.mev.refresh_interval_ms,
            detect_interval_ms: cfg.mev.detect_interval_ms,
            publish_profit_percent: cfg.mev.publish_profit_percent,
            hysteresis_pp: cfg.mev.hysteresis_pp,
            opportunity_ttl_secs: cfg.mev.opportunity_ttl_secs,
            counters: Counters::default(),
            last_summary: Counters::default(),
        })
    }

    pub async fn run(&mut self) -> Result<()> {
        let discovered = self.view.discover().await?;
        if discovered == 0 {
            warn!("no pairs discovered; detector will idle");
        }

        let mut refresh = interval(Duration::from_millis(self.refresh_interval_ms.max(1)));
        refresh.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut detect = interval(Duration::from_millis(self.detect_interval_ms.max(1)));
        detect.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut summary = interval(Duration::from_millis(SUMMARY_INTERVAL_MS));
        summary.set_missed_tick_behavior(MissedTickBehavior::Delay);
        summary.tick().await;

        info!("arbitrage detector started");
        loop {
            tokio::select! {
                _ = refresh.tick() => {
                    self.counters.refreshes += 1;
                    self.view.refresh(&mut self.cache).await;
                }
                _ = detect.tick() => {
                    self.detect_once().await;
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
        Ok(())
    }

    async fn detect_once(&mut self) {
        self.counters.ticks += 1;
        let snapshot = self.view.snapshot();
        let opportunities = self.detector.scan(self.view.registry(), &snapshot);
        self.counters.found += opportunities.len() as u64;

        for opp in &opportunities {
            let outcome = publish_opportunity(
                &mut self.cache,
                self.view.registry(),
                opp,
                self.publish_profit_percent,
                self.hysteresis_pp,
                self.opportunity_ttl_secs,
            )
            .await;
            match outcome {
                PublishOutcome::Written => {
                    self.counters.written += 1;
                    info!(
                        buy = %opp.buy_venue,
                        sell = %opp.sell_venue,
                        profit_pct = format!("{:.3}", opp.profit_percent),
                        min_trade = opp.min_trade,
                        max_trade = opp.max_trade,
                        "opportunity published"
                    );
                }
                PublishOutcome::Suppressed => self.counters.suppressed += 1,
                PublishOutcome::BelowThreshold => {}
                PublishOutcome::CacheDown => self.counters.cache_errors += 1,
            }
        }
    }

    fn log_summary(&mut self) {
        let delta = self.counters.delta(&self.last_summary);
        self.last_summary = self.counters;
        info!(
            refreshes = delta.refreshes,
            ticks = delta.ticks,
            found = delta.found,
            written = delta.written,
            suppressed = delta.suppressed,
            cache_errors = delta.cache_errors,
            "detector summary (last 30s)"
        );
    }
}
