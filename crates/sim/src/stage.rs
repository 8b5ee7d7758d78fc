use crate::bundle::build_cycle_bundle;
use crate::simulator::BundleSimulator;
use anyhow::Result;
use glacier_arb::get_current_opportunities;
use glacier_cache::CacheClient;
use glacier_chain::NodeClient;
use glacier_core::config::AppConfig;
use glacier_core::utils::{from_units, now_secs};
use glacier_core::Registry;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{info, warn};

/// Pipeline stage three: pull the best published opportunity, replay it in
/// the sandbox, report locally, reset, repeat. Bundles run strictly one at
/// a time; the sandbox is reset between them.
pub struct SimStage {
    cache: CacheClient,
    registry: Registry,
    simulator: BundleSimulator,
    poll_interval_ms: u64,
    default_gas_limit: u64,
    trade_amount_native: f64,
    min_profit_wei: i128,
}

impl SimStage {
    pub async fn new(cfg: &AppConfig, registry: Registry) -> Result<Self> {
        let network = cfg.chain.selected()?;
        let chain = NodeClient::connect(network).await?;
        let cache = CacheClient::connect(&cfg.cache.url, &cfg.cache.key_prefix).await?;
        let simulator = BundleSimulator::new(chain, &cfg.sim, network.rpc_http.clone());

        Ok(Self {
            cache,
            registry,
            simulator,
            poll_interval_ms: cfg.mev.detect_interval_ms,
            default_gas_limit: cfg.mev.default_gas_limit,
            trade_amount_native: cfg.sim.trade_amount_native,
            min_profit_wei: i128::try_from(from_units(cfg.mev.min_profit_native, 18))
                .unwrap_or(i128::MAX),
        })
    }

    pub async fn run(&mut self) -> Result<()> {
        // sandbox startup failure is fatal to this stage and only this stage
        self.simulator.start().await?;

        let mut poll = interval(Duration::from_millis(self.poll_interval_ms.max(1)));
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("bundle simulator started");
        loop {
            tokio::select! {
                _ = poll.tick() => {
                    self.simulate_best().await;
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("shutdown signal received");
                    break;
                }
            }
        }

        self.simulator.stop().await;
        Ok(())
    }

    async fn simulate_best(&mut self) {
        let opportunities = get_current_opportunities(&mut self.cache).await;
        let Some(opp) = opportunities.first() else {
            return;
        };

        let trade_units = opp
            .max_trade
            .min(self.trade_amount_native)
            .max(opp.min_trade);
        let bundle = match build_cycle_bundle(
            &self.registry,
            opp,
            trade_units,
            self.trade_amount_native,
            self.default_gas_limit,
            self.simulator.account(),
            now_secs(),
        ) {
            Ok(bundle) => bundle,
            Err(err) => {
                // lazily-surfaced config mismatch rejects this opportunity only
                warn!(?err, buy = %opp.buy_venue, sell = %opp.sell_venue, "bundle build rejected");
                return;
            }
        };

        let result = self.simulator.simulate(&bundle).await;
        match serde_json::to_string(&result) {
            Ok(report) => info!(report = %report, description = %bundle.description, "simulation report"),
            Err(_) => info!(
                success = result.success,
                gas_used = result.gas_used,
                profit_wei = result.profit_wei,
                execution_ms = result.execution_ms,
                "simulation report"
            ),
        }
        if result.success && result.profit_wei >= self.min_profit_wei {
            info!(
                profit_wei = result.profit_wei,
                threshold_wei = self.min_profit_wei,
                "bundle clears the profit threshold"
            );
        }

        if let Err(err) = self.simulator.reset().await {
            warn!(?err, "sandbox reset failed; stale fork state may leak");
        }
    }
}
