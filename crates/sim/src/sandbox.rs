use alloy::primitives::{Address, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use anyhow::{anyhow, Result};
use glacier_core::config::SimConfig;
use serde_json::json;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

const PORT_PROBE_LIMIT: u16 = 100;
const READY_POLL_INTERVAL: Duration = Duration::from_secs(1);
const POST_READY_SETTLE: Duration = Duration::from_secs(2);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Forked-EVM subprocess owned by one simulator. State between bundles is
/// disposable; `reset` repins the fork and is the only sanctioned way to
/// clean up balances, approvals, and pool drift left by a replay.
pub struct Sandbox {
    anvil_path: String,
    host: String,
    base_port: u16,
    accounts: u32,
    balance_native: u64,
    fork_block_offset: u64,
    startup_timeout: Duration,
    fork_url: String,
    child: Option<Child>,
    provider: Option<DynProvider>,
    port: u16,
    fork_block: u64,
}

impl Sandbox {
    pub fn new(cfg: &SimConfig, fork_url: String) -> Self {
        Self {
            anvil_path: cfg.anvil_path.clone(),
            host: cfg.host.clone(),
            base_port: cfg.base_port,
            accounts: cfg.accounts,
            balance_native: cfg.balance_native,
            fork_block_offset: cfg.fork_block_offset,
            startup_timeout: Duration::from_secs(cfg.startup_timeout_secs),
            fork_url,
            child: None,
            provider: None,
            port: 0,
            fork_block: 0,
        }
    }

    pub fn endpoint(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn fork_block(&self) -> u64 {
        self.fork_block
    }

    /// Launches the subprocess against `head - offset` and blocks until its
    /// RPC answers. Startup failure here is fatal to the simulator stage.
    pub async fn start(&mut self, head_block: u64) -> Result<()> {
        if self.child.is_some() {
            return Err(anyhow!("sandbox already running"));
        }

        let fork_block = head_block.saturating_sub(self.fork_block_offset);
        let port = find_available_port(&self.host, self.base_port)?;

        let child = Command::new(&self.anvil_path)
            .args(["--fork-url", &self.fork_url])
            .args(["--fork-block-number", &fork_block.to_string()])
            .args(["--port", &port.to_string()])
            .args(["--host", &self.host])
            .args(["--accounts", &self.accounts.to_string()])
            .args(["--balance", &self.balance_native.to_string()])
            .args(["--gas-limit", "30000000"])
            .args(["--gas-price", "0"])
            .args(["--base-fee", "0"])
            .arg("--auto-impersonate")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| anyhow!("failed to launch {}: {err}", self.anvil_path))?;

        self.child = Some(child);
        self.port = port;
        self.fork_block = fork_block;

        if let Err(err) = self.wait_ready().await {
            self.stop().await;
            return Err(err);
        }

        // freshly forked instances intermittently drop the first tx without
        // this settle window
        sleep(POST_READY_SETTLE).await;
        info!(port, fork_block, "sandbox ready");
        Ok(())
    }

    async fn wait_ready(&mut self) -> Result<()> {
        let endpoint = self.endpoint();
        let deadline = Instant::now() + self.startup_timeout;
        loop {
            if let Ok(provider) = ProviderBuilder::new().connect(&endpoint).await {
                let provider = provider.erased();
                if provider.get_block_number().await.is_ok() {
                    self.provider = Some(provider);
                    return Ok(());
                }
            }
            if Instant::now() >= deadline {
                return Err(anyhow!(
                    "sandbox not ready within {}s",
                    self.startup_timeout.as_secs()
                ));
            }
            sleep(READY_POLL_INTERVAL).await;
        }
    }

    /// Checks the subprocess, clearing the handle if it exited.
    pub fn is_alive(&mut self) -> bool {
        let Some(child) = self.child.as_mut() else {
            return false;
        };
        match child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                warn!(?status, "sandbox exited");
                self.child = None;
                self.provider = None;
                false
            }
            Err(err) => {
                warn!(?err, "sandbox status check failed");
                false
            }
        }
    }

    pub fn provider(&self) -> Result<&DynProvider> {
        self.provider
            .as_ref()
            .ok_or_else(|| anyhow!("sandbox not running"))
    }

    /// Repins the fork to `head - offset`. The administrative dialect wants
    /// the object-shaped forking params, not positional arguments.
    pub async fn reset(&mut self, head_block: u64) -> Result<()> {
        let fork_block = head_block.saturating_sub(self.fork_block_offset);
        let params = json!([{
            "forking": {
                "jsonRpcUrl": self.fork_url,
                "blockNumber": fork_block,
            }
        }]);
        let provider = self.provider()?;
        provider
            .raw_request::<_, serde_json::Value>("anvil_reset".into(), params)
            .await?;
        self.fork_block = fork_block;
        debug!(fork_block, "sandbox repinned");
        Ok(())
    }

    pub async fn set_balance(&self, account: Address, wei: U256) -> Result<()> {
        let provider = self.provider()?;
        provider
            .raw_request::<_, serde_json::Value>("anvil_setBalance".into(), (account, wei))
            .await?;
        Ok(())
    }

    /// Termination signal, then a bounded wait before abandoning the child.
    pub async fn stop(&mut self) {
        self.provider = None;
        let Some(mut child) = self.child.take() else {
            return;
        };
        if let Err(err) = child.start_kill() {
            warn!(?err, "sandbox kill failed");
            return;
        }
        match timeout(SHUTDOWN_GRACE, child.wait()).await {
            Ok(Ok(status)) => debug!(?status, "sandbox exited"),
            Ok(Err(err)) => warn!(?err, "sandbox wait failed"),
            Err(_) => warn!("sandbox did not exit in time; abandoning"),
        }
    }
}

/// Bind-and-release probe starting at the base port, incrementing past
/// collisions. Exhaustion is fatal; the simulator cannot run without a port.
fn find_available_port(host: &str, base_port: u16) -> Result<u16> {
    for offset in 0..PORT_PROBE_LIMIT {
        let Some(port) = base_port.checked_add(offset) else {
            break;
        };
        match std::net::TcpListener::bind((host, port)) {
            Ok(listener) => {
                drop(listener);
                return Ok(port);
            }
            Err(_) => continue,
        }
    }
    Err(anyhow!(
        "no available port in [{base_port}, {})",
        base_port as u32 + PORT_PROBE_LIMIT as u32
    ))
}

#[cfg(test)]
mod tests {
    use super::find_available_port;

    #[test]
    fn port_probe_skips_bound_ports() {
        let holder = std::net::TcpListener::bind(("127.0.0.1", 0)).unwrap();
        let held = holder.local_addr().unwrap().port();

        let picked = find_available_port("127.0.0.1", held).unwrap();
        assert!(picked > held);
    }

    #[test]
    fn port_probe_returns_base_when_free() {
        // grab any free port, release it, then probe from there
        let listener = std::net::TcpListener::bind(("127.0.0.1", 0)).unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let picked = find_available_port("127.0.0.1", port).unwrap();
        assert_eq!(picked, port);
    }
}
