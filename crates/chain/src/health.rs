use anyhow::Result;
use serde::Deserialize;
use std::time::Duration;

/// Outcome of probing the node's `/ext/health` endpoint. Maps onto process
/// exit codes 0/1/2 for scripted checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Unreachable,
    Unhealthy,
}

impl HealthStatus {
    pub fn exit_code(&self) -> i32 {
        match self {
            HealthStatus::Healthy => 0,
            HealthStatus::Unreachable => 1,
            HealthStatus::Unhealthy => 2,
        }
    }
}

#[derive(Debug, Deserialize)]
struct HealthEnvelope {
    result: HealthResult,
}

#[derive(Debug, Deserialize)]
struct HealthResult {
    healthy: bool,
}

pub async fn probe_health(url: &str, timeout: Duration) -> HealthStatus {
    match fetch_health(url, timeout).await {
        Ok(true) => HealthStatus::Healthy,
        Ok(false) => HealthStatus::Unhealthy,
        Err(_) => HealthStatus::Unreachable,
    }
}

async fn fetch_health(url: &str, timeout: Duration) -> Result<bool> {
    let client = reqwest::Client::builder().timeout(timeout).build()?;
    let envelope: HealthEnvelope = client.get(url).send().await?.json().await?;
    Ok(envelope.result.healthy)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_match_probe_contract() {
        assert_eq!(HealthStatus::Healthy.exit_code(), 0);
        assert_eq!(HealthStatus::Unreachable.exit_code(), 1);
        assert_eq!(HealthStatus::Unhealthy.exit_code(), 2);
    }

    #[tokio::test]
    async fn unreachable_endpoint_reports_unreachable() {
        // nothing listens on this port
        let status = probe_health(
            "http://127.0.0.1:59999/ext/health",
            Duration::from_millis(200),
        )
        .await;
        assert_eq!(status, HealthStatus::Unreachable);
    }
}
