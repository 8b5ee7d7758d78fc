use std::time::Duration;

/// Resubscription policy for the WS streams. The mempool stage runs a fixed
/// delay (base == max); exponential growth only kicks in when configured
/// with a larger max.
#[derive(Debug, Clone, Copy)]
pub struct ReconnectConfig {
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl ReconnectConfig {
    pub fn fixed(delay_ms: u64) -> Self {
        Self {
            base_delay: Duration::from_millis(delay_ms),
            max_delay: Duration::from_millis(delay_ms),
        }
    }

    pub fn new(base_ms: u64, max_ms: u64) -> Self {
        Self {
            base_delay: Duration::from_millis(base_ms),
            max_delay: Duration::from_millis(max_ms.max(base_ms)),
        }
    }
}

pub fn next_backoff(current: Duration, max: Duration) -> Duration {
    let next_ms = current.as_millis().saturating_mul(2) as u64;
    let max_ms = max.as_millis() as u64;
    Duration::from_millis(next_ms.min(max_ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_policy_never_grows() {
        let cfg = ReconnectConfig::fixed(5_000);
        let next = next_backoff(cfg.base_delay, cfg.max_delay);
        assert_eq!(next, Duration::from_millis(5_000));
    }

    #[test]
    fn backoff_doubles_up_to_max() {
        let cfg = ReconnectConfig::new(500, 3_000);
        let a = next_backoff(cfg.base_delay, cfg.max_delay);
        let b = next_backoff(a, cfg.max_delay);
        let c = next_backoff(b, cfg.max_delay);
        assert_eq!(a, Duration::from_millis(1_000));
        assert_eq!(b, Duration::from_millis(2_000));
        assert_eq!(c, Duration::from_millis(3_000));
    }
}
