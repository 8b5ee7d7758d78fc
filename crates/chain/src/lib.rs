pub mod channel;
pub mod client;
pub mod fetcher;
pub mod health;
pub mod metrics;
pub mod pending;
pub mod reconnect;

pub use channel::TrackedReceiver;
pub use client::NodeClient;
pub use fetcher::TxFetcher;
pub use health::{probe_health, HealthStatus};
pub use metrics::ChannelMetrics;
pub use pending::PendingTxStream;
pub use reconnect::ReconnectConfig;
