pub mod ingestor;
pub mod metrics;

pub use ingestor::MempoolIngestor;
pub use metrics::IngestorMetrics;
