use anyhow::Result;
use glacier_chain::ChannelMetrics;
use glacier_core::metrics::Metrics;
use prometheus::{IntCounter, Opts};
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use tracing::{info, warn};

pub struct IngestorMetrics {
    metrics: Metrics,
    pub pending: ChannelMetrics,
    pub dedup_hits: IntCounter,
    pub swaps_stored: IntCounter,
}

impl IngestorMetrics {
    pub fn new() -> Result<Self> {
        let metrics = Metrics::new();
        let registry = metrics.registry();
        let pending = ChannelMetrics::new(registry, "pending")?;
        let dedup_hits = IntCounter::with_opts(Opts::new(
            "glacier_mempool_dedup_hits_total",
            "Total duplicate tx hashes filtered by the dedup set",
        ))?;
        let swaps_stored = IntCounter::with_opts(Opts::new(
            "glacier_mempool_swaps_stored_total",
            "Total decoded swaps written to the cache",
        ))?;
        registry.register(Box::new(dedup_hits.clone()))?;
        registry.register(Box::new(swaps_stored.clone()))?;

        Ok(Self {
            metrics,
            pending,
            dedup_hits,
            swaps_stored,
        })
    }

    pub fn gather(&self) -> String {
        self.metrics.gather()
    }
}

pub fn spawn_metrics_server(bind: &str, metrics: Arc<IngestorMetrics>) -> Result<()> {
    let listener = TcpListener::bind(bind)?;
    let bind = bind.to_string();
    thread::spawn(move || {
        info!(%bind, "metrics server listening");
        for stream in listener.incoming() {
            match stream {
                Ok(stream) => {
                    if let Err(err) = handle_connection(stream, &metrics) {
                        warn!(?err, "metrics server connection failed");
                    }
                }
                Err(err) => {
                    warn!(?err, "metrics server accept failed");
                }
            }
        }
    });
    Ok(())
}

fn handle_connection(mut stream: TcpStream, metrics: &IngestorMetrics) -> Result<()> {
    let mut buffer = [0u8; 512];
    let _ = stream.read(&mut buffer);
    let body = metrics.gather();
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain; version=0.0.4\r\nContent-Length: {}\r\n\r\n{}",
        body.len(),
        body
    );
    stream.write_all(response.as_bytes())?;
    Ok(())
}
