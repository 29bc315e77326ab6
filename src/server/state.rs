use crate::{config::Config, error::Result, proxy::OriginFetcher};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<Config>,
    /// Outbound client plus the default header bundle
    pub fetcher: OriginFetcher,
    /// Process start, for the health endpoint
    pub started_at: Instant,
    /// Prometheus render handle, absent if no recorder could be installed
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Create a new AppState with the given configuration
    pub fn new(config: Config, metrics: Option<PrometheusHandle>) -> Result<Self> {
        let client =
            OriginFetcher::build_client(Duration::from_secs(config.connect_timeout_secs))?;
        let fetcher = OriginFetcher::new(client, Arc::new(config.default_headers.clone()));

        Ok(Self {
            config: Arc::new(config),
            fetcher,
            started_at: Instant::now(),
            metrics,
        })
    }
}
