//! Engine health probing

use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Bound on a single health probe.
pub const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// A single yes/no question to the engine: are you serving?
///
/// Implementations must never panic or hang past their own timeout; any
/// failure is an unhealthy answer.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn probe(&self) -> bool;
}

/// Probes `GET {upstream}/health`; healthy means HTTP 200.
pub struct HttpHealthProbe {
    client: reqwest::Client,
    url: String,
}

impl HttpHealthProbe {
    pub fn new(upstream_url: &str) -> reqwest::Result<Self> {
        Self::with_timeout(upstream_url, HEALTH_CHECK_TIMEOUT)
    }

    pub fn with_timeout(upstream_url: &str, timeout: Duration) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            url: format!("{}/health", upstream_url.trim_end_matches('/')),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn probe(&self) -> bool {
        match self.client.get(&self.url).send().await {
            Ok(resp) => resp.status() == reqwest::StatusCode::OK,
            Err(e) => {
                debug!(url = %self.url, error = %e, "health probe failed");
                false
            }
        }
    }
}
