//! Health probes

use crate::errors::{Result, RouterError};
use crate::health::types::{ProbeFailureKind, ProbeOutcome};
use async_trait::async_trait;
use reqwest::Client;
use std::time::{Duration, Instant};

/// Issues one health probe against a URL
#[async_trait]
pub trait HealthProber: Send + Sync {
    async fn probe(&self, url: &str) -> ProbeOutcome;

    /// Deadline applied to each probe
    fn timeout(&self) -> Duration;
}

/// HTTP GET prober with a per-probe timeout
pub struct HttpProber {
    client: Client,
    timeout: Duration,
}

impl HttpProber {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(RouterError::Http)?;

        Ok(Self { client, timeout })
    }
}

#[async_trait]
impl HealthProber for HttpProber {
    async fn probe(&self, url: &str) -> ProbeOutcome {
        let started = Instant::now();
        let result = self.client.get(url).send().await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(response) => ProbeOutcome::Reachable {
                status_code: response.status().as_u16(),
                elapsed_ms,
            },
            Err(e) => ProbeOutcome::Failed {
                kind: if e.is_timeout() {
                    ProbeFailureKind::Timeout
                } else {
                    ProbeFailureKind::Connection
                },
                message: e.to_string(),
                elapsed_ms,
            },
        }
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }
}
