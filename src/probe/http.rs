//! HTTP probe implementation.

use std::time::Duration;

use async_trait::async_trait;
use rand::{distributions::Alphanumeric, Rng};
use tokio::time::Instant;

use super::{ProbeConfig, ProbeError, Prober, Sample, Transport};
use crate::catalog::Endpoint;

/// Bytes subtracted from the padded body to account for the JSON envelope.
const BODY_OVERHEAD_BYTES: usize = 20;

/// Probe executor backed by a shared HTTP client.
///
/// The client carries no global timeout; each probe sets its own, which
/// cancels the in-flight exchange when it fires.
pub struct HttpProber {
    client: reqwest::Client,
}

impl HttpProber {
    pub fn new() -> Result<Self, ProbeError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ProbeError::Network(e.to_string()))?;
        Ok(Self { client })
    }

    /// Run one exchange and return elapsed wall-clock milliseconds.
    ///
    /// For `RequestResponse` the clock stops at header receipt; for
    /// `StreamLike` it stops after the response body is fully drained.
    async fn run_exchange(
        &self,
        endpoint: &Endpoint,
        config: ProbeConfig,
        timeout: Duration,
    ) -> Result<f64, ProbeError> {
        let size = config.payload_size.bytes();

        let request = match config.transport {
            Transport::RequestResponse => self.client.head(&endpoint.url),
            Transport::StreamLike => self.client.post(&endpoint.url).json(&serde_json::json!({
                "data": padding(size.saturating_sub(BODY_OVERHEAD_BYTES)),
            })),
        };

        // The size parameter makes payload intent observable by the remote.
        let request = request
            .query(&[("size", size)])
            .header(reqwest::header::CACHE_CONTROL, "no-cache")
            .header(reqwest::header::PRAGMA, "no-cache")
            .timeout(timeout);

        let start = Instant::now();

        let response = request.send().await.map_err(|e| classify(e, timeout))?;

        if config.transport == Transport::StreamLike {
            response
                .bytes()
                .await
                .map_err(|e| classify(e, timeout))?;
        }

        Ok(start.elapsed().as_secs_f64() * 1000.0)
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn probe(&self, endpoint: &Endpoint, config: ProbeConfig, timeout: Duration) -> Sample {
        match self.run_exchange(endpoint, config, timeout).await {
            Ok(elapsed) => Sample::Latency(elapsed),
            Err(e) => {
                tracing::debug!("probe against {} failed: {}", endpoint.id, e);
                Sample::Failed
            }
        }
    }
}

fn classify(e: reqwest::Error, timeout: Duration) -> ProbeError {
    if e.is_timeout() {
        ProbeError::Timeout(timeout)
    } else {
        ProbeError::Network(e.to_string())
    }
}

/// Random alphanumeric fill so intermediaries cannot collapse the body.
fn padding(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}
