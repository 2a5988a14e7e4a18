//! Endpoint selection by measured responsiveness.

use std::sync::Arc;
use std::time::Duration;

use crate::catalog::{Catalog, Endpoint};
use crate::probe::{PayloadSize, ProbeConfig, Prober, Sample, Transport};

/// Timeout for the lightweight selection probe.
const SELECT_TIMEOUT: Duration = Duration::from_millis(1000);

/// Probe every catalog endpoint once, concurrently, and return the fastest
/// responder. Waits for all probes to finish before ranking. Falls back to
/// the catalog's first entry when nothing answers.
///
/// Panics if the catalog is empty.
pub async fn select_nearest(catalog: &Catalog, prober: Arc<dyn Prober>) -> Endpoint {
    // Metadata-only exchange regardless of the session's configured transport.
    let config = ProbeConfig {
        payload_size: PayloadSize::Small,
        transport: Transport::RequestResponse,
    };

    let handles: Vec<_> = catalog
        .entries()
        .iter()
        .cloned()
        .map(|endpoint| {
            let prober = prober.clone();
            tokio::spawn(async move {
                let latency = match prober.probe(&endpoint, config, SELECT_TIMEOUT).await {
                    Sample::Latency(ms) => ms,
                    // An endpoint that errors or times out ranks last.
                    Sample::Failed => f64::INFINITY,
                };
                (endpoint, latency)
            })
        })
        .collect();

    let mut best: Option<(Endpoint, f64)> = None;
    for handle in handles {
        let Ok((endpoint, latency)) = handle.await else {
            continue;
        };
        match &best {
            Some((_, current)) if latency >= *current => {}
            _ => best = Some((endpoint, latency)),
        }
    }

    match best {
        Some((endpoint, latency)) if latency.is_finite() => {
            tracing::info!("selected endpoint {} at {:.1} ms", endpoint.id, latency);
            endpoint
        }
        _ => {
            tracing::warn!("no endpoint answered the selection probe, falling back to first entry");
            catalog.entries()[0].clone()
        }
    }
}
