//! Probe module for latency measurement.
//!
//! A probe is one timed HTTP exchange against an endpoint. Its outcome is
//! always a [`Sample`]: failures are data that feed packet-loss statistics,
//! never errors that propagate to the session controller.

mod http;

pub use http::*;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::Endpoint;

/// Probe error types. Internal to the probe layer; callers only ever see
/// [`Sample::Failed`].
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),
    #[error("network error: {0}")]
    Network(String),
}

/// Simulated payload size attached to each probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadSize {
    Small,
    Medium,
    Large,
}

impl PayloadSize {
    /// Nominal payload size in bytes.
    pub fn bytes(self) -> usize {
        match self {
            PayloadSize::Small => 32,
            PayloadSize::Medium => 64,
            PayloadSize::Large => 1500,
        }
    }
}

/// How a probe exchanges data with the endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transport {
    /// Metadata-only exchange, timed to header receipt.
    RequestResponse,
    /// The request carries a payload-sized body and the response body is
    /// drained in full before the clock stops.
    StreamLike,
}

/// Per-session probe configuration. Chosen before a session starts and
/// immutable while it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeConfig {
    pub payload_size: PayloadSize,
    pub transport: Transport,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            payload_size: PayloadSize::Medium,
            transport: Transport::RequestResponse,
        }
    }
}

/// Outcome of one probe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Sample {
    /// Round-trip time in milliseconds.
    Latency(f64),
    /// The probe timed out or failed at the transport level.
    Failed,
}

impl Sample {
    pub fn latency_ms(self) -> Option<f64> {
        match self {
            Sample::Latency(ms) => Some(ms),
            Sample::Failed => None,
        }
    }

    pub fn is_failed(self) -> bool {
        matches!(self, Sample::Failed)
    }
}

/// A source of timed probes.
///
/// The session controller and the endpoint selector are written against
/// this seam so tests can substitute a scripted implementation.
#[async_trait]
pub trait Prober: Send + Sync {
    /// Execute one timed probe against `endpoint` under `config`, enforcing
    /// `timeout`. Never returns an error; failure is a [`Sample::Failed`].
    async fn probe(&self, endpoint: &Endpoint, config: ProbeConfig, timeout: Duration) -> Sample;
}
