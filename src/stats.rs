//! Session-level aggregation of raw probe samples.

use serde::{Deserialize, Serialize};

use crate::probe::Sample;

/// Aggregated statistics for one measurement session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    /// Mean round-trip time of successful probes, rounded to whole ms.
    pub latency_ms: u64,
    /// Mean absolute difference between consecutive successful probes,
    /// rounded to whole ms.
    pub jitter_ms: u64,
    /// Share of probes that failed, in percent, rounded to one decimal.
    pub packet_loss_pct: f64,
}

impl SessionStats {
    /// The zero-success invariant: nothing measurable, total loss.
    fn all_lost() -> Self {
        Self {
            latency_ms: 0,
            jitter_ms: 0,
            packet_loss_pct: 100.0,
        }
    }
}

/// Reduce an ordered sample sequence to session statistics.
///
/// Jitter is the mean absolute difference between temporally consecutive
/// successful samples. Failed samples are skipped when forming the pair
/// sequence, they never contribute a zero. Order matters: reordering the
/// input changes the jitter, not the latency or loss.
pub fn summarize(samples: &[Sample]) -> SessionStats {
    let successes: Vec<f64> = samples.iter().filter_map(|s| s.latency_ms()).collect();

    if successes.is_empty() {
        return SessionStats::all_lost();
    }

    let total = samples.len();
    let failed = total - successes.len();
    let packet_loss_pct = round1(100.0 * failed as f64 / total as f64);

    let latency_ms = (successes.iter().sum::<f64>() / successes.len() as f64).round() as u64;

    let jitter_ms = if successes.len() < 2 {
        0
    } else {
        let diff_sum: f64 = successes.windows(2).map(|w| (w[1] - w[0]).abs()).sum();
        (diff_sum / (successes.len() - 1) as f64).round() as u64
    };

    SessionStats {
        latency_ms,
        jitter_ms,
        packet_loss_pct,
    }
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}
