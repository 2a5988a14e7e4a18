//! Session controller: drives repeated probing and owns session state.
//!
//! One session is a `start` → (stop or duration expiry) cycle. The sampling
//! loop is strictly sequential, one probe in flight at a time, because the
//! jitter computation depends on the temporal order of samples. The loop is
//! the only writer of the sample buffer; observers receive snapshot copies
//! through a watch channel.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::catalog::{Catalog, Endpoint};
use crate::probe::{ProbeConfig, Prober, Sample};
use crate::stats::{summarize, SessionStats};

/// Pacing between probes in unbounded mode.
const PROBE_SPACING: Duration = Duration::from_millis(100);
/// Back-off after a failed probe in unbounded mode.
const FAILURE_BACKOFF: Duration = Duration::from_millis(500);
/// Trailing samples kept in the live snapshot for display.
const LIVE_WINDOW: usize = 20;

/// Bounds for a fixed-duration session, in seconds.
pub const MIN_DURATION_SECS: u64 = 1;
pub const MAX_DURATION_SECS: u64 = 9;

/// Engine error types. Every rejection is synchronous and leaves session
/// state untouched; nothing here aborts the process.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum EngineError {
    #[error("a session is already running")]
    AlreadyRunning,
    #[error("no session is running")]
    NotRunning,
    #[error("no endpoint selected")]
    NoEndpointSelected,
    #[error("unknown endpoint: {0}")]
    UnknownEndpoint(String),
    #[error("invalid policy: {0}")]
    InvalidPolicy(String),
}

/// How long a session keeps sampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SessionPolicy {
    /// Sample for a fixed number of seconds, then stop on its own.
    FixedDuration { seconds: u64 },
    /// Sample until `request_stop` is called.
    Unbounded,
}

impl SessionPolicy {
    fn validate(self) -> Result<(), EngineError> {
        if let SessionPolicy::FixedDuration { seconds } = self {
            if !(MIN_DURATION_SECS..=MAX_DURATION_SECS).contains(&seconds) {
                return Err(EngineError::InvalidPolicy(format!(
                    "duration must be between {} and {} seconds, got {}",
                    MIN_DURATION_SECS, MAX_DURATION_SECS, seconds
                )));
            }
        }
        Ok(())
    }
}

impl Default for SessionPolicy {
    fn default() -> Self {
        SessionPolicy::FixedDuration { seconds: 5 }
    }
}

/// Controller state visible to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Running,
    /// Idle, with the last session's result fresh for display.
    ResultReady,
}

/// One completed session in the in-memory history.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub time: DateTime<Utc>,
    pub stats: SessionStats,
}

/// Copy-on-publish snapshot for the display layer.
///
/// Readers never see the live sample buffer; each probe publishes a fresh
/// copy of these fields.
#[derive(Debug, Clone, Serialize)]
pub struct LiveSnapshot {
    pub state: SessionState,
    /// Latest single-probe latency; `None` before the first sample or after
    /// a failed probe.
    pub current_latency_ms: Option<f64>,
    pub sample_count: usize,
    /// Trailing window of recent samples; failed probes appear as `None`.
    pub recent: Vec<Option<f64>>,
    /// Final stats of the last completed session. Withheld while running.
    pub last_result: Option<SessionStats>,
    /// Number of completed sessions, equal to the history length.
    pub session_count: usize,
}

impl LiveSnapshot {
    fn idle() -> Self {
        Self {
            state: SessionState::Idle,
            current_latency_ms: None,
            sample_count: 0,
            recent: Vec::new(),
            last_result: None,
            session_count: 0,
        }
    }
}

struct EngineState {
    state: SessionState,
    selected: Option<Endpoint>,
    config: ProbeConfig,
    policy: SessionPolicy,
    history: Vec<HistoryEntry>,
    stop_tx: Option<watch::Sender<bool>>,
}

struct Inner {
    catalog: Catalog,
    prober: Arc<dyn Prober>,
    probe_timeout: Duration,
    state: Mutex<EngineState>,
    live_tx: watch::Sender<LiveSnapshot>,
}

/// The probing and aggregation engine.
///
/// Cheap to clone; all clones share one controller. `start` is single-flight:
/// at most one sampling loop exists at a time.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<Inner>,
}

impl Engine {
    pub fn new(catalog: Catalog, prober: Arc<dyn Prober>, probe_timeout: Duration) -> Self {
        let (live_tx, _) = watch::channel(LiveSnapshot::idle());
        Self {
            inner: Arc::new(Inner {
                catalog,
                prober,
                probe_timeout,
                state: Mutex::new(EngineState {
                    state: SessionState::Idle,
                    selected: None,
                    config: ProbeConfig::default(),
                    policy: SessionPolicy::default(),
                    history: Vec::new(),
                    stop_tx: None,
                }),
                live_tx,
            }),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.inner.catalog
    }

    /// Make the endpoint with the given id the active probe target.
    ///
    /// Takes effect for the next session; a running session keeps the
    /// endpoint it started with.
    pub fn select_endpoint(&self, id: &str) -> Result<Endpoint, EngineError> {
        let endpoint = self
            .inner
            .catalog
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::UnknownEndpoint(id.to_string()))?;
        let mut st = self.inner.state.lock().unwrap();
        st.selected = Some(endpoint.clone());
        Ok(endpoint)
    }

    pub fn selected_endpoint(&self) -> Option<Endpoint> {
        self.inner.state.lock().unwrap().selected.clone()
    }

    /// Re-run nearest-endpoint selection and make the winner active.
    pub async fn auto_select(&self) -> Endpoint {
        let endpoint =
            crate::selector::select_nearest(&self.inner.catalog, self.inner.prober.clone()).await;
        self.inner.state.lock().unwrap().selected = Some(endpoint.clone());
        endpoint
    }

    pub fn set_probe_config(&self, config: ProbeConfig) {
        self.inner.state.lock().unwrap().config = config;
    }

    pub fn probe_config(&self) -> ProbeConfig {
        self.inner.state.lock().unwrap().config
    }

    pub fn set_policy(&self, policy: SessionPolicy) -> Result<(), EngineError> {
        policy.validate()?;
        self.inner.state.lock().unwrap().policy = policy;
        Ok(())
    }

    pub fn policy(&self) -> SessionPolicy {
        self.inner.state.lock().unwrap().policy
    }

    pub fn state(&self) -> SessionState {
        self.inner.state.lock().unwrap().state
    }

    pub fn history(&self) -> Vec<HistoryEntry> {
        self.inner.state.lock().unwrap().history.clone()
    }

    pub fn session_count(&self) -> usize {
        self.inner.state.lock().unwrap().history.len()
    }

    /// Latest published snapshot.
    pub fn live(&self) -> LiveSnapshot {
        self.inner.live_tx.borrow().clone()
    }

    /// Subscribe to live snapshots, one per probe plus one at session end.
    pub fn subscribe(&self) -> watch::Receiver<LiveSnapshot> {
        self.inner.live_tx.subscribe()
    }

    /// Begin a session against the selected endpoint with the configured
    /// probe settings and policy.
    ///
    /// Rejected while a session is running or before an endpoint has been
    /// selected. Clears the sample buffer and the live-display fields, then
    /// spawns the sampling loop.
    pub fn start(&self) -> Result<(), EngineError> {
        let mut st = self.inner.state.lock().unwrap();
        if st.state == SessionState::Running {
            return Err(EngineError::AlreadyRunning);
        }
        let endpoint = st.selected.clone().ok_or(EngineError::NoEndpointSelected)?;

        let (stop_tx, stop_rx) = watch::channel(false);
        st.state = SessionState::Running;
        st.stop_tx = Some(stop_tx);
        let config = st.config;
        let policy = st.policy;
        let session_count = st.history.len();
        drop(st);

        self.inner.live_tx.send_replace(LiveSnapshot {
            state: SessionState::Running,
            current_latency_ms: None,
            sample_count: 0,
            recent: Vec::new(),
            last_result: None,
            session_count,
        });

        tracing::info!(
            "starting session against {} ({:?})",
            endpoint.id,
            policy
        );

        let inner = self.inner.clone();
        tokio::spawn(async move {
            run_session(inner, endpoint, config, policy, stop_rx).await;
        });
        Ok(())
    }

    /// Ask the running session to stop.
    ///
    /// Cooperative: the flag is observed between probes, so an in-flight
    /// probe always finishes (or hits its own timeout) first.
    pub fn request_stop(&self) -> Result<(), EngineError> {
        let st = self.inner.state.lock().unwrap();
        if st.state != SessionState::Running {
            return Err(EngineError::NotRunning);
        }
        if let Some(stop_tx) = &st.stop_tx {
            stop_tx.send_replace(true);
        }
        Ok(())
    }
}

/// The sampling loop. Exactly one runs at a time; it is the only writer of
/// the sample buffer and the live snapshot while the session lasts.
async fn run_session(
    inner: Arc<Inner>,
    endpoint: Endpoint,
    config: ProbeConfig,
    policy: SessionPolicy,
    stop_rx: watch::Receiver<bool>,
) {
    let started = Instant::now();
    let session_count = inner.state.lock().unwrap().history.len();
    let mut samples: Vec<Sample> = Vec::new();
    let mut recent: Vec<Option<f64>> = Vec::new();

    loop {
        // Cancellation is checked at loop top only; an in-flight probe is
        // never preempted beyond its own timeout.
        if *stop_rx.borrow() {
            break;
        }
        if let SessionPolicy::FixedDuration { seconds } = policy {
            if started.elapsed() >= Duration::from_secs(seconds) {
                break;
            }
        }

        let sample = inner
            .prober
            .probe(&endpoint, config, inner.probe_timeout)
            .await;
        samples.push(sample);

        if recent.len() == LIVE_WINDOW {
            recent.remove(0);
        }
        recent.push(sample.latency_ms());

        inner.live_tx.send_replace(LiveSnapshot {
            state: SessionState::Running,
            current_latency_ms: sample.latency_ms(),
            sample_count: samples.len(),
            recent: recent.clone(),
            last_result: None,
            session_count,
        });

        if policy == SessionPolicy::Unbounded {
            let delay = if sample.is_failed() {
                FAILURE_BACKOFF
            } else {
                PROBE_SPACING
            };
            tokio::time::sleep(delay).await;
        }
    }

    finish_session(&inner, samples, recent);
}

/// Close out a session: aggregate, append history, publish the final
/// snapshot. An empty buffer produces no history entry.
fn finish_session(inner: &Inner, samples: Vec<Sample>, recent: Vec<Option<f64>>) {
    let mut st = inner.state.lock().unwrap();
    st.stop_tx = None;

    if samples.is_empty() {
        st.state = SessionState::Idle;
        let session_count = st.history.len();
        drop(st);

        tracing::info!("session ended before any probe completed");
        inner.live_tx.send_replace(LiveSnapshot {
            state: SessionState::Idle,
            current_latency_ms: None,
            sample_count: 0,
            recent: Vec::new(),
            last_result: None,
            session_count,
        });
        return;
    }

    let stats = summarize(&samples);
    st.history.push(HistoryEntry {
        time: Utc::now(),
        stats,
    });
    st.state = SessionState::ResultReady;
    let session_count = st.history.len();
    drop(st);

    tracing::info!(
        "session complete: {} samples, latency {} ms, jitter {} ms, loss {:.1}%",
        samples.len(),
        stats.latency_ms,
        stats.jitter_ms,
        stats.packet_loss_pct
    );

    inner.live_tx.send_replace(LiveSnapshot {
        state: SessionState::ResultReady,
        current_latency_ms: None,
        sample_count: samples.len(),
        recent,
        last_result: Some(stats),
        session_count,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    /// Prober that takes `delay` per probe and answers from a fixed script,
    /// cycling when it runs out.
    struct ScriptedProber {
        script: Vec<Sample>,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl ScriptedProber {
        fn new(script: Vec<Sample>, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                script,
                delay,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Prober for ScriptedProber {
        async fn probe(
            &self,
            _endpoint: &Endpoint,
            _config: ProbeConfig,
            _timeout: Duration,
        ) -> Sample {
            let i = self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.script[i % self.script.len()]
        }
    }

    fn engine_with(script: Vec<Sample>, delay: Duration) -> Engine {
        let engine = Engine::new(
            Catalog::default(),
            ScriptedProber::new(script, delay),
            Duration::from_millis(1500),
        );
        engine.select_endpoint("cloudflare-us").unwrap();
        engine
    }

    async fn wait_until_settled(engine: &Engine) {
        let mut rx = engine.subscribe();
        loop {
            if rx.borrow_and_update().state != SessionState::Running {
                return;
            }
            rx.changed().await.unwrap();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_duration_session_produces_one_history_entry() {
        // Three 400ms probes fit in a one second session.
        let engine = engine_with(
            vec![
                Sample::Latency(20.0),
                Sample::Latency(24.0),
                Sample::Latency(22.0),
            ],
            Duration::from_millis(400),
        );
        engine
            .set_policy(SessionPolicy::FixedDuration { seconds: 1 })
            .unwrap();

        engine.start().unwrap();
        wait_until_settled(&engine).await;

        let history = engine.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].stats.latency_ms, 22);
        assert_eq!(history[0].stats.jitter_ms, 3);
        assert_eq!(history[0].stats.packet_loss_pct, 0.0);

        let live = engine.live();
        assert_eq!(live.state, SessionState::ResultReady);
        assert_eq!(live.sample_count, 3);
        assert_eq!(live.last_result, Some(history[0].stats));
        assert_eq!(live.session_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_before_first_sample_returns_to_idle() {
        let engine = engine_with(vec![Sample::Latency(10.0)], Duration::from_secs(60));
        engine.set_policy(SessionPolicy::Unbounded).unwrap();

        engine.start().unwrap();
        // The loop has not run yet; the stop flag wins at the first check.
        engine.request_stop().unwrap();
        wait_until_settled(&engine).await;

        assert_eq!(engine.state(), SessionState::Idle);
        assert!(engine.history().is_empty());
        assert_eq!(engine.live().session_count, 0);
        assert_eq!(engine.live().last_result, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbounded_session_runs_until_stopped() {
        let engine = engine_with(
            vec![Sample::Latency(30.0), Sample::Latency(34.0)],
            Duration::from_millis(10),
        );
        engine.set_policy(SessionPolicy::Unbounded).unwrap();

        engine.start().unwrap();

        let mut rx = engine.subscribe();
        loop {
            if rx.borrow_and_update().sample_count >= 5 {
                break;
            }
            rx.changed().await.unwrap();
        }
        engine.request_stop().unwrap();
        wait_until_settled(&engine).await;

        // A stop request never cancels the in-flight probe, so at most one
        // extra sample lands after it.
        let history = engine.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].stats.packet_loss_pct, 0.0);
        let live = engine.live();
        assert_eq!(live.state, SessionState::ResultReady);
        assert!(live.sample_count >= 5 && live.sample_count <= 6);
        assert_eq!(live.session_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_while_running_is_rejected() {
        let engine = engine_with(vec![Sample::Latency(10.0)], Duration::from_secs(60));
        engine.set_policy(SessionPolicy::Unbounded).unwrap();

        engine.start().unwrap();
        assert_eq!(engine.start(), Err(EngineError::AlreadyRunning));
        assert!(engine.history().is_empty());

        engine.request_stop().unwrap();
        wait_until_settled(&engine).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_clears_live_fields_from_previous_session() {
        let engine = engine_with(vec![Sample::Latency(20.0)], Duration::from_millis(100));
        engine
            .set_policy(SessionPolicy::FixedDuration { seconds: 1 })
            .unwrap();

        engine.start().unwrap();
        wait_until_settled(&engine).await;
        assert!(engine.live().last_result.is_some());

        engine.start().unwrap();
        let live = engine.live();
        assert_eq!(live.state, SessionState::Running);
        assert_eq!(live.sample_count, 0);
        assert_eq!(live.last_result, None);
        assert!(live.recent.is_empty());

        engine.request_stop().unwrap();
        wait_until_settled(&engine).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_samples_count_toward_loss() {
        let engine = engine_with(
            vec![
                Sample::Latency(20.0),
                Sample::Failed,
                Sample::Latency(24.0),
                Sample::Failed,
            ],
            Duration::from_millis(200),
        );
        engine
            .set_policy(SessionPolicy::FixedDuration { seconds: 1 })
            .unwrap();

        engine.start().unwrap();
        wait_until_settled(&engine).await;

        let history = engine.history();
        assert_eq!(history.len(), 1);
        // Five 200ms probes fit before the one second deadline passes:
        // 2 of the first 4 fail, the cycled 5th succeeds.
        assert_eq!(history[0].stats.packet_loss_pct, 40.0);
    }

    #[tokio::test]
    async fn test_start_without_endpoint_is_rejected() {
        let engine = Engine::new(
            Catalog::default(),
            ScriptedProber::new(vec![Sample::Latency(1.0)], Duration::ZERO),
            Duration::from_millis(1500),
        );
        assert_eq!(engine.start(), Err(EngineError::NoEndpointSelected));
        assert_eq!(engine.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_stop_when_idle_is_rejected() {
        let engine = engine_with(vec![Sample::Latency(1.0)], Duration::ZERO);
        assert_eq!(engine.request_stop(), Err(EngineError::NotRunning));
    }

    #[test]
    fn test_policy_duration_bounds() {
        assert!(SessionPolicy::FixedDuration { seconds: 0 }.validate().is_err());
        assert!(SessionPolicy::FixedDuration { seconds: 1 }.validate().is_ok());
        assert!(SessionPolicy::FixedDuration { seconds: 9 }.validate().is_ok());
        assert!(SessionPolicy::FixedDuration { seconds: 10 }.validate().is_err());
        assert!(SessionPolicy::Unbounded.validate().is_ok());
    }

    #[tokio::test]
    async fn test_auto_select_picks_a_catalog_entry() {
        let engine = Engine::new(
            Catalog::default(),
            ScriptedProber::new(vec![Sample::Latency(25.0)], Duration::ZERO),
            Duration::from_millis(1500),
        );
        let endpoint = engine.auto_select().await;
        assert!(engine.catalog().get(&endpoint.id).is_some());
        assert_eq!(engine.selected_endpoint().unwrap().id, endpoint.id);
    }

    #[test]
    fn test_select_unknown_endpoint_is_rejected() {
        let engine = Engine::new(
            Catalog::default(),
            ScriptedProber::new(vec![Sample::Failed], Duration::ZERO),
            Duration::from_millis(1500),
        );
        assert_eq!(
            engine.select_endpoint("nope"),
            Err(EngineError::UnknownEndpoint("nope".to_string()))
        );
    }
}
