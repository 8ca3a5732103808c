//! Named circuit breakers guarding provider calls
//!
//! Every breaker is a small state machine (closed, open, half-open) kept
//! behind its own mutex, so callers hitting different names never contend.
//! The registry hands out the same breaker for a name for its whole life.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::error::{AdvisorError, Result};

/// Latency samples kept per breaker for percentile stats
const LATENCY_SAMPLES: usize = 100;

/// Breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BreakerStatus {
    /// Calls flow normally
    Closed,
    /// Calls are rejected without touching the operation
    Open,
    /// One trial call decides whether to close again
    HalfOpen,
}

impl BreakerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakerStatus::Closed => "closed",
            BreakerStatus::Open => "open",
            BreakerStatus::HalfOpen => "half-open",
        }
    }

    /// Gauge encoding: 0 closed, 1 open, 0.5 half-open
    pub fn gauge_value(&self) -> f64 {
        match self {
            BreakerStatus::Closed => 0.0,
            BreakerStatus::Open => 1.0,
            BreakerStatus::HalfOpen => 0.5,
        }
    }
}

/// Thresholds for one breaker
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BreakerOptions {
    /// Per-call time limit; exceeding it counts as a failure
    pub timeout: Duration,
    /// Failure percentage over the window that trips the breaker
    pub error_threshold_percentage: f64,
    /// How long to stay open before allowing a trial call
    pub reset_timeout: Duration,
    /// Minimum outcomes in the window before the ratio is considered
    pub volume_threshold: usize,
    /// Number of most recent outcomes the ratio is computed over
    pub window_size: usize,
}

impl Default for BreakerOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(10_000),
            error_threshold_percentage: 50.0,
            reset_timeout: Duration::from_millis(30_000),
            volume_threshold: 5,
            window_size: 20,
        }
    }
}

/// Snapshot of one breaker
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CircuitBreakerState {
    pub status: BreakerStatus,
    pub failures: usize,
    pub successes: usize,
    pub last_transition_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakerStats {
    pub state: BreakerStatus,
    pub failures: usize,
    pub successes: usize,
    pub rejections: u64,
    pub fallbacks: u64,
    pub timeouts: u64,
    pub latency_mean_ms: f64,
    pub latency_p95_ms: u64,
    pub latency_p99_ms: u64,
    pub last_transition_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerEventKind {
    Opened,
    HalfOpen,
    Closed,
    Fallback,
    Timeout,
}

impl BreakerEventKind {
    /// The state this event moves the breaker into, if it is a transition
    pub fn status(&self) -> Option<BreakerStatus> {
        match self {
            BreakerEventKind::Opened => Some(BreakerStatus::Open),
            BreakerEventKind::HalfOpen => Some(BreakerStatus::HalfOpen),
            BreakerEventKind::Closed => Some(BreakerStatus::Closed),
            BreakerEventKind::Fallback | BreakerEventKind::Timeout => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakerEvent {
    pub name: String,
    pub kind: BreakerEventKind,
}

/// Callback notified of breaker events; must not block
pub type BreakerObserver = Arc<dyn Fn(&BreakerEvent) + Send + Sync>;

type Observers = Arc<RwLock<Vec<BreakerObserver>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Normal,
    Trial,
    Rejected,
}

#[derive(Debug)]
struct BreakerInner {
    status: BreakerStatus,
    /// Most recent outcomes, `true` for success
    window: VecDeque<bool>,
    latencies: VecDeque<u64>,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
    last_transition_at: DateTime<Utc>,
    rejections: u64,
    fallbacks: u64,
    timeouts: u64,
}

impl BreakerInner {
    fn new() -> Self {
        Self {
            status: BreakerStatus::Closed,
            window: VecDeque::new(),
            latencies: VecDeque::new(),
            opened_at: None,
            trial_in_flight: false,
            last_transition_at: Utc::now(),
            rejections: 0,
            fallbacks: 0,
            timeouts: 0,
        }
    }

    fn failures(&self) -> usize {
        self.window.iter().filter(|ok| !**ok).count()
    }

    fn successes(&self) -> usize {
        self.window.iter().filter(|ok| **ok).count()
    }

    /// Move open to half-open once the reset timeout has passed
    fn refresh(&mut self, options: &BreakerOptions, events: &mut Vec<BreakerEventKind>) {
        if self.status != BreakerStatus::Open {
            return;
        }
        if let Some(opened_at) = self.opened_at {
            if opened_at.elapsed() >= options.reset_timeout {
                self.status = BreakerStatus::HalfOpen;
                self.trial_in_flight = false;
                self.last_transition_at = Utc::now();
                events.push(BreakerEventKind::HalfOpen);
            }
        }
    }

    fn open(&mut self, events: &mut Vec<BreakerEventKind>) {
        self.status = BreakerStatus::Open;
        self.opened_at = Some(Instant::now());
        self.trial_in_flight = false;
        self.last_transition_at = Utc::now();
        events.push(BreakerEventKind::Opened);
    }

    fn close(&mut self, events: &mut Vec<BreakerEventKind>) {
        self.status = BreakerStatus::Closed;
        self.window.clear();
        self.opened_at = None;
        self.trial_in_flight = false;
        self.last_transition_at = Utc::now();
        events.push(BreakerEventKind::Closed);
    }

    fn should_trip(&self, options: &BreakerOptions) -> bool {
        let volume = self.window.len();
        if volume == 0 || volume < options.volume_threshold {
            return false;
        }
        let failure_pct = self.failures() as f64 * 100.0 / volume as f64;
        failure_pct > options.error_threshold_percentage
    }
}

/// A single named breaker
pub struct CircuitBreaker {
    name: String,
    options: BreakerOptions,
    inner: Mutex<BreakerInner>,
    observers: Observers,
}

impl CircuitBreaker {
    fn new(name: &str, options: BreakerOptions, observers: Observers) -> Self {
        Self {
            name: name.to_string(),
            options,
            inner: Mutex::new(BreakerInner::new()),
            observers,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> &BreakerOptions {
        &self.options
    }

    /// Run an operation through the breaker
    pub async fn run<T, F, Fut>(&self, operation: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.execute(operation, None::<fn() -> T>).await
    }

    /// Like [`run`](Self::run), but answers with `fallback()` instead of a
    /// breaker-open error while the breaker rejects calls
    pub async fn run_or_else<T, F, Fut, G>(&self, operation: F, fallback: G) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
        G: FnOnce() -> T,
    {
        self.execute(operation, Some(fallback)).await
    }

    async fn execute<T, F, Fut, G>(&self, operation: F, fallback: Option<G>) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
        G: FnOnce() -> T,
    {
        let admission = self.admit();

        if admission == Admission::Rejected {
            return match fallback {
                Some(fallback) => {
                    self.with_inner(|inner, _| inner.fallbacks += 1);
                    self.emit(&[BreakerEventKind::Fallback]);
                    Ok(fallback())
                }
                None => Err(AdvisorError::BreakerOpen(self.name.clone())),
            };
        }

        let is_trial = admission == Admission::Trial;
        let mut guard = TrialGuard {
            breaker: self,
            armed: is_trial,
        };

        let started = Instant::now();
        let outcome = tokio::time::timeout(self.options.timeout, operation()).await;
        let elapsed = started.elapsed();
        guard.armed = false;

        match outcome {
            Ok(Ok(value)) => {
                self.record(true, is_trial, elapsed, false);
                Ok(value)
            }
            Ok(Err(err)) => {
                self.record(false, is_trial, elapsed, false);
                Err(err)
            }
            Err(_) => {
                self.record(false, is_trial, elapsed, true);
                Err(AdvisorError::Timeout {
                    name: self.name.clone(),
                    elapsed_ms: elapsed.as_millis() as u64,
                })
            }
        }
    }

    fn admit(&self) -> Admission {
        let (admission, events) = self.with_inner(|inner, events| {
            inner.refresh(&self.options, events);
            match inner.status {
                BreakerStatus::Closed => Admission::Normal,
                BreakerStatus::HalfOpen if !inner.trial_in_flight => {
                    inner.trial_in_flight = true;
                    Admission::Trial
                }
                _ => {
                    inner.rejections += 1;
                    Admission::Rejected
                }
            }
        });
        self.emit(&events);
        admission
    }

    fn record(&self, success: bool, is_trial: bool, elapsed: Duration, timed_out: bool) {
        let options = self.options;
        let (_, events) = self.with_inner(|inner, events| {
            inner.latencies.push_back(elapsed.as_millis() as u64);
            if inner.latencies.len() > LATENCY_SAMPLES {
                inner.latencies.pop_front();
            }
            if timed_out {
                inner.timeouts += 1;
                events.push(BreakerEventKind::Timeout);
            }

            match inner.status {
                BreakerStatus::HalfOpen if is_trial => {
                    if success {
                        inner.close(events);
                    } else {
                        inner.window.push_back(false);
                        inner.open(events);
                    }
                }
                BreakerStatus::Closed => {
                    inner.window.push_back(success);
                    while inner.window.len() > options.window_size.max(1) {
                        inner.window.pop_front();
                    }
                    if inner.should_trip(&options) {
                        inner.open(events);
                    }
                }
                // Outcomes of calls admitted before the last transition
                _ => {}
            }
        });
        self.emit(&events);
    }

    /// Current state, applying any pending open to half-open transition
    pub fn state(&self) -> CircuitBreakerState {
        let (state, events) = self.with_inner(|inner, events| {
            inner.refresh(&self.options, events);
            CircuitBreakerState {
                status: inner.status,
                failures: inner.failures(),
                successes: inner.successes(),
                last_transition_at: inner.last_transition_at,
            }
        });
        self.emit(&events);
        state
    }

    pub fn is_open(&self) -> bool {
        self.state().status == BreakerStatus::Open
    }

    pub fn stats(&self) -> BreakerStats {
        let state = self.state();
        let (stats, _) = self.with_inner(|inner, _| {
            let mut sorted: Vec<u64> = inner.latencies.iter().copied().collect();
            sorted.sort_unstable();
            let mean = if sorted.is_empty() {
                0.0
            } else {
                sorted.iter().sum::<u64>() as f64 / sorted.len() as f64
            };
            BreakerStats {
                state: state.status,
                failures: state.failures,
                successes: state.successes,
                rejections: inner.rejections,
                fallbacks: inner.fallbacks,
                timeouts: inner.timeouts,
                latency_mean_ms: mean,
                latency_p95_ms: percentile(&sorted, 95.0),
                latency_p99_ms: percentile(&sorted, 99.0),
                last_transition_at: state.last_transition_at,
            }
        });
        stats
    }

    fn release_trial(&self) {
        self.with_inner(|inner, _| inner.trial_in_flight = false);
    }

    fn with_inner<R>(
        &self,
        f: impl FnOnce(&mut BreakerInner, &mut Vec<BreakerEventKind>) -> R,
    ) -> (R, Vec<BreakerEventKind>) {
        let mut events = Vec::new();
        let mut inner = lock(&self.inner);
        let result = f(&mut inner, &mut events);
        (result, events)
    }

    /// Log and fan out events; called with the state lock released
    fn emit(&self, events: &[BreakerEventKind]) {
        if events.is_empty() {
            return;
        }
        let observers: Vec<BreakerObserver> = self
            .observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        for kind in events {
            match kind {
                BreakerEventKind::Opened => warn!("Circuit breaker \"{}\" opened", self.name),
                BreakerEventKind::HalfOpen => info!("Circuit breaker \"{}\" half-open", self.name),
                BreakerEventKind::Closed => info!("Circuit breaker \"{}\" closed", self.name),
                BreakerEventKind::Fallback => {
                    debug!("Circuit breaker \"{}\" fallback triggered", self.name)
                }
                BreakerEventKind::Timeout => warn!("Circuit breaker \"{}\" timeout", self.name),
            }

            let event = BreakerEvent {
                name: self.name.clone(),
                kind: *kind,
            };
            for observer in &observers {
                observer(&event);
            }
        }
    }
}

/// Frees the half-open trial slot if the trial future is dropped mid-flight
struct TrialGuard<'a> {
    breaker: &'a CircuitBreaker,
    armed: bool,
}

impl Drop for TrialGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.breaker.release_trial();
        }
    }
}

/// Nearest-rank percentile over sorted samples
fn percentile(sorted: &[u64], pct: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let rank = ((pct / 100.0) * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Process-wide set of breakers, keyed by logical name.
///
/// Create one at startup and share it; `get_or_create` is first-use-wins, so
/// options passed after a breaker exists are ignored.
pub struct BreakerRegistry {
    defaults: BreakerOptions,
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
    observers: Observers,
}

impl Default for BreakerRegistry {
    fn default() -> Self {
        Self::new(BreakerOptions::default())
    }
}

impl BreakerRegistry {
    pub fn new(defaults: BreakerOptions) -> Self {
        Self {
            defaults,
            breakers: RwLock::new(HashMap::new()),
            observers: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn defaults(&self) -> &BreakerOptions {
        &self.defaults
    }

    pub fn get_or_create(&self, name: &str, options: Option<BreakerOptions>) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.get(name) {
            return existing;
        }

        let mut breakers = self
            .breakers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        breakers
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!("Creating circuit breaker \"{}\"", name);
                Arc::new(CircuitBreaker::new(
                    name,
                    options.unwrap_or(self.defaults),
                    Arc::clone(&self.observers),
                ))
            })
            .clone()
    }

    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub async fn run<T, F, Fut>(&self, name: &str, operation: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.run_with_options(name, None, operation).await
    }

    /// Run through the breaker for `name`, creating it with `options` if this
    /// is its first use. Options are ignored once the breaker exists.
    pub async fn run_with_options<T, F, Fut>(
        &self,
        name: &str,
        options: Option<BreakerOptions>,
        operation: F,
    ) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.get_or_create(name, options).run(operation).await
    }

    pub async fn run_or_else<T, F, Fut, G>(&self, name: &str, operation: F, fallback: G) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
        G: FnOnce() -> T,
    {
        self.get_or_create(name, None)
            .run_or_else(operation, fallback)
            .await
    }

    pub fn state(&self, name: &str) -> Option<CircuitBreakerState> {
        self.get(name).map(|breaker| breaker.state())
    }

    pub fn is_open(&self, name: &str) -> bool {
        self.get(name).map_or(false, |breaker| breaker.is_open())
    }

    pub fn stats(&self, name: &str) -> Option<BreakerStats> {
        self.get(name).map(|breaker| breaker.stats())
    }

    pub fn all_stats(&self) -> BTreeMap<String, BreakerStats> {
        let breakers: Vec<Arc<CircuitBreaker>> = self
            .breakers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();

        breakers
            .into_iter()
            .map(|breaker| (breaker.name().to_string(), breaker.stats()))
            .collect()
    }

    /// Register an observer for every breaker, existing and future
    pub fn subscribe(&self, observer: BreakerObserver) {
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast_options() -> BreakerOptions {
        BreakerOptions {
            timeout: Duration::from_secs(5),
            error_threshold_percentage: 50.0,
            reset_timeout: Duration::from_millis(30),
            volume_threshold: 5,
            window_size: 20,
        }
    }

    async fn fail(breaker: &CircuitBreaker) {
        let _ = breaker
            .run(|| async { Err::<(), _>(AdvisorError::Network("down".to_string())) })
            .await;
    }

    async fn succeed(breaker: &CircuitBreaker) {
        let _ = breaker.run(|| async { Ok::<_, AdvisorError>(()) }).await;
    }

    #[tokio::test]
    async fn test_opens_after_volume_of_failures() {
        let registry = BreakerRegistry::new(fast_options());
        let breaker = registry.get_or_create("groq", None);

        for _ in 0..5 {
            fail(&breaker).await;
        }

        assert!(registry.is_open("groq"));
        let calls = AtomicUsize::new(0);
        let result = breaker
            .run(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, AdvisorError>(())
            })
            .await;

        assert!(matches!(result, Err(AdvisorError::BreakerOpen(ref name)) if name == "groq"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stays_closed_below_volume_threshold() {
        let registry = BreakerRegistry::new(fast_options());
        let breaker = registry.get_or_create("google", None);

        for _ in 0..4 {
            fail(&breaker).await;
        }

        let state = registry.state("google").unwrap();
        assert_eq!(state.status, BreakerStatus::Closed);
        assert_eq!(state.failures, 4);
    }

    #[tokio::test]
    async fn test_stays_closed_at_or_below_error_percentage() {
        let registry = BreakerRegistry::new(fast_options());
        let breaker = registry.get_or_create("hf", None);

        for _ in 0..3 {
            succeed(&breaker).await;
        }
        for _ in 0..3 {
            fail(&breaker).await;
        }

        // 3 of 6 is exactly 50%, which does not exceed the threshold
        assert!(!registry.is_open("hf"));
        fail(&breaker).await;
        assert!(registry.is_open("hf"));
    }

    #[tokio::test]
    async fn test_half_open_only_after_reset_timeout() {
        let registry = BreakerRegistry::new(fast_options());
        let breaker = registry.get_or_create("groq", None);
        for _ in 0..5 {
            fail(&breaker).await;
        }

        assert_eq!(breaker.state().status, BreakerStatus::Open);
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(breaker.state().status, BreakerStatus::HalfOpen);
    }

    #[tokio::test]
    async fn test_half_open_allows_exactly_one_trial() {
        let registry = BreakerRegistry::new(fast_options());
        let breaker = registry.get_or_create("groq", None);
        for _ in 0..5 {
            fail(&breaker).await;
        }
        tokio::time::sleep(Duration::from_millis(60)).await;

        let (started_tx, started_rx) = tokio::sync::oneshot::channel::<()>();
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let trial_breaker = Arc::clone(&breaker);
        let trial = tokio::spawn(async move {
            trial_breaker
                .run(move || async move {
                    let _ = started_tx.send(());
                    let _ = release_rx.await;
                    Ok::<_, AdvisorError>(1)
                })
                .await
        });

        started_rx.await.unwrap();
        let second = breaker.run(|| async { Ok::<_, AdvisorError>(2) }).await;
        assert!(matches!(second, Err(AdvisorError::BreakerOpen(_))));

        release_tx.send(()).unwrap();
        assert_eq!(trial.await.unwrap().unwrap(), 1);

        let state = breaker.state();
        assert_eq!(state.status, BreakerStatus::Closed);
        assert_eq!(state.failures, 0);
        assert_eq!(state.successes, 0);
    }

    #[tokio::test]
    async fn test_failed_trial_reopens() {
        let registry = BreakerRegistry::new(fast_options());
        let breaker = registry.get_or_create("groq", None);
        for _ in 0..5 {
            fail(&breaker).await;
        }
        tokio::time::sleep(Duration::from_millis(60)).await;

        fail(&breaker).await;
        assert_eq!(breaker.state().status, BreakerStatus::Open);
    }

    #[tokio::test]
    async fn test_dropped_trial_frees_slot() {
        let registry = BreakerRegistry::new(fast_options());
        let breaker = registry.get_or_create("groq", None);
        for _ in 0..5 {
            fail(&breaker).await;
        }
        tokio::time::sleep(Duration::from_millis(60)).await;

        let pending = breaker.run(|| std::future::pending::<Result<()>>());
        let _ = tokio::time::timeout(Duration::from_millis(10), pending).await;

        succeed(&breaker).await;
        assert_eq!(breaker.state().status, BreakerStatus::Closed);
    }

    #[tokio::test]
    async fn test_timeout_counts_as_failure() {
        let options = BreakerOptions {
            timeout: Duration::from_millis(10),
            ..fast_options()
        };
        let registry = BreakerRegistry::new(options);

        let result = registry
            .run("slow", || async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok::<_, AdvisorError>(())
            })
            .await;

        assert!(matches!(result, Err(AdvisorError::Timeout { .. })));
        let stats = registry.stats("slow").unwrap();
        assert_eq!(stats.timeouts, 1);
        assert_eq!(stats.failures, 1);
    }

    #[tokio::test]
    async fn test_first_use_options_win() {
        let registry = BreakerRegistry::new(fast_options());
        let strict = BreakerOptions {
            volume_threshold: 2,
            ..fast_options()
        };
        let down = || async { Err::<(), _>(AdvisorError::Network("down".to_string())) };

        let _ = registry.run_with_options("groq", Some(strict), down).await;
        let _ = registry.run_with_options("groq", None, down).await;
        assert!(registry.is_open("groq"));
        assert_eq!(registry.get("groq").unwrap().options().volume_threshold, 2);

        let lenient = BreakerOptions {
            volume_threshold: 50,
            ..fast_options()
        };
        let _ = registry.run_with_options("google", None, down).await;
        let _ = registry.run_with_options("google", Some(lenient), down).await;
        assert_eq!(registry.get("google").unwrap().options().volume_threshold, 5);
    }

    #[tokio::test]
    async fn test_fallback_when_open() {
        let registry = BreakerRegistry::new(fast_options());
        let breaker = registry.get_or_create("groq", None);
        for _ in 0..5 {
            fail(&breaker).await;
        }

        let value = registry
            .run_or_else("groq", || async { Ok::<_, AdvisorError>("live") }, || "cached")
            .await
            .unwrap();

        assert_eq!(value, "cached");
        assert_eq!(registry.stats("groq").unwrap().fallbacks, 1);
    }

    #[tokio::test]
    async fn test_observers_see_transitions() {
        let registry = BreakerRegistry::new(fast_options());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        registry.subscribe(Arc::new(move |event: &BreakerEvent| {
            sink.lock().unwrap().push(event.kind);
        }));

        let breaker = registry.get_or_create("groq", None);
        for _ in 0..5 {
            fail(&breaker).await;
        }
        tokio::time::sleep(Duration::from_millis(60)).await;
        succeed(&breaker).await;

        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![
                BreakerEventKind::Opened,
                BreakerEventKind::HalfOpen,
                BreakerEventKind::Closed
            ]
        );
    }

    #[test]
    fn test_same_name_same_instance() {
        let registry = BreakerRegistry::default();
        let custom = BreakerOptions {
            volume_threshold: 2,
            ..BreakerOptions::default()
        };

        let first = registry.get_or_create("groq", Some(custom));
        let second = registry.get_or_create("groq", None);

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.options().volume_threshold, 2);
    }

    #[test]
    fn test_unknown_breaker() {
        let registry = BreakerRegistry::default();
        assert!(registry.state("missing").is_none());
        assert!(!registry.is_open("missing"));
        assert!(registry.all_stats().is_empty());
    }

    #[test]
    fn test_percentile_nearest_rank() {
        let samples: Vec<u64> = (1..=100).collect();
        assert_eq!(percentile(&samples, 95.0), 95);
        assert_eq!(percentile(&samples, 99.0), 99);
        assert_eq!(percentile(&[7], 99.0), 7);
        assert_eq!(percentile(&[], 95.0), 0);
    }
}
