//! Circuit breaker pattern implementation

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use bulwark_core::{Context, Result, Task, TaskError};

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Circuit is closed, requests pass through normally
    Closed,
    /// Circuit is open, requests are blocked
    Open,
    /// A single trial request is probing for recovery
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit
    pub failure_threshold: u32,

    /// Time to stay open before letting a trial request through
    #[serde(with = "humantime_serde")]
    pub open_duration: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_duration: Duration::from_secs(60),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.failure_threshold == 0 {
            return Err(TaskError::validation(
                "circuit breaker failure_threshold must be greater than zero",
            ));
        }
        if self.open_duration.is_zero() {
            return Err(TaskError::validation(
                "circuit breaker open_duration must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// Circuit breaker metrics
#[derive(Debug, Clone, Default)]
pub struct CircuitMetrics {
    /// Total number of requests that ran to an outcome
    pub total_requests: u64,
    /// Number of successful requests
    pub total_successes: u64,
    /// Number of failed requests
    pub total_failures: u64,
    /// Number of requests rejected due to open circuit
    pub total_rejected: u64,
    /// Current consecutive failures
    pub consecutive_failures: u32,
    /// Last failure time
    pub last_failure_time: Option<Instant>,
    /// Last success time
    pub last_success_time: Option<Instant>,
    /// Last state change time
    pub last_state_change: Option<Instant>,
}

/// How a call was let through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Admitted while closed
    Normal,
    /// The single trial call after the open period
    Trial,
}

/// How an admitted call ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
    /// Cancelled or dropped before producing an outcome
    Abandoned,
}

/// Thread-safe circuit breaker.
///
/// Clones share state, so one breaker can guard several task chains. Only
/// the bookkeeping is serialized; wrapped tasks run concurrently.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    config: Arc<CircuitBreakerConfig>,
    state: Arc<Mutex<CircuitBreakerState>>,
}

#[derive(Debug)]
struct CircuitBreakerState {
    state: CircuitState,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
    /// Bumped by `reset`; guards from an older generation cannot drive transitions
    generation: u64,
    metrics: CircuitMetrics,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given configuration
    pub fn new(config: CircuitBreakerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::closed(config))
    }

    /// Create with default configuration
    pub fn with_defaults() -> Self {
        Self::closed(CircuitBreakerConfig::default())
    }

    fn closed(config: CircuitBreakerConfig) -> Self {
        Self {
            config: Arc::new(config),
            state: Arc::new(Mutex::new(CircuitBreakerState {
                state: CircuitState::Closed,
                opened_at: None,
                trial_in_flight: false,
                generation: 0,
                metrics: CircuitMetrics::default(),
            })),
        }
    }

    pub fn builder() -> CircuitBreakerBuilder {
        CircuitBreakerBuilder::new()
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Get the current state.
    ///
    /// An open circuit whose open period has elapsed still reports
    /// [`CircuitState::Open`] until a call claims the trial.
    pub fn state(&self) -> CircuitState {
        self.state.lock().state
    }

    /// Get current metrics
    pub fn metrics(&self) -> CircuitMetrics {
        self.state.lock().metrics.clone()
    }

    /// Reset the circuit breaker to closed state
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.state = CircuitState::Closed;
        state.opened_at = None;
        state.trial_in_flight = false;
        state.generation += 1;
        state.metrics = CircuitMetrics::default();
        state.metrics.last_state_change = Some(Instant::now());
        log::info!("Circuit breaker reset");
    }

    /// Ask to run a call.
    ///
    /// The returned guard must be settled with [`CallGuard::success`] or
    /// [`CallGuard::failure`]; dropping it unsettled records the call as
    /// abandoned.
    pub fn try_enter(&self) -> Result<CallGuard> {
        let (admission, generation) = self.admit()?;
        Ok(CallGuard {
            breaker: self.clone(),
            admission,
            generation,
            settled: false,
        })
    }

    /// Run `task` once through the breaker
    pub async fn call(&self, task: &Task, ctx: Context) -> Result<()> {
        let guard = self.try_enter()?;
        let result = task.call(ctx).await;

        match &result {
            Ok(()) => guard.success(),
            // The caller gave up; says nothing about the inner task's health.
            Err(error) if error.is_cancelled() => drop(guard),
            Err(_) => guard.failure(),
        }

        result
    }

    /// Wrap `task` so every call goes through this breaker
    pub fn wrap(&self, task: &Task) -> Task {
        let breaker = self.clone();
        task.decorate(move |inner, ctx| {
            let breaker = breaker.clone();
            async move { breaker.call(&inner, ctx).await }
        })
    }

    fn admit(&self) -> Result<(Admission, u64)> {
        let mut state = self.state.lock();
        let generation = state.generation;

        match state.state {
            CircuitState::Closed => Ok((Admission::Normal, generation)),
            CircuitState::Open => {
                let elapsed = state
                    .opened_at
                    .map(|opened_at| opened_at.elapsed())
                    .unwrap_or(self.config.open_duration);

                if elapsed >= self.config.open_duration && !state.trial_in_flight {
                    self.transition_to_half_open(&mut state);
                    return Ok((Admission::Trial, generation));
                }

                state.metrics.total_rejected += 1;
                Err(TaskError::CircuitOpen {
                    retry_after: self.config.open_duration.saturating_sub(elapsed),
                })
            }
            CircuitState::HalfOpen => {
                state.metrics.total_rejected += 1;
                Err(TaskError::CircuitOpen {
                    retry_after: Duration::ZERO,
                })
            }
        }
    }

    fn record(&self, admission: Admission, generation: u64, outcome: Outcome) {
        let mut state = self.state.lock();
        let now = Instant::now();

        // A trial admitted before a reset is an ordinary call now.
        let admission = if generation == state.generation {
            admission
        } else {
            Admission::Normal
        };

        match outcome {
            Outcome::Success => {
                state.metrics.total_requests += 1;
                state.metrics.total_successes += 1;
                state.metrics.last_success_time = Some(now);
                state.metrics.consecutive_failures = 0;

                if admission == Admission::Trial {
                    self.transition_to_closed(&mut state);
                }
            }
            Outcome::Failure => {
                state.metrics.total_requests += 1;
                state.metrics.total_failures += 1;
                state.metrics.last_failure_time = Some(now);
                state.metrics.consecutive_failures += 1;

                match admission {
                    Admission::Trial => self.transition_to_open(&mut state),
                    Admission::Normal
                        if state.state == CircuitState::Closed
                            && state.metrics.consecutive_failures
                                >= self.config.failure_threshold =>
                    {
                        self.transition_to_open(&mut state)
                    }
                    Admission::Normal => {}
                }
            }
            Outcome::Abandoned => {
                if admission == Admission::Trial {
                    // Back to open with the original opened_at, so the next
                    // caller may run the trial straight away.
                    state.state = CircuitState::Open;
                    state.trial_in_flight = false;
                    state.metrics.last_state_change = Some(now);
                    log::debug!("Circuit breaker trial abandoned, circuit open");
                }
            }
        }
    }

    // Internal methods

    fn transition_to_open(&self, state: &mut CircuitBreakerState) {
        let now = Instant::now();
        state.state = CircuitState::Open;
        state.opened_at = Some(now);
        state.trial_in_flight = false;
        state.metrics.last_state_change = Some(now);
        log::warn!(
            "Circuit breaker opened after {} consecutive failures",
            state.metrics.consecutive_failures
        );
    }

    fn transition_to_closed(&self, state: &mut CircuitBreakerState) {
        state.state = CircuitState::Closed;
        state.opened_at = None;
        state.trial_in_flight = false;
        state.metrics.consecutive_failures = 0;
        state.metrics.last_state_change = Some(Instant::now());
        log::info!("Circuit breaker closed after successful recovery");
    }

    fn transition_to_half_open(&self, state: &mut CircuitBreakerState) {
        state.state = CircuitState::HalfOpen;
        state.trial_in_flight = true;
        state.metrics.last_state_change = Some(Instant::now());
        log::info!("Circuit breaker transitioned to half-open state");
    }
}

/// An admitted call that has not reported its outcome yet
#[derive(Debug)]
pub struct CallGuard {
    breaker: CircuitBreaker,
    admission: Admission,
    generation: u64,
    settled: bool,
}

impl CallGuard {
    pub fn admission(&self) -> Admission {
        self.admission
    }

    pub fn success(mut self) {
        self.settle(Outcome::Success);
    }

    pub fn failure(mut self) {
        self.settle(Outcome::Failure);
    }

    fn settle(&mut self, outcome: Outcome) {
        if !self.settled {
            self.settled = true;
            self.breaker.record(self.admission, self.generation, outcome);
        }
    }
}

impl Drop for CallGuard {
    fn drop(&mut self) {
        self.settle(Outcome::Abandoned);
    }
}

/// Builder for circuit breaker configuration
pub struct CircuitBreakerBuilder {
    config: CircuitBreakerConfig,
}

impl CircuitBreakerBuilder {
    /// Create a new builder with default config
    pub fn new() -> Self {
        Self {
            config: CircuitBreakerConfig::default(),
        }
    }

    /// Set failure threshold
    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.config.failure_threshold = threshold;
        self
    }

    /// Set how long the circuit stays open before a trial
    pub fn open_duration(mut self, open_duration: Duration) -> Self {
        self.config.open_duration = open_duration;
        self
    }

    /// Build the circuit breaker
    pub fn build(self) -> Result<CircuitBreaker> {
        CircuitBreaker::new(self.config)
    }
}

impl Default for CircuitBreakerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
