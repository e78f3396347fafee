use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{info, warn};

use prfirm_core::error::{PrFirmError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Closed/Open/HalfOpen failure isolation for outbound calls.
///
/// `failure_threshold` consecutive failures open the circuit. While open,
/// every call is rejected until `open_duration` has passed; then exactly one
/// trial call is let through. The trial's verdict closes the circuit or
/// reopens it with a fresh timer.
pub struct CircuitBreaker {
    failure_threshold: u32,
    open_duration: Duration,
    inner: Mutex<BreakerInner>,
}

struct BreakerInner {
    state: CircuitState,
    failures: u32,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
}

impl BreakerInner {
    /// Open -> HalfOpen once the open period has elapsed.
    fn refresh(&mut self, open_duration: Duration, now: Instant) {
        if self.state == CircuitState::Open {
            let elapsed = self.opened_at.map(|t| now.duration_since(t));
            if elapsed.map_or(true, |e| e >= open_duration) {
                self.state = CircuitState::HalfOpen;
                self.trial_in_flight = false;
            }
        }
    }

    fn open(&mut self, now: Instant) {
        self.state = CircuitState::Open;
        self.opened_at = Some(now);
        self.trial_in_flight = false;
    }
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, open_duration: Duration) -> Self {
        Self {
            failure_threshold,
            open_duration,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failures: 0,
                opened_at: None,
                trial_in_flight: false,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Ask permission to make one call.
    ///
    /// The returned permit must be resolved with [`CallPermit::succeeded`] or
    /// [`CallPermit::failed`]. Dropping it undecided frees a half-open trial
    /// slot without changing the state.
    pub fn try_acquire(&self) -> Result<CallPermit<'_>> {
        let now = Instant::now();
        let mut inner = self.lock();
        inner.refresh(self.open_duration, now);

        match inner.state {
            CircuitState::Closed => Ok(CallPermit::new(self, false)),
            CircuitState::Open => {
                let retry_in = inner
                    .opened_at
                    .map(|t| self.open_duration.saturating_sub(now.duration_since(t)))
                    .unwrap_or_default();
                Err(PrFirmError::CircuitOpen {
                    retry_in_ms: retry_in.as_millis() as u64,
                })
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    // trial in flight; its verdict reopens or closes the circuit
                    return Err(PrFirmError::CircuitOpen { retry_in_ms: 0 });
                }
                inner.trial_in_flight = true;
                info!("Circuit half-open, allowing trial call");
                Ok(CallPermit::new(self, true))
            }
        }
    }

    pub fn state(&self) -> CircuitState {
        let mut inner = self.lock();
        inner.refresh(self.open_duration, Instant::now());
        inner.state
    }

    /// Consecutive failures counted while closed.
    pub fn failure_count(&self) -> u32 {
        self.lock().failures
    }

    fn record_success(&self, trial: bool) {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => inner.failures = 0,
            CircuitState::HalfOpen if trial => {
                inner.state = CircuitState::Closed;
                inner.failures = 0;
                inner.opened_at = None;
                inner.trial_in_flight = false;
                info!("Circuit closed after successful trial call");
            }
            // a call admitted before the circuit opened does not close it
            _ => {}
        }
    }

    fn record_failure(&self, trial: bool) {
        let now = Instant::now();
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.failures += 1;
                if inner.failures >= self.failure_threshold {
                    inner.open(now);
                    warn!(
                        failures = inner.failures,
                        open_secs = self.open_duration.as_secs(),
                        "Circuit opened"
                    );
                }
            }
            CircuitState::HalfOpen if trial => {
                inner.open(now);
                warn!(
                    open_secs = self.open_duration.as_secs(),
                    "Trial call failed, circuit reopened"
                );
            }
            _ => {}
        }
    }

    fn release_trial(&self) {
        let mut inner = self.lock();
        if inner.state == CircuitState::HalfOpen {
            inner.trial_in_flight = false;
        }
    }
}

/// Permission for one call through a [`CircuitBreaker`].
#[must_use = "a permit must be resolved with succeeded() or failed()"]
pub struct CallPermit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    decided: bool,
}

impl<'a> CallPermit<'a> {
    fn new(breaker: &'a CircuitBreaker, trial: bool) -> Self {
        Self {
            breaker,
            trial,
            decided: false,
        }
    }

    /// Whether this permit is the single half-open trial.
    pub fn is_trial(&self) -> bool {
        self.trial
    }

    pub fn succeeded(mut self) {
        self.decided = true;
        self.breaker.record_success(self.trial);
    }

    pub fn failed(mut self) {
        self.decided = true;
        self.breaker.record_failure(self.trial);
    }
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        if !self.decided && self.trial {
            self.breaker.release_trial();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fail_n(breaker: &CircuitBreaker, n: u32) {
        for _ in 0..n {
            breaker.try_acquire().unwrap().failed();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_after_threshold_consecutive_failures() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(30));
        fail_n(&breaker, 2);
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.failure_count(), 2);

        fail_n(&breaker, 1);
        assert_eq!(breaker.state(), CircuitState::Open);

        let err = breaker.try_acquire().err().unwrap();
        assert!(matches!(err, PrFirmError::CircuitOpen { retry_in_ms: 30_000 }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_consecutive_count() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(30));
        fail_n(&breaker, 2);
        breaker.try_acquire().unwrap().succeeded();
        assert_eq!(breaker.failure_count(), 0);
        fail_n(&breaker, 2);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_trial_success_closes() {
        let breaker = CircuitBreaker::new(1, Duration::from_secs(10));
        fail_n(&breaker, 1);

        tokio::time::advance(Duration::from_secs(9)).await;
        assert!(breaker.try_acquire().is_err());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        let permit = breaker.try_acquire().unwrap();
        assert!(permit.is_trial());
        // only one trial at a time
        let err = breaker.try_acquire().err().unwrap();
        assert!(matches!(err, PrFirmError::CircuitOpen { retry_in_ms: 0 }));
        permit.succeeded();

        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.failure_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_trial_failure_restarts_timer() {
        let breaker = CircuitBreaker::new(2, Duration::from_secs(10));
        fail_n(&breaker, 2);
        tokio::time::advance(Duration::from_secs(10)).await;

        breaker.try_acquire().unwrap().failed();
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_secs(5)).await;
        let err = breaker.try_acquire().err().unwrap();
        assert!(matches!(err, PrFirmError::CircuitOpen { retry_in_ms: 5_000 }));

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(breaker.try_acquire().unwrap().is_trial());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_trial_permit_frees_slot() {
        let breaker = CircuitBreaker::new(1, Duration::from_secs(1));
        fail_n(&breaker, 1);
        tokio::time::advance(Duration::from_secs(1)).await;

        drop(breaker.try_acquire().unwrap());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert!(breaker.try_acquire().unwrap().is_trial());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_success_does_not_close_open_circuit() {
        let breaker = CircuitBreaker::new(1, Duration::from_secs(10));
        let early = breaker.try_acquire().unwrap();
        fail_n(&breaker, 1);
        early.succeeded();
        assert_eq!(breaker.state(), CircuitState::Open);
    }
}
