//! Per-source circuit breaker for adaptive source selection.
//!
//! Tracks consecutive failures per source and temporarily skips sources
//! that keep failing. After a cooldown, a skipped source enters a half-open
//! state where a single trial request decides whether it is restored or
//! skipped again. Concurrent requests keep skipping the source while the
//! trial is in flight.
//!
//! # State Machine
//!
//! ```text
//! ┌────────┐  N failures   ┌────────┐  cooldown   ┌──────────┐
//! │ Closed ├──────────────►│  Open  ├────────────►│ HalfOpen │
//! └───▲────┘               └────────┘             └────┬─────┘
//!     │                         ▲                      │
//!     │  success                │  failure              │
//!     └─────────────────────────┴──────────────────────┘
//! ```

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::config::CircuitBreakerSettings;
use crate::types::{SourceId, SourceSelection};

/// How long an unanswered trial request blocks further attempts.
const DEFAULT_TRIAL_LEASE: Duration = Duration::from_secs(60);

/// Circuit state for a single source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Healthy; requests go through.
    Closed,
    /// Failing; requests are skipped until the cooldown expires.
    Open,
    /// Cooldown elapsed; one trial request is allowed through.
    HalfOpen,
}

/// Health tracking data for a single source.
#[derive(Debug, Clone)]
struct SourceHealth {
    state: CircuitState,
    consecutive_failures: u32,
    last_failure_at: Option<Instant>,
    trial_started_at: Option<Instant>,
}

impl Default for SourceHealth {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            last_failure_at: None,
            trial_started_at: None,
        }
    }
}

/// Per-source circuit breaker.
#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    cooldown: Duration,
    trial_lease: Duration,
    sources: HashMap<SourceId, SourceHealth>,
}

impl CircuitBreaker {
    /// Create a breaker from settings.
    pub fn new(settings: &CircuitBreakerSettings) -> Self {
        Self {
            failure_threshold: settings.failure_threshold.max(1),
            cooldown: Duration::from_secs(settings.cooldown_secs),
            trial_lease: DEFAULT_TRIAL_LEASE,
            sources: HashMap::new(),
        }
    }

    /// Builder: how long a trial request may stay unanswered before another
    /// request may try instead. Covers trials whose request was dropped.
    pub fn with_trial_lease(mut self, lease: Duration) -> Self {
        self.trial_lease = lease;
        self
    }

    /// Record a successful request; the source returns to `Closed`.
    pub fn record_success(&mut self, source: SourceId) {
        let health = self.sources.entry(source).or_default();
        health.state = CircuitState::Closed;
        health.consecutive_failures = 0;
        health.trial_started_at = None;
    }

    /// Record a failed request; trips to `Open` at the threshold.
    pub fn record_failure(&mut self, source: SourceId) {
        let health = self.sources.entry(source).or_default();
        health.consecutive_failures += 1;
        health.last_failure_at = Some(Instant::now());
        health.trial_started_at = None;

        if health.consecutive_failures >= self.failure_threshold
            || health.state == CircuitState::HalfOpen
        {
            if health.state != CircuitState::Open {
                tracing::warn!(
                    %source,
                    failures = health.consecutive_failures,
                    "source circuit opened"
                );
            }
            health.state = CircuitState::Open;
        }
    }

    /// Whether a request to `source` should be attempted.
    ///
    /// `Open` sources whose cooldown has elapsed move to `HalfOpen` and are
    /// allowed one trial request. Until its outcome is recorded with
    /// [`record_success`](Self::record_success) or
    /// [`record_failure`](Self::record_failure), every other caller is told
    /// to skip the source.
    pub fn should_attempt(&mut self, source: SourceId) -> bool {
        let cooldown = self.cooldown;
        let lease = self.trial_lease;
        let health = self.sources.entry(source).or_default();

        match health.state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => {
                if health.trial_started_at.is_some_and(|t| t.elapsed() < lease) {
                    return false;
                }
                health.trial_started_at = Some(Instant::now());
                true
            }
            CircuitState::Open => {
                let cooled = health
                    .last_failure_at
                    .is_none_or(|t| t.elapsed() >= cooldown);
                if cooled {
                    tracing::debug!(%source, "source circuit half-open, sending trial request");
                    health.state = CircuitState::HalfOpen;
                    health.trial_started_at = Some(Instant::now());
                }
                cooled
            }
        }
    }

    /// Remove sources that should not be attempted from `selection`.
    ///
    /// Returns the skipped sources in selection order.
    pub fn filter_selection(&mut self, selection: &mut SourceSelection) -> Vec<SourceId> {
        let skipped: Vec<SourceId> = selection
            .sources()
            .filter(|source| !self.should_attempt(*source))
            .collect();
        if !skipped.is_empty() {
            selection.retain(|source| !skipped.contains(&source));
        }
        skipped
    }

    /// Current state of `source`.
    pub fn source_status(&self, source: SourceId) -> CircuitState {
        self.sources
            .get(&source)
            .map_or(CircuitState::Closed, |h| h.state)
    }

    /// `(source, state, consecutive_failures)` for every tracked source.
    pub fn health_report(&self) -> Vec<(SourceId, CircuitState, u32)> {
        let mut report: Vec<_> = self
            .sources
            .iter()
            .map(|(source, health)| (*source, health.state, health.consecutive_failures))
            .collect();
        report.sort_by_key(|(source, _, _)| *source);
        report
    }

    /// Forget all tracked state.
    pub fn reset(&mut self) {
        self.sources.clear();
    }
}
