// SPDX-License-Identifier: MIT OR Apache-2.0
//! Backoff configuration, presets, and retry predicates.

use mgx_error::{Failure, is_critical, is_timeout};
use mgx_registry::DefinitionLookup;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Decides whether a failed attempt may be retried.
pub type RetryPredicate = Arc<dyn Fn(&Failure) -> bool + Send + Sync>;

/// Retry budget used when the configured one is zero.
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// First delay used when the configured one is zero.
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(100);
/// Delay cap used when the configured one is zero.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);
/// Growth factor used when the configured one is not positive.
pub const DEFAULT_MULTIPLIER: f64 = 2.0;

// ── Configuration ───────────────────────────────────────────────────

/// Configuration for [`RecoveryEngine::recover_with_backoff`](crate::RecoveryEngine::recover_with_backoff).
///
/// Zero (or, for the multiplier, non-positive) values fall back to the
/// `DEFAULT_*` constants when the loop starts.
#[derive(Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    #[serde(with = "duration_millis")]
    pub initial_delay: Duration,
    /// Upper bound on any single delay, before jitter.
    #[serde(with = "duration_millis")]
    pub max_delay: Duration,
    /// Factor applied to the delay after every sleep.
    pub multiplier: f64,
    /// When set, a failure it rejects ends the loop immediately.
    #[serde(skip)]
    pub retry_if: Option<RetryPredicate>,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_delay: DEFAULT_INITIAL_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            multiplier: DEFAULT_MULTIPLIER,
            retry_if: None,
        }
    }
}

impl BackoffConfig {
    /// Doubling delays starting at `initial_delay`, capped at 30s.
    pub fn exponential(initial_delay: Duration, max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_delay,
            max_delay: DEFAULT_MAX_DELAY,
            multiplier: 2.0,
            retry_if: None,
        }
    }

    /// Delays that grow by roughly `increment` per retry.
    ///
    /// Expressed as a multiplier of `1 + increment / initial_delay` with
    /// the cap at `initial_delay + increment * max_retries`.
    pub fn linear(initial_delay: Duration, increment: Duration, max_retries: u32) -> Self {
        let multiplier = if initial_delay.is_zero() {
            DEFAULT_MULTIPLIER
        } else {
            1.0 + increment.as_secs_f64() / initial_delay.as_secs_f64()
        };
        Self {
            max_retries,
            initial_delay,
            max_delay: initial_delay.saturating_add(increment.saturating_mul(max_retries)),
            multiplier,
            retry_if: None,
        }
    }

    /// Delays growing by the golden ratio, capped at 30s.
    pub fn fibonacci(initial_delay: Duration, max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_delay,
            max_delay: DEFAULT_MAX_DELAY,
            multiplier: 1.618,
            retry_if: None,
        }
    }

    /// Copy with a retry predicate.
    #[must_use]
    pub fn retry_if(mut self, predicate: impl Fn(&Failure) -> bool + Send + Sync + 'static) -> Self {
        self.retry_if = Some(Arc::new(predicate));
        self
    }

    /// Copy with every unset value replaced by its default, and the initial
    /// delay clamped to the cap.
    pub fn normalized(&self) -> Self {
        let mut cfg = self.clone();
        if cfg.max_retries == 0 {
            cfg.max_retries = DEFAULT_MAX_RETRIES;
        }
        if cfg.initial_delay.is_zero() {
            cfg.initial_delay = DEFAULT_INITIAL_DELAY;
        }
        if cfg.max_delay.is_zero() {
            cfg.max_delay = DEFAULT_MAX_DELAY;
        }
        if !cfg.multiplier.is_finite() || cfg.multiplier <= 0.0 {
            cfg.multiplier = DEFAULT_MULTIPLIER;
        }
        cfg.initial_delay = cfg.initial_delay.min(cfg.max_delay);
        cfg
    }

    /// Delay that follows `current`: multiplied, then capped.
    pub fn next_delay(&self, current: Duration) -> Duration {
        let scaled = current.as_secs_f64() * self.multiplier;
        if !scaled.is_finite() || scaled >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(scaled)
        }
    }
}

impl fmt::Debug for BackoffConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackoffConfig")
            .field("max_retries", &self.max_retries)
            .field("initial_delay", &self.initial_delay)
            .field("max_delay", &self.max_delay)
            .field("multiplier", &self.multiplier)
            .field("retry_if", &self.retry_if.is_some())
            .finish()
    }
}

/// Serde helper: `Duration` as integer milliseconds.
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(val: &Duration, ser: S) -> Result<S::Ok, S::Error> {
        u64::try_from(val.as_millis())
            .unwrap_or(u64::MAX)
            .serialize(ser)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Duration, D::Error> {
        let ms: u64 = u64::deserialize(de)?;
        Ok(Duration::from_millis(ms))
    }
}

// ── Predicates ──────────────────────────────────────────────────────

/// Retry only codes that `lookup` defines as retryable.
pub fn retry_if_retryable<L>(lookup: Arc<L>) -> RetryPredicate
where
    L: DefinitionLookup + ?Sized + 'static,
{
    Arc::new(move |f| lookup.is_retryable(f))
}

/// Retry only timeouts.
pub fn retry_if_timeout() -> RetryPredicate {
    Arc::new(is_timeout)
}

/// Retry anything below `Critical`.
pub fn retry_if_not_critical() -> RetryPredicate {
    Arc::new(|f| !is_critical(f))
}

/// Retry only when every predicate agrees. An empty list always retries.
pub fn all_of(predicates: Vec<RetryPredicate>) -> RetryPredicate {
    Arc::new(move |f| predicates.iter().all(|p| p(f)))
}
