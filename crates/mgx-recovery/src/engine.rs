// SPDX-License-Identifier: MIT OR Apache-2.0
//! Panic recovery and retry loops.

use crate::backoff::BackoffConfig;
use mgx_cancel::OpContext;
use mgx_error::{ErrorCode, Failure, StructuredError, wrap};
use rand::RngCore;
use rand::rngs::OsRng;
use std::any::Any;
use std::error::Error;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Duration;
use tracing::{debug, error, warn};

/// Runs units of work so that panics become errors and transient failures
/// are retried.
///
/// Every attempt of every strategy goes through [`recover`](Self::recover),
/// so no panic ever escapes the engine. Retry loops block the calling
/// thread while sleeping; use [`recover_with_context`](Self::recover_with_context)
/// from async code.
#[derive(Debug, Clone, Default)]
pub struct RecoveryEngine {
    backoff: BackoffConfig,
}

impl RecoveryEngine {
    /// Engine whose [`retry`](Self::retry) uses the default backoff.
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine whose [`retry`](Self::retry) uses `backoff`.
    pub fn with_backoff(backoff: BackoffConfig) -> Self {
        Self { backoff }
    }

    /// The backoff used by [`retry`](Self::retry).
    pub fn backoff(&self) -> &BackoffConfig {
        &self.backoff
    }

    /// Run `f`, turning a panic into an error.
    ///
    /// An error panic payload is wrapped under `panic recovered`; any other
    /// payload becomes a new error reading `panic recovered: <payload>`.
    pub fn recover<T, F>(&self, f: F) -> Result<T, Failure>
    where
        F: FnOnce() -> Result<T, Failure>,
    {
        recover_unwind(f)
    }

    /// Run `f`; if it fails, let `fallback` turn the failure into the result.
    pub fn recover_with_fallback<T, F, G>(&self, f: F, fallback: G) -> Result<T, Failure>
    where
        F: FnOnce() -> Result<T, Failure>,
        G: FnOnce(Failure) -> Result<T, Failure>,
    {
        match recover_unwind(f) {
            Ok(v) => Ok(v),
            Err(err) => {
                debug!(target: "mgx.recovery", error = %err, "invoking fallback");
                fallback(err)
            }
        }
    }

    /// Run `f` up to `retries + 1` times, sleeping `delay` between attempts.
    ///
    /// On exhaustion the last failure is wrapped in an error stating the
    /// number of attempts made.
    pub fn recover_with_retry<T, F>(&self, mut f: F, retries: u32, delay: Duration) -> Result<T, Failure>
    where
        F: FnMut() -> Result<T, Failure>,
    {
        let attempts = retries.saturating_add(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            debug!(target: "mgx.recovery", attempt, attempts, "attempting operation");
            let err = match recover_unwind(&mut f) {
                Ok(v) => return Ok(v),
                Err(e) => e,
            };
            if attempt >= attempts {
                warn!(target: "mgx.recovery", error = %err, attempts, "max retries exhausted");
                return Err(exhausted(err, format!("failed after {attempts} attempts"), attempts));
            }
            warn!(
                target: "mgx.recovery",
                error = %err,
                attempt,
                delay_ms = millis(delay),
                "retrying after fixed delay"
            );
            std::thread::sleep(delay);
        }
    }

    /// Run `f` with jittered exponential backoff.
    ///
    /// Unset values in `config` take their defaults. After each failure the
    /// retry predicate, if any, is consulted first; a rejected failure is
    /// returned as-is. Otherwise the loop sleeps the current delay plus up
    /// to 10% jitter drawn from the operating system's secure RNG, then
    /// grows the delay by the multiplier up to the cap.
    pub fn recover_with_backoff<T, F>(&self, mut f: F, config: &BackoffConfig) -> Result<T, Failure>
    where
        F: FnMut() -> Result<T, Failure>,
    {
        let config = config.normalized();
        let attempts = config.max_retries.saturating_add(1);
        let mut delay = config.initial_delay;
        let mut attempt = 0;
        loop {
            attempt += 1;
            debug!(target: "mgx.recovery", attempt, attempts, "attempting operation");
            let err = match recover_unwind(&mut f) {
                Ok(v) => return Ok(v),
                Err(e) => e,
            };
            if let Some(retry_if) = &config.retry_if {
                if !retry_if(&err) {
                    debug!(target: "mgx.recovery", error = %err, "non-retryable error, giving up");
                    return Err(err);
                }
            }
            if attempt >= attempts {
                warn!(target: "mgx.recovery", error = %err, attempts, "max retries exhausted");
                return Err(exhausted(
                    err,
                    format!("failed after {attempts} attempts with backoff"),
                    attempts,
                ));
            }
            let sleep_for = delay + jitter(delay);
            warn!(
                target: "mgx.recovery",
                error = %err,
                attempt,
                delay_ms = millis(sleep_for),
                "retryable error, backing off"
            );
            std::thread::sleep(sleep_for);
            delay = config.next_delay(delay);
        }
    }

    /// [`recover_with_backoff`](Self::recover_with_backoff) using this
    /// engine's own backoff.
    pub fn retry<T, F>(&self, f: F) -> Result<T, Failure>
    where
        F: FnMut() -> Result<T, Failure>,
    {
        self.recover_with_backoff(f, &self.backoff)
    }

    /// Run `f` on the blocking pool, racing it against `ctx`.
    ///
    /// Whichever finishes first decides the result. If the context wins, a
    /// `canceled` error is returned at once and `f` keeps running detached
    /// until it completes on its own; its result is discarded. Work that
    /// must actually stop has to watch `ctx` itself.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn recover_with_context<T, F>(&self, ctx: &OpContext, f: F) -> Result<T, Failure>
    where
        F: FnOnce() -> Result<T, Failure> + Send + 'static,
        T: Send + 'static,
    {
        if let Some(err) = ctx.err() {
            warn!(target: "mgx.recovery", "context cancelled before start");
            return Err(canceled(err));
        }
        let work = tokio::task::spawn_blocking(move || recover_unwind(f));
        tokio::select! {
            biased;
            joined = work => match joined {
                Ok(result) => result,
                Err(join_err) => Err(
                    StructuredError::new("recovered work did not complete")
                        .with_code(ErrorCode::INTERNAL)
                        .with_cause(join_err)
                        .into(),
                ),
            },
            () = ctx.cancelled() => {
                warn!(target: "mgx.recovery", "context cancelled, detaching work");
                let err = ctx.err().unwrap_or_else(|| {
                    StructuredError::new("context canceled").with_code(ErrorCode::CANCELED)
                });
                Err(canceled(err))
            }
        }
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn recover_unwind<T, F>(f: F) -> Result<T, Failure>
where
    F: FnOnce() -> Result<T, Failure>,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let failure = panic_to_failure(payload);
            error!(target: "mgx.recovery", error = %failure, "panic recovered");
            Err(failure)
        }
    }
}

fn panic_to_failure(payload: Box<dyn Any + Send>) -> Failure {
    const PREFIX: &str = "panic recovered";

    let payload = match payload.downcast::<Failure>() {
        Ok(f) => return wrap(*f, PREFIX).into(),
        Err(p) => p,
    };
    let payload = match payload.downcast::<StructuredError>() {
        Ok(s) => return wrap(*s, PREFIX).into(),
        Err(p) => p,
    };
    let payload = match payload.downcast::<std::io::Error>() {
        Ok(e) => return wrap(*e, PREFIX).into(),
        Err(p) => p,
    };
    let payload = match payload.downcast::<Box<dyn Error + Send + Sync>>() {
        Ok(e) => return wrap(Failure::from_boxed(*e), PREFIX).into(),
        Err(p) => p,
    };
    let text = if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    };
    StructuredError::new(format!("{PREFIX}: {text}")).into()
}

fn exhausted(last: Failure, message: String, attempts: u32) -> Failure {
    wrap(last, message).with_field("attempts", attempts).into()
}

fn canceled(ctx_err: StructuredError) -> Failure {
    wrap(ctx_err, "operation canceled").into()
}

/// Uniform jitter in `[0, delay / 10)`. Zero if the RNG is unavailable.
fn jitter(delay: Duration) -> Duration {
    let max = u64::try_from(delay.as_nanos() / 10).unwrap_or(u64::MAX);
    if max == 0 {
        return Duration::ZERO;
    }
    let mut buf = [0u8; 8];
    match OsRng.try_fill_bytes(&mut buf) {
        Ok(()) => Duration::from_nanos(u64::from_le_bytes(buf) % max),
        Err(_) => Duration::ZERO,
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mgx_error::Severity;
    use std::cell::Cell;

    fn fail(msg: &str) -> Failure {
        StructuredError::new(msg).with_code(ErrorCode::UNAVAILABLE).into()
    }

    #[test]
    fn recover_passes_through_success_and_error() {
        let engine = RecoveryEngine::new();
        assert_eq!(engine.recover(|| Ok::<_, Failure>(7)).unwrap(), 7);
        let err = engine.recover(|| Err::<(), _>(fail("down"))).unwrap_err();
        assert_eq!(err.to_string(), "down");
    }

    #[test]
    fn string_panic_becomes_error() {
        let engine = RecoveryEngine::new();
        let err = engine
            .recover(|| -> Result<(), Failure> { panic!("disk on fire") })
            .unwrap_err();
        assert_eq!(err.to_string(), "panic recovered: disk on fire");
    }

    #[test]
    fn error_panic_is_wrapped() {
        let engine = RecoveryEngine::new();
        let err = engine
            .recover(|| -> Result<(), Failure> {
                std::panic::panic_any(
                    StructuredError::new("bad state").with_code(ErrorCode::INTERNAL),
                )
            })
            .unwrap_err();
        assert_eq!(err.to_string(), "panic recovered: bad state");
        assert_eq!(err.code(), &ErrorCode::INTERNAL);
    }

    #[test]
    fn opaque_panic_payload() {
        let engine = RecoveryEngine::new();
        let err = engine
            .recover(|| -> Result<(), Failure> { std::panic::panic_any(42_u8) })
            .unwrap_err();
        assert!(err.to_string().starts_with("panic recovered"));
    }

    #[test]
    fn fallback_sees_failure() {
        let engine = RecoveryEngine::new();
        let out = engine.recover_with_fallback(
            || Err(fail("primary")),
            |e| {
                assert_eq!(e.to_string(), "primary");
                Ok("fallback")
            },
        );
        assert_eq!(out.unwrap(), "fallback");
    }

    #[test]
    fn fallback_not_called_on_success() {
        let engine = RecoveryEngine::new();
        let out = engine.recover_with_fallback(|| Ok(1), |_| panic!("must not run"));
        assert_eq!(out.unwrap(), 1);
    }

    #[test]
    fn retry_makes_retries_plus_one_attempts() {
        let engine = RecoveryEngine::new();
        let calls = Cell::new(0);
        let err = engine
            .recover_with_retry(
                || {
                    calls.set(calls.get() + 1);
                    Err::<(), _>(fail("nope"))
                },
                3,
                Duration::from_millis(1),
            )
            .unwrap_err();
        assert_eq!(calls.get(), 4);
        assert!(err.to_string().starts_with("failed after 4 attempts"));
        let s = err.as_structured().unwrap();
        assert_eq!(s.context().fields["attempts"], 4);
        assert_eq!(s.code(), &ErrorCode::UNAVAILABLE);
    }

    #[test]
    fn retry_stops_on_success() {
        let engine = RecoveryEngine::new();
        let calls = Cell::new(0);
        let v = engine
            .recover_with_retry(
                || {
                    calls.set(calls.get() + 1);
                    if calls.get() < 3 { Err(fail("flaky")) } else { Ok("done") }
                },
                5,
                Duration::ZERO,
            )
            .unwrap();
        assert_eq!(v, "done");
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn retry_recovers_panics_per_attempt() {
        let engine = RecoveryEngine::new();
        let calls = Cell::new(0);
        let v = engine.recover_with_retry(
            || {
                calls.set(calls.get() + 1);
                if calls.get() == 1 {
                    panic!("first attempt explodes");
                }
                Ok(calls.get())
            },
            1,
            Duration::ZERO,
        );
        assert_eq!(v.unwrap(), 2);
    }

    #[test]
    fn zero_retries_is_one_attempt() {
        let engine = RecoveryEngine::new();
        let calls = Cell::new(0);
        let _ = engine.recover_with_retry(
            || {
                calls.set(calls.get() + 1);
                Err::<(), _>(fail("x"))
            },
            0,
            Duration::from_secs(60),
        );
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn backoff_predicate_short_circuits() {
        let engine = RecoveryEngine::new();
        let calls = Cell::new(0);
        let cfg = BackoffConfig::exponential(Duration::from_millis(1), 5).retry_if(|_| false);
        let err = engine
            .recover_with_backoff(
                || {
                    calls.set(calls.get() + 1);
                    Err::<(), _>(fail("fatal"))
                },
                &cfg,
            )
            .unwrap_err();
        assert_eq!(calls.get(), 1);
        assert_eq!(err.to_string(), "fatal");
    }

    #[test]
    fn backoff_exhausts_budget() {
        let engine = RecoveryEngine::new();
        let calls = Cell::new(0);
        let cfg = BackoffConfig {
            max_retries: 2,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            multiplier: 2.0,
            retry_if: None,
        };
        let err = engine
            .recover_with_backoff(
                || {
                    calls.set(calls.get() + 1);
                    Err::<(), _>(fail("still down"))
                },
                &cfg,
            )
            .unwrap_err();
        assert_eq!(calls.get(), 3);
        assert!(
            err.to_string()
                .starts_with("failed after 3 attempts with backoff")
        );
    }

    #[test]
    fn backoff_predicate_sees_each_failure() {
        let engine = RecoveryEngine::new();
        let cfg = BackoffConfig::exponential(Duration::from_millis(1), 4)
            .retry_if(|f| f.severity() < Severity::Critical);
        let calls = Cell::new(0);
        let err = engine
            .recover_with_backoff(
                || {
                    calls.set(calls.get() + 1);
                    let sev = if calls.get() == 2 { Severity::Critical } else { Severity::Error };
                    Err::<(), _>(StructuredError::new("x").with_severity(sev).into())
                },
                &cfg,
            )
            .unwrap_err();
        assert_eq!(calls.get(), 2);
        assert_eq!(err.severity(), Severity::Critical);
    }

    #[test]
    fn jitter_stays_below_ten_percent() {
        let delay = Duration::from_millis(100);
        for _ in 0..200 {
            assert!(jitter(delay) < Duration::from_millis(10));
        }
        assert_eq!(jitter(Duration::from_nanos(5)), Duration::ZERO);
    }
}
