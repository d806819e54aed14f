// SPDX-License-Identifier: MIT OR Apache-2.0
//! Routing of failures to registered handlers.
//!
//! A [`Dispatcher`] holds four kinds of callbacks and picks exactly one per
//! failure, in this order:
//!
//! 1. the handler registered for the structured error's code,
//! 2. else the handler registered for its severity,
//! 3. else the default handler (the only candidate for plain errors),
//! 4. else the fallback, which receives the original failure.
//!
//! When the chosen handler itself fails, its failure goes to the fallback.
//! With no fallback registered the failure is returned as-is, so nothing
//! is ever swallowed silently.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use mgx_cancel::OpContext;
use mgx_error::{ErrorCode, Failure, Severity, StructuredError};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, warn};

/// Handler for structured errors, keyed by code or severity.
pub type ErrorCallback = Arc<dyn Fn(&StructuredError) -> Result<(), Failure> + Send + Sync>;

/// Handler for any failure; used for the default and fallback slots.
pub type FailureCallback = Arc<dyn Fn(&Failure) -> Result<(), Failure> + Send + Sync>;

#[derive(Default)]
struct Table {
    by_code: HashMap<ErrorCode, ErrorCallback>,
    by_severity: HashMap<Severity, ErrorCallback>,
    default: Option<FailureCallback>,
    fallback: Option<FailureCallback>,
}

enum Route {
    Code(ErrorCallback),
    Severity(ErrorCallback),
    Default(FailureCallback),
    Unhandled,
}

/// Thread-safe registry of handlers with priority-ordered dispatch.
///
/// Registration takes the write lock. Dispatch takes the read lock only to
/// pick a handler; the handler runs after the lock is released, so a
/// handler may register other handlers but must not dispatch re-entrantly
/// while expecting to see its own registration.
#[derive(Default)]
pub struct Dispatcher {
    table: RwLock<Table>,
}

impl Dispatcher {
    /// Dispatcher with nothing registered.
    pub fn new() -> Self {
        Self::default()
    }

    // -- registration --

    /// Handle errors with `code`. Replaces any previous handler for it.
    pub fn on_error<F>(&self, code: impl Into<ErrorCode>, handler: F) -> &Self
    where
        F: Fn(&StructuredError) -> Result<(), Failure> + Send + Sync + 'static,
    {
        self.write().by_code.insert(code.into(), Arc::new(handler));
        self
    }

    /// Handle errors with exactly `severity`. Replaces any previous handler.
    pub fn on_severity<F>(&self, severity: Severity, handler: F) -> &Self
    where
        F: Fn(&StructuredError) -> Result<(), Failure> + Send + Sync + 'static,
    {
        self.write().by_severity.insert(severity, Arc::new(handler));
        self
    }

    /// Handle anything no code or severity handler claimed, including
    /// plain errors.
    pub fn set_default<F>(&self, handler: F) -> &Self
    where
        F: Fn(&Failure) -> Result<(), Failure> + Send + Sync + 'static,
    {
        self.write().default = Some(Arc::new(handler));
        self
    }

    /// Absorb failures of other handlers, and failures nothing else claimed.
    pub fn set_fallback<F>(&self, handler: F) -> &Self
    where
        F: Fn(&Failure) -> Result<(), Failure> + Send + Sync + 'static,
    {
        self.write().fallback = Some(Arc::new(handler));
        self
    }

    /// Whether a handler is registered for `code`.
    pub fn has_code_handler(&self, code: &ErrorCode) -> bool {
        self.read().by_code.contains_key(code)
    }

    /// Whether a handler is registered for `severity`.
    pub fn has_severity_handler(&self, severity: Severity) -> bool {
        self.read().by_severity.contains_key(&severity)
    }

    // -- dispatch --

    /// Route the error of `result`, if any. `Ok` passes through untouched.
    pub fn dispatch(&self, result: Result<(), Failure>) -> Result<(), Failure> {
        match result {
            Ok(()) => Ok(()),
            Err(failure) => self.handle(failure),
        }
    }

    /// Route one failure to exactly one handler.
    pub fn handle(&self, failure: impl Into<Failure>) -> Result<(), Failure> {
        let failure = failure.into();
        let (route, fallback) = self.select(&failure);

        let outcome = match route {
            Route::Code(cb) => {
                debug!(target: "mgx.dispatch", code = %failure.code(), "routing to code handler");
                run_structured(&cb, &failure)
            }
            Route::Severity(cb) => {
                debug!(
                    target: "mgx.dispatch",
                    code = %failure.code(),
                    severity = %failure.severity(),
                    "routing to severity handler"
                );
                run_structured(&cb, &failure)
            }
            Route::Default(cb) => {
                debug!(target: "mgx.dispatch", code = %failure.code(), "routing to default handler");
                cb(&failure)
            }
            Route::Unhandled => {
                debug!(target: "mgx.dispatch", code = %failure.code(), "no handler matched");
                return route_to_fallback(fallback.as_ref(), failure);
            }
        };

        match outcome {
            Ok(()) => Ok(()),
            Err(handler_err) => {
                warn!(
                    target: "mgx.dispatch",
                    code = %failure.code(),
                    error = %handler_err,
                    "handler failed, routing to fallback"
                );
                route_to_fallback(fallback.as_ref(), handler_err)
            }
        }
    }

    /// Like [`dispatch`](Self::dispatch), but honours `ctx`.
    ///
    /// A cancelled context short-circuits with its cancellation error and
    /// no handler runs. Otherwise the context's request, user, and trace
    /// ids are copied into a structured error's fields before routing.
    pub fn dispatch_with_context(
        &self,
        ctx: &OpContext,
        result: Result<(), Failure>,
    ) -> Result<(), Failure> {
        if let Some(cancelled) = ctx.err() {
            debug!(target: "mgx.dispatch", "context already cancelled, skipping handlers");
            return Err(cancelled.into());
        }
        let failure = match result {
            Ok(()) => return Ok(()),
            Err(f) => f,
        };
        let failure = match failure {
            Failure::Structured(s) => {
                let values: Vec<_> = ctx.recognized_values().collect();
                if values.is_empty() {
                    Failure::Structured(s)
                } else {
                    Failure::Structured(s.with_fields(values))
                }
            }
            foreign => foreign,
        };
        self.handle(failure)
    }

    fn select(&self, failure: &Failure) -> (Route, Option<FailureCallback>) {
        let table = self.read();
        let route = match failure {
            Failure::Structured(s) => {
                if let Some(cb) = table.by_code.get(s.code()) {
                    Route::Code(Arc::clone(cb))
                } else if let Some(cb) = table.by_severity.get(&s.severity()) {
                    Route::Severity(Arc::clone(cb))
                } else {
                    table.default.clone().map_or(Route::Unhandled, Route::Default)
                }
            }
            Failure::Foreign(_) => table.default.clone().map_or(Route::Unhandled, Route::Default),
        };
        (route, table.fallback.clone())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Table> {
        self.table.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Table> {
        self.table.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn run_structured(cb: &ErrorCallback, failure: &Failure) -> Result<(), Failure> {
    match failure.as_structured() {
        Some(s) => cb(s),
        None => Err(failure.clone()),
    }
}

fn route_to_fallback(fallback: Option<&FailureCallback>, failure: Failure) -> Result<(), Failure> {
    match fallback {
        Some(cb) => {
            debug!(target: "mgx.dispatch", code = %failure.code(), "routing to fallback");
            cb(&failure)
        }
        None => Err(failure),
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = self.read();
        let mut codes: Vec<&str> = table.by_code.keys().map(ErrorCode::as_str).collect();
        codes.sort_unstable();
        let mut severities: Vec<Severity> = table.by_severity.keys().copied().collect();
        severities.sort_unstable();
        f.debug_struct("Dispatcher")
            .field("codes", &codes)
            .field("severities", &severities)
            .field("default", &table.default.is_some())
            .field("fallback", &table.fallback.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mgx_cancel::{CancellationReason, REQUEST_ID, USER_ID};
    use std::io;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn build_failed() -> StructuredError {
        StructuredError::new("build failed").with_code(ErrorCode::BUILD_FAILED)
    }

    fn handler_error() -> Failure {
        StructuredError::new("handler error").into()
    }

    #[test]
    fn ok_is_a_no_op() {
        let d = Dispatcher::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        d.set_default(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        assert!(d.dispatch(Ok(())).is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn code_handler_wins_over_severity_and_default() {
        let d = Dispatcher::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let (a, b, c) = (Arc::clone(&log), Arc::clone(&log), Arc::clone(&log));
        d.on_error(ErrorCode::BUILD_FAILED, move |_| {
            a.lock().unwrap().push("code");
            Ok(())
        })
        .on_severity(Severity::Error, move |_| {
            b.lock().unwrap().push("severity");
            Ok(())
        })
        .set_default(move |_| {
            c.lock().unwrap().push("default");
            Ok(())
        });

        assert!(d.handle(build_failed()).is_ok());
        assert_eq!(*log.lock().unwrap(), vec!["code"]);
    }

    #[test]
    fn failing_code_handler_goes_to_fallback_not_severity() {
        let d = Dispatcher::new();
        let severity_calls = Arc::new(AtomicUsize::new(0));
        let s = Arc::clone(&severity_calls);
        let seen = Arc::new(Mutex::new(String::new()));
        let seen2 = Arc::clone(&seen);
        d.on_error(ErrorCode::BUILD_FAILED, |_| Err(handler_error()))
            .on_severity(Severity::Error, move |_| {
                s.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .set_fallback(move |f| {
                *seen2.lock().unwrap() = f.to_string();
                Ok(())
            });

        assert!(d.handle(build_failed()).is_ok());
        assert_eq!(severity_calls.load(Ordering::SeqCst), 0);
        assert_eq!(*seen.lock().unwrap(), "handler error");
    }

    #[test]
    fn severity_handler_used_when_no_code_handler() {
        let d = Dispatcher::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        d.on_error(ErrorCode::LINT_FAILED, |_| Err(handler_error()))
            .on_severity(Severity::Error, move |err| {
                assert_eq!(err.code(), &ErrorCode::BUILD_FAILED);
                h.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        assert!(d.handle(build_failed()).is_ok());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn plain_error_goes_to_default() {
        let d = Dispatcher::new();
        d.on_severity(Severity::Error, |_| Err(handler_error()))
            .set_default(|f| {
                assert!(!f.is_structured());
                Ok(())
            });
        assert!(d.handle(Failure::foreign(io::Error::other("plain"))).is_ok());
    }

    #[test]
    fn plain_error_without_default_goes_to_fallback() {
        let d = Dispatcher::new();
        d.set_fallback(|f| {
            assert_eq!(f.to_string(), "plain");
            Ok(())
        });
        assert!(d.handle(Failure::foreign(io::Error::other("plain"))).is_ok());
    }

    #[test]
    fn failing_default_goes_to_fallback() {
        let d = Dispatcher::new();
        let called = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&called);
        d.set_default(|_| Err(handler_error())).set_fallback(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        assert!(d.handle(build_failed()).is_ok());
        assert_eq!(called.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn nothing_registered_returns_original() {
        let d = Dispatcher::new();
        let err = d.handle(build_failed()).unwrap_err();
        assert_eq!(err.code(), &ErrorCode::BUILD_FAILED);
        assert_eq!(err.to_string(), "build failed");
    }

    #[test]
    fn only_fallback_receives_unmatched_structured_error() {
        let d = Dispatcher::new();
        d.set_fallback(|f| {
            assert_eq!(f.code(), &ErrorCode::BUILD_FAILED);
            Ok(())
        });
        assert!(d.handle(build_failed()).is_ok());
    }

    #[test]
    fn fallback_error_is_returned() {
        let d = Dispatcher::new();
        d.set_fallback(|_| Err(StructuredError::new("fallback error").into()));
        assert_eq!(
            d.handle(build_failed()).unwrap_err().to_string(),
            "fallback error"
        );
    }

    #[test]
    fn failing_handler_without_fallback_returns_handler_error() {
        let d = Dispatcher::new();
        d.on_error(ErrorCode::BUILD_FAILED, |_| Err(handler_error()));
        assert_eq!(
            d.handle(build_failed()).unwrap_err().to_string(),
            "handler error"
        );
    }

    #[test]
    fn reregistration_replaces() {
        let d = Dispatcher::new();
        d.on_error(ErrorCode::BUILD_FAILED, |_| Err(handler_error()));
        d.on_error(ErrorCode::BUILD_FAILED, |_| Ok(()));
        assert!(d.handle(build_failed()).is_ok());
        assert!(d.has_code_handler(&ErrorCode::BUILD_FAILED));
        assert!(!d.has_severity_handler(Severity::Fatal));
    }

    #[test]
    fn cancelled_context_short_circuits() {
        let d = Dispatcher::new();
        d.set_default(|_| panic!("handler must not run"));
        let ctx = OpContext::new();
        ctx.cancel(CancellationReason::UserRequested);
        let err = d
            .dispatch_with_context(&ctx, Err(build_failed().into()))
            .unwrap_err();
        assert_eq!(err.code(), &ErrorCode::CANCELED);
        assert!(err.to_string().contains("canceled"));
    }

    #[test]
    fn context_values_are_copied_into_fields() {
        let d = Dispatcher::new();
        let captured = Arc::new(Mutex::new(None));
        let cap = Arc::clone(&captured);
        d.on_error(ErrorCode::BUILD_FAILED, move |err| {
            *cap.lock().unwrap() = Some(err.clone());
            Ok(())
        });
        let ctx = OpContext::new()
            .with_value(REQUEST_ID, "req-123")
            .with_value(USER_ID, "user-456")
            .with_value("unrelated", "x");
        assert!(
            d.dispatch_with_context(&ctx, Err(build_failed().into()))
                .is_ok()
        );

        let err = captured.lock().unwrap().take().unwrap();
        let fields = &err.context().fields;
        assert_eq!(fields["request_id"], "req-123");
        assert_eq!(fields["user_id"], "user-456");
        assert!(!fields.contains_key("unrelated"));
    }

    #[test]
    fn context_dispatch_of_ok_is_ok() {
        let d = Dispatcher::new();
        assert!(d.dispatch_with_context(&OpContext::new(), Ok(())).is_ok());
    }

    #[test]
    fn debug_lists_registrations() {
        let d = Dispatcher::new();
        d.on_error(ErrorCode::TIMEOUT, |_| Ok(()));
        let dbg = format!("{d:?}");
        assert!(dbg.contains("TIMEOUT"));
        assert!(dbg.contains("fallback: false"));
    }
}
