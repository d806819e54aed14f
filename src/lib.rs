// SPDX-License-Identifier: MIT OR Apache-2.0
//! magex-resilience
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! Error classification, dispatch, recovery, and metrics for build
//! automation.
//!
//! The member crates can be used on their own. This crate re-exports them
//! and adds [`HandlingContext`], which owns one of each component and wires
//! them from a [`ResilienceConfig`]. Create one per application (or per
//! test) and pass it where it is needed; nothing here is process-global.
//!
//! ```no_run
//! use magex_resilience::{ErrorCode, HandlingContext};
//!
//! let ctx = HandlingContext::new();
//! ctx.dispatcher().on_error(ErrorCode::BUILD_FAILED, |err| {
//!     eprintln!("{}", err.format(false));
//!     Ok(())
//! });
//! let outcome = ctx.execute(|| {
//!     Err(ctx.error_builder().code(ErrorCode::BUILD_FAILED).message("link step failed").build().into())
//! });
//! assert!(outcome.is_ok());
//! ```

use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use tracing_subscriber::EnvFilter;

pub use mgx_cancel as cancel;
pub use mgx_config as config;
pub use mgx_error as error;
pub use mgx_handler as handler;
pub use mgx_recovery as recovery;
pub use mgx_registry as registry;
pub use mgx_telemetry as telemetry;

pub use mgx_cancel::{CancellationReason, CancellationToken, OpContext};
pub use mgx_config::{ConfigError, ResilienceConfig, load_config, validate_config};
pub use mgx_error::{
    ErrorBuilder, ErrorChain, ErrorCode, ErrorContext, ErrorMatcher, Failure, Severity,
    StructuredError,
};
pub use mgx_handler::Dispatcher;
pub use mgx_recovery::{BackoffConfig, RecoveryEngine, RetryPredicate};
pub use mgx_registry::{DefinitionLookup, ErrorDefinition, ErrorRegistry};
pub use mgx_telemetry::{MetricsCollector, MetricsSummary};

// ---------------------------------------------------------------------------
// HandlingContext
// ---------------------------------------------------------------------------

/// One dispatcher, recovery engine, metrics collector, and registry that
/// belong together.
///
/// [`execute`](Self::execute) is the usual entry point: it retries the work
/// under the configured backoff, counts a terminal failure, and routes it
/// through the dispatcher.
#[derive(Debug)]
pub struct HandlingContext {
    dispatcher: Dispatcher,
    recovery: RecoveryEngine,
    metrics: MetricsCollector,
    registry: Arc<ErrorRegistry>,
    environment: Option<String>,
    version: Option<String>,
    retries: u32,
    retry_delay: Duration,
}

impl Default for HandlingContext {
    fn default() -> Self {
        Self::new()
    }
}

impl HandlingContext {
    /// Context built from [`ResilienceConfig::default`].
    pub fn new() -> Self {
        Self::from_config(&ResilienceConfig::default())
    }

    /// Build every component from `config`.
    ///
    /// The backoff only retries failures whose code the built-in registry
    /// marks retryable; [`with_retry_policy`](Self::with_retry_policy)
    /// replaces that rule.
    pub fn from_config(config: &ResilienceConfig) -> Self {
        let registry = Arc::new(ErrorRegistry::with_defaults());
        let backoff = BackoffConfig {
            max_retries: config.backoff.max_retries(),
            initial_delay: Duration::from_millis(config.backoff.initial_delay_ms()),
            max_delay: Duration::from_millis(config.backoff.max_delay_ms()),
            multiplier: config.backoff.multiplier(),
            retry_if: Some(mgx_recovery::retry_if_retryable(Arc::clone(&registry))),
        };
        Self {
            dispatcher: Dispatcher::new(),
            recovery: RecoveryEngine::with_backoff(backoff),
            metrics: MetricsCollector::new().with_top_errors(config.metrics.top_errors()),
            registry,
            environment: config.environment.clone(),
            version: config.version.clone(),
            retries: config.retry.retries(),
            retry_delay: Duration::from_millis(config.retry.delay_ms()),
        }
    }

    /// Replace the predicate deciding which failures [`execute`](Self::execute)
    /// retries.
    pub fn with_retry_policy(mut self, predicate: RetryPredicate) -> Self {
        let mut backoff = self.recovery.backoff().clone();
        backoff.retry_if = Some(predicate);
        self.recovery = RecoveryEngine::with_backoff(backoff);
        self
    }

    /// The dispatcher failures are routed through.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// The recovery engine and its backoff.
    pub fn recovery(&self) -> &RecoveryEngine {
        &self.recovery
    }

    /// The metrics collector.
    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    /// The error-definition registry.
    pub fn registry(&self) -> &Arc<ErrorRegistry> {
        &self.registry
    }

    /// Environment stamped into built errors.
    pub fn environment(&self) -> Option<&str> {
        self.environment.as_deref()
    }

    /// Version stamped into built errors.
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// A builder whose context already carries this environment and version.
    pub fn error_builder(&self) -> ErrorBuilder {
        let mut builder = ErrorBuilder::new();
        if let Some(env) = &self.environment {
            builder = builder.environment(env.clone());
        }
        if let Some(version) = &self.version {
            builder = builder.version(version.clone());
        }
        builder
    }

    /// Whether the registry defines `failure`'s code as retryable.
    pub fn is_retryable(&self, failure: &Failure) -> bool {
        self.registry.is_retryable(failure)
    }

    /// Run `f` under backoff recovery. A terminal failure is recorded in
    /// metrics and then dispatched; the dispatcher's verdict is returned.
    pub fn execute<F>(&self, f: F) -> Result<(), Failure>
    where
        F: FnMut() -> Result<(), Failure>,
    {
        let outcome = self.recovery.retry(f);
        self.settle(outcome)
    }

    /// Like [`execute`](Self::execute) with the fixed-delay budget from the
    /// `[retry]` section.
    pub fn execute_with_retry<F>(&self, f: F) -> Result<(), Failure>
    where
        F: FnMut() -> Result<(), Failure>,
    {
        let outcome = self
            .recovery
            .recover_with_retry(f, self.retries, self.retry_delay);
        self.settle(outcome)
    }

    /// Run `f` once, racing it against `ctx`. Failures are recorded and
    /// dispatched with `ctx`'s values. Cancellation is recorded and returned
    /// without running any handler.
    pub async fn execute_with_context<F>(&self, ctx: &OpContext, f: F) -> Result<(), Failure>
    where
        F: FnOnce() -> Result<(), Failure> + Send + 'static,
    {
        let err = match self.recovery.recover_with_context(ctx, f).await {
            Ok(()) => return Ok(()),
            Err(err) => err,
        };
        self.record(&err);
        // A cancelled context skips the handlers; return what was counted.
        match self.dispatcher.dispatch_with_context(ctx, Err(err.clone())) {
            Err(_) if ctx.is_cancelled() => Err(err),
            other => other,
        }
    }

    fn settle(&self, outcome: Result<(), Failure>) -> Result<(), Failure> {
        if let Err(err) = &outcome {
            self.record(err);
        }
        self.dispatcher.dispatch(outcome)
    }

    fn record(&self, err: &Failure) {
        debug!(
            target: "mgx.dispatch",
            code = %err.code(),
            severity = %err.severity(),
            "unit of work failed"
        );
        self.metrics.record_error(err);
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// Install a `fmt` subscriber filtered by `RUST_LOG`, or by `default_filter`
/// when that is unset (e.g. `"mgx=info"`). Returns `false` if a global
/// subscriber was already installed.
pub fn init_tracing(default_filter: &str) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .is_ok()
}
