// SPDX-License-Identifier: MIT OR Apache-2.0
//! Structured error taxonomy for build automation.
//!
//! Every failure is described by a [`StructuredError`]: a stable
//! [`ErrorCode`], a [`Severity`], an [`ErrorContext`] value bag, and an
//! optional cause. Errors from elsewhere enter through the [`Failure`]
//! adapter, which classifies them exactly once. Several failures can be
//! accumulated in an [`ErrorChain`], selected with an [`ErrorMatcher`], and
//! rewritten before reporting by an [`ErrorTransformer`].

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod builder;
mod chain;
mod code;
mod context;
mod failure;
mod matcher;
mod severity;
mod structured;
mod transformer;

pub use builder::ErrorBuilder;
pub use chain::ErrorChain;
pub use code::ErrorCode;
pub use context::ErrorContext;
pub use failure::Failure;
pub use matcher::ErrorMatcher;
pub use severity::{Severity, SeverityParseError};
pub use structured::{StructuredError, StructuredErrorDto};
pub use transformer::{
    ErrorTransformer, NamedTransformer, TransformFn, chain as chain_transformers, conditional,
    enrich, retryable, sanitize,
};

use std::error::Error;
use std::sync::Arc;

/// Thread-safe, cheaply clonable handle to any error.
pub type SharedError = Arc<dyn Error + Send + Sync + 'static>;

// ---------------------------------------------------------------------------
// Constructors
// ---------------------------------------------------------------------------

/// New `UNKNOWN` error.
pub fn new(message: impl Into<String>) -> StructuredError {
    StructuredError::new(message)
}

/// New error with an explicit code.
pub fn with_code(code: impl Into<ErrorCode>, message: impl Into<String>) -> StructuredError {
    ErrorBuilder::new().code(code).message(message).build()
}

/// Wrap `cause` under a new message. A structured cause lends its code and
/// severity to the wrapper.
pub fn wrap(cause: impl Into<Failure>, message: impl Into<String>) -> StructuredError {
    let cause = cause.into();
    let code = cause.code().clone();
    let severity = cause.severity();
    ErrorBuilder::new()
        .message(message)
        .code(code)
        .severity(severity)
        .shared_cause(cause.into_shared())
        .build()
}

/// Build failure wrapping `cause`, with a captured stack.
pub fn build_error(message: impl Into<String>, cause: impl Into<Failure>) -> StructuredError {
    ErrorBuilder::new()
        .code(ErrorCode::BUILD_FAILED)
        .message(message)
        .shared_cause(cause.into().into_shared())
        .operation("build")
        .stack_trace()
        .build()
}

/// Invalid configuration in `config_file`.
pub fn config_error(message: impl Into<String>, config_file: impl Into<String>) -> StructuredError {
    ErrorBuilder::new()
        .code(ErrorCode::CONFIG_INVALID)
        .message(message)
        .resource(config_file)
        .operation("config")
        .build()
}

/// File operation failure on `path`.
pub fn file_error(
    code: impl Into<ErrorCode>,
    message: impl Into<String>,
    path: impl Into<String>,
) -> StructuredError {
    ErrorBuilder::new()
        .code(code)
        .message(message)
        .resource(path)
        .operation("file")
        .build()
}

/// External command exited unsuccessfully.
pub fn command_error(command: &str, exit_code: i32, output: &str) -> StructuredError {
    ErrorBuilder::new()
        .code(ErrorCode::COMMAND_FAILED)
        .message(format!("command failed: {command}"))
        .field("command", command)
        .field("exit_code", exit_code)
        .field("output", output)
        .operation("exec")
        .build()
}

/// Argument `field` failed validation.
pub fn validation_error(
    field: &str,
    value: impl serde::Serialize,
    reason: &str,
) -> StructuredError {
    ErrorBuilder::new()
        .code(ErrorCode::INVALID_ARGUMENT)
        .message(format!("validation failed for field '{field}': {reason}"))
        .field("field", field)
        .field("value", value)
        .field("reason", reason)
        .operation("validate")
        .build()
}

// ---------------------------------------------------------------------------
// Inspectors
// ---------------------------------------------------------------------------

/// Code of the first structured error in the chain, else `UNKNOWN`.
pub fn code_of(err: &Failure) -> ErrorCode {
    err.find_structured()
        .map_or(ErrorCode::UNKNOWN, |s| s.code().clone())
}

/// Severity of the first structured error in the chain, else `Error`.
pub fn severity_of(err: &Failure) -> Severity {
    err.find_structured()
        .map_or(Severity::Error, StructuredError::severity)
}

/// `NOT_FOUND` or `FILE_NOT_FOUND`.
pub fn is_not_found(err: &Failure) -> bool {
    let code = code_of(err);
    code == ErrorCode::NOT_FOUND || code == ErrorCode::FILE_NOT_FOUND
}

/// `TIMEOUT` or `COMMAND_TIMEOUT`.
pub fn is_timeout(err: &Failure) -> bool {
    let code = code_of(err);
    code == ErrorCode::TIMEOUT || code == ErrorCode::COMMAND_TIMEOUT
}

/// `PERMISSION_DENIED` or `FILE_ACCESS_DENIED`.
pub fn is_permission_denied(err: &Failure) -> bool {
    let code = code_of(err);
    code == ErrorCode::PERMISSION_DENIED || code == ErrorCode::FILE_ACCESS_DENIED
}

/// Severity is `Critical` or `Fatal`.
pub fn is_critical(err: &Failure) -> bool {
    severity_of(err) >= Severity::Critical
}

// ---------------------------------------------------------------------------
// Combinators
// ---------------------------------------------------------------------------

/// Collapse several results into one failure: `None` if all are `Ok`, the
/// failure itself if exactly one, an [`ErrorChain`] otherwise.
pub fn combine<I, E>(results: I) -> Option<Failure>
where
    I: IntoIterator<Item = Result<(), E>>,
    E: Into<Failure>,
{
    let mut chain = ErrorChain::new();
    for r in results {
        chain.add_result(r);
    }
    match chain.count() {
        0 => None,
        1 => chain.first().cloned(),
        _ => Some(Failure::foreign(chain)),
    }
}

/// First failure among `results`, if any.
pub fn first_error<I, E>(results: I) -> Option<Failure>
where
    I: IntoIterator<Item = Result<(), E>>,
    E: Into<Failure>,
{
    results.into_iter().find_map(|r| r.err().map(Into::into))
}
