// SPDX-License-Identifier: MIT OR Apache-2.0
//! Fluent construction of [`StructuredError`] values.

use crate::{ErrorCode, ErrorContext, Severity, SharedError, StructuredError};
use serde::Serialize;
use std::backtrace::Backtrace;
use std::error::Error;
use std::sync::Arc;

/// Builder for [`StructuredError`].
///
/// Unlike the `with_*` methods on the error itself, the builder mutates in
/// place; the value only becomes immutable once [`build`](Self::build)
/// hands it out.
///
/// ```
/// use mgx_error::{ErrorBuilder, ErrorCode, Severity};
///
/// let err = ErrorBuilder::new()
///     .message("tests failed")
///     .code(ErrorCode::TEST_FAILED)
///     .severity(Severity::Critical)
///     .operation("test")
///     .field("failed", 3)
///     .build();
///
/// assert_eq!(err.to_string(), "tests failed");
/// assert_eq!(err.context().fields["failed"], 3);
/// ```
#[derive(Debug, Clone)]
pub struct ErrorBuilder {
    inner: StructuredError,
}

impl Default for ErrorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorBuilder {
    /// Start from an empty `UNKNOWN`/`Error` value.
    pub fn new() -> Self {
        Self {
            inner: StructuredError::new(""),
        }
    }

    /// Set the message.
    #[must_use]
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.inner.message = message.into();
        self
    }

    /// Set the code.
    #[must_use]
    pub fn code(mut self, code: impl Into<ErrorCode>) -> Self {
        self.inner.code = code.into();
        self
    }

    /// Set the severity.
    #[must_use]
    pub fn severity(mut self, severity: Severity) -> Self {
        self.inner.severity = severity;
        self
    }

    /// Replace the whole context.
    #[must_use]
    pub fn context(mut self, context: ErrorContext) -> Self {
        self.inner.context = context;
        self
    }

    /// Add one field. Values that fail to serialize are skipped.
    #[must_use]
    pub fn field(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.inner.context.fields.insert(key.into(), v);
        }
        self
    }

    /// Add several fields.
    #[must_use]
    pub fn fields<K, V>(mut self, fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Serialize,
    {
        for (k, v) in fields {
            if let Ok(v) = serde_json::to_value(v) {
                self.inner.context.fields.insert(k.into(), v);
            }
        }
        self
    }

    /// Wrap a cause.
    #[must_use]
    pub fn cause<E>(self, cause: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        self.shared_cause(Arc::new(cause))
    }

    /// Wrap an already shared cause.
    #[must_use]
    pub fn shared_cause(mut self, cause: SharedError) -> Self {
        self.inner.cause = Some(cause);
        self
    }

    /// Set the operation name.
    #[must_use]
    pub fn operation(mut self, operation: impl Into<String>) -> Self {
        self.inner.context.operation = Some(operation.into());
        self
    }

    /// Set the resource identifier.
    #[must_use]
    pub fn resource(mut self, resource: impl Into<String>) -> Self {
        self.inner.context.resource = Some(resource.into());
        self
    }

    /// Set the user.
    #[must_use]
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.inner.context.user = Some(user.into());
        self
    }

    /// Set the request id.
    #[must_use]
    pub fn request_id(mut self, id: impl Into<String>) -> Self {
        self.inner.context.request_id = Some(id.into());
        self
    }

    /// Set the environment.
    #[must_use]
    pub fn environment(mut self, env: impl Into<String>) -> Self {
        self.inner.context.environment = Some(env.into());
        self
    }

    /// Set the version.
    #[must_use]
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.inner.context.version = Some(version.into());
        self
    }

    /// Capture the current call stack.
    #[must_use]
    pub fn stack_trace(mut self) -> Self {
        self.inner.stack_trace = Some(Backtrace::force_capture().to_string());
        self
    }

    /// Finish.
    pub fn build(self) -> StructuredError {
        self.inner
    }
}
