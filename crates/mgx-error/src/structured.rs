// SPDX-License-Identifier: MIT OR Apache-2.0
//! The central immutable error value.

use crate::{ErrorCode, ErrorContext, Severity, SharedError};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{self, Write as _};
use std::sync::Arc;

/// A failure with a stable code, a severity, structured context, and an
/// optional cause.
///
/// Values are immutable once built: every `with_*` method borrows `self`
/// and returns a new error with exactly one aspect changed, deep-copying
/// everything else. Use [`ErrorBuilder`](crate::ErrorBuilder) when several
/// aspects need to be set at once.
///
/// # Examples
///
/// ```
/// use mgx_error::{ErrorCode, Severity, StructuredError};
///
/// let err = StructuredError::new("compilation failed")
///     .with_code(ErrorCode::BUILD_FAILED)
///     .with_field("file", "main.go");
///
/// assert_eq!(err.code(), &ErrorCode::BUILD_FAILED);
/// assert_eq!(err.severity(), Severity::Error);
/// assert!(err.format(false).contains("file: main.go"));
/// ```
#[derive(Clone)]
pub struct StructuredError {
    pub(crate) message: String,
    pub(crate) code: ErrorCode,
    pub(crate) severity: Severity,
    pub(crate) context: ErrorContext,
    pub(crate) cause: Option<SharedError>,
    pub(crate) stack_trace: Option<String>,
}

impl StructuredError {
    /// New error with code [`ErrorCode::UNKNOWN`], severity
    /// [`Severity::Error`], and an empty context stamped now.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: ErrorCode::UNKNOWN,
            severity: Severity::Error,
            context: ErrorContext::new(),
            cause: None,
            stack_trace: None,
        }
    }

    // -- accessors --

    /// Human-readable message, without the cause.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Stable error code.
    pub fn code(&self) -> &ErrorCode {
        &self.code
    }

    /// Severity.
    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// Attached context. Borrowed, so callers cannot mutate it in place;
    /// clone it to get an independent copy.
    pub fn context(&self) -> &ErrorContext {
        &self.context
    }

    /// The wrapped cause, if any.
    pub fn cause(&self) -> Option<&(dyn Error + Send + Sync + 'static)> {
        self.cause.as_deref()
    }

    /// The wrapped cause as a shared handle, if any.
    pub fn shared_cause(&self) -> Option<&SharedError> {
        self.cause.as_ref()
    }

    /// Alias of [`cause`](Self::cause) for generic chain traversal.
    pub fn unwrap_cause(&self) -> Option<&(dyn Error + Send + Sync + 'static)> {
        self.cause()
    }

    /// Captured call stack, if one was recorded.
    pub fn stack_trace(&self) -> Option<&str> {
        self.stack_trace
            .as_deref()
            .or(self.context.stack_trace.as_deref())
    }

    // -- copy-on-write mutators --

    /// Copy with a different code.
    #[must_use]
    pub fn with_code(&self, code: impl Into<ErrorCode>) -> Self {
        let mut next = self.clone();
        next.code = code.into();
        next
    }

    /// Copy with a different severity.
    #[must_use]
    pub fn with_severity(&self, severity: Severity) -> Self {
        let mut next = self.clone();
        next.severity = severity;
        next
    }

    /// Copy with the context replaced wholesale.
    #[must_use]
    pub fn with_context(&self, context: ErrorContext) -> Self {
        let mut next = self.clone();
        next.context = context;
        next
    }

    /// Copy with one extra field. Values that fail to serialize are skipped.
    #[must_use]
    pub fn with_field(&self, key: impl Into<String>, value: impl Serialize) -> Self {
        let mut next = self.clone();
        if let Ok(v) = serde_json::to_value(value) {
            next.context.fields.insert(key.into(), v);
        }
        next
    }

    /// Copy with several extra fields.
    #[must_use]
    pub fn with_fields<K, V>(&self, fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Serialize,
    {
        let mut next = self.clone();
        for (k, v) in fields {
            if let Ok(v) = serde_json::to_value(v) {
                next.context.fields.insert(k.into(), v);
            }
        }
        next
    }

    /// Copy wrapping `cause`.
    #[must_use]
    pub fn with_cause<E>(&self, cause: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        self.with_shared_cause(Arc::new(cause))
    }

    /// Copy wrapping an already shared cause. The cause keeps its identity,
    /// so [`is`](Self::is) finds it by pointer.
    #[must_use]
    pub fn with_shared_cause(&self, cause: SharedError) -> Self {
        let mut next = self.clone();
        next.cause = Some(cause);
        next
    }

    /// Copy with the operation name set.
    #[must_use]
    pub fn with_operation(&self, operation: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.context.operation = Some(operation.into());
        next
    }

    /// Copy with the resource identifier set.
    #[must_use]
    pub fn with_resource(&self, resource: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.context.resource = Some(resource.into());
        next
    }

    // -- rendering --

    /// Deterministic multi-line rendering.
    ///
    /// ```text
    /// [CODE] message
    ///   Operation: op
    ///   Resource: res
    ///   Fields:
    ///     key: value
    ///   Caused by: cause
    ///   Stack trace:
    /// <trace>
    /// ```
    ///
    /// Lines for unset aspects are omitted. String field values are
    /// printed bare, other values as JSON.
    pub fn format(&self, include_stack: bool) -> String {
        let mut out = format!("[{}] {}", self.code, self.message);
        if let Some(op) = &self.context.operation {
            let _ = write!(out, "\n  Operation: {op}");
        }
        if let Some(res) = &self.context.resource {
            let _ = write!(out, "\n  Resource: {res}");
        }
        if !self.context.fields.is_empty() {
            out.push_str("\n  Fields:");
            for (k, v) in &self.context.fields {
                match v {
                    serde_json::Value::String(s) => {
                        let _ = write!(out, "\n    {k}: {s}");
                    }
                    other => {
                        let _ = write!(out, "\n    {k}: {other}");
                    }
                }
            }
        }
        if let Some(cause) = &self.cause {
            let _ = write!(out, "\n  Caused by: {cause}");
        }
        if include_stack {
            if let Some(trace) = self.stack_trace() {
                let _ = write!(out, "\n  Stack trace:\n{trace}");
            }
        }
        out
    }

    // -- chain inspection --

    /// Iterate over `self` followed by every error reachable through
    /// [`Error::source`].
    pub fn chain(&self) -> impl Iterator<Item = &(dyn Error + 'static)> {
        std::iter::successors(Some(self as &(dyn Error + 'static)), |&e| e.source())
    }

    /// Whether `target` is equivalent to this error.
    ///
    /// True when `target` is the very same error object as `self` or any
    /// error in its cause chain, or when `target` is a `StructuredError`
    /// whose code equals the code of a structured error in the chain.
    pub fn is(&self, target: &(dyn Error + 'static)) -> bool {
        let target_code = target.downcast_ref::<StructuredError>().map(|s| &s.code);
        self.chain().any(|node| {
            if std::ptr::addr_eq(node as *const dyn Error, target as *const dyn Error) {
                return true;
            }
            match (target_code, node.downcast_ref::<StructuredError>()) {
                (Some(code), Some(s)) => &s.code == code,
                _ => false,
            }
        })
    }

    /// First error in the chain (starting at `self`) of concrete type `T`.
    pub fn as_error<T: Error + 'static>(&self) -> Option<&T> {
        self.chain().find_map(|e| e.downcast_ref::<T>())
    }
}

impl fmt::Display for StructuredError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.cause {
            Some(cause) => write!(f, "{}: {}", self.message, cause),
            None => f.write_str(&self.message),
        }
    }
}

impl fmt::Debug for StructuredError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("StructuredError");
        s.field("code", &self.code)
            .field("severity", &self.severity)
            .field("message", &self.message);
        if !self.context.fields.is_empty() {
            s.field("fields", &self.context.fields);
        }
        if let Some(cause) = &self.cause {
            s.field("cause", &cause.to_string());
        }
        s.finish()
    }
}

impl Error for StructuredError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.cause
            .as_deref()
            .map(|e| e as &(dyn Error + 'static))
    }
}

// ---------------------------------------------------------------------------
// Serializable snapshot
// ---------------------------------------------------------------------------

/// Serializable snapshot of a [`StructuredError`] for logs and exporters.
///
/// The cause cannot be serialized as-is, so only its message survives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredErrorDto {
    /// Error code.
    pub code: ErrorCode,
    /// Severity.
    pub severity: Severity,
    /// Message without the cause.
    pub message: String,
    /// Full context.
    pub context: ErrorContext,
    /// Rendered cause, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

impl From<&StructuredError> for StructuredErrorDto {
    fn from(err: &StructuredError) -> Self {
        Self {
            code: err.code.clone(),
            severity: err.severity,
            message: err.message.clone(),
            context: err.context.clone(),
            cause: err.cause.as_ref().map(|c| c.to_string()),
        }
    }
}
