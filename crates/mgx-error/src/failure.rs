// SPDX-License-Identifier: MIT OR Apache-2.0
//! Tagged union over structured and foreign errors.

use crate::{ErrorCode, Severity, SharedError, StructuredError};
use std::error::Error;
use std::fmt;
use std::sync::Arc;

static UNKNOWN_CODE: ErrorCode = ErrorCode::UNKNOWN;

/// Any failure flowing through the dispatcher, chain, recovery engine, or
/// metrics collector.
///
/// Foreign errors are classified exactly once, when they enter through
/// [`Failure::foreign`] or [`Failure::from_shared`]; downstream code
/// matches on the variant instead of downcasting again.
#[derive(Clone)]
pub enum Failure {
    /// A [`StructuredError`] with its own code and severity.
    Structured(StructuredError),
    /// Any other error. Reports [`ErrorCode::UNKNOWN`] and
    /// [`Severity::Error`].
    Foreign(SharedError),
}

impl Failure {
    /// Classify an owned error.
    pub fn foreign<E>(err: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        Self::from_shared(Arc::new(err))
    }

    /// Classify a shared error. A `StructuredError` (or a `Failure`) behind
    /// the pointer is recognized and unpacked.
    pub fn from_shared(err: SharedError) -> Self {
        if let Some(s) = err.downcast_ref::<StructuredError>() {
            return Self::Structured(s.clone());
        }
        if let Some(f) = err.downcast_ref::<Failure>() {
            return f.clone();
        }
        Self::Foreign(err)
    }

    /// Classify a boxed error.
    pub fn from_boxed(err: Box<dyn Error + Send + Sync + 'static>) -> Self {
        Self::from_shared(Arc::from(err))
    }

    /// Code of a structured failure, [`ErrorCode::UNKNOWN`] otherwise.
    pub fn code(&self) -> &ErrorCode {
        match self {
            Self::Structured(s) => s.code(),
            Self::Foreign(_) => &UNKNOWN_CODE,
        }
    }

    /// Severity of a structured failure, [`Severity::Error`] otherwise.
    pub fn severity(&self) -> Severity {
        match self {
            Self::Structured(s) => s.severity(),
            Self::Foreign(_) => Severity::Error,
        }
    }

    /// The structured error, if this is one.
    pub fn as_structured(&self) -> Option<&StructuredError> {
        match self {
            Self::Structured(s) => Some(s),
            Self::Foreign(_) => None,
        }
    }

    /// Whether this is a structured failure.
    pub fn is_structured(&self) -> bool {
        matches!(self, Self::Structured(_))
    }

    /// First structured error found by walking the cause chain, starting
    /// with this failure itself.
    pub fn find_structured(&self) -> Option<&StructuredError> {
        match self {
            Self::Structured(s) => Some(s),
            Self::Foreign(e) => {
                let mut cur = e.source();
                while let Some(err) = cur {
                    if let Some(s) = err.downcast_ref::<StructuredError>() {
                        return Some(s);
                    }
                    cur = err.source();
                }
                None
            }
        }
    }

    /// Promote to a structured error. A foreign error becomes the cause of a
    /// new `UNKNOWN` error carrying its message.
    pub fn into_structured(self) -> StructuredError {
        match self {
            Self::Structured(s) => s,
            Self::Foreign(e) => StructuredError::new(e.to_string()).with_shared_cause(e),
        }
    }

    /// Share the underlying error without adding a wrapper layer.
    pub fn into_shared(self) -> SharedError {
        match self {
            Self::Structured(s) => Arc::new(s),
            Self::Foreign(e) => e,
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Structured(s) => fmt::Display::fmt(s, f),
            Self::Foreign(e) => fmt::Display::fmt(e, f),
        }
    }
}

impl fmt::Debug for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Structured(s) => f.debug_tuple("Structured").field(s).finish(),
            Self::Foreign(e) => f.debug_tuple("Foreign").field(e).finish(),
        }
    }
}

impl Error for Failure {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Structured(s) => s.source(),
            Self::Foreign(e) => e.source(),
        }
    }
}

impl From<StructuredError> for Failure {
    fn from(err: StructuredError) -> Self {
        Self::Structured(err)
    }
}

impl From<std::io::Error> for Failure {
    fn from(err: std::io::Error) -> Self {
        Self::Foreign(Arc::new(err))
    }
}

impl From<fmt::Error> for Failure {
    fn from(err: fmt::Error) -> Self {
        Self::Foreign(Arc::new(err))
    }
}

impl From<Box<dyn Error + Send + Sync + 'static>> for Failure {
    fn from(err: Box<dyn Error + Send + Sync + 'static>) -> Self {
        Self::from_boxed(err)
    }
}
