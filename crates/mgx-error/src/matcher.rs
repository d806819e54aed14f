// SPDX-License-Identifier: MIT OR Apache-2.0
//! Composable predicates over failures.

use crate::{ErrorCode, Failure, Severity};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

type Predicate = Arc<dyn Fn(&Failure) -> bool + Send + Sync>;

/// Conjunction of predicates over a [`Failure`].
///
/// An empty matcher accepts every failure. Each added criterion must hold;
/// [`not`](Self::not) inverts the final answer. Structural criteria (code,
/// severity, field) look at the first structured error in the cause chain,
/// so plain errors never satisfy them.
///
/// ```
/// use mgx_error::{ErrorCode, ErrorMatcher, Failure, Severity, StructuredError};
///
/// let m = ErrorMatcher::new()
///     .code(ErrorCode::TIMEOUT)
///     .min_severity(Severity::Warning);
/// let f = Failure::from(StructuredError::new("slow").with_code(ErrorCode::TIMEOUT));
/// assert!(m.matches(&f));
/// ```
#[derive(Clone, Default)]
pub struct ErrorMatcher {
    predicates: Vec<Predicate>,
    inverted: bool,
}

impl ErrorMatcher {
    /// Matcher that accepts everything.
    pub fn new() -> Self {
        Self::default()
    }

    fn push(mut self, p: impl Fn(&Failure) -> bool + Send + Sync + 'static) -> Self {
        self.predicates.push(Arc::new(p));
        self
    }

    /// Require an exact code.
    #[must_use]
    pub fn code(self, code: ErrorCode) -> Self {
        self.push(move |f| f.find_structured().is_some_and(|s| s.code() == &code))
    }

    /// Require an exact severity.
    #[must_use]
    pub fn severity(self, severity: Severity) -> Self {
        self.push(move |f| {
            f.find_structured()
                .is_some_and(|s| s.severity() == severity)
        })
    }

    /// Require a severity at or above `threshold`.
    #[must_use]
    pub fn min_severity(self, threshold: Severity) -> Self {
        self.push(move |f| {
            f.find_structured()
                .is_some_and(|s| s.severity() >= threshold)
        })
    }

    /// Require the rendered message to contain `needle`.
    #[must_use]
    pub fn message(self, needle: impl Into<String>) -> Self {
        let needle = needle.into();
        self.push(move |f| f.to_string().contains(&needle))
    }

    /// Require a context field equal to `value`.
    #[must_use]
    pub fn field(self, key: impl Into<String>, value: impl Serialize) -> Self {
        let key = key.into();
        let Ok(expected) = serde_json::to_value(value) else {
            return self.push(|_| false);
        };
        self.push(move |f| {
            f.find_structured()
                .and_then(|s| s.context().fields.get(&key))
                .is_some_and(|v| v == &expected)
        })
    }

    /// Require at least one of `matchers` to accept.
    #[must_use]
    pub fn any(self, matchers: Vec<ErrorMatcher>) -> Self {
        self.push(move |f| matchers.iter().any(|m| m.matches(f)))
    }

    /// Require every one of `matchers` to accept.
    #[must_use]
    pub fn all(self, matchers: Vec<ErrorMatcher>) -> Self {
        self.push(move |f| matchers.iter().all(|m| m.matches(f)))
    }

    /// Add an arbitrary predicate.
    #[must_use]
    pub fn predicate(self, p: impl Fn(&Failure) -> bool + Send + Sync + 'static) -> Self {
        self.push(p)
    }

    /// Invert the final answer.
    #[must_use]
    pub fn not(mut self) -> Self {
        self.inverted = !self.inverted;
        self
    }

    /// Evaluate against a failure.
    pub fn matches(&self, failure: &Failure) -> bool {
        let all = self.predicates.iter().all(|p| p(failure));
        all != self.inverted
    }

    /// Evaluate against a possibly absent failure. Absence matches only an
    /// inverted matcher.
    pub fn matches_opt(&self, failure: Option<&Failure>) -> bool {
        match failure {
            Some(f) => self.matches(f),
            None => self.inverted,
        }
    }
}

impl fmt::Debug for ErrorMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorMatcher")
            .field("predicates", &self.predicates.len())
            .field("inverted", &self.inverted)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StructuredError;
    use std::io;

    fn timeout() -> Failure {
        StructuredError::new("deadline exceeded")
            .with_code(ErrorCode::TIMEOUT)
            .with_severity(Severity::Warning)
            .with_field("step", "fetch")
            .into()
    }

    #[test]
    fn empty_matcher_matches_everything() {
        let m = ErrorMatcher::new();
        assert!(m.matches(&timeout()));
        assert!(m.matches(&Failure::foreign(io::Error::other("x"))));
        assert!(!m.matches_opt(None));
    }

    #[test]
    fn all_criteria_must_hold() {
        let m = ErrorMatcher::new()
            .code(ErrorCode::TIMEOUT)
            .severity(Severity::Warning)
            .message("deadline")
            .field("step", "fetch");
        assert!(m.matches(&timeout()));

        let wrong_field = ErrorMatcher::new().code(ErrorCode::TIMEOUT).field("step", "push");
        assert!(!wrong_field.matches(&timeout()));
    }

    #[test]
    fn structural_criteria_reject_plain_errors() {
        let plain = Failure::foreign(io::Error::other("deadline"));
        assert!(!ErrorMatcher::new().code(ErrorCode::UNKNOWN).matches(&plain));
        assert!(ErrorMatcher::new().message("dead").matches(&plain));
    }

    #[test]
    fn not_inverts() {
        let m = ErrorMatcher::new().code(ErrorCode::NOT_FOUND).not();
        assert!(m.matches(&timeout()));
        assert!(m.matches_opt(None));
    }

    #[test]
    fn any_and_all_compose() {
        let either = ErrorMatcher::new().any(vec![
            ErrorMatcher::new().code(ErrorCode::NOT_FOUND),
            ErrorMatcher::new().code(ErrorCode::TIMEOUT),
        ]);
        assert!(either.matches(&timeout()));

        let both = ErrorMatcher::new().all(vec![
            ErrorMatcher::new().code(ErrorCode::TIMEOUT),
            ErrorMatcher::new().min_severity(Severity::Critical),
        ]);
        assert!(!both.matches(&timeout()));
    }

    #[test]
    fn custom_predicate() {
        let m = ErrorMatcher::new().predicate(|f| f.to_string().len() > 5);
        assert!(m.matches(&timeout()));
    }

    #[test]
    fn plain_errors_never_meet_severity_criteria() {
        let plain = Failure::foreign(io::Error::other("plain"));
        assert!(!ErrorMatcher::new().min_severity(Severity::Debug).matches(&plain));
        assert!(!ErrorMatcher::new().severity(Severity::Error).matches(&plain));
        assert!(ErrorMatcher::new().min_severity(Severity::Warning).matches(&timeout()));
    }
}
