// SPDX-License-Identifier: MIT OR Apache-2.0
//! Ordered accumulation of several failures.

use crate::{ErrorCode, ErrorContext, Failure, StructuredError};
use std::error::Error;
use std::fmt;

/// An ordered collection of failures.
///
/// `add` mutates the chain in place and returns `&mut Self` so calls can be
/// chained; a chain is never implicitly copied. Clone it explicitly before
/// branching. Insertion order is preserved by every accessor.
#[derive(Debug, Clone, Default)]
pub struct ErrorChain {
    errors: Vec<Failure>,
}

impl ErrorChain {
    /// Empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a failure.
    pub fn add(&mut self, err: impl Into<Failure>) -> &mut Self {
        self.errors.push(err.into());
        self
    }

    /// Append the error of `result`, if any. `Ok` values are ignored.
    pub fn add_result<T, E>(&mut self, result: Result<T, E>) -> &mut Self
    where
        E: Into<Failure>,
    {
        if let Err(e) = result {
            self.add(e);
        }
        self
    }

    /// Append a failure carrying `ctx`.
    ///
    /// A structured failure keeps its identity and has every aspect set in
    /// `ctx` overlaid onto its own context. Anything else is promoted to a
    /// new structured error whose message is the original message, whose
    /// context is `ctx`, and whose cause is the original error.
    pub fn add_with_context(&mut self, err: impl Into<Failure>, ctx: &ErrorContext) -> &mut Self {
        let promoted = match err.into() {
            Failure::Structured(s) => {
                let mut merged = s.context().clone();
                merged.overlay(ctx);
                s.with_context(merged)
            }
            Failure::Foreign(e) => StructuredError::new(e.to_string())
                .with_context(ctx.clone())
                .with_shared_cause(e),
        };
        self.errors.push(Failure::Structured(promoted));
        self
    }

    /// All failures, in insertion order.
    pub fn errors(&self) -> &[Failure] {
        &self.errors
    }

    /// Owned copy of all failures, in insertion order.
    pub fn to_slice(&self) -> Vec<Failure> {
        self.errors.clone()
    }

    /// First failure added.
    pub fn first(&self) -> Option<&Failure> {
        self.errors.first()
    }

    /// Last failure added.
    pub fn last(&self) -> Option<&Failure> {
        self.errors.last()
    }

    /// Number of failures.
    pub fn count(&self) -> usize {
        self.errors.len()
    }

    /// Whether the chain holds nothing.
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Whether any element is, or wraps, a structured error with `code`.
    pub fn has_error(&self, code: &ErrorCode) -> bool {
        self.find_by_code(code).is_some()
    }

    /// First structured error (directly or through its cause chain) whose
    /// code is `code`. Plain errors are skipped.
    pub fn find_by_code(&self, code: &ErrorCode) -> Option<&StructuredError> {
        self.errors
            .iter()
            .filter_map(Failure::find_structured)
            .find(|s| s.code() == code)
    }

    /// Visit every failure in order, stopping at the first `Err`.
    pub fn for_each<E>(&self, mut f: impl FnMut(&Failure) -> Result<(), E>) -> Result<(), E> {
        for err in &self.errors {
            f(err)?;
        }
        Ok(())
    }

    /// Failures accepted by `predicate`, in order. Never `None`; empty when
    /// nothing matches.
    pub fn filter(&self, mut predicate: impl FnMut(&Failure) -> bool) -> Vec<&Failure> {
        self.errors.iter().filter(|e| predicate(*e)).collect()
    }

    /// Iterate in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, Failure> {
        self.errors.iter()
    }
}

impl fmt::Display for ErrorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.errors.as_slice() {
            [] => f.write_str("no errors"),
            [only] => write!(f, "{only}"),
            many => {
                write!(f, "{} errors occurred:", many.len())?;
                for (i, err) in many.iter().enumerate() {
                    write!(f, "\n[{}] {}", i + 1, err)?;
                }
                Ok(())
            }
        }
    }
}

impl Error for ErrorChain {}

impl<'a> IntoIterator for &'a ErrorChain {
    type Item = &'a Failure;
    type IntoIter = std::slice::Iter<'a, Failure>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.iter()
    }
}

impl<F: Into<Failure>> FromIterator<F> for ErrorChain {
    fn from_iter<I: IntoIterator<Item = F>>(iter: I) -> Self {
        Self {
            errors: iter.into_iter().map(Into::into).collect(),
        }
    }
}

impl<F: Into<Failure>> Extend<F> for ErrorChain {
    fn extend<I: IntoIterator<Item = F>>(&mut self, iter: I) {
        self.errors.extend(iter.into_iter().map(Into::into));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Severity;
    use std::io;

    fn coded(msg: &str, code: ErrorCode) -> StructuredError {
        StructuredError::new(msg).with_code(code)
    }

    #[test]
    fn empty_chain() {
        let chain = ErrorChain::new();
        assert_eq!(chain.to_string(), "no errors");
        assert!(chain.first().is_none());
        assert!(chain.last().is_none());
        assert_eq!(chain.count(), 0);
        assert!(chain.filter(|_| true).is_empty());
        assert!(chain.to_slice().is_empty());
    }

    #[test]
    fn single_error_message_is_unwrapped() {
        let mut chain = ErrorChain::new();
        chain.add(StructuredError::new("only"));
        assert_eq!(chain.to_string(), "only");
    }

    #[test]
    fn multi_error_message_is_numbered_in_order() {
        let mut chain = ErrorChain::new();
        chain
            .add(StructuredError::new("E1"))
            .add(io::Error::other("E2"))
            .add(StructuredError::new("E3"));
        assert_eq!(
            chain.to_string(),
            "3 errors occurred:\n[1] E1\n[2] E2\n[3] E3"
        );
    }

    #[test]
    fn add_result_ignores_ok() {
        let mut chain = ErrorChain::new();
        chain.add_result(Ok::<_, Failure>(1));
        chain.add_result(Err::<(), _>(io::Error::other("bad")));
        assert_eq!(chain.count(), 1);
    }

    #[test]
    fn first_and_last_follow_insertion_order() {
        let mut chain = ErrorChain::new();
        chain.add(StructuredError::new("a")).add(StructuredError::new("b"));
        assert_eq!(chain.first().unwrap().to_string(), "a");
        assert_eq!(chain.last().unwrap().to_string(), "b");
    }

    #[test]
    fn find_by_code_skips_plain_errors() {
        let mut chain = ErrorChain::new();
        chain
            .add(io::Error::other("plain"))
            .add(coded("lint", ErrorCode::LINT_FAILED))
            .add(coded("lint again", ErrorCode::LINT_FAILED));
        assert!(chain.has_error(&ErrorCode::LINT_FAILED));
        assert!(!chain.has_error(&ErrorCode::UNKNOWN));
        assert_eq!(
            chain.find_by_code(&ErrorCode::LINT_FAILED).unwrap().message(),
            "lint"
        );
        assert!(chain.find_by_code(&ErrorCode::TEST_FAILED).is_none());
    }

    #[test]
    fn for_each_stops_at_first_error() {
        let mut chain = ErrorChain::new();
        chain
            .add(StructuredError::new("1"))
            .add(StructuredError::new("2"))
            .add(StructuredError::new("3"));
        let mut seen = Vec::new();
        let result = chain.for_each(|e| {
            seen.push(e.to_string());
            if seen.len() == 2 { Err("stop") } else { Ok(()) }
        });
        assert_eq!(result, Err("stop"));
        assert_eq!(seen, vec!["1", "2"]);
    }

    #[test]
    fn filter_preserves_order() {
        let mut chain = ErrorChain::new();
        chain
            .add(coded("a", ErrorCode::TIMEOUT).with_severity(Severity::Critical))
            .add(coded("b", ErrorCode::TIMEOUT))
            .add(coded("c", ErrorCode::TIMEOUT).with_severity(Severity::Fatal));
        let severe: Vec<_> = chain
            .filter(|e| e.severity() >= Severity::Critical)
            .into_iter()
            .map(|e| e.to_string())
            .collect();
        assert_eq!(severe, vec!["a", "c"]);
    }

    #[test]
    fn add_with_context_promotes_plain_error() {
        let mut chain = ErrorChain::new();
        let ctx = ErrorContext::new().operation("deploy").field("region", "eu");
        chain.add_with_context(io::Error::other("connection reset"), &ctx);

        let s = chain.first().unwrap().as_structured().unwrap();
        assert_eq!(s.message(), "connection reset");
        assert_eq!(s.context().operation.as_deref(), Some("deploy"));
        assert_eq!(s.context().fields["region"], "eu");
        assert!(s.cause().is_some());
    }

    #[test]
    fn add_with_context_overlays_structured_error() {
        let original = coded("compile", ErrorCode::COMPILE_FAILED)
            .with_resource("main.rs")
            .with_field("line", 3);
        let mut chain = ErrorChain::new();
        chain.add_with_context(original.clone(), &ErrorContext::new().user("ci"));

        let s = chain.first().unwrap().as_structured().unwrap();
        assert_eq!(s.code(), &ErrorCode::COMPILE_FAILED);
        assert_eq!(s.context().resource.as_deref(), Some("main.rs"));
        assert_eq!(s.context().user.as_deref(), Some("ci"));
        assert_eq!(s.context().fields["line"], 3);
        assert!(original.context().user.is_none());
    }

    #[test]
    fn collects_from_iterator() {
        let chain: ErrorChain = vec![StructuredError::new("a"), StructuredError::new("b")]
            .into_iter()
            .collect();
        assert_eq!(chain.count(), 2);
        assert_eq!((&chain).into_iter().count(), 2);
    }
}
