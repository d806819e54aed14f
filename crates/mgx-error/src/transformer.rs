// SPDX-License-Identifier: MIT OR Apache-2.0
//! Rewriting failures before they are reported.
//!
//! An [`ErrorTransformer`] holds an ordered list of named rewrite steps plus
//! code and severity remapping tables. Steps are plain closures over
//! [`Failure`]; a few common ones ([`sanitize`], [`enrich`], [`retryable`])
//! and two combinators ([`conditional`], [`chain`]) ship with the crate.

use crate::{ErrorBuilder, ErrorCode, ErrorMatcher, Failure, Severity, StructuredError};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// A single rewrite step.
pub type TransformFn = Arc<dyn Fn(Failure) -> Failure + Send + Sync>;

const REDACTED: &str = "***";
const SENSITIVE: &[&str] = &["password", "passwd", "secret", "token", "key", "credential"];

// ---------------------------------------------------------------------------
// NamedTransformer
// ---------------------------------------------------------------------------

/// A rewrite step registered under a name and priority.
#[derive(Clone)]
pub struct NamedTransformer {
    name: String,
    priority: i32,
    func: TransformFn,
}

impl NamedTransformer {
    /// Registration name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Higher runs earlier.
    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Run the step.
    pub fn apply(&self, failure: Failure) -> Failure {
        (self.func)(failure)
    }
}

impl fmt::Debug for NamedTransformer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamedTransformer")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// ErrorTransformer
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Rules {
    codes: BTreeMap<ErrorCode, ErrorCode>,
    severities: BTreeMap<Severity, Severity>,
    steps: Vec<NamedTransformer>,
    disabled: bool,
}

/// Ordered pipeline of rewrite steps followed by code and severity remaps.
///
/// [`transform`](Self::transform) runs every registered step, highest
/// priority first (equal priorities keep registration order), then remaps
/// the code and severity of a structured result. Remaps look up the values
/// the error carried before remapping, so `A -> B` and `B -> C` do not
/// chain. Structured errors are never edited in place: every rewrite goes
/// through the copy-on-write `with_*` methods.
///
/// All methods take `&self`; one transformer can be shared across threads.
///
/// ```
/// use mgx_error::{ErrorCode, ErrorTransformer, Failure, StructuredError};
///
/// let t = ErrorTransformer::new();
/// t.transform_code(ErrorCode::PERMISSION_DENIED, ErrorCode::UNKNOWN);
/// let f = Failure::from(StructuredError::new("no").with_code(ErrorCode::PERMISSION_DENIED));
/// assert_eq!(t.transform(f).code(), &ErrorCode::UNKNOWN);
/// ```
#[derive(Default)]
pub struct ErrorTransformer {
    rules: RwLock<Rules>,
}

impl ErrorTransformer {
    /// Enabled transformer with no rules.
    pub fn new() -> Self {
        Self::default()
    }

    /// Hides resource details: sanitizes messages and collapses
    /// `NOT_FOUND` and `PERMISSION_DENIED` into `UNKNOWN`, reporting errors
    /// as warnings.
    pub fn security() -> Self {
        let t = Self::new();
        t.add(sanitize)
            .transform_code(ErrorCode::NOT_FOUND, ErrorCode::UNKNOWN)
            .transform_code(ErrorCode::PERMISSION_DENIED, ErrorCode::UNKNOWN)
            .transform_severity(Severity::Error, Severity::Warning);
        t
    }

    /// Tags errors as development output and marks transient-looking
    /// failures retryable.
    pub fn development() -> Self {
        let t = Self::new();
        t.add(enrich([
            ("environment", serde_json::json!("development")),
            ("debug", serde_json::json!(true)),
        ]))
        .add(retryable([
            "connection refused",
            "timeout",
            "temporary failure",
            "network",
        ]));
        t
    }

    /// Sanitizes, tags errors as production output, and lifts `Debug` to
    /// `Info`.
    pub fn production() -> Self {
        let t = Self::new();
        t.add(sanitize)
            .add(enrich([
                ("environment", serde_json::json!("production")),
                ("debug", serde_json::json!(false)),
            ]))
            .transform_severity(Severity::Debug, Severity::Info);
        t
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Rules> {
        self.rules.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Rules> {
        self.rules.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Remap `from` to `to`. A later rule for the same `from` replaces the
    /// earlier one.
    pub fn transform_code(&self, from: ErrorCode, to: ErrorCode) -> &Self {
        self.write().codes.insert(from, to);
        self
    }

    /// Remap severity `from` to `to`.
    pub fn transform_severity(&self, from: Severity, to: Severity) -> &Self {
        self.write().severities.insert(from, to);
        self
    }

    /// Register an anonymous step at priority 0, named `transformer_<n>`.
    pub fn add<F>(&self, f: F) -> &Self
    where
        F: Fn(Failure) -> Failure + Send + Sync + 'static,
    {
        let name = format!("transformer_{}", self.read().steps.len());
        self.add_named(name, f, 0)
    }

    /// Register a named step. Higher priorities run first.
    pub fn add_named<F>(&self, name: impl Into<String>, f: F, priority: i32) -> &Self
    where
        F: Fn(Failure) -> Failure + Send + Sync + 'static,
    {
        let step = NamedTransformer {
            name: name.into(),
            priority,
            func: Arc::new(f),
        };
        let mut rules = self.write();
        let at = rules
            .steps
            .iter()
            .position(|s| priority > s.priority)
            .unwrap_or(rules.steps.len());
        rules.steps.insert(at, step);
        drop(rules);
        self
    }

    /// Drop the first step registered under `name`, if any.
    pub fn remove(&self, name: &str) -> &Self {
        let mut rules = self.write();
        if let Some(at) = rules.steps.iter().position(|s| s.name == name) {
            rules.steps.remove(at);
        }
        drop(rules);
        self
    }

    /// Turn the whole pipeline on or off. A disabled transformer returns
    /// its input untouched.
    pub fn set_enabled(&self, enabled: bool) {
        self.write().disabled = !enabled;
    }

    /// Whether the pipeline runs.
    pub fn is_enabled(&self) -> bool {
        !self.read().disabled
    }

    /// Registered steps in execution order.
    pub fn transformers(&self) -> Vec<NamedTransformer> {
        self.read().steps.clone()
    }

    /// Drop every step and remap rule. The enabled flag is kept.
    pub fn clear(&self) {
        let mut rules = self.write();
        rules.codes.clear();
        rules.severities.clear();
        rules.steps.clear();
    }

    /// Run the pipeline over `failure`.
    pub fn transform(&self, failure: Failure) -> Failure {
        let rules = self.read();
        if rules.disabled {
            return failure;
        }
        let mut current = failure;
        for step in &rules.steps {
            current = step.apply(current);
        }
        match current {
            Failure::Structured(s) => Failure::Structured(remap(&rules, s)),
            foreign => foreign,
        }
    }

    /// Run the pipeline over the error of `result`, if any.
    pub fn transform_result<T>(&self, result: Result<T, Failure>) -> Result<T, Failure> {
        result.map_err(|f| self.transform(f))
    }
}

fn remap(rules: &Rules, err: StructuredError) -> StructuredError {
    let severity = err.severity();
    let mut out = match rules.codes.get(err.code()) {
        Some(to) => err.with_code(to.clone()),
        None => err,
    };
    if let Some(to) = rules.severities.get(&severity) {
        out = out.with_severity(*to);
    }
    out
}

impl fmt::Debug for ErrorTransformer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rules = self.read();
        f.debug_struct("ErrorTransformer")
            .field("enabled", &!rules.disabled)
            .field("codes", &rules.codes)
            .field("severities", &rules.severities)
            .field("steps", &rules.steps)
            .finish()
    }
}

// ── Built-in steps ──────────────────────────────────────────────────

/// Redact credentials.
///
/// Every `name=value` word whose name looks sensitive (`password`,
/// `token`, `api_key`, ...) becomes `name=***` in the rendered message,
/// and sensitive context fields are replaced with `"***"`. The result has
/// no cause, since the cause's text is already folded into the message.
/// Code and severity survive, including those of a structured error found
/// deeper in a foreign failure's chain.
pub fn sanitize(failure: Failure) -> Failure {
    let message = sanitize_text(&failure.to_string());
    let builder = match failure.find_structured() {
        Some(s) => {
            let mut context = s.context().clone();
            for (k, v) in context.fields.iter_mut() {
                if is_sensitive(k) {
                    *v = serde_json::Value::String(REDACTED.to_string());
                }
            }
            ErrorBuilder::new()
                .code(s.code().clone())
                .severity(s.severity())
                .context(context)
        }
        None => ErrorBuilder::new(),
    };
    builder.message(message).build().into()
}

fn is_sensitive(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    SENSITIVE.iter().any(|s| name.contains(s))
}

fn sanitize_text(text: &str) -> String {
    text.split(' ')
        .map(|word| match word.split_once('=') {
            Some((name, _)) if is_sensitive(name) => format!("{name}={REDACTED}"),
            _ => word.to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Step adding `fields` to structured errors. Foreign failures pass
/// through.
pub fn enrich<K, V>(
    fields: impl IntoIterator<Item = (K, V)>,
) -> impl Fn(Failure) -> Failure + Send + Sync + 'static
where
    K: Into<String>,
    V: Serialize,
{
    let fields: BTreeMap<String, serde_json::Value> = fields
        .into_iter()
        .filter_map(|(k, v)| serde_json::to_value(v).ok().map(|v| (k.into(), v)))
        .collect();
    move |failure| match failure {
        Failure::Structured(s) => s.with_fields(fields.clone()).into(),
        foreign => foreign,
    }
}

/// Step setting a boolean `retryable` field on structured errors: `true`
/// when the rendered message contains any of `patterns`, ignoring case.
/// Foreign failures pass through.
pub fn retryable<S: Into<String>>(
    patterns: impl IntoIterator<Item = S>,
) -> impl Fn(Failure) -> Failure + Send + Sync + 'static {
    let patterns: Vec<String> = patterns
        .into_iter()
        .map(|p| p.into().to_lowercase())
        .collect();
    move |failure| match failure {
        Failure::Structured(s) => {
            let text = s.to_string().to_lowercase();
            let hit = patterns.iter().any(|p| text.contains(p.as_str()));
            s.with_field("retryable", hit).into()
        }
        foreign => foreign,
    }
}

/// Step running `step` only on failures `matcher` accepts.
pub fn conditional<F>(
    matcher: ErrorMatcher,
    step: F,
) -> impl Fn(Failure) -> Failure + Send + Sync + 'static
where
    F: Fn(Failure) -> Failure + Send + Sync + 'static,
{
    move |failure| {
        if matcher.matches(&failure) {
            step(failure)
        } else {
            failure
        }
    }
}

/// Step running `steps` in order.
pub fn chain(steps: Vec<TransformFn>) -> impl Fn(Failure) -> Failure + Send + Sync + 'static {
    move |failure| steps.iter().fold(failure, |acc, step| step(acc))
}
