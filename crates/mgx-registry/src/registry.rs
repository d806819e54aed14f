// SPDX-License-Identifier: MIT OR Apache-2.0
//! Thread-safe catalogue of [`ErrorDefinition`]s.

use crate::definition::{ErrorDefinition, builtin_definitions};
use mgx_error::{ErrorCode, Failure, Severity, code_of};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use tracing::debug;

/// Errors from registry mutations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// The code already has a definition.
    #[error("error code {0} already registered")]
    AlreadyRegistered(ErrorCode),
    /// The code has no definition.
    #[error("error code {0} not found")]
    NotFound(ErrorCode),
}

/// Read-only view of error definitions.
///
/// Retry predicates depend on this trait rather than on [`ErrorRegistry`]
/// so they can be fed any source of definitions.
pub trait DefinitionLookup: Send + Sync {
    /// Definition for `code`, if known.
    fn lookup(&self, code: &ErrorCode) -> Option<ErrorDefinition>;

    /// Whether `failure`'s code is defined as retryable. Unknown codes and
    /// plain errors are not.
    fn is_retryable(&self, failure: &Failure) -> bool {
        self.lookup(&code_of(failure))
            .is_some_and(|def| def.retryable)
    }
}

/// Guarded map of error codes to their definitions.
#[derive(Debug, Default)]
pub struct ErrorRegistry {
    definitions: RwLock<HashMap<ErrorCode, ErrorDefinition>>,
}

impl ErrorRegistry {
    /// Registry with no definitions.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the built-in definitions.
    pub fn with_defaults() -> Self {
        let definitions = builtin_definitions()
            .into_iter()
            .map(|def| (def.code.clone(), def))
            .collect();
        Self {
            definitions: RwLock::new(definitions),
        }
    }

    /// Add a definition. Fails if the code is already present.
    pub fn register(&self, def: ErrorDefinition) -> Result<(), RegistryError> {
        let mut map = self
            .definitions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if map.contains_key(&def.code) {
            return Err(RegistryError::AlreadyRegistered(def.code));
        }
        debug!(target: "mgx.registry", code = %def.code, "registered error code");
        map.insert(def.code.clone(), def);
        Ok(())
    }

    /// Add a code with derived metadata.
    pub fn register_code(
        &self,
        code: impl Into<ErrorCode>,
        description: impl Into<String>,
        severity: Severity,
    ) -> Result<(), RegistryError> {
        self.register(ErrorDefinition::new(code.into(), description, severity))
    }

    /// Remove a code. Fails if the code is absent.
    pub fn unregister(&self, code: &ErrorCode) -> Result<ErrorDefinition, RegistryError> {
        let removed = self
            .definitions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(code);
        match removed {
            Some(def) => {
                debug!(target: "mgx.registry", code = %code, "unregistered error code");
                Ok(def)
            }
            None => Err(RegistryError::NotFound(code.clone())),
        }
    }

    /// Definition for `code`.
    pub fn get(&self, code: &ErrorCode) -> Option<ErrorDefinition> {
        self.definitions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(code)
            .cloned()
    }

    /// Whether `code` has a definition.
    pub fn contains(&self, code: &ErrorCode) -> bool {
        self.definitions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(code)
    }

    /// Number of definitions.
    pub fn len(&self) -> usize {
        self.definitions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All definitions, sorted by code.
    pub fn list(&self) -> Vec<ErrorDefinition> {
        self.list_where(|_| true)
    }

    /// Definitions whose code starts with `prefix`, sorted by code.
    pub fn list_by_prefix(&self, prefix: &str) -> Vec<ErrorDefinition> {
        self.list_where(|def| def.code.as_str().starts_with(prefix))
    }

    /// Definitions with exactly `severity`, sorted by code.
    pub fn list_by_severity(&self, severity: Severity) -> Vec<ErrorDefinition> {
        self.list_where(|def| def.severity == severity)
    }

    /// Drop every definition.
    pub fn clear(&self) {
        self.definitions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn list_where(&self, keep: impl Fn(&ErrorDefinition) -> bool) -> Vec<ErrorDefinition> {
        let mut out: Vec<ErrorDefinition> = self
            .definitions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|def| keep(*def))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.code.cmp(&b.code));
        out
    }
}

impl DefinitionLookup for ErrorRegistry {
    fn lookup(&self, code: &ErrorCode) -> Option<ErrorDefinition> {
        self.get(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mgx_error::StructuredError;
    use std::io;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn defaults_are_present() {
        let reg = ErrorRegistry::with_defaults();
        assert!(reg.contains(&ErrorCode::BUILD_FAILED));
        assert!(reg.contains(&ErrorCode::new("DEPLOY_FAILED")));
        assert!(!ErrorRegistry::empty().contains(&ErrorCode::BUILD_FAILED));
    }

    #[test]
    fn duplicate_registration_fails() {
        let reg = ErrorRegistry::with_defaults();
        let err = reg
            .register_code(ErrorCode::TIMEOUT, "again", Severity::Error)
            .unwrap_err();
        assert_eq!(err, RegistryError::AlreadyRegistered(ErrorCode::TIMEOUT));
        assert_eq!(err.to_string(), "error code TIMEOUT already registered");
    }

    #[test]
    fn unregister_missing_fails() {
        let reg = ErrorRegistry::empty();
        let err = reg.unregister(&ErrorCode::TIMEOUT).unwrap_err();
        assert_eq!(err.to_string(), "error code TIMEOUT not found");
    }

    #[test]
    fn register_then_unregister() {
        let reg = ErrorRegistry::empty();
        reg.register_code("CACHE_MISS", "cache miss", Severity::Info)
            .unwrap();
        assert_eq!(reg.len(), 1);
        let def = reg.unregister(&ErrorCode::new("CACHE_MISS")).unwrap();
        assert_eq!(def.description, "cache miss");
        assert!(reg.is_empty());
    }

    #[test]
    fn lists_are_sorted_and_filtered() {
        let reg = ErrorRegistry::with_defaults();
        let all = reg.list();
        assert!(all.windows(2).all(|w| w[0].code < w[1].code));

        let files: Vec<_> = reg
            .list_by_prefix("FILE_")
            .into_iter()
            .map(|d| d.code)
            .collect();
        assert_eq!(
            files,
            vec![ErrorCode::FILE_ACCESS_DENIED, ErrorCode::FILE_NOT_FOUND]
        );

        let warnings = reg.list_by_severity(Severity::Warning);
        assert!(warnings.iter().all(|d| d.severity == Severity::Warning));
        assert!(warnings.iter().any(|d| d.code == ErrorCode::NOT_FOUND));
    }

    #[test]
    fn clear_empties() {
        let reg = ErrorRegistry::with_defaults();
        reg.clear();
        assert!(reg.list().is_empty());
    }

    #[test]
    fn retryability_lookup() {
        let reg = ErrorRegistry::with_defaults();
        let timeout: Failure = StructuredError::new("t")
            .with_code(ErrorCode::TIMEOUT)
            .into();
        let lint: Failure = StructuredError::new("l")
            .with_code(ErrorCode::LINT_FAILED)
            .into();
        assert!(reg.is_retryable(&timeout));
        assert!(!reg.is_retryable(&lint));
        assert!(!reg.is_retryable(&Failure::foreign(io::Error::other("x"))));
    }

    #[test]
    fn concurrent_registration_admits_each_code_once() {
        let reg = Arc::new(ErrorRegistry::empty());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let reg = Arc::clone(&reg);
                thread::spawn(move || {
                    reg.register_code("RACE_CODE", "race", Severity::Error)
                        .is_ok()
                })
            })
            .collect();
        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(wins, 1);
    }
}
