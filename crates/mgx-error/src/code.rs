// SPDX-License-Identifier: MIT OR Apache-2.0
//! Stable, string-backed error codes.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

/// Machine-readable, stable error code (e.g. `BUILD_FAILED`).
///
/// Codes are opaque strings: equality is by content and they are used as
/// map keys throughout the workspace. Existing codes are never renamed;
/// new ones are additive, and callers may mint their own with
/// [`ErrorCode::new`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ErrorCode(Cow<'static, str>);

macro_rules! codes {
    ($($(#[$doc:meta])* $name:ident = $text:literal;)+) => {
        impl ErrorCode {
            $(
                $(#[$doc])*
                pub const $name: ErrorCode = ErrorCode(Cow::Borrowed($text));
            )+

            /// Every code that ships with the crate, in declaration order.
            pub const BUILTIN: &'static [ErrorCode] = &[$(ErrorCode::$name),+];
        }
    };
}

codes! {
    // -- General --
    /// Catch-all for failures that carry no better classification.
    UNKNOWN = "UNKNOWN";
    /// Unexpected internal failure.
    INTERNAL = "INTERNAL";
    /// An argument failed validation.
    INVALID_ARGUMENT = "INVALID_ARGUMENT";
    /// A requested entity does not exist.
    NOT_FOUND = "NOT_FOUND";
    /// The entity being created already exists.
    ALREADY_EXISTS = "ALREADY_EXISTS";
    /// The caller lacks permission.
    PERMISSION_DENIED = "PERMISSION_DENIED";
    /// A quota or resource limit was hit.
    RESOURCE_EXHAUSTED = "RESOURCE_EXHAUSTED";
    /// The operation was canceled.
    CANCELED = "CANCELED";
    /// The operation timed out.
    TIMEOUT = "TIMEOUT";
    /// The operation is not implemented.
    NOT_IMPLEMENTED = "NOT_IMPLEMENTED";
    /// A dependency is temporarily unavailable.
    UNAVAILABLE = "UNAVAILABLE";

    // -- Build --
    /// The build as a whole failed.
    BUILD_FAILED = "BUILD_FAILED";
    /// Compilation failed.
    COMPILE_FAILED = "COMPILE_FAILED";
    /// Tests failed.
    TEST_FAILED = "TEST_FAILED";
    /// Linting failed.
    LINT_FAILED = "LINT_FAILED";
    /// Packaging failed.
    PACKAGE_FAILED = "PACKAGE_FAILED";
    /// A dependency could not be resolved or is broken.
    DEPENDENCY_ERROR = "DEPENDENCY_ERROR";

    // -- Environment --
    /// A required environment variable is not set.
    ENV_VAR_NOT_SET = "ENV_VAR_NOT_SET";
    /// An environment variable holds an invalid value.
    INVALID_ENV_VALUE = "INVALID_ENV_VALUE";

    // -- Files --
    /// A file does not exist.
    FILE_NOT_FOUND = "FILE_NOT_FOUND";
    /// A file could not be accessed.
    FILE_ACCESS_DENIED = "FILE_ACCESS_DENIED";
    /// A file already exists.
    FILE_EXISTS = "FILE_EXISTS";
    /// A directory already exists.
    DIRECTORY_EXISTS = "DIRECTORY_EXISTS";
    /// A path was expected to be a directory.
    NOT_A_DIRECTORY = "NOT_A_DIRECTORY";
    /// A path was expected to be a regular file.
    NOT_A_FILE = "NOT_A_FILE";

    // -- Configuration --
    /// No configuration could be found.
    CONFIG_NOT_FOUND = "CONFIG_NOT_FOUND";
    /// Configuration is semantically invalid.
    CONFIG_INVALID = "CONFIG_INVALID";
    /// Configuration could not be parsed.
    CONFIG_PARSE_FAILED = "CONFIG_PARSE_FAILED";

    // -- Commands --
    /// An external command exited unsuccessfully.
    COMMAND_FAILED = "COMMAND_FAILED";
    /// An external command could not be found.
    COMMAND_NOT_FOUND = "COMMAND_NOT_FOUND";
    /// An external command timed out.
    COMMAND_TIMEOUT = "COMMAND_TIMEOUT";
    /// An external command was canceled.
    COMMAND_CANCELED = "COMMAND_CANCELED";

    // -- Security --
    /// A security check failed.
    SECURITY_FAILED = "SECURITY_FAILED";
    /// The caller is not authenticated.
    UNAUTHORIZED = "UNAUTHORIZED";

    // -- Formatting --
    /// A formatting check failed.
    FORMAT_CHECK_FAILED = "FORMAT_CHECK_FAILED";
}

impl ErrorCode {
    /// Mint a code from any string. Prefer the associated constants for
    /// codes that ship with the crate.
    pub fn new(code: impl Into<Cow<'static, str>>) -> Self {
        Self(code.into())
    }

    /// The code's stable string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lower-cased leading segment of the code (`BUILD_FAILED` → `build`),
    /// or `general` for single-segment codes.
    pub fn category(&self) -> String {
        match self.0.split_once('_') {
            Some((head, _)) => head.to_ascii_lowercase(),
            None => "general".to_string(),
        }
    }
}

impl Default for ErrorCode {
    fn default() -> Self {
        Self::UNKNOWN
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for ErrorCode {
    fn from(code: &'static str) -> Self {
        Self(Cow::Borrowed(code))
    }
}

impl From<String> for ErrorCode {
    fn from(code: String) -> Self {
        Self(Cow::Owned(code))
    }
}

impl AsRef<str> for ErrorCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
