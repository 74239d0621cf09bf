// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 relflow contributors

//! Error types for release runs
//!
//! Every external step maps onto one failure class. The class decides the
//! process exit code and whether the disk image on disk is still usable.

mod recovery;

pub use recovery::RecoverySuggestion;

use miette::Diagnostic;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for relflow operations
pub type ReleaseResult<T> = Result<T, ReleaseError>;

/// Exit code for a successful run (including a degraded notarization)
pub const EXIT_SUCCESS: i32 = 0;
/// Exit code for any failure before the disk image is assembled
pub const EXIT_PRE_ASSEMBLY: i32 = 1;
/// Exit code for a packaging failure after the build succeeded
pub const EXIT_PACKAGING: i32 = 2;
/// Exit code for signing, or notarization under `--require-notarization`
pub const EXIT_SIGNING: i32 = 3;
/// Exit code for a cancelled run
pub const EXIT_CANCELLED: i32 = 130;

/// What went wrong inside a single pipeline step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepFailure {
    /// Step name, e.g. `build`
    pub step: String,

    /// Exit status of the external tool, `None` when the tool never ran
    /// or its result was rejected afterwards
    pub exit_code: Option<i32>,

    /// Captured standard error, or the reason the step was rejected
    pub detail: String,
}

impl StepFailure {
    /// Failure reported by a tool that exited with a non-zero status
    pub fn exited(step: &str, exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            step: step.to_string(),
            exit_code: Some(exit_code),
            detail: stderr.into(),
        }
    }

    /// Failure detected by relflow itself (missing precondition or output)
    pub fn rejected(step: &str, reason: impl Into<String>) -> Self {
        Self {
            step: step.to_string(),
            exit_code: None,
            detail: reason.into(),
        }
    }

    /// Captured stderr worth echoing to the user, if any
    pub fn stderr(&self) -> Option<&str> {
        let trimmed = self.detail.trim();
        (self.exit_code.is_some() && !trimmed.is_empty()).then_some(trimmed)
    }
}

impl fmt::Display for StepFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.exit_code {
            Some(code) => write!(f, "step '{}' exited with status {}", self.step, code),
            None => write!(f, "step '{}': {}", self.step, self.detail),
        }
    }
}

/// Failure class of a pipeline step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepClass {
    Toolchain,
    Dependency,
    Codegen,
    Build,
    Packaging,
    Signing,
    Notarization,
}

impl StepClass {
    /// Wrap a step failure into the error of this class
    pub fn error(self, failure: StepFailure) -> ReleaseError {
        match self {
            Self::Toolchain => ReleaseError::Toolchain(failure),
            Self::Dependency => ReleaseError::Dependency(failure),
            Self::Codegen => ReleaseError::Codegen(failure),
            Self::Build => ReleaseError::Build(failure),
            Self::Packaging => ReleaseError::Packaging(failure),
            Self::Signing => ReleaseError::Signing(failure),
            Self::Notarization => ReleaseError::Notarization(failure),
        }
    }
}

/// Main error type for relflow
#[derive(Error, Debug, Diagnostic)]
pub enum ReleaseError {
    // ─────────────────────────────────────────────────────────────────────────
    // Step Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Toolchain setup failed: {0}")]
    #[diagnostic(
        code(relflow::toolchain_failed),
        help("The code generator could not be installed. Check the cargo output above.")
    )]
    Toolchain(StepFailure),

    #[error("Dependency fetch failed: {0}")]
    #[diagnostic(code(relflow::dependency_failed))]
    Dependency(StepFailure),

    #[error("Binding generation failed: {0}")]
    #[diagnostic(
        code(relflow::codegen_failed),
        help("Check that the Rust FFI input compiles and the generator version matches")
    )]
    Codegen(StepFailure),

    #[error("Application build failed: {0}")]
    #[diagnostic(
        code(relflow::build_failed),
        help("Re-run with --verbose to see the build driver output")
    )]
    Build(StepFailure),

    #[error("Disk image packaging failed: {0}")]
    #[diagnostic(code(relflow::packaging_failed))]
    Packaging(StepFailure),

    #[error("Code signing failed: {0}")]
    #[diagnostic(
        code(relflow::signing_failed),
        help("Verify the identity with 'security find-identity -v -p codesigning'")
    )]
    Signing(StepFailure),

    #[error("Notarization failed: {0}")]
    #[diagnostic(
        code(relflow::notarization_failed),
        help("The disk image was produced; retry with '--step notarize'")
    )]
    Notarization(StepFailure),

    #[error("Step '{step}' was cancelled")]
    #[diagnostic(code(relflow::cancelled))]
    Cancelled { step: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Preflight Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Tool '{tool}' not found")]
    #[diagnostic(code(relflow::tool_not_found), help("{suggestion}"))]
    ToolNotFound { tool: String, suggestion: String },

    #[error("Notarization credential not found: {path}")]
    #[diagnostic(
        code(relflow::missing_credential),
        help("Pass --api-key-path or set MACOS_NOTARY_API_KEY_PATH to an existing API key file")
    )]
    MissingCredential { path: PathBuf },

    #[error("Invalid release configuration: {reason}")]
    #[diagnostic(code(relflow::invalid_config))]
    InvalidConfig {
        reason: String,
        #[help]
        help: Option<String>,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // IO/System Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Failed to read file '{path}': {error}")]
    #[diagnostic(code(relflow::file_read_error))]
    FileReadError { path: PathBuf, error: String },

    #[error("IO error: {message}")]
    #[diagnostic(code(relflow::io_error))]
    Io { message: String },

    #[error("YAML parsing error: {message}")]
    #[diagnostic(code(relflow::yaml_error))]
    Yaml { message: String },

    #[error("TOML parsing error: {message}")]
    #[diagnostic(code(relflow::toml_error))]
    Toml { message: String },

    #[error("JSON error: {message}")]
    #[diagnostic(code(relflow::json_error))]
    Json { message: String },
}

impl From<std::io::Error> for ReleaseError {
    fn from(e: std::io::Error) -> Self {
        Self::Io { message: e.to_string() }
    }
}

impl From<serde_yaml::Error> for ReleaseError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Yaml { message: e.to_string() }
    }
}

impl From<toml::de::Error> for ReleaseError {
    fn from(e: toml::de::Error) -> Self {
        Self::Toml { message: e.to_string() }
    }
}

impl From<serde_json::Error> for ReleaseError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json { message: e.to_string() }
    }
}

impl ReleaseError {
    /// Create a tool not found error with installation suggestion
    pub fn tool_not_found(tool: &str) -> Self {
        Self::ToolNotFound {
            tool: tool.to_string(),
            suggestion: RecoverySuggestion::install_tool(tool).action,
        }
    }

    /// Create an invalid configuration error
    pub fn invalid_config(reason: impl Into<String>, help: Option<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
            help,
        }
    }

    /// The step failure carried by this error, if it came from a step
    pub fn step_failure(&self) -> Option<&StepFailure> {
        match self {
            Self::Toolchain(f)
            | Self::Dependency(f)
            | Self::Codegen(f)
            | Self::Build(f)
            | Self::Packaging(f)
            | Self::Signing(f)
            | Self::Notarization(f) => Some(f),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Packaging(_) => EXIT_PACKAGING,
            Self::Signing(_) | Self::Notarization(_) => EXIT_SIGNING,
            Self::Cancelled { .. } => EXIT_CANCELLED,
            _ => EXIT_PRE_ASSEMBLY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_follow_failure_class() {
        let failure = StepFailure::exited("build", 1, "boom");
        assert_eq!(StepClass::Build.error(failure.clone()).exit_code(), 1);
        assert_eq!(StepClass::Toolchain.error(failure.clone()).exit_code(), 1);
        assert_eq!(StepClass::Packaging.error(failure.clone()).exit_code(), 2);
        assert_eq!(StepClass::Signing.error(failure.clone()).exit_code(), 3);
        assert_eq!(StepClass::Notarization.error(failure).exit_code(), 3);
        assert_eq!(
            ReleaseError::Cancelled { step: "build".into() }.exit_code(),
            EXIT_CANCELLED
        );
        assert_eq!(
            ReleaseError::MissingCredential { path: "key.json".into() }.exit_code(),
            EXIT_PRE_ASSEMBLY
        );
    }

    #[test]
    fn test_step_failure_display() {
        let exited = StepFailure::exited("sign-dmg", 5, "no identity found\n");
        assert_eq!(exited.to_string(), "step 'sign-dmg' exited with status 5");
        assert_eq!(exited.stderr(), Some("no identity found"));

        let rejected = StepFailure::rejected("generate-bindings", "missing output: a.h");
        assert_eq!(
            rejected.to_string(),
            "step 'generate-bindings': missing output: a.h"
        );
        assert_eq!(rejected.stderr(), None);
    }

    #[test]
    fn test_tool_not_found_carries_install_hint() {
        let err = ReleaseError::tool_not_found("create-dmg");
        match err {
            ReleaseError::ToolNotFound { suggestion, .. } => {
                assert!(suggestion.contains("create-dmg"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
