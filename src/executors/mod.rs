// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 relflow contributors

//! Command runners
//!
//! Every external tool the release touches goes through a [`CommandRunner`].
//! The real implementation spawns processes; tests swap in a scripted one.

mod process;
#[cfg(test)]
pub mod scripted;

pub use process::ProcessRunner;

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::errors::ReleaseError;

/// An external command line, fully resolved
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolCommand {
    /// Program name or path
    pub program: String,

    /// Arguments, passed verbatim
    pub args: Vec<String>,

    /// Working directory for the child
    pub cwd: PathBuf,

    /// Kill the child after this long
    #[serde(skip)]
    pub timeout: Option<Duration>,
}

impl ToolCommand {
    pub fn new(program: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.into(),
            timeout: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Whether any argument equals `needle`
    pub fn has_arg(&self, needle: &str) -> bool {
        self.args.iter().any(|a| a == needle)
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " '{}'", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

/// Result of running one command
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// Whether the command exited with status 0
    pub success: bool,

    /// Standard output
    pub stdout: String,

    /// Standard error
    pub stderr: String,

    /// Exit code, -1 when the process never ran or was killed
    pub exit_code: i32,
}

impl ExecutionResult {
    /// Create a successful result
    pub fn success(stdout: String) -> Self {
        Self {
            success: true,
            stdout,
            stderr: String::new(),
            exit_code: 0,
        }
    }

    /// Create a failed result
    pub fn failure(stderr: String, exit_code: i32) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr,
            exit_code,
        }
    }
}

/// Runs external commands on behalf of pipeline steps
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `command` for the step named `step`
    ///
    /// A non-zero exit is reported through [`ExecutionResult`], not as an
    /// error. [`ReleaseError::Cancelled`] is returned once `cancel` has
    /// fired, after the child and everything it spawned have been killed,
    /// even if the child exited on its own in the meantime.
    async fn run(
        &self,
        step: &str,
        command: &ToolCommand,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult, ReleaseError>;

    /// Check whether `program` can be found
    async fn check_available(&self, program: &str) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_quotes_whitespace() {
        let cmd = ToolCommand::new("codesign", ".")
            .args(["-s", "Developer ID Application: Example"])
            .arg("App.app");
        assert_eq!(
            cmd.to_string(),
            "codesign -s 'Developer ID Application: Example' App.app"
        );
        assert!(cmd.has_arg("-s"));
        assert!(!cmd.has_arg("--deep"));
    }
}
