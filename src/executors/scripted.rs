// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 relflow contributors

//! Scripted runner for pipeline tests
//!
//! Records every invocation and answers with canned results per step.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::{CommandRunner, ExecutionResult, ToolCommand};
use crate::errors::ReleaseError;

/// One recorded command
#[derive(Debug, Clone)]
pub struct Invocation {
    pub step: String,
    pub command: ToolCommand,
}

#[derive(Debug, Clone, Default)]
struct Script {
    exit_code: i32,
    stderr: String,
    creates: Vec<(PathBuf, Vec<u8>)>,
    hang: bool,
    interrupt: bool,
}

/// Runner that never spawns anything
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    scripts: HashMap<String, Script>,
    missing: HashSet<String>,
    invocations: Mutex<Vec<Invocation>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `step` exit with `exit_code` and `stderr`
    pub fn fail(mut self, step: &str, exit_code: i32, stderr: &str) -> Self {
        let script = self.scripts.entry(step.to_string()).or_default();
        script.exit_code = exit_code;
        script.stderr = stderr.to_string();
        self
    }

    /// Make `step` write `contents` to `path`
    pub fn creates(mut self, step: &str, path: impl Into<PathBuf>, contents: &[u8]) -> Self {
        self.scripts
            .entry(step.to_string())
            .or_default()
            .creates
            .push((path.into(), contents.to_vec()));
        self
    }

    /// Make `step` block until cancelled
    pub fn hang(mut self, step: &str) -> Self {
        self.scripts.entry(step.to_string()).or_default().hang = true;
        self
    }

    /// Make `step` behave like a terminal Ctrl-C: the token fires and the
    /// child exits with status 130 on its own
    pub fn interrupted(mut self, step: &str) -> Self {
        let script = self.scripts.entry(step.to_string()).or_default();
        script.interrupt = true;
        script.exit_code = 130;
        self
    }

    /// Report `program` as not installed
    pub fn missing_tool(mut self, program: &str) -> Self {
        self.missing.insert(program.to_string());
        self
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Names of the steps that invoked a command, in order
    pub fn steps_run(&self) -> Vec<String> {
        self.invocations().into_iter().map(|i| i.step).collect()
    }

    pub fn ran(&self, step: &str) -> bool {
        self.invocations().iter().any(|i| i.step == step)
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(
        &self,
        step: &str,
        command: &ToolCommand,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult, ReleaseError> {
        self.invocations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Invocation {
                step: step.to_string(),
                command: command.clone(),
            });

        let script = self.scripts.get(step).cloned().unwrap_or_default();

        if script.hang {
            cancel.cancelled().await;
            return Err(ReleaseError::Cancelled {
                step: step.to_string(),
            });
        }

        for (path, contents) in &script.creates {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(path, contents).await?;
        }

        if script.interrupt {
            cancel.cancel();
        }

        if script.exit_code == 0 {
            Ok(ExecutionResult::success(String::new()))
        } else {
            Ok(ExecutionResult::failure(script.stderr, script.exit_code))
        }
    }

    async fn check_available(&self, program: &str) -> bool {
        !self.missing.contains(program)
    }
}
