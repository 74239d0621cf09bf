// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 relflow contributors

//! Pipeline step definitions

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::errors::StepClass;
use crate::executors::ToolCommand;

/// Every step the release pipeline knows, in pipeline order
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum StepName {
    EnsureToolchain,
    FetchDependencies,
    GenerateBindings,
    Build,
    CleanStaleArtifact,
    SignBundle,
    StripSignature,
    StripAttributes,
    CreateDmg,
    SignDmg,
    Notarize,
}

impl StepName {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::EnsureToolchain => "ensure-toolchain",
            Self::FetchDependencies => "fetch-dependencies",
            Self::GenerateBindings => "generate-bindings",
            Self::Build => "build",
            Self::CleanStaleArtifact => "clean-stale-artifact",
            Self::SignBundle => "sign-bundle",
            Self::StripSignature => "strip-signature",
            Self::StripAttributes => "strip-attributes",
            Self::CreateDmg => "create-dmg",
            Self::SignDmg => "sign-dmg",
            Self::Notarize => "notarize",
        }
    }

    /// Steps that can take minutes and get a spinner
    pub fn is_long_running(self) -> bool {
        matches!(self, Self::EnsureToolchain | Self::Build | Self::Notarize)
    }
}

impl fmt::Display for StepName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a step does when it runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepAction {
    /// Run an external tool
    Command(ToolCommand),
    /// Delete a file if present
    RemoveFile { path: PathBuf },
}

/// One named step of the release
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStep {
    pub name: StepName,

    /// Human-readable summary for plans and progress output
    pub description: String,

    pub action: StepAction,

    /// Error class used when the step fails
    pub class: StepClass,

    /// Paths that must exist before the step starts
    pub requires: Vec<PathBuf>,

    /// Paths that must exist after the step succeeds
    pub produces: Vec<PathBuf>,

    /// Artifact recreated by this step: removed before it runs and again if
    /// the step fails, so no partial file survives
    pub fresh_output: Option<PathBuf>,

    /// Existing artifact this step finishes in place; deleted if the step
    /// fails so a half-finished file is not left at the output path
    pub discard_on_failure: Option<PathBuf>,

    /// Log and ignore failures
    pub best_effort: bool,

    /// Tool this step installs, exempting it from the preflight check
    pub installs_tool: Option<String>,
}

impl PipelineStep {
    /// A step running an external command
    pub fn command(
        name: StepName,
        class: StepClass,
        description: impl Into<String>,
        command: ToolCommand,
    ) -> Self {
        Self {
            name,
            description: description.into(),
            action: StepAction::Command(command),
            class,
            requires: Vec::new(),
            produces: Vec::new(),
            fresh_output: None,
            discard_on_failure: None,
            best_effort: false,
            installs_tool: None,
        }
    }

    pub fn requires(mut self, path: impl Into<PathBuf>) -> Self {
        self.requires.push(path.into());
        self
    }

    pub fn produces(mut self, path: impl Into<PathBuf>) -> Self {
        self.produces.push(path.into());
        self
    }

    pub fn fresh_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.fresh_output = Some(path.into());
        self
    }

    pub fn discard_on_failure(mut self, path: impl Into<PathBuf>) -> Self {
        self.discard_on_failure = Some(path.into());
        self
    }

    /// Files removed when this step fails or is cancelled
    pub fn partial_outputs(&self) -> impl Iterator<Item = &PathBuf> {
        self.fresh_output.iter().chain(self.discard_on_failure.iter())
    }

    pub fn best_effort(mut self) -> Self {
        self.best_effort = true;
        self
    }

    pub fn installs_tool(mut self, tool: impl Into<String>) -> Self {
        self.installs_tool = Some(tool.into());
        self
    }

    /// External program run by this step, if any
    pub fn program(&self) -> Option<&str> {
        match &self.action {
            StepAction::Command(cmd) => Some(cmd.program.as_str()),
            StepAction::RemoveFile { .. } => None,
        }
    }

    /// Command line or action as shown in plans
    pub fn display_action(&self) -> String {
        match &self.action {
            StepAction::Command(cmd) => cmd.to_string(),
            StepAction::RemoveFile { path } => format!("remove {}", path.display()),
        }
    }
}
