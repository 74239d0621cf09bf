// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 relflow contributors

//! Release plan
//!
//! Turns a [`ReleaseConfig`] into the ordered list of steps for its signing
//! mode. The first five steps are shared; the tail depends on whether a
//! signing identity is configured.

use serde::Serialize;
use std::path::Path;

use super::definition::{PipelineStep, StepAction, StepName};
use crate::config::ReleaseConfig;
use crate::errors::{ReleaseError, ReleaseResult, StepClass};
use crate::executors::ToolCommand;

/// Which termination path the release takes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SigningMode {
    Signed,
    Unsigned,
}

/// Ordered steps for one release run
#[derive(Debug, Clone, Serialize)]
pub struct ReleasePlan {
    pub mode: SigningMode,
    pub steps: Vec<PipelineStep>,
}

fn lossy(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

impl ReleasePlan {
    /// Build the full plan for `config`
    pub fn for_config(config: &ReleaseConfig) -> Self {
        let mut steps = vec![
            ensure_toolchain(config),
            fetch_dependencies(config),
            generate_bindings(config),
            build(config),
            clean_stale_artifact(config),
        ];

        let mode = match &config.codesign_identity {
            Some(identity) => {
                steps.push(sign_bundle(config, identity));
                steps.push(create_dmg(config));
                steps.push(sign_dmg(config, identity));
                steps.push(notarize(config));
                SigningMode::Signed
            }
            None => {
                steps.push(strip_signature(config));
                steps.push(strip_attributes(config));
                steps.push(create_dmg(config));
                SigningMode::Unsigned
            }
        };

        for step in &mut steps {
            if let StepAction::Command(cmd) = &mut step.action {
                cmd.timeout = config.timeout(step.name);
            }
        }

        Self { mode, steps }
    }

    /// Keep only the named steps, preserving pipeline order
    ///
    /// An empty selection keeps everything. Naming a step that does not
    /// belong to this signing mode is a configuration error.
    pub fn select(mut self, names: &[StepName]) -> ReleaseResult<Self> {
        if names.is_empty() {
            return Ok(self);
        }

        for name in names {
            if !self.contains(*name) {
                let mode = match self.mode {
                    SigningMode::Signed => "signed",
                    SigningMode::Unsigned => "unsigned",
                };
                return Err(ReleaseError::invalid_config(
                    format!("step '{}' is not part of the {} release", name, mode),
                    Some(match self.mode {
                        SigningMode::Signed => {
                            "Signing steps replace strip-signature and strip-attributes".into()
                        }
                        SigningMode::Unsigned => {
                            "Set --codesign-identity or MACOS_CODESIGN_IDENTITY to sign".into()
                        }
                    }),
                ));
            }
        }

        self.steps.retain(|s| names.contains(&s.name));
        Ok(self)
    }

    pub fn contains(&self, name: StepName) -> bool {
        self.steps.iter().any(|s| s.name == name)
    }

    pub fn step_names(&self) -> Vec<StepName> {
        self.steps.iter().map(|s| s.name).collect()
    }

    /// Programs that must already be installed before the plan starts
    ///
    /// A tool installed by an earlier step of the same plan is skipped.
    pub fn required_tools(&self) -> Vec<String> {
        let mut installed: Vec<&str> = Vec::new();
        let mut tools: Vec<String> = Vec::new();

        for step in &self.steps {
            if let Some(program) = step.program() {
                if !installed.contains(&program) && !tools.iter().any(|t| t == program) {
                    tools.push(program.to_string());
                }
            }
            if let Some(ref tool) = step.installs_tool {
                installed.push(tool.as_str());
            }
        }

        tools
    }
}

fn ensure_toolchain(config: &ReleaseConfig) -> PipelineStep {
    let cmd = ToolCommand::new(&config.tools.cargo, &config.working_dir)
        .args(["install", "flutter_rust_bridge_codegen", "--version"])
        .arg(&config.codegen_version)
        .args(["--features", "uuid"]);

    PipelineStep::command(
        StepName::EnsureToolchain,
        StepClass::Toolchain,
        format!("Install flutter_rust_bridge_codegen {}", config.codegen_version),
        cmd,
    )
    .installs_tool(&config.tools.codegen)
}

fn fetch_dependencies(config: &ReleaseConfig) -> PipelineStep {
    let ui_dir = config.path(&config.ui_dir);
    let cmd = ToolCommand::new(&config.tools.flutter, &ui_dir).args(["pub", "get"]);

    PipelineStep::command(
        StepName::FetchDependencies,
        StepClass::Dependency,
        "Resolve UI dependencies",
        cmd,
    )
    .requires(ui_dir)
}

fn generate_bindings(config: &ReleaseConfig) -> PipelineStep {
    let cmd = ToolCommand::new(&config.tools.codegen, &config.working_dir)
        .arg("--rust-input")
        .arg(lossy(&config.rust_input))
        .arg("--dart-output")
        .arg(lossy(&config.dart_output))
        .arg("--c-output")
        .arg(lossy(&config.c_output));

    PipelineStep::command(
        StepName::GenerateBindings,
        StepClass::Codegen,
        "Generate FFI bindings",
        cmd,
    )
    .requires(config.path(&config.rust_input))
    .produces(config.path(&config.dart_output))
    .produces(config.path(&config.c_output))
}

fn build(config: &ReleaseConfig) -> PipelineStep {
    let cmd = ToolCommand::new(&config.tools.python, &config.working_dir)
        .arg(lossy(&config.build_script))
        .args(config.build_args.iter().cloned());

    PipelineStep::command(StepName::Build, StepClass::Build, "Build the application", cmd)
        .requires(config.path(&config.build_script))
        .produces(&config.bundle)
}

fn clean_stale_artifact(config: &ReleaseConfig) -> PipelineStep {
    let path = config.disk_image_path();
    PipelineStep {
        name: StepName::CleanStaleArtifact,
        description: format!("Remove stale {}", config.disk_image_name()),
        action: StepAction::RemoveFile { path },
        class: StepClass::Packaging,
        requires: Vec::new(),
        produces: Vec::new(),
        fresh_output: None,
        discard_on_failure: None,
        best_effort: false,
        installs_tool: None,
    }
}

fn sign_bundle(config: &ReleaseConfig, identity: &str) -> PipelineStep {
    let cmd = codesign(config, identity).arg(lossy(&config.bundle)).arg("-vvv");

    PipelineStep::command(
        StepName::SignBundle,
        StepClass::Signing,
        "Sign the application bundle (hardened runtime)",
        cmd,
    )
    .requires(&config.bundle)
}

fn sign_dmg(config: &ReleaseConfig, identity: &str) -> PipelineStep {
    let dmg = config.disk_image_path();
    let cmd = codesign(config, identity).arg(lossy(&dmg)).arg("-vvv");

    PipelineStep::command(StepName::SignDmg, StepClass::Signing, "Sign the disk image", cmd)
        .requires(&dmg)
        .discard_on_failure(dmg)
}

fn codesign(config: &ReleaseConfig, identity: &str) -> ToolCommand {
    ToolCommand::new(&config.tools.codesign, &config.working_dir)
        .args(["--force", "--options", "runtime", "-s"])
        .arg(identity)
        .args(["--deep", "--strict"])
}

fn notarize(config: &ReleaseConfig) -> PipelineStep {
    let dmg = config.disk_image_path();
    let cmd = ToolCommand::new(&config.tools.notary, &config.working_dir)
        .args(["notary-submit", "--api-key-path"])
        .arg(lossy(&config.api_key_path))
        .arg("--staple")
        .arg(lossy(&dmg));

    PipelineStep::command(
        StepName::Notarize,
        StepClass::Notarization,
        "Notarize and staple the disk image",
        cmd,
    )
    .requires(dmg)
    .requires(&config.api_key_path)
}

fn strip_signature(config: &ReleaseConfig) -> PipelineStep {
    let cmd = ToolCommand::new(&config.tools.codesign, &config.working_dir)
        .arg("--remove-signature")
        .arg(lossy(&config.bundle));

    PipelineStep::command(
        StepName::StripSignature,
        StepClass::Signing,
        "Remove any existing signature",
        cmd,
    )
    .best_effort()
}

fn strip_attributes(config: &ReleaseConfig) -> PipelineStep {
    let cmd = ToolCommand::new(&config.tools.xattr, &config.working_dir)
        .arg("-cr")
        .arg(lossy(&config.bundle));

    PipelineStep::command(
        StepName::StripAttributes,
        StepClass::Signing,
        "Clear extended attributes",
        cmd,
    )
    .best_effort()
}

fn create_dmg(config: &ReleaseConfig) -> PipelineStep {
    let dmg = config.disk_image_path();
    let app = config
        .bundle
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| format!("{}.app", config.product));

    let cmd = ToolCommand::new(&config.tools.create_dmg, &config.working_dir)
        .arg("--volname")
        .arg(&config.product)
        .args(["--window-size", "800", "400"])
        .arg("--icon")
        .arg(&app)
        .args(["200", "190"])
        .arg("--hide-extension")
        .arg(&app)
        .args(["--app-drop-link", "600", "185"])
        .arg(lossy(&dmg))
        .arg(lossy(&config.bundle));

    PipelineStep::command(
        StepName::CreateDmg,
        StepClass::Packaging,
        format!("Create {}", config.disk_image_name()),
        cmd,
    )
    .requires(&config.bundle)
    .fresh_output(&dmg)
    .produces(dmg)
}
