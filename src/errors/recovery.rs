// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 relflow contributors

//! Error recovery suggestions
//!
//! Provides actionable suggestions for recovering from errors.

use std::path::Path;

/// A recovery suggestion with concrete steps
#[derive(Debug, Clone)]
pub struct RecoverySuggestion {
    /// Brief description of what to do
    pub action: String,
    /// Detailed steps
    pub steps: Vec<String>,
    /// Commands to run
    pub commands: Vec<String>,
}

impl RecoverySuggestion {
    /// Suggest installing a missing tool
    ///
    /// `tool` may be a bare program name or a configured path; only the
    /// file name is used to pick the suggestion.
    pub fn install_tool(tool: &str) -> Self {
        let name = Path::new(tool)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(tool);

        match name {
            "codesign" | "xattr" => Self {
                action: format!("Install the Xcode command line tools to get '{}'", name),
                steps: vec![format!("'{}' ships with the macOS developer tools", name)],
                commands: vec!["xcode-select --install".into()],
            },
            "create-dmg" => Self {
                action: "Install create-dmg: brew install create-dmg".into(),
                steps: vec!["create-dmg builds the drag-to-install disk image".into()],
                commands: vec!["brew install create-dmg".into()],
            },
            "rcodesign" => Self {
                action: "Install rcodesign: cargo install apple-codesign".into(),
                steps: vec!["rcodesign submits the disk image for notarization".into()],
                commands: vec!["cargo install apple-codesign".into()],
            },
            "flutter" => Self {
                action: "Install Flutter and ensure 'flutter' is in your PATH".into(),
                steps: vec!["Flutter resolves the UI dependencies".into()],
                commands: vec![
                    "# See https://docs.flutter.dev/get-started/install/macos".into(),
                    "flutter doctor".into(),
                ],
            },
            "flutter_rust_bridge_codegen" => Self {
                action: "Install flutter_rust_bridge_codegen with cargo".into(),
                steps: vec![
                    "The ensure-toolchain step installs the generator".into(),
                    "Run it first or install the generator manually".into(),
                ],
                commands: vec!["cargo install flutter_rust_bridge_codegen --features uuid".into()],
            },
            _ => Self {
                action: format!("Install {} and ensure it's in your PATH", name),
                steps: vec![],
                commands: vec![],
            },
        }
    }

    /// Suggest re-running a single step after a transient failure
    pub fn retry_step(step: &str, version: &str) -> Self {
        Self {
            action: format!("Re-run the '{}' step", step),
            steps: vec![
                "Earlier artifacts are still on disk".into(),
                "Only the failed step needs to run again".into(),
            ],
            commands: vec![format!("relflow --version {} --step {}", version, step)],
        }
    }
}

impl std::fmt::Display for RecoverySuggestion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "→ {}", self.action)?;

        for step in &self.steps {
            writeln!(f, "  {}", step)?;
        }

        if !self.commands.is_empty() {
            writeln!(f)?;
            for cmd in &self.commands {
                writeln!(f, "  {}", cmd)?;
            }
        }

        Ok(())
    }
}
