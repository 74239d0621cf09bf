// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 relflow contributors

//! Settings file structures
//!
//! Defines the schema for `.relflow.yaml` / `.relflow.toml`. Every field has
//! a default, so an absent file behaves like an empty one.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::errors::ReleaseError;
use crate::pipeline::StepName;

/// File names probed in the working directory, in order
pub const SETTINGS_FILES: &[&str] = &[".relflow.yaml", ".relflow.yml", ".relflow.toml"];

/// Project-level release settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReleaseSettings {
    /// Disk image prefix: `<product>-<version>.dmg`
    pub product: String,

    /// Application bundle produced by the build
    pub bundle: Option<PathBuf>,

    /// Flutter project directory
    pub ui_dir: PathBuf,

    /// Rust file holding the FFI surface
    pub rust_input: PathBuf,

    /// Generated Dart bindings
    pub dart_output: PathBuf,

    /// Generated C header
    pub c_output: PathBuf,

    /// Build driver script
    pub build_script: PathBuf,

    /// Arguments selecting the UI-integrated build
    pub build_args: Vec<String>,

    /// Pinned code generator version
    pub codegen_version: String,

    /// Signing identity (overridden by flag and environment)
    pub codesign_identity: Option<String>,

    /// Notarization API key (overridden by flag and environment)
    pub api_key_path: Option<PathBuf>,

    /// Treat a notarization failure as fatal
    pub require_notarization: bool,

    /// External programs
    pub tools: ToolSettings,

    /// Per-step timeouts in seconds
    pub timeouts: HashMap<StepName, u64>,
}

impl Default for ReleaseSettings {
    fn default() -> Self {
        Self {
            product: "product".into(),
            bundle: None,
            ui_dir: "flutter".into(),
            rust_input: "src/flutter_ffi.rs".into(),
            dart_output: "flutter/lib/generated_bridge.dart".into(),
            c_output: "flutter/macos/Runner/bridge_generated.h".into(),
            build_script: "build.py".into(),
            build_args: vec!["--flutter".into()],
            codegen_version: "1.80.1".into(),
            codesign_identity: None,
            api_key_path: None,
            require_notarization: false,
            tools: ToolSettings::default(),
            timeouts: HashMap::new(),
        }
    }
}

impl ReleaseSettings {
    /// Load settings from a YAML or TOML file (chosen by extension)
    pub fn from_file(path: &Path) -> Result<Self, ReleaseError> {
        let content = std::fs::read_to_string(path).map_err(|e| ReleaseError::FileReadError {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml(&content),
            _ => Self::from_yaml(&content),
        }
    }

    /// Parse settings from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ReleaseError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(yaml).map_err(Into::into)
    }

    /// Parse settings from a TOML string
    pub fn from_toml(text: &str) -> Result<Self, ReleaseError> {
        toml::from_str(text).map_err(Into::into)
    }

    /// Load the first settings file found in `dir`, or defaults
    pub fn discover(dir: &Path) -> Result<Self, ReleaseError> {
        for name in SETTINGS_FILES {
            let candidate = dir.join(name);
            if candidate.is_file() {
                tracing::debug!("Using settings from {}", candidate.display());
                return Self::from_file(&candidate);
            }
        }
        Ok(Self::default())
    }
}

/// Programs invoked by the pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolSettings {
    pub cargo: String,
    pub flutter: String,
    pub codegen: String,
    pub python: String,
    pub codesign: String,
    pub xattr: String,
    pub create_dmg: String,
    pub notary: String,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            cargo: "cargo".into(),
            flutter: "flutter".into(),
            codegen: "flutter_rust_bridge_codegen".into(),
            python: "python3".into(),
            codesign: "codesign".into(),
            xattr: "xattr".into(),
            create_dmg: "create-dmg".into(),
            notary: "rcodesign".into(),
        }
    }
}
