// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 relflow contributors

//! Release configuration
//!
//! A [`ReleaseConfig`] is resolved once at startup from command-line flags,
//! environment variables (through clap), the settings file and defaults, in
//! that order of precedence. It is immutable afterwards.

mod settings;

pub use settings::{ReleaseSettings, ToolSettings, SETTINGS_FILES};

use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::{ReleaseError, ReleaseResult};
use crate::pipeline::StepName;

/// Default location of the notarization API key, relative to `$HOME`
const DEFAULT_API_KEY: &str = ".p12/api-key.json";

/// Values given on the command line (or through their environment variables)
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub version: String,
    pub codesign_identity: Option<String>,
    pub api_key_path: Option<PathBuf>,
    pub product: Option<String>,
    pub bundle: Option<PathBuf>,
    pub require_notarization: bool,
}

/// Immutable configuration for one release run
#[derive(Debug, Clone, Serialize)]
pub struct ReleaseConfig {
    /// Release version, names the disk image
    pub version: String,

    /// Disk image prefix
    pub product: String,

    /// Signing identity; `None` selects the unsigned path
    pub codesign_identity: Option<String>,

    /// Notarization credential, only read in signed mode
    pub api_key_path: PathBuf,

    /// Fail the run when notarization fails
    pub require_notarization: bool,

    /// Directory every relative path is resolved against
    pub working_dir: PathBuf,

    /// Application bundle produced by the build
    pub bundle: PathBuf,

    pub ui_dir: PathBuf,
    pub rust_input: PathBuf,
    pub dart_output: PathBuf,
    pub c_output: PathBuf,
    pub build_script: PathBuf,
    pub build_args: Vec<String>,
    pub codegen_version: String,
    pub tools: ToolSettings,

    #[serde(skip)]
    timeouts: HashMap<StepName, Duration>,
}

impl ReleaseConfig {
    /// Resolve the configuration for a run in `working_dir`
    pub fn resolve(
        overrides: ConfigOverrides,
        settings: ReleaseSettings,
        working_dir: &Path,
    ) -> ReleaseResult<Self> {
        let version = overrides.version.trim().to_string();
        if version.is_empty() {
            return Err(ReleaseError::invalid_config(
                "version must not be empty",
                Some("Pass the release version with --version".into()),
            ));
        }
        reject_path_separator("version", &version)?;

        let product = overrides.product.unwrap_or(settings.product);
        if product.trim().is_empty() {
            return Err(ReleaseError::invalid_config("product must not be empty", None));
        }
        reject_path_separator("product", &product)?;

        let codesign_identity = non_empty(overrides.codesign_identity)
            .or_else(|| non_empty(settings.codesign_identity));

        let api_key_path = overrides
            .api_key_path
            .or(settings.api_key_path)
            .unwrap_or_else(default_api_key_path);

        let bundle = overrides
            .bundle
            .or(settings.bundle)
            .unwrap_or_else(|| default_bundle(&settings.ui_dir, &product));

        let timeouts = settings
            .timeouts
            .into_iter()
            .map(|(step, secs)| (step, Duration::from_secs(secs)))
            .collect();

        Ok(Self {
            version,
            product,
            codesign_identity,
            api_key_path: working_dir.join(api_key_path),
            require_notarization: overrides.require_notarization || settings.require_notarization,
            working_dir: working_dir.to_path_buf(),
            bundle: working_dir.join(bundle),
            ui_dir: settings.ui_dir,
            rust_input: settings.rust_input,
            dart_output: settings.dart_output,
            c_output: settings.c_output,
            build_script: settings.build_script,
            build_args: settings.build_args,
            codegen_version: settings.codegen_version,
            tools: settings.tools,
            timeouts,
        })
    }

    /// Whether the signed path is selected
    pub fn is_signed(&self) -> bool {
        self.codesign_identity.is_some()
    }

    /// `<product>-<version>.dmg`
    pub fn disk_image_name(&self) -> String {
        format!("{}-{}.dmg", self.product, self.version)
    }

    /// Absolute path of the disk image
    pub fn disk_image_path(&self) -> PathBuf {
        self.working_dir.join(self.disk_image_name())
    }

    /// Resolve a project-relative path
    pub fn path(&self, relative: &Path) -> PathBuf {
        self.working_dir.join(relative)
    }

    /// Timeout configured for `step`
    pub fn timeout(&self, step: StepName) -> Option<Duration> {
        self.timeouts.get(&step).copied()
    }

    /// Fail fast when the signed path cannot possibly finish
    pub fn validate_credentials(&self) -> ReleaseResult<()> {
        if self.is_signed() && !self.api_key_path.is_file() {
            return Err(ReleaseError::MissingCredential {
                path: self.api_key_path.clone(),
            });
        }
        Ok(())
    }
}

/// Both values end up in the disk image file name
fn reject_path_separator(field: &str, value: &str) -> ReleaseResult<()> {
    if value.contains(&['/', '\\'][..]) {
        return Err(ReleaseError::invalid_config(
            format!("{} '{}' contains a path separator", field, value),
            Some("The disk image is always written to the working directory".into()),
        ));
    }
    Ok(())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn default_api_key_path() -> PathBuf {
    directories::BaseDirs::new()
        .map(|dirs| dirs.home_dir().join(DEFAULT_API_KEY))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_API_KEY))
}

fn default_bundle(ui_dir: &Path, product: &str) -> PathBuf {
    ui_dir
        .join("build/macos/Build/Products/Release")
        .join(format!("{}.app", product))
}
