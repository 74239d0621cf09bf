// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 relflow contributors

//! CLI definition and handlers
//!
//! Defines the command-line interface for relflow.

pub mod run;

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use crate::config::ConfigOverrides;
use crate::pipeline::StepName;

/// Build, package, sign and notarize a macOS release
#[derive(Parser, Debug)]
#[clap(
    name = "relflow",
    about = "Build, package, sign and notarize a macOS disk image",
    long_about = None,
    disable_version_flag = true,
    after_help = "Examples:\n\
        relflow --version 1.2.3                          Unsigned release\n\
        relflow --version 1.2.3 --codesign-identity ID   Signed and notarized release\n\
        relflow --version 1.2.3 --step notarize          Retry a single step\n\
        relflow --version 1.2.3 --dry-run                Show the plan only\n\n\
        Exit codes: 0 success, 1 failure before packaging, 2 packaging failure,\n\
        3 signing/notarization failure, 130 cancelled."
)]
pub struct Cli {
    /// Release version, used to name the disk image
    #[clap(long, value_name = "VERSION")]
    pub version: String,

    /// Code-signing identity; selects the signed path
    #[clap(long, env = "MACOS_CODESIGN_IDENTITY", value_name = "ID")]
    pub codesign_identity: Option<String>,

    /// Notarization API key (default: ~/.p12/api-key.json)
    #[clap(long, env = "MACOS_NOTARY_API_KEY_PATH", value_name = "PATH")]
    pub api_key_path: Option<PathBuf>,

    /// Disk image prefix (`<product>-<version>.dmg`)
    #[clap(long, value_name = "NAME")]
    pub product: Option<String>,

    /// Application bundle produced by the build
    #[clap(long, value_name = "PATH")]
    pub bundle: Option<PathBuf>,

    /// Settings file (default: .relflow.yaml if present)
    #[clap(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Run only these steps
    #[clap(long = "step", value_enum, value_name = "STEP")]
    pub steps: Vec<StepName>,

    /// Fail with exit code 3 when notarization fails
    #[clap(long)]
    pub require_notarization: bool,

    /// Dry run (show what would be done)
    #[clap(long)]
    pub dry_run: bool,

    /// Output format for the result
    #[clap(short, long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Enable verbose output
    #[clap(short, long)]
    pub verbose: bool,

    /// Change to directory before executing
    #[clap(short = 'C', long, value_name = "DIR")]
    pub directory: Option<PathBuf>,
}

impl Cli {
    /// Configuration values carried by flags and their environment variables
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            version: self.version.clone(),
            codesign_identity: self.codesign_identity.clone(),
            api_key_path: self.api_key_path.clone(),
            product: self.product.clone(),
            bundle: self.bundle.clone(),
            require_notarization: self.require_notarization,
        }
    }
}

/// Output format for results
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}
