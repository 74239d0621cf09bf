// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 relflow contributors

//! # relflow - Release Flow for macOS apps
//!
//! `relflow` builds a Rust + Flutter desktop application and packages it
//! into a disk image, then either signs and notarizes the image or produces
//! an unsigned image with an advisory.
//!
//! ## Quick Start
//!
//! ```bash
//! # Unsigned release
//! relflow --version 1.2.3
//!
//! # Signed and notarized release
//! MACOS_CODESIGN_IDENTITY="Developer ID Application: Example" \
//!     relflow --version 1.2.3 --api-key-path ~/.p12/api-key.json
//!
//! # Retry only notarization after a network failure
//! relflow --version 1.2.3 --step notarize
//! ```

pub mod cli;
pub mod config;
pub mod errors;
pub mod executors;
pub mod pipeline;
pub mod utils;

// Re-export commonly used types
pub use config::{ReleaseConfig, ReleaseSettings};
pub use errors::{ReleaseError, ReleaseResult};
pub use pipeline::{BuildArtifact, ReleasePipeline, ReleaseStatus};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
