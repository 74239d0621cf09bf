// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 relflow contributors

//! Release results

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use super::definition::StepName;
use crate::errors::StepFailure;

/// How far the produced disk image got
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReleaseStatus {
    /// Signed, notarized and stapled
    Notarized,
    /// Signed, but notarization failed or did not run
    SignedOnly,
    /// No signature; Gatekeeper will prompt
    Unsigned,
}

impl fmt::Display for ReleaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Notarized => "notarized",
            Self::SignedOnly => "signed (not notarized)",
            Self::Unsigned => "unsigned",
        })
    }
}

/// How a single step ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepOutcome {
    Succeeded,
    /// Best-effort step failed; ignored
    Ignored,
    /// Failed without invalidating the artifact
    Degraded,
}

/// Record of one executed step
#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    pub name: StepName,
    pub outcome: StepOutcome,
    #[serde(rename = "duration_secs", serialize_with = "as_secs")]
    pub duration: Duration,
}

fn as_secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

/// Files produced by a release run
///
/// The pipeline does not own these paths; it only observes and produces
/// them.
#[derive(Debug, Clone, Serialize)]
pub struct BuildArtifact {
    /// Application bundle built by the build step
    pub bundle: PathBuf,

    /// `<product>-<version>.dmg`
    pub disk_image: PathBuf,

    pub status: ReleaseStatus,

    /// BLAKE3 of the disk image, when it exists after the run
    pub digest: Option<String>,

    /// Set when notarization failed but was not fatal
    pub notarization_failure: Option<StepFailure>,

    /// Steps executed in this run
    pub steps: Vec<StepRecord>,
}

impl BuildArtifact {
    /// Whether the artifact is usable but below the requested status
    pub fn is_degraded(&self) -> bool {
        self.notarization_failure.is_some()
    }

    pub fn outcome_of(&self, step: StepName) -> Option<&StepOutcome> {
        self.steps.iter().find(|r| r.name == step).map(|r| &r.outcome)
    }
}
