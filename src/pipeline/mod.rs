// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 relflow contributors

//! Release pipeline
//!
//! This module defines the steps of a release, the plan built from a
//! configuration, the executor that runs it and the artifact it returns.

mod definition;
mod executor;
mod outcome;
mod plan;

pub use definition::{PipelineStep, StepAction, StepName};
pub use executor::{ExecutionOptions, ReleasePipeline};
pub use outcome::{BuildArtifact, ReleaseStatus, StepOutcome, StepRecord};
pub use plan::{ReleasePlan, SigningMode};
