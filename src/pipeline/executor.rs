// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 relflow contributors

//! Release pipeline executor
//!
//! Runs the steps of a [`ReleasePlan`] strictly one after another. A step
//! only starts after the previous one reported success; the two best-effort
//! unsigned steps and a non-fatal notarization are the only failures that
//! do not stop the run.

use colored::Colorize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::definition::{PipelineStep, StepAction, StepName};
use super::outcome::{BuildArtifact, ReleaseStatus, StepOutcome, StepRecord};
use super::plan::{ReleasePlan, SigningMode};
use crate::config::ReleaseConfig;
use crate::errors::{ReleaseError, ReleaseResult, StepClass, StepFailure};
use crate::executors::CommandRunner;
use crate::utils;

/// Pipeline execution options
#[derive(Debug, Clone, Default)]
pub struct ExecutionOptions {
    /// Only run these steps (empty runs all)
    pub steps: Vec<StepName>,
    /// Echo captured stderr of failed steps
    pub verbose: bool,
    /// Suppress progress output
    pub quiet: bool,
}

/// Result of running one step
struct StepRun {
    duration: Duration,
    failure: Option<StepFailure>,
    /// A precondition was missing; never downgraded to a warning
    fatal: bool,
}

/// The release pipeline
pub struct ReleasePipeline {
    runner: Arc<dyn CommandRunner>,
    cancel: CancellationToken,
    options: ExecutionOptions,
}

impl ReleasePipeline {
    /// Create a pipeline running commands through `runner`
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            cancel: CancellationToken::new(),
            options: ExecutionOptions::default(),
        }
    }

    /// Use a caller-supplied cancellation token
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_options(mut self, options: ExecutionOptions) -> Self {
        self.options = options;
        self
    }

    /// Validate `config` and build the plan for this run
    ///
    /// Runs before any external command, so a signed release without a
    /// credential fails before the build starts.
    pub fn plan(&self, config: &ReleaseConfig) -> ReleaseResult<ReleasePlan> {
        config.validate_credentials()?;
        ReleasePlan::for_config(config).select(&self.options.steps)
    }

    /// Check that every tool the plan needs is installed
    pub async fn preflight(&self, plan: &ReleasePlan) -> ReleaseResult<()> {
        for tool in plan.required_tools() {
            if !self.runner.check_available(&tool).await {
                return Err(ReleaseError::tool_not_found(&tool));
            }
        }
        Ok(())
    }

    /// Run the release described by `config`
    pub async fn run(&self, config: &ReleaseConfig) -> ReleaseResult<BuildArtifact> {
        let start = Instant::now();
        let plan = self.plan(config)?;
        self.preflight(&plan).await?;

        if !self.options.quiet {
            print_plan(config, &plan);
        }

        let mut records = Vec::with_capacity(plan.steps.len());
        let mut notarization_failure = None;
        let mut notarized = false;

        for step in &plan.steps {
            if self.cancel.is_cancelled() {
                return Err(ReleaseError::Cancelled {
                    step: step.name.to_string(),
                });
            }

            let run = self.execute_step(step).await?;
            let outcome = match run.failure {
                None => {
                    self.report(|| {
                        utils::print_success(&format!(
                            "{} ({:.2}s)",
                            step.name.as_str().bold(),
                            run.duration.as_secs_f64()
                        ))
                    });
                    if step.name == StepName::Notarize {
                        notarized = true;
                    }
                    StepOutcome::Succeeded
                }
                Some(failure) if !run.fatal && step.best_effort => {
                    debug!("Ignoring failure of best-effort step: {}", failure);
                    self.report(|| utils::print_skipped(&format!("{} (ignored)", step.name)));
                    StepOutcome::Ignored
                }
                Some(failure)
                    if !run.fatal
                        && step.class == StepClass::Notarization
                        && !config.require_notarization =>
                {
                    info!("Notarization failed, disk image left signed only: {}", failure);
                    self.report(|| {
                        utils::print_warning(&format!("{} failed (continuing)", step.name))
                    });
                    notarization_failure = Some(failure);
                    StepOutcome::Degraded
                }
                Some(failure) => {
                    self.report(|| utils::print_error(&format!("{} failed", step.name)));
                    if self.options.verbose {
                        if let Some(stderr) = failure.stderr() {
                            eprintln!("{}", stderr.dimmed());
                        }
                    }
                    return Err(step.class.error(failure));
                }
            };

            info!(step = %step.name, elapsed_secs = run.duration.as_secs_f64(), "step finished");
            records.push(StepRecord {
                name: step.name,
                outcome,
                duration: run.duration,
            });
        }

        let status = match plan.mode {
            SigningMode::Unsigned => ReleaseStatus::Unsigned,
            SigningMode::Signed if notarized => ReleaseStatus::Notarized,
            SigningMode::Signed => ReleaseStatus::SignedOnly,
        };

        if plan.mode == SigningMode::Unsigned && plan.contains(StepName::CreateDmg) {
            self.print_unsigned_advisory(config);
        }

        let disk_image = config.disk_image_path();
        let digest = if disk_image.is_file() {
            Some(digest_file(disk_image.clone()).await?)
        } else {
            None
        };

        let duration = start.elapsed();
        self.report(|| {
            eprintln!();
            eprintln!(
                "{}",
                format!("Release finished in {:.2}s ({})", duration.as_secs_f64(), status).green()
            );
        });

        Ok(BuildArtifact {
            bundle: config.bundle.clone(),
            disk_image,
            status,
            digest,
            notarization_failure,
            steps: records,
        })
    }

    /// Execute a single step
    async fn execute_step(&self, step: &PipelineStep) -> ReleaseResult<StepRun> {
        let start = Instant::now();
        let name = step.name.as_str();

        for path in &step.requires {
            if !path.exists() {
                return Ok(StepRun {
                    duration: start.elapsed(),
                    failure: Some(StepFailure::rejected(
                        name,
                        format!("required path {} does not exist", path.display()),
                    )),
                    fatal: true,
                });
            }
        }

        if let Some(ref output) = step.fresh_output {
            if remove_if_present(output).await? {
                debug!("Removed previous {}", output.display());
            }
        }

        let mut failure = match &step.action {
            StepAction::RemoveFile { path } => {
                if remove_if_present(path).await? {
                    info!("Removed stale artifact {}", path.display());
                }
                None
            }
            StepAction::Command(cmd) => {
                let spinner = (!self.options.quiet && step.name.is_long_running())
                    .then(|| utils::create_spinner(&step.description));
                if spinner.is_none() {
                    self.report(|| utils::print_info(&format!("{}...", name)));
                }

                let result = self.runner.run(name, cmd, &self.cancel).await;

                if let Some(spinner) = spinner {
                    spinner.finish_and_clear();
                }

                // A child killed by the same Ctrl-C can report a plain
                // failure before the runner sees the token
                let result = result.and_then(|result| {
                    if !result.success && self.cancel.is_cancelled() {
                        Err(ReleaseError::Cancelled {
                            step: name.to_string(),
                        })
                    } else {
                        Ok(result)
                    }
                });

                let result = match result {
                    Ok(result) => result,
                    Err(e) => {
                        self.report(|| utils::print_error(&format!("{} cancelled", name)));
                        for output in step.partial_outputs() {
                            discard_partial(output).await;
                        }
                        return Err(e);
                    }
                };

                (!result.success)
                    .then(|| StepFailure::exited(name, result.exit_code, result.stderr))
            }
        };

        if failure.is_none() {
            failure = step
                .produces
                .iter()
                .find(|p| !p.exists())
                .map(|p| {
                    StepFailure::rejected(
                        name,
                        format!("expected output {} was not produced", p.display()),
                    )
                });
        }

        if failure.is_some() {
            for output in step.partial_outputs() {
                discard_partial(output).await;
            }
        }

        Ok(StepRun {
            duration: start.elapsed(),
            failure,
            fatal: false,
        })
    }

    fn report(&self, print: impl FnOnce()) {
        if !self.options.quiet {
            print();
        }
    }

    fn print_unsigned_advisory(&self, config: &ReleaseConfig) {
        let name = config.disk_image_name();
        info!("{} is unsigned", name);
        self.report(|| {
            eprintln!();
            utils::print_warning(&format!(
                "{} is NOT signed or notarized. Gatekeeper will block it on first launch;",
                name
            ));
            eprintln!("    users must right-click the app and choose Open, or run:");
            eprintln!("    {}", "xattr -cr /Applications/<App>.app".cyan());
        });
    }
}

/// Delete `path`, treating absence as success
async fn remove_if_present(path: &Path) -> ReleaseResult<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(ReleaseError::Io {
            message: format!("failed to remove {}: {}", path.display(), e),
        }),
    }
}

async fn discard_partial(path: &Path) {
    match remove_if_present(path).await {
        Ok(true) => debug!("Removed partial {}", path.display()),
        Ok(false) => {}
        Err(e) => warn!("{}", e),
    }
}

/// BLAKE3 of a file, hashed off the async runtime
async fn digest_file(path: PathBuf) -> ReleaseResult<String> {
    let digest = tokio::task::spawn_blocking(move || -> std::io::Result<String> {
        let mut file = std::fs::File::open(&path)?;
        let mut hasher = blake3::Hasher::new();
        std::io::copy(&mut file, &mut hasher)?;
        Ok(hasher.finalize().to_hex().to_string())
    })
    .await
    .map_err(|e| ReleaseError::Io {
        message: format!("digest task failed: {}", e),
    })??;

    Ok(digest)
}

/// Print the execution plan
fn print_plan(config: &ReleaseConfig, plan: &ReleasePlan) {
    let mode = match plan.mode {
        SigningMode::Signed => "signed",
        SigningMode::Unsigned => "unsigned",
    };

    eprintln!();
    utils::print_header(&format!(
        "Release {} {} ({})",
        config.product, config.version, mode
    ));
    eprintln!(
        "Execution plan ({} step{}):",
        plan.steps.len(),
        if plan.steps.len() == 1 { "" } else { "s" }
    );
    eprintln!();
    for (i, step) in plan.steps.iter().enumerate() {
        eprint!("  {}. {} {}", i + 1, step.name.as_str().bold(), step.description.dimmed());
        if step.best_effort {
            eprint!(" {}", "[best effort]".dimmed());
        }
        eprintln!();
    }
    eprintln!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigOverrides, ReleaseSettings};
    use crate::executors::scripted::ScriptedRunner;
    use tempfile::TempDir;

    const SIGNING_STEPS: &[&str] = &["sign-bundle", "sign-dmg", "notarize"];

    struct Project {
        dir: TempDir,
    }

    impl Project {
        /// A project tree with the inputs every step requires
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let root = dir.path();
            std::fs::create_dir_all(root.join("flutter")).unwrap();
            std::fs::create_dir_all(root.join("src")).unwrap();
            std::fs::write(root.join("src/flutter_ffi.rs"), "").unwrap();
            std::fs::write(root.join("build.py"), "").unwrap();
            Self { dir }
        }

        fn root(&self) -> &Path {
            self.dir.path()
        }

        fn config(&self, identity: Option<&str>) -> ReleaseConfig {
            ReleaseConfig::resolve(
                ConfigOverrides {
                    version: "1.2.3".into(),
                    codesign_identity: identity.map(Into::into),
                    api_key_path: Some("api-key.json".into()),
                    ..Default::default()
                },
                ReleaseSettings::default(),
                self.root(),
            )
            .unwrap()
        }

        fn with_credential(self) -> Self {
            std::fs::write(self.root().join("api-key.json"), "{}").unwrap();
            self
        }

        fn dmg(&self) -> PathBuf {
            self.root().join("product-1.2.3.dmg")
        }

        /// A runner whose codegen, build and packaging steps leave their
        /// outputs on disk
        fn runner(&self) -> ScriptedRunner {
            let config = self.config(None);
            ScriptedRunner::new()
                .creates("generate-bindings", config.path(&config.dart_output), b"// dart")
                .creates("generate-bindings", config.path(&config.c_output), b"// c")
                .creates("build", config.bundle.join("Contents/Info.plist"), b"<plist/>")
                .creates("create-dmg", self.dmg(), b"disk image bytes")
        }
    }

    fn pipeline(runner: &Arc<ScriptedRunner>) -> ReleasePipeline {
        ReleasePipeline::new(runner.clone()).with_options(ExecutionOptions {
            quiet: true,
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_unsigned_release_never_signs() {
        let project = Project::new();
        let runner = Arc::new(project.runner());

        let artifact = pipeline(&runner).run(&project.config(None)).await.unwrap();

        assert_eq!(artifact.status, ReleaseStatus::Unsigned);
        assert_eq!(artifact.disk_image, project.dmg());
        assert!(project.dmg().is_file());
        assert!(artifact.digest.is_some());
        assert_eq!(
            runner.steps_run(),
            vec![
                "ensure-toolchain",
                "fetch-dependencies",
                "generate-bindings",
                "build",
                "strip-signature",
                "strip-attributes",
                "create-dmg",
            ]
        );
        for invocation in runner.invocations() {
            assert!(!SIGNING_STEPS.contains(&invocation.step.as_str()));
            assert!(!invocation.command.has_arg("-s"));
            assert_ne!(invocation.command.program, "rcodesign");
        }
    }

    #[tokio::test]
    async fn test_best_effort_failures_are_ignored() {
        let project = Project::new();
        let runner = Arc::new(
            project
                .runner()
                .fail("strip-signature", 1, "code object is not signed at all")
                .fail("strip-attributes", 1, "xattr: permission denied"),
        );

        let artifact = pipeline(&runner).run(&project.config(None)).await.unwrap();

        assert_eq!(artifact.outcome_of(StepName::StripSignature), Some(&StepOutcome::Ignored));
        assert_eq!(artifact.outcome_of(StepName::StripAttributes), Some(&StepOutcome::Ignored));
        assert_eq!(artifact.outcome_of(StepName::CreateDmg), Some(&StepOutcome::Succeeded));
        assert!(project.dmg().is_file());
    }

    #[tokio::test]
    async fn test_signed_release_is_notarized() {
        let project = Project::new().with_credential();
        let runner = Arc::new(project.runner());

        let artifact = pipeline(&runner)
            .run(&project.config(Some("Developer ID")))
            .await
            .unwrap();

        assert_eq!(artifact.status, ReleaseStatus::Notarized);
        assert!(!artifact.is_degraded());
        assert_eq!(
            &runner.steps_run()[4..],
            &["sign-bundle", "create-dmg", "sign-dmg", "notarize"]
        );
        assert!(!runner.ran("strip-signature"));
    }

    #[tokio::test]
    async fn test_notarization_failure_is_degraded_by_default() {
        let project = Project::new().with_credential();
        let runner = Arc::new(project.runner().fail("notarize", 1, "network unreachable"));

        let artifact = pipeline(&runner).run(&project.config(Some("X"))).await.unwrap();

        assert_eq!(artifact.status, ReleaseStatus::SignedOnly);
        assert!(artifact.is_degraded());
        let failure = artifact.notarization_failure.unwrap();
        assert_eq!(failure.exit_code, Some(1));
        assert_eq!(failure.detail, "network unreachable");
        assert!(project.dmg().is_file());
    }

    #[tokio::test]
    async fn test_notarization_failure_fatal_when_required() {
        let project = Project::new().with_credential();
        let runner = Arc::new(project.runner().fail("notarize", 1, "rejected"));
        let mut config = project.config(Some("X"));
        config.require_notarization = true;

        let err = pipeline(&runner).run(&config).await.unwrap_err();

        assert!(matches!(err, ReleaseError::Notarization(_)));
        assert_eq!(err.exit_code(), 3);
        assert!(project.dmg().is_file());
    }

    #[tokio::test]
    async fn test_missing_credential_fails_before_any_step() {
        let project = Project::new();
        let runner = Arc::new(project.runner());

        let err = pipeline(&runner).run(&project.config(Some("X"))).await.unwrap_err();

        assert!(matches!(err, ReleaseError::MissingCredential { .. }));
        assert_eq!(err.exit_code(), 1);
        assert!(runner.invocations().is_empty());
    }

    #[tokio::test]
    async fn test_missing_tool_fails_preflight() {
        let project = Project::new();
        let runner = Arc::new(project.runner().missing_tool("create-dmg"));

        let err = pipeline(&runner).run(&project.config(None)).await.unwrap_err();

        assert!(matches!(err, ReleaseError::ToolNotFound { ref tool, .. } if tool == "create-dmg"));
        assert!(runner.invocations().is_empty());
    }

    #[tokio::test]
    async fn test_build_failure_stops_pipeline() {
        let project = Project::new();
        std::fs::write(project.dmg(), b"stale").unwrap();
        let runner = Arc::new(project.runner().fail("build", 2, "linker error"));

        let err = pipeline(&runner).run(&project.config(None)).await.unwrap_err();

        match &err {
            ReleaseError::Build(failure) => {
                assert_eq!(failure.step, "build");
                assert_eq!(failure.exit_code, Some(2));
                assert_eq!(failure.stderr(), Some("linker error"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(err.exit_code(), 1);
        assert_eq!(runner.steps_run().last().map(String::as_str), Some("build"));
        assert!(!runner.ran("create-dmg"));
        assert!(!runner.ran("strip-signature"));
        // The stale image is only removed after a successful build
        assert_eq!(std::fs::read(project.dmg()).unwrap(), b"stale");
    }

    #[tokio::test]
    async fn test_codegen_missing_output_is_codegen_error() {
        let project = Project::new();
        let config = project.config(None);
        let runner = Arc::new(
            ScriptedRunner::new()
                .creates("generate-bindings", config.path(&config.dart_output), b"// dart"),
        );

        let err = pipeline(&runner).run(&config).await.unwrap_err();

        match err {
            ReleaseError::Codegen(failure) => {
                assert_eq!(failure.exit_code, None);
                assert!(failure.detail.contains("bridge_generated.h"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!runner.ran("build"));
    }

    #[tokio::test]
    async fn test_packaging_failure_removes_partial_image() {
        let project = Project::new();
        let runner = Arc::new(project.runner().fail("create-dmg", 1, "hdiutil: create failed"));

        let err = pipeline(&runner).run(&project.config(None)).await.unwrap_err();

        assert!(matches!(err, ReleaseError::Packaging(_)));
        assert_eq!(err.exit_code(), 2);
        assert!(!project.dmg().exists());
    }

    #[tokio::test]
    async fn test_rerun_with_stale_image_is_byte_identical() {
        let project = Project::new();
        let runner = Arc::new(project.runner());

        let first = pipeline(&runner).run(&project.config(None)).await.unwrap();
        let first_bytes = std::fs::read(project.dmg()).unwrap();
        let second = pipeline(&runner).run(&project.config(None)).await.unwrap();

        assert_eq!(first.digest, second.digest);
        assert_eq!(std::fs::read(project.dmg()).unwrap(), first_bytes);
    }

    #[tokio::test]
    async fn test_cancel_during_build() {
        let project = Project::new();
        let runner = Arc::new(project.runner().hang("build"));
        let cancel = CancellationToken::new();
        let pipeline = pipeline(&runner).with_cancellation(cancel.clone());

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        });

        let err = pipeline.run(&project.config(None)).await.unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(err.exit_code(), crate::errors::EXIT_CANCELLED);
        assert!(!runner.ran("create-dmg"));
        assert!(!project.dmg().exists());
    }

    #[tokio::test]
    async fn test_interrupted_child_is_cancelled_not_failed() {
        let project = Project::new();
        let runner = Arc::new(project.runner().interrupted("build"));

        let err = pipeline(&runner).run(&project.config(None)).await.unwrap_err();

        assert!(err.is_cancelled(), "unexpected error: {err:?}");
        assert_eq!(err.exit_code(), crate::errors::EXIT_CANCELLED);
        assert!(!runner.ran("create-dmg"));
    }

    #[tokio::test]
    async fn test_interrupted_packaging_removes_partial_image() {
        let project = Project::new();
        let runner = Arc::new(project.runner().interrupted("create-dmg"));

        let err = pipeline(&runner).run(&project.config(None)).await.unwrap_err();

        assert!(err.is_cancelled());
        assert!(!project.dmg().exists());
    }

    #[tokio::test]
    async fn test_sign_dmg_failure_leaves_no_unsigned_image() {
        let project = Project::new().with_credential();
        let runner = Arc::new(project.runner().fail("sign-dmg", 1, "errSecInternalComponent"));

        let err = pipeline(&runner).run(&project.config(Some("X"))).await.unwrap_err();

        assert!(matches!(err, ReleaseError::Signing(ref f) if f.step == "sign-dmg"));
        assert_eq!(err.exit_code(), 3);
        assert!(runner.ran("create-dmg"));
        assert!(!runner.ran("notarize"));
        assert!(!project.dmg().exists());
    }

    #[tokio::test]
    async fn test_single_step_rerun_requires_prior_artifacts() {
        let project = Project::new().with_credential();
        let runner = Arc::new(project.runner());
        let pipeline = ReleasePipeline::new(runner.clone()).with_options(ExecutionOptions {
            steps: vec![StepName::Notarize],
            quiet: true,
            ..Default::default()
        });

        let err = pipeline.run(&project.config(Some("X"))).await.unwrap_err();
        assert!(matches!(err, ReleaseError::Notarization(ref f) if f.exit_code.is_none()));
        assert!(runner.invocations().is_empty());

        std::fs::write(project.dmg(), b"signed image").unwrap();
        let artifact = pipeline.run(&project.config(Some("X"))).await.unwrap();
        assert_eq!(artifact.status, ReleaseStatus::Notarized);
        assert_eq!(runner.steps_run(), vec!["notarize"]);
    }
}
