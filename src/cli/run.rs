// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 relflow contributors

//! Run command - resolve the configuration and execute the release

use colored::Colorize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::{Cli, OutputFormat};
use crate::config::{ReleaseConfig, ReleaseSettings};
use crate::errors::{RecoverySuggestion, ReleaseError, ReleaseResult, EXIT_SUCCESS};
use crate::executors::ProcessRunner;
use crate::pipeline::{BuildArtifact, ExecutionOptions, ReleasePipeline, ReleasePlan, StepName};
use crate::utils;

/// Run the release and return the process exit code
pub async fn run(cli: Cli) -> ReleaseResult<i32> {
    let working_dir = std::env::current_dir()?;

    let settings = match &cli.config {
        Some(path) => ReleaseSettings::from_file(&working_dir.join(path))?,
        None => ReleaseSettings::discover(&working_dir)?,
    };
    let config = ReleaseConfig::resolve(cli.overrides(), settings, &working_dir)?;

    let cancel = CancellationToken::new();
    let watcher = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping the current step");
            watcher.cancel();
        }
    });

    let pipeline = ReleasePipeline::new(Arc::new(ProcessRunner::new()))
        .with_cancellation(cancel)
        .with_options(ExecutionOptions {
            steps: cli.steps.clone(),
            verbose: cli.verbose,
            quiet: false,
        });

    if cli.dry_run {
        let plan = pipeline.plan(&config)?;
        print_dry_run(&config, &plan, cli.format)?;
        pipeline.preflight(&plan).await?;
        return Ok(EXIT_SUCCESS);
    }

    let artifact = pipeline.run(&config).await?;
    print_artifact(&config, &artifact, cli.format)?;

    Ok(EXIT_SUCCESS)
}

/// Print an error with its captured tool output and a recovery hint
pub fn report_error(err: ReleaseError) {
    let stderr = err
        .step_failure()
        .and_then(|f| f.stderr())
        .map(str::to_string);
    let suggestion = match &err {
        ReleaseError::ToolNotFound { tool, .. } => Some(RecoverySuggestion::install_tool(tool)),
        _ => None,
    };

    eprintln!("{:?}", miette::Report::new(err));

    if let Some(stderr) = stderr {
        eprintln!("{}", "stderr:".bold());
        for line in stderr.lines() {
            eprintln!("  {}", line.dimmed());
        }
        eprintln!();
    }

    if let Some(suggestion) = suggestion {
        eprint!("{}", suggestion);
    }
}

fn print_dry_run(config: &ReleaseConfig, plan: &ReleasePlan, format: OutputFormat) -> ReleaseResult<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(plan)?),
        OutputFormat::Text => {
            println!(
                "{} {} {} -> {}",
                "Dry run:".yellow().bold(),
                config.product,
                config.version,
                config.disk_image_name()
            );
            println!();
            for (i, step) in plan.steps.iter().enumerate() {
                let mut notes = Vec::new();
                if step.best_effort {
                    notes.push("best effort");
                }
                if step.name.is_long_running() {
                    notes.push("long running");
                }
                let notes = if notes.is_empty() {
                    String::new()
                } else {
                    format!(" ({})", notes.join(", "))
                };

                println!("  {}. {}{}", i + 1, step.name.as_str().bold(), notes.dimmed());
                println!("     {}", step.display_action().cyan());
            }
        }
    }
    Ok(())
}

fn print_artifact(
    config: &ReleaseConfig,
    artifact: &BuildArtifact,
    format: OutputFormat,
) -> ReleaseResult<()> {
    if let Some(ref failure) = artifact.notarization_failure {
        eprintln!();
        utils::print_warning(&format!(
            "{} is signed but NOT notarized: {}",
            config.disk_image_name(),
            failure
        ));
        if let Some(stderr) = failure.stderr() {
            for line in stderr.lines() {
                eprintln!("    {}", line.dimmed());
            }
        }
        eprint!(
            "{}",
            RecoverySuggestion::retry_step(StepName::Notarize.as_str(), &config.version)
        );
    }

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(artifact)?),
        OutputFormat::Text => {
            println!("{}", "Outputs:".bold());
            if artifact.disk_image.is_file() {
                println!("  - {}", artifact.disk_image.display());
            }
            println!("Status: {}", artifact.status);
            if let Some(ref digest) = artifact.digest {
                println!("blake3: {}", digest);
            }
        }
    }
    Ok(())
}
