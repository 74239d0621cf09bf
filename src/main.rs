// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 relflow contributors

//! relflow - Release Flow for macOS apps
//!
//! Build a Rust + Flutter application into a signed, notarized disk image.

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use relflow::cli::run::{report_error, run};
use relflow::cli::Cli;
use relflow::errors::EXIT_PRE_ASSEMBLY;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Progress is printed directly; logs only carry warnings unless verbose
    let default_filter = if cli.verbose { "relflow=debug" } else { "relflow=warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    colored::control::set_override(relflow::utils::should_use_colors());

    // Change to specified directory if provided
    if let Some(ref dir) = cli.directory {
        if let Err(e) = std::env::set_current_dir(dir) {
            eprintln!("Failed to change to directory '{}': {}", dir.display(), e);
            std::process::exit(EXIT_PRE_ASSEMBLY);
        }
    }

    let code = match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            let code = err.exit_code();
            report_error(err);
            code
        }
    };

    std::process::exit(code);
}
