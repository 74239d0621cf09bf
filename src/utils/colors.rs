// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 relflow contributors

//! Terminal color utilities
//!
//! Status output goes to stderr so stdout stays free for `--format json`.

use colored::Colorize;
use std::io::IsTerminal;

/// Check if colors should be used
pub fn should_use_colors() -> bool {
    // Respect NO_COLOR environment variable
    if std::env::var_os("NO_COLOR").is_some() {
        return false;
    }

    std::io::stderr().is_terminal()
}

/// Print a styled header
pub fn print_header(title: &str) {
    eprintln!("{}", title.bold());
    eprintln!("{}", "═".repeat(title.chars().count().max(40)));
}

/// Print a success check
pub fn print_success(msg: &str) {
    eprintln!("  {} {}", "✓".green(), msg);
}

/// Print an error cross
pub fn print_error(msg: &str) {
    eprintln!("  {} {}", "✗".red(), msg);
}

/// Print a warning
pub fn print_warning(msg: &str) {
    eprintln!("  {} {}", "⚠".yellow(), msg);
}

/// Print an info item
pub fn print_info(msg: &str) {
    eprintln!("  {} {}", "→".blue(), msg);
}

/// Print a skipped item
pub fn print_skipped(msg: &str) {
    eprintln!("  {} {}", "○".dimmed(), msg.dimmed());
}
