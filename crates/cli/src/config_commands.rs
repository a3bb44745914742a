use std::path::Path;

use {anyhow::Result, clap::Subcommand};

use inbox_config::{Severity, validate};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Validate the configuration and report errors/warnings.
    Check,
    /// Print the effective configuration (secrets redacted).
    Show,
}

pub fn handle_config(explicit: Option<&Path>, action: &ConfigAction) -> Result<()> {
    let mut config = match explicit {
        Some(path) => inbox_config::load_config(path)?,
        None => inbox_config::discover_and_load(),
    };
    inbox_config::apply_env_overrides(&mut config)?;

    match action {
        ConfigAction::Check => check(explicit, &config),
        ConfigAction::Show => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        },
    }
}

/// ANSI color codes.
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

fn check(explicit: Option<&Path>, config: &inbox_config::InboxConfig) -> Result<()> {
    match explicit {
        Some(path) => eprintln!("Checking {}\n", path.display()),
        None => eprintln!("Checking discovered config (or defaults).\n"),
    }

    let diagnostics = validate(config);
    for d in &diagnostics {
        let color = match d.severity {
            Severity::Error => RED,
            Severity::Warning => YELLOW,
        };
        eprintln!("  {BOLD}{color}{}{RESET} {d}", d.severity);
    }

    let errors = diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Error)
        .count();
    let warnings = diagnostics.len() - errors;

    if diagnostics.is_empty() {
        eprintln!("No issues found.");
    } else {
        eprintln!("\n{errors} error(s), {warnings} warning(s)");
    }

    if errors > 0 {
        anyhow::bail!("configuration has {errors} error(s)");
    }
    Ok(())
}
