//! CLI argument definitions using clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Keel - keep a database schema in line with a package catalog
#[derive(Parser, Debug)]
#[command(name = "keel")]
#[command(version)]
#[command(about = "Keel - keep a database schema in line with a package catalog", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, global = true, default_value = "keel.toml", env = "KEEL_CONFIG")]
    pub config: PathBuf,

    /// Database URL (overrides `[database] url`)
    #[arg(short, long, global = true, env = "KEEL_DATABASE_URL")]
    pub url: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show the statements a reconcile would run
    Plan(PlanArgs),

    /// Drop obsolete tables, then create and alter tables to match the catalog
    Apply(ApplyArgs),

    /// Drop namespace tables the catalog no longer declares
    Reap(ReapArgs),

    /// Drop every catalog table
    Uninstall(UninstallArgs),
}

/// Arguments for the `plan` command
#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Leave obsolete tables alone
    #[arg(long)]
    pub keep_obsolete: bool,
}

/// Arguments for the `apply` command
#[derive(Args, Debug)]
pub struct ApplyArgs {
    /// Plan without executing
    #[arg(long)]
    pub dry_run: bool,

    /// Leave obsolete tables alone
    #[arg(long)]
    pub keep_obsolete: bool,
}

/// Arguments for the `reap` command
#[derive(Args, Debug)]
pub struct ReapArgs {
    /// Plan without executing
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for the `uninstall` command
#[derive(Args, Debug)]
pub struct UninstallArgs {
    /// Plan without executing
    #[arg(long)]
    pub dry_run: bool,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_apply() {
        let cli = Cli::try_parse_from(["keel", "apply", "--dry-run", "--url", "sqlite::memory:"])
            .unwrap();
        assert_eq!(cli.url.as_deref(), Some("sqlite::memory:"));
        assert_eq!(cli.config, PathBuf::from("keel.toml"));
        assert!(matches!(
            cli.command,
            Command::Apply(ApplyArgs {
                dry_run: true,
                keep_obsolete: false
            })
        ));
    }

    #[test]
    fn test_parse_uninstall() {
        let cli = Cli::try_parse_from(["keel", "--config", "db/keel.toml", "uninstall", "-y"])
            .unwrap();
        assert_eq!(cli.config, PathBuf::from("db/keel.toml"));
        assert!(matches!(
            cli.command,
            Command::Uninstall(UninstallArgs {
                yes: true,
                dry_run: false
            })
        ));
    }
}
