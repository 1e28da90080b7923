//! Keel CLI - keep a database schema in line with a package catalog.

use clap::Parser;
use miette::Diagnostic;

use keel_cli::cli::{Cli, Command};
use keel_cli::commands;
use keel_cli::config::Context;
use keel_cli::error::{CliError, CliResult};
use keel_cli::{logging, output};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        output::newline();
        output::error(&e.to_string());
        match &e {
            CliError::Migration(failure) => output::migration_failure(failure),
            CliError::Interrupted { applied, .. } => output::applied_before_failure(applied),
            _ => {}
        }
        if let Some(help) = e.help() {
            output::dim(&help.to_string());
        }
        std::process::exit(1);
    }
}

async fn run() -> CliResult<()> {
    let cli = Cli::parse();

    let ctx = Context::load(&cli.config, cli.url)?;
    logging::init(&ctx.config.log);

    match cli.command {
        Command::Plan(args) => commands::plan::run(&ctx, args).await,
        Command::Apply(args) => commands::apply::run(&ctx, args).await,
        Command::Reap(args) => commands::reap::run(&ctx, args).await,
        Command::Uninstall(args) => commands::uninstall::run(&ctx, args).await,
    }
}
