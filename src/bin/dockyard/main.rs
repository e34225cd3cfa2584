//! Dockyard CLI - build target discovery and build orchestration

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use dockyard::util::Shell;

mod cli;
mod commands;
mod session;

use cli::{Cli, Commands, MessageFormat};

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<ExitCode> {
    // Parse CLI
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("dockyard=debug")
    } else {
        EnvFilter::new("dockyard=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    let shell = Arc::new(Shell::from_flags(
        cli.quiet,
        cli.verbose,
        cli.color,
        cli.message_format == MessageFormat::Json,
    ));

    let command = match cli.command {
        Commands::Completions(args) => {
            commands::completions::execute(args)?;
            return Ok(ExitCode::SUCCESS);
        }
        command => command,
    };

    let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;

    // Execute command
    let code = runtime.block_on(async move {
        match command {
            Commands::Targets(args) => commands::targets::execute(args, shell).await,
            Commands::Build(args) => commands::build::execute(args, shell).await,
            Commands::Select(args) => commands::select::execute(args, shell).await,
            Commands::Watch(args) => commands::watch::execute(args, shell).await,
            Commands::Completions(_) => Ok(ExitCode::SUCCESS),
        }
    });

    // A pending stdin read must not keep the process alive.
    runtime.shutdown_background();
    code
}
