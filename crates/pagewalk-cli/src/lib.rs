//! pagewalk CLI - run page-oriented scraping workflows
//!
//! The binary is a thin adapter over `pagewalk-core`: it reads a workflow
//! file, runs it with the reqwest-backed fetcher and writes JSON lines.
use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;
pub mod error;
pub mod workflow;
mod utils;

use crate::utils::initialize_logging;
use cli::{Cli, Commands};

/// Execute the pagewalk CLI with the current process arguments.
///
/// # Errors
///
/// Returns an error if logging initialization or the command fails. Errors
/// carry a category; see [`error::exit_code_from_error`].
pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    initialize_logging(&cli)?;
    execute_command(cli).await
}

async fn execute_command(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match &cli.command {
        Commands::Run(args) => commands::run_workflow(args, config_path, cli.quiet).await,
        Commands::Test(args) => commands::test_page(&args.workflow, args.seed, args.item).await,
        Commands::Config { path } => commands::show_config(config_path, *path),
    }
}
