//! # CLI Structure and Argument Parsing
//!
//! The `pagewalk` command runs scraping workflows described in TOML files.
//!
//! ## Usage Patterns
//!
//! ```bash
//! # Scrape every record of a workflow as JSON lines
//! pagewalk run bills.toml > bills.jsonl
//! pagewalk run bills.toml --output bills.jsonl --retries 3
//!
//! # Check a page against its saved example, without any network access
//! pagewalk test bills.toml --seed 0
//! pagewalk test bills.toml --item
//!
//! # Show the effective configuration
//! pagewalk config
//! ```
//!
//! ## Logging
//!
//! Logs go to stderr so stdout stays machine readable. Warnings are shown by
//! default; `-v` adds fetch progress and `-vv` every page state change.

use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

/// Main CLI structure for the `pagewalk` command
#[derive(Parser, Clone, Debug)]
#[command(name = "pagewalk")]
#[command(version)]
#[command(about = "pagewalk - page-oriented scraping workflows", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Suppress informational messages (only show errors)
    #[arg(short = 'q', long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Emit logs as JSON objects
    #[arg(long = "log-json", global = true)]
    pub log_json: bool,

    /// Disable all ANSI colors in output (also respects `NO_COLOR` env)
    #[arg(long = "no-color", global = true)]
    pub no_color: bool,

    /// Path to configuration file (overrides `PAGEWALK_CONFIG` and autodiscovery)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

/// Available subcommands
#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Run a workflow and write its records as JSON lines
    Run(RunArgs),

    /// Run one page of a workflow offline against its example source
    Test(TestArgs),

    /// Print the effective configuration as TOML
    Config {
        /// Print the configuration file location instead
        #[arg(long)]
        path: bool,
    },
}

/// Arguments of `pagewalk run`
#[derive(Args, Clone, Debug)]
pub struct RunArgs {
    /// Workflow file
    #[arg(value_name = "WORKFLOW")]
    pub workflow: PathBuf,

    /// Write records to FILE instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Stop at the first page failure
    #[arg(long)]
    pub fail_fast: bool,

    /// Per-request timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Retries for transient fetch failures
    #[arg(long, value_name = "N")]
    pub retries: Option<u32>,

    /// Maximum pages followed per pagination chain
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u64).range(1..))]
    pub max_pages: Option<u64>,
}

/// Arguments of `pagewalk test`
#[derive(Args, Clone, Debug)]
pub struct TestArgs {
    /// Workflow file
    #[arg(value_name = "WORKFLOW")]
    pub workflow: PathBuf,

    /// Index of the seed page to test
    #[arg(long, value_name = "N", default_value_t = 0, conflicts_with = "item")]
    pub seed: usize,

    /// Test the item page with its example input instead of a seed
    #[arg(long)]
    pub item: bool,
}
