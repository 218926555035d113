//! pagewalk - page-oriented scraping workflows
//!
//! Entry point; maps failures to semantic exit codes.

use colored::Colorize;
use pagewalk_cli::error::exit_code_from_error;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    match pagewalk_cli::run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {err:#}", "error:".red().bold());
            ExitCode::from(exit_code_from_error(&err))
        },
    }
}
