//! The `run` command: scrape a workflow into JSON lines

use anyhow::{Context, Result};
use colored::Colorize;
use futures::StreamExt;
use pagewalk_core::{Config, HttpFetcher, ScrapeStats, Scraper};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::cli::RunArgs;
use crate::error::CliError;
use crate::workflow::WorkflowFile;

/// Execute the run command
pub async fn execute(args: &RunArgs, config_path: Option<&Path>, quiet: bool) -> Result<()> {
    let workflow = WorkflowFile::load(&args.workflow)?
        .workflow()
        .map_err(CliError::usage)?;

    let mut config = super::load_config(config_path)?;
    apply_overrides(&mut config, args);
    debug!(?config, "effective configuration");

    let client = HttpFetcher::new(&config.fetch).map_err(CliError::from_core)?;
    let mut run = Scraper::new(Arc::new(client), config).run(workflow);

    let mut out: Box<dyn Write + Send> = match &args.output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("Failed to create {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(io::stdout())),
    };

    let mut fatal = None;
    while let Some(next) = run.next().await {
        match next {
            Ok(record) => {
                serde_json::to_writer(&mut out, &record)?;
                out.write_all(b"\n")?;
            },
            // Non-fatal page failures are already logged by the engine.
            Err(err) if run.stats().aborted => fatal = Some(err),
            Err(_) => {},
        }
    }
    out.flush()?;

    if !quiet {
        print_summary(&run.stats());
    }
    match fatal {
        Some(err) => Err(CliError::from_core(err).into()),
        None => Ok(()),
    }
}

fn apply_overrides(config: &mut Config, args: &RunArgs) {
    if args.fail_fast {
        config.scrape.fail_fast = true;
    }
    if let Some(timeout) = args.timeout {
        config.fetch.timeout_secs = timeout;
    }
    if let Some(retries) = args.retries {
        config.fetch.retries = retries;
    }
    if let Some(max_pages) = args.max_pages {
        config.scrape.max_pages = Some(usize::try_from(max_pages).unwrap_or(usize::MAX));
    }
}

fn print_summary(stats: &ScrapeStats) {
    let elapsed_ms = match (stats.started_at, stats.finished_at) {
        (Some(start), Some(end)) => (end - start).num_milliseconds(),
        _ => 0,
    };
    let mark = if stats.aborted {
        "✗".red()
    } else if stats.failed > 0 {
        "!".yellow()
    } else {
        "✓".green()
    };
    eprintln!(
        "{mark} {} records from {} pages in {elapsed_ms}ms ({} fetched, {} skipped, {} failed)",
        stats.records.to_string().bold(),
        stats.pages,
        stats.fetches,
        stats.skipped,
        stats.failed,
    );
}
