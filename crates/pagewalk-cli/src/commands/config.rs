//! Configuration loading and the `config` command

use anyhow::{Context, Result};
use pagewalk_core::Config;
use std::path::Path;

use crate::error::CliError;

/// Load configuration from `path`, or from the default location when unset.
pub fn load(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };
    config.map_err(|e| CliError::usage(e).into())
}

/// Print the effective configuration, or its location.
pub fn execute(path: Option<&Path>, show_path: bool) -> Result<()> {
    if show_path {
        let location = match path {
            Some(path) => path.to_path_buf(),
            None => Config::config_path().map_err(CliError::usage)?,
        };
        println!("{}", location.display());
        return Ok(());
    }

    let config = load(path)?;
    let rendered = config.to_toml().context("Failed to render configuration")?;
    print!("{rendered}");
    Ok(())
}
