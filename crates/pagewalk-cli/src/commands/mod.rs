//! Command implementations for the pagewalk CLI
//!
//! Each command lives in its own submodule.

mod config;
mod run;

pub use config::{execute as show_config, load as load_config};
pub use run::execute as run_workflow;
pub use test::execute as test_page;
