#![allow(clippy::expect_used, clippy::unwrap_used)]

use assert_cmd::Command;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;
use tempfile::TempDir;

#[allow(dead_code)]
pub const CMD_TIMEOUT: Duration = Duration::from_secs(15);

fn config_dir() -> &'static Path {
    static CONFIG_DIR: OnceLock<TempDir> = OnceLock::new();
    CONFIG_DIR
        .get_or_init(|| tempfile::tempdir().expect("failed to create config dir for tests"))
        .path()
}

/// Create a configured `pagewalk` command suitable for integration tests.
///
/// The configuration file points into an empty temp dir so the user's own
/// settings never leak into a test.
#[allow(dead_code)]
pub fn pagewalk_cmd() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("pagewalk"));
    cmd.timeout(CMD_TIMEOUT);
    cmd.env("PAGEWALK_CONFIG", config_dir().join("config.toml"));
    cmd.env("NO_COLOR", "1");
    cmd
}

/// Write `content` as `workflow.toml` inside `dir`.
#[allow(dead_code)]
pub fn write_workflow(dir: &Path, content: &str) -> PathBuf {
    let path = dir.join("workflow.toml");
    std::fs::write(&path, content).expect("failed to write workflow");
    path
}

/// Parse JSON lines from command output.
#[allow(dead_code)]
pub fn json_lines(stdout: &[u8]) -> Vec<serde_json::Value> {
    String::from_utf8_lossy(stdout)
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).expect("stdout line is not JSON"))
        .collect()
}
