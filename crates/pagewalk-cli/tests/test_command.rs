#![allow(missing_docs, clippy::expect_used)]

mod common;

use anyhow::Result;
use common::{pagewalk_cmd, write_workflow};
use predicates::prelude::*;
use serde_json::Value;
use tempfile::tempdir;

const WORKFLOW: &str = r#"
[[seed]]
type = "html_list"
url = "https://legislature.test/bills"
selector = "ul.bills a"
next = "a.next"
example_file = "fixtures/bills.html"

[[seed]]
type = "json_list"
url = "https://legislature.test/api/votes"

[item]
type = "html_detail"
required = ["title"]
example_inline = "<h1>An Act relating to bees</h1><a class='pdf' href='https://legislature.test/text/hb1.pdf'>Text</a>"
example_input = { href = "https://legislature.test/bills/hb1", text = "HB 1" }

[item.fields]
title = "h1"
pdf = "a.pdf@href"
"#;

const LISTING: &str = r#"
<ul class="bills">
  <li><a href="https://legislature.test/bills/hb1">HB 1</a></li>
  <li><a href="https://legislature.test/bills/hb2">HB 2</a></li>
</ul>
<a class="next" href="https://legislature.test/bills?page=2">Next</a>
"#;

fn setup() -> Result<(tempfile::TempDir, std::path::PathBuf)> {
    let dir = tempdir()?;
    std::fs::create_dir(dir.path().join("fixtures"))?;
    std::fs::write(dir.path().join("fixtures/bills.html"), LISTING)?;
    let workflow = write_workflow(dir.path(), WORKFLOW);
    Ok((dir, workflow))
}

fn report(stdout: &[u8]) -> Value {
    serde_json::from_slice(stdout).expect("test output is JSON")
}

#[test]
fn test_seed_runs_against_example_file() -> Result<()> {
    let (_dir, workflow) = setup()?;
    let output = pagewalk_cmd()
        .arg("test")
        .arg(&workflow)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let report = report(&output);
    assert_eq!(report["type"], "next_page");
    assert_eq!(report["items"].as_array().map(Vec::len), Some(2));
    assert_eq!(report["items"][1]["text"], "HB 2");
    assert_eq!(report["next"]["kind"], "html_list");
    assert_eq!(
        report["next"]["source"],
        "https://legislature.test/bills?page=2"
    );
    Ok(())
}

#[test]
fn test_item_uses_example_input() -> Result<()> {
    let (_dir, workflow) = setup()?;
    let output = pagewalk_cmd()
        .arg("test")
        .arg(&workflow)
        .arg("--item")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let report = report(&output);
    assert_eq!(report["type"], "item");
    assert_eq!(report["item"]["title"], "An Act relating to bees");
    assert_eq!(report["item"]["text"], "HB 1");
    assert_eq!(
        report["item"]["pdf"],
        "https://legislature.test/text/hb1.pdf"
    );
    Ok(())
}

#[test]
fn test_seed_without_example_refuses_network() -> Result<()> {
    let (_dir, workflow) = setup()?;
    pagewalk_cmd()
        .arg("test")
        .arg(&workflow)
        .args(["--seed", "1"])
        .assert()
        .code(5)
        .stderr(predicate::str::contains("Offline"));
    Ok(())
}

#[test]
fn test_missing_required_field_reports_skip() -> Result<()> {
    let dir = tempdir()?;
    let workflow = write_workflow(
        dir.path(),
        r#"
        [[seed]]
        type = "html_list"
        inline = "<p>x</p>"
        selector = "p"

        [item]
        type = "html_detail"
        required = ["title"]
        example_inline = "<p>Withdrawn</p>"
        example_input = "https://legislature.test/bills/hb9"

        [item.fields]
        title = "h1"
        "#,
    );

    let output = pagewalk_cmd()
        .arg("test")
        .arg(&workflow)
        .arg("--item")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let report = report(&output);
    assert_eq!(report["type"], "skip");
    assert!(
        report["reason"]
            .as_str()
            .is_some_and(|reason| reason.contains("title"))
    );
    Ok(())
}

#[test]
fn test_out_of_range_seed_is_usage_error() -> Result<()> {
    let (_dir, workflow) = setup()?;
    pagewalk_cmd()
        .arg("test")
        .arg(&workflow)
        .args(["--seed", "7"])
        .assert()
        .code(2);
    Ok(())
}
