use std::path::Path;

use anyhow::Result;
use predicates::prelude::PredicateBooleanExt;
use predicates::str::contains;
use tempfile::TempDir;

fn breakscope(dir: &Path) -> Result<assert_cmd::Command> {
    let mut cmd = assert_cmd::Command::cargo_bin("breakscope")?;
    cmd.current_dir(dir)
        .env_remove("RUST_LOG")
        .env_remove("OPENAI_API_KEY");
    Ok(cmd)
}

const RUN_FILE: &str = r#"{
  "orgName": "acme",
  "repoFullName": "acme/shop",
  "prMetadata": { "number": 42, "title": "Rename pay button" },
  "astChunks": [
    { "filename": "src/Checkout.tsx", "rawDiff": "+<button data-testid=\"pay\">" }
  ],
  "specFiles": [
    {
      "filename": "cypress/e2e/checkout.cy.ts",
      "chunks": [
        { "testName": "pays with card", "filename": "cypress/e2e/checkout.cy.ts", "body": "cy.get('[data-testid=pay]')" }
      ]
    }
  ],
  "analysisStartedAt": "2026-01-05T10:00:00Z"
}"#;

#[test]
fn help_lists_subcommands() -> Result<()> {
    let dir = TempDir::new()?;
    breakscope(dir.path())?
        .arg("--help")
        .assert()
        .success()
        .stdout(
            contains("schema")
                .and(contains("check"))
                .and(contains("match"))
                .and(contains("analyze"))
                .and(contains("stats")),
        );
    Ok(())
}

#[test]
fn check_creates_and_reaches_sqlite_store() -> Result<()> {
    let dir = TempDir::new()?;
    breakscope(dir.path())?
        .args(["check", "--db-path", "data/graph.db"])
        .assert()
        .success()
        .stdout(contains("OK sqlite"));
    assert!(dir.path().join("data/graph.db").exists());
    Ok(())
}

#[test]
fn schema_is_idempotent() -> Result<()> {
    let dir = TempDir::new()?;
    for _ in 0..2 {
        breakscope(dir.path())?
            .args(["schema", "--db-path", "graph.db"])
            .assert()
            .success()
            .stdout(contains("constraints"));
    }
    Ok(())
}

#[test]
fn stats_json_on_empty_store() -> Result<()> {
    let dir = TempDir::new()?;
    let output = breakscope(dir.path())?
        .args(["stats", "--json", "--db-path", "graph.db"])
        .output()?;
    assert!(output.status.success());
    let stats: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(stats["nodes"]["Organization"], 0);
    assert_eq!(stats["relationships"]["MATCHED"], 0);
    Ok(())
}

#[test]
fn missing_explicit_config_exits_2() -> Result<()> {
    let dir = TempDir::new()?;
    breakscope(dir.path())?
        .args(["check", "--config", "nope.toml"])
        .assert()
        .code(2)
        .stderr(contains("Cannot load config"));
    Ok(())
}

#[test]
fn invalid_config_exits_2() -> Result<()> {
    let dir = TempDir::new()?;
    std::fs::write(dir.path().join("breakscope.toml"), "[retrieval]\ntop_k = 0\n")?;
    breakscope(dir.path())?.arg("check").assert().code(2);
    Ok(())
}

#[test]
fn unreadable_run_file_exits_3() -> Result<()> {
    let dir = TempDir::new()?;
    breakscope(dir.path())?
        .args(["match", "missing.json"])
        .assert()
        .code(3)
        .stderr(contains("run file"));
    Ok(())
}

#[test]
fn malformed_run_file_exits_3() -> Result<()> {
    let dir = TempDir::new()?;
    std::fs::write(dir.path().join("run.json"), "{ not json")?;
    breakscope(dir.path())?
        .args(["analyze", "run.json", "--db-path", "graph.db"])
        .assert()
        .code(3);
    Ok(())
}

#[test]
fn analyze_without_api_key_exits_6_before_touching_store() -> Result<()> {
    let dir = TempDir::new()?;
    std::fs::write(dir.path().join("run.json"), RUN_FILE)?;
    breakscope(dir.path())?
        .args(["analyze", "run.json", "--db-path", "graph.db"])
        .assert()
        .code(6)
        .stderr(contains("OPENAI_API_KEY"));
    assert!(!dir.path().join("graph.db").exists());
    Ok(())
}
