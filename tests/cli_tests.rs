//! CLI tests for the clouddeck binary.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;

fn clouddeck() -> Command {
    let mut cmd = cargo_bin_cmd!("clouddeck");
    // Keep a developer's .env or shell settings from leaking in.
    cmd.env_remove("DATABASE_PATH").env_remove("PORT");
    cmd
}

#[test]
fn test_help_lists_subcommands() {
    clouddeck()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("migrate"));
}

#[test]
fn test_version() {
    clouddeck().arg("--version").assert().success();
}

#[test]
fn test_serve_help_documents_env_vars() {
    clouddeck()
        .args(["serve", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("DATABASE_PATH"))
        .stdout(predicate::str::contains("CORS_ALLOWED_ORIGINS"))
        .stdout(predicate::str::contains("GITHUB_API_URL"));
}

#[test]
fn test_migrate_creates_database() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("data/clouddeck.db");

    clouddeck()
        .current_dir(dir.path())
        .args(["migrate", "--db-path"])
        .arg(&db_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Database ready"));

    assert!(db_path.exists());
}

#[test]
fn test_migrate_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("clouddeck.db");

    for _ in 0..2 {
        clouddeck()
            .current_dir(dir.path())
            .args(["migrate", "--db-path"])
            .arg(&db_path)
            .assert()
            .success();
    }
}

#[test]
fn test_migrate_reads_database_path_from_env() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("from-env.db");

    clouddeck()
        .current_dir(dir.path())
        .env("DATABASE_PATH", &db_path)
        .arg("migrate")
        .assert()
        .success();

    assert!(db_path.exists());
}

#[test]
fn test_serve_rejects_invalid_port() {
    clouddeck()
        .args(["serve", "--port", "not-a-port"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}

#[test]
fn test_unknown_subcommand_fails() {
    clouddeck().arg("deploy").assert().failure();
}
