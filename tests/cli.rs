//! CLI test cases.
//!
//! The bot needs a real Telegram token and network access to do anything
//! useful, so these only cover argument handling and startup validation.

use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;

/// Create a new `Command` with our binary.
fn cmd() -> Command {
    Command::cargo_bin("snapsolve").unwrap()
}

#[test]
fn test_help() {
    cmd().arg("--help").assert().success();
}

#[test]
fn test_version() {
    cmd().arg("--version").assert().success();
}

#[test]
fn test_help_documents_environment() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("TELEGRAM_TOKEN"));
}

#[test]
fn test_missing_telegram_token_fails_fast() {
    cmd()
        .env_remove("TELEGRAM_TOKEN")
        .assert()
        .failure()
        .stderr(predicate::str::contains("TELEGRAM_TOKEN"));
}

#[test]
fn test_rejects_unknown_flags() {
    cmd().arg("--no-such-flag").assert().failure();
}
