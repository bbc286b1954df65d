// SPDX-License-Identifier: MIT

//! Black-box tests for the `zallet` binary against an isolated,
//! deliberately daemon-less `ZALLET_BASE_DIR` (spec.md §6: "non-zero with
//! error on any [failure] from the local socket").

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use assert_cmd::Command;

#[test]
fn health_fails_without_a_running_daemon() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut cmd = Command::cargo_bin("zallet").expect("binary");
    cmd.env("ZALLET_BASE_DIR", dir.path()).arg("health");
    cmd.assert().failure();
}

#[test]
fn ls_rejects_an_unknown_status_token() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut cmd = Command::cargo_bin("zallet").expect("binary");
    cmd.env("ZALLET_BASE_DIR", dir.path()).args(["ls", "--status", "bogus"]);
    cmd.assert().failure();
}

#[test]
fn apply_with_missing_file_fails_before_contacting_the_daemon() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut cmd = Command::cargo_bin("zallet").expect("binary");
    cmd.env("ZALLET_BASE_DIR", dir.path()).args(["apply", "/nonexistent/spec.yaml"]);
    cmd.assert().failure();
}

#[test]
fn help_runs_successfully() {
    let mut cmd = Command::cargo_bin("zallet").expect("binary");
    cmd.arg("--help");
    cmd.assert().success();
}
