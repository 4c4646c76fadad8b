// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Binary surface smoke tests.

use assert_cmd::Command;

#[test]
fn version_flag_prints_version() {
    let output = Command::cargo_bin("tetherd").unwrap().arg("--version").assert().success();
    let stdout = String::from_utf8_lossy(&output.get_output().stdout).into_owned();
    assert!(stdout.starts_with("tetherd "));
}

#[test]
fn help_flag_prints_usage() {
    let output = Command::cargo_bin("tetherd").unwrap().arg("--help").assert().success();
    let stdout = String::from_utf8_lossy(&output.get_output().stdout).into_owned();
    assert!(stdout.contains("USAGE"));
    assert!(stdout.contains("--version"));
}

#[test]
fn unexpected_argument_fails() {
    Command::cargo_bin("tetherd").unwrap().arg("--bogus").assert().failure();
}
