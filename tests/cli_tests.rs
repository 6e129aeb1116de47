use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::process::Command;
use tempfile::tempdir;

fn crosstest() -> Command {
    let mut cmd = Command::cargo_bin("crosstest").unwrap();
    cmd.env("NO_COLOR", "1").env_remove("CROSSTEST_SMOKE_FAIL");
    cmd
}

/// Runs the built-in suite with no config file and expects every test to pass.
///
/// 在没有配置文件的情况下运行内置套件，期望所有测试通过。
#[test]
fn test_successful_run() {
    let dir = tempdir().unwrap();
    crosstest()
        .current_dir(dir.path())
        .arg("run")
        .assert()
        .success()
        .stdout(predicate::str::contains("Start testing on the server side..."))
        .stdout(predicate::str::contains("--- Test Summary ---"))
        .stdout(predicate::str::contains("All tests passed."));
}

/// A failing test makes the command exit with a non-zero status.
///
/// 失败的测试会使命令以非零状态退出。
#[test]
fn test_failing_test_fails_the_command() {
    let dir = tempdir().unwrap();
    crosstest()
        .current_dir(dir.path())
        .env("CROSSTEST_SMOKE_FAIL", "1")
        .arg("run")
        .assert()
        .failure()
        .stdout(predicate::str::contains("--- Failures ---"))
        .stdout(predicate::str::contains("[smoke][check][forced-failure]"))
        .stderr(predicate::str::contains("1 of"));
}

/// Filters given on the command line narrow the run.
#[test]
fn test_filters_from_the_command_line() {
    let dir = tempdir().unwrap();
    crosstest()
        .current_dir(dir.path())
        .args(["run", "--groups", "async", "--quiet"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[smoke][async][sleep]"))
        .stdout(predicate::str::contains("[smoke][check][equal]").not());
}

/// `--json` and `--html` write the reports.
///
/// `--json` 与 `--html` 会生成报告文件。
#[test]
fn test_reports_are_written() {
    let dir = tempdir().unwrap();
    let json = dir.path().join("result.json");
    let html = dir.path().join("report.html");
    crosstest()
        .current_dir(dir.path())
        .arg("run")
        .arg("--json")
        .arg(&json)
        .arg("--html")
        .arg(&html)
        .assert()
        .success();

    let result: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&json).unwrap()).unwrap();
    assert!(result["test_count"].as_u64().unwrap() >= 4);
    assert_eq!(result["error_count"], 0);
    let page = fs::read_to_string(&html).unwrap();
    assert!(page.contains("[smoke][check][equal]"));
}

/// `init --non-interactive` writes a config that `run` accepts.
#[test]
fn test_init_then_run() {
    let dir = tempdir().unwrap();
    crosstest()
        .current_dir(dir.path())
        .args(["init", "--non-interactive"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created crosstest.toml"));

    let written = fs::read_to_string(dir.path().join("crosstest.toml")).unwrap();
    assert!(written.contains("timeout_ms = 30000"));

    crosstest()
        .current_dir(dir.path())
        .arg("run")
        .assert()
        .success()
        .stdout(predicate::str::contains("Loading options from: crosstest.toml"));
}

/// The binary prints help for `--help`.
#[test]
fn test_help() {
    crosstest()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("drive"))
        .stdout(predicate::str::contains("init"));
}
