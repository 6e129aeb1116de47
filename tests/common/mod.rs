// Shared test helpers for integration tests
#![allow(dead_code)]

use crosstest::{Registry, RunOptions, TestContext};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

/// Options that keep the console quiet and skip the remote stage.
pub fn local_options() -> RunOptions {
    RunOptions {
        quiet: true,
        enable_web_tests: false,
        ..RunOptions::default()
    }
}

/// A registry with two passing tests and one failing test across two parts.
///
/// ```text
/// [unit][math][adds]       ok
/// [unit][math][compares]   error (Equal)
/// [app][io][sleeps]        ok
/// ```
pub fn sample_registry() -> Registry {
    let registry = Registry::new();
    registry
        .register("unit", "math", "adds", |ctx: TestContext| async move {
            ctx.equal(1 + 1, 2)
        })
        .unwrap();
    registry
        .register("unit", "math", "compares", |ctx: TestContext| async move {
            ctx.equal(3, 4)
        })
        .unwrap();
    registry
        .register("app", "io", "sleeps", |ctx: TestContext| async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            ctx.less(1, 2)
        })
        .unwrap();
    registry
}

/// Writes `content` to `name` inside the temporary directory.
pub fn write_file(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).expect("Failed to write fixture");
    path
}

/// Whether a process with `pid` still exists.
#[cfg(unix)]
pub fn is_alive(pid: u32) -> bool {
    std::process::Command::new("kill")
        .args(["-0", &pid.to_string()])
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}
