//! # Drive Command Module / 驱动命令模块
//!
//! Implements `crosstest drive`: runs the smoke suite as a remote driver.
//!
//! Test failures are reported to the coordinator, not through the exit
//! status. Only an orchestration error makes this command fail.
//!
//! 实现 `crosstest drive`：以远程驱动程序的身份运行冒烟测试套件。
//! 测试失败通过协调器报告，而不是通过退出状态。

use anyhow::{Context, Result};
use colored::*;

use crate::cli::suite;
use crate::core::config::RunOptions;
use crate::remote;

/// Drives `url` until the coordinator reports the terminal step.
pub async fn execute(url: &str, timeout_ms: Option<u64>) -> Result<()> {
    let registry = suite::registry()?;
    let mut base = RunOptions::default();
    if let Some(timeout_ms) = timeout_ms {
        base.timeout_ms = timeout_ms;
    }

    let results = remote::drive(&registry, url, &base)
        .await
        .with_context(|| format!("Failed to drive {url}"))?;

    let (total, failed) = results.iter().fold((0, 0), |(total, failed), r| {
        (total + r.test_count, failed + r.error_count)
    });
    println!(
        "{}",
        format!(
            "Driven {} page(s): {} tests, {} failed",
            results.len(),
            total,
            failed
        )
        .bold()
    );
    Ok(())
}
