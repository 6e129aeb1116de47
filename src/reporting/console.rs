//! # Console Reporting Module / 控制台报告模块
//!
//! Colored summary of a `RunResult` for the terminal.
//!
//! 在终端中打印 `RunResult` 的彩色摘要。

use colored::*;

use crate::core::models::{RunResult, Status, TestRecord};

fn status_label(record: &TestRecord) -> ColoredString {
    match record.status {
        Status::Ok => "Passed".green(),
        Status::Error => "Failed".red(),
        Status::Pending => "Pending".dimmed(),
    }
}

/// Prints one row per test and the totals.
///
/// 在控制台打印每个测试一行以及汇总数字。
///
/// # Output Format / 输出格式
/// ```text
/// --- Test Summary ---
///   - Passed   | server     | [unit][math][adds]
///   - Failed   | firefox    | [ui][form][submit]
///
/// 2 tests, 1 passed, 1 failed
/// ```
pub fn print_summary(result: &RunResult) {
    println!("\n{}", "--- Test Summary ---".bold());

    for record in &result.tests {
        println!(
            "  - {:<8} | {:<10} | {}",
            status_label(record),
            record.executor,
            record.key()
        );
    }

    let totals = format!(
        "{} test{}, {} passed, {} failed",
        result.test_count,
        if result.test_count == 1 { "" } else { "s" },
        result.successful_count,
        result.error_count
    );
    if result.is_success() {
        println!("\n{}", totals.green().bold());
    } else {
        println!("\n{}", totals.red().bold());
    }
}

/// Prints message, position and captured output of every failed test.
pub fn print_failure_details(result: &RunResult) {
    let failures: Vec<&TestRecord> = result.failed_tests().collect();
    if failures.is_empty() {
        return;
    }

    println!("\n{}", "--- Failures ---".red().bold());
    println!("{}", "-".repeat(80));

    for (i, record) in failures.iter().enumerate() {
        println!(
            "[{}/{}] {} {}",
            i + 1,
            failures.len(),
            record.key().cyan(),
            format!("({})", record.executor).dimmed()
        );
        if let Some(error) = &record.error {
            println!("  {} {}", "Error:".red(), error.message);
            println!("  {} {}", "Position:".yellow(), error.position());
        }
        if !record.output.is_empty() {
            println!("\n--- {} ---", "Test output".yellow());
            for line in &record.output {
                println!("[{}] {}", line.level, line.text);
            }
        }
        println!("{}", "-".repeat(80));
    }
}
