//! # Run Command Module / 运行命令模块
//!
//! Implements `crosstest run`: resolves the options, runs the smoke suite
//! through every stage, prints the summary and writes the requested reports.
//!
//! 实现 `crosstest run`：解析选项，运行所有阶段，打印摘要并生成报告。

use anyhow::{Context, Result};
use colored::*;
use std::path::{Path, PathBuf};
use tokio::signal;
use tokio_util::sync::CancellationToken;

use crate::cli::suite;
use crate::core::config::{self, DEFAULT_CONFIG_FILE, RunOptions};
use crate::core::models::RunResult;
use crate::core::registry::Selector;
use crate::core::session::RunSession;
use crate::reporting::{generate_html_report, generate_json_report, print_failure_details, print_summary};

/// Arguments of `crosstest run`.
#[derive(Debug, Default)]
pub struct RunArgs {
    pub config: Option<PathBuf>,
    pub parts: Option<String>,
    pub groups: Option<String>,
    pub tests: Option<String>,
    pub timeout_ms: Option<u64>,
    pub no_web: bool,
    pub quiet: bool,
    pub html: Option<PathBuf>,
    pub json: Option<PathBuf>,
}

/// Executes the run command.
pub async fn execute(args: RunArgs) -> Result<()> {
    let options = resolve_options(&args)?;
    let registry = suite::registry()?;
    let stop_token = setup_signal_handler();

    let outcome = RunSession::new(&registry, options)
        .with_cancellation(stop_token)
        .run()
        .await;

    let (result, failure) = match outcome {
        Ok(result) => (result, None),
        Err(failure) => (failure.partial, Some(failure.error)),
    };

    print_summary(&result);
    print_failure_details(&result);
    write_reports(&result, &args);

    if let Some(error) = failure {
        return Err(anyhow::Error::new(error).context("The run was aborted"));
    }
    if !result.is_success() {
        anyhow::bail!("{} of {} tests failed.", result.error_count, result.test_count);
    }
    println!("\n{}", "All tests passed.".green().bold());
    Ok(())
}

/// Loads the config file (explicit, or `crosstest.toml` when present) and
/// applies the command-line overrides on top.
pub fn resolve_options(args: &RunArgs) -> Result<RunOptions> {
    let mut options = match &args.config {
        Some(path) => load(path)?,
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => load(Path::new(DEFAULT_CONFIG_FILE))?,
        None => RunOptions::default(),
    };

    if let Some(parts) = &args.parts {
        options.parts = Some(Selector::parse(parts));
    }
    if let Some(groups) = &args.groups {
        options.groups = Some(Selector::parse(groups));
    }
    if let Some(tests) = &args.tests {
        options.tests = Some(Selector::parse(tests));
    }
    if let Some(timeout_ms) = args.timeout_ms {
        options.timeout_ms = timeout_ms;
    }
    if args.no_web {
        options.enable_web_tests = false;
    }
    options.quiet |= args.quiet;
    Ok(options)
}

fn load(path: &Path) -> Result<RunOptions> {
    println!("Loading options from: {}", path.display());
    config::load_options(path).with_context(|| format!("Failed to load {}", path.display()))
}

fn write_reports(result: &RunResult, args: &RunArgs) {
    if let Some(report_path) = &args.html {
        println!("\nGenerating HTML report at: {}", report_path.display());
        if let Err(e) = generate_html_report(result, report_path) {
            eprintln!("{} {:#}", "Failed to generate HTML report:".red(), e);
        }
    }
    if let Some(report_path) = &args.json {
        println!("Writing JSON result to: {}", report_path.display());
        if let Err(e) = generate_json_report(result, report_path) {
            eprintln!("{} {:#}", "Failed to write JSON result:".red(), e);
        }
    }
}

/// Cancels the returned token on Ctrl-C.
fn setup_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let token_clone = token.clone();

    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            println!("\n{}", "Received Ctrl-C, stopping the run...".yellow());
            token_clone.cancel();
        }
    });

    token
}
