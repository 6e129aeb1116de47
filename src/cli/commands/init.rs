//! # Config Initialization Module / 配置初始化模块
//!
//! Interactive wizard that writes a starter `crosstest.toml`.
//!
//! 生成初始 `crosstest.toml` 的交互式向导。

use anyhow::{Context, Result};
use colored::*;
use dialoguer::{Confirm, Input, MultiSelect, theme::ColorfulTheme};
use std::fs;
use std::path::Path;

use crate::core::config::{BrowserChain, PageSpec, RunOptions};

const BROWSER_CANDIDATES: [&str; 6] = [
    "google-chrome",
    "chrome",
    "chromium",
    "firefox",
    "opera",
    "safari",
];

/// Runs the wizard, or writes the defaults when `non_interactive` is set.
///
/// 运行向导；若设置了 `non_interactive` 则直接写入默认配置。
pub fn run_init_wizard(config_path: &Path, non_interactive: bool) -> Result<()> {
    let theme = ColorfulTheme::default();

    if non_interactive {
        return write_config(config_path, &RunOptions::default());
    }

    println!("\n{}", "crosstest configuration wizard".cyan().bold());
    println!("This writes {} for `crosstest run`.", config_path.display());

    if config_path.exists() {
        let confirmation = Confirm::with_theme(&theme)
            .with_prompt(format!("{} already exists. Overwrite it?", config_path.display()))
            .default(false)
            .interact()
            .context("Failed to read confirmation")?;
        if !confirmation {
            println!("Aborted.");
            return Ok(());
        }
    }

    let mut options = RunOptions::default();

    options.timeout_ms = Input::with_theme(&theme)
        .with_prompt("Per-test timeout (ms)")
        .default(options.timeout_ms)
        .interact_text()?;

    let enable_web = Confirm::with_theme(&theme)
        .with_prompt("Run tests in browsers as well?")
        .default(false)
        .interact()?;

    if enable_web {
        let url: String = Input::with_theme(&theme)
            .with_prompt("URL of the test page")
            .interact_text()?;
        options.web_testing_pages = vec![PageSpec::new(url.trim())];

        options.web_testing_port = Input::with_theme(&theme)
            .with_prompt("Port of the coordination server")
            .default(options.web_testing_port)
            .interact_text()?;

        let defaults = [true; BROWSER_CANDIDATES.len()];
        let selections = MultiSelect::with_theme(&theme)
            .with_prompt("Browsers to try, in order")
            .items(&BROWSER_CANDIDATES)
            .defaults(&defaults)
            .interact()
            .context("Failed to read browser selection")?;
        if selections.is_empty() {
            println!("{}", "No browser selected, keeping the default chain.".yellow());
        } else {
            options.web_browsers = vec![BrowserChain::new(
                selections.into_iter().map(|i| BROWSER_CANDIDATES[i]),
            )];
        }
    } else {
        options.enable_web_tests = false;
    }

    write_config(config_path, &options)
}

fn write_config(path: &Path, options: &RunOptions) -> Result<()> {
    let toml_string =
        toml::to_string_pretty(options).context("Failed to serialize the configuration")?;

    fs::write(path, toml_string)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    println!(
        "\n{} {}",
        "✔".green(),
        format!("Created {}", path.display()).bold()
    );
    println!("Run `crosstest run` to use it.");

    Ok(())
}
