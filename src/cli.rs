//! # CLI Module / 命令行模块
//!
//! The `crosstest` binary: `run` executes the built-in suite plus whatever the
//! config file adds, `drive` acts as a headless remote driver for a page URL,
//! and `init` writes a starter `crosstest.toml`.
//!
//! `crosstest` 可执行文件：`run` 运行内置套件及配置文件添加的内容，
//! `drive` 作为页面 URL 的无头远程驱动程序，`init` 生成初始的 `crosstest.toml`。

pub mod commands;
pub mod suite;

use anyhow::Result;
use clap::{Arg, ArgAction, Command};
use std::path::PathBuf;

fn build_cli() -> Command {
    Command::new("crosstest")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Runs registered tests in-process and inside external browser-like drivers")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("run")
                .about("Run the test pipeline")
                .arg(
                    Arg::new("config")
                        .short('c')
                        .long("config")
                        .help("Path to the options file (defaults to ./crosstest.toml when present)")
                        .value_name("CONFIG")
                        .value_parser(clap::value_parser!(PathBuf))
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("parts")
                        .long("parts")
                        .help("Only run these parts (';'-separated)")
                        .value_name("PARTS")
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("groups")
                        .long("groups")
                        .help("Only run these groups (';'-separated)")
                        .value_name("GROUPS")
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("tests")
                        .long("tests")
                        .help("Only run these tests (';'-separated)")
                        .value_name("TESTS")
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("timeout-ms")
                        .long("timeout-ms")
                        .help("Per-test timeout in milliseconds")
                        .value_name("MS")
                        .value_parser(clap::value_parser!(u64))
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("no-web")
                        .long("no-web")
                        .help("Skip the remote stage")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("quiet")
                        .short('q')
                        .long("quiet")
                        .help("Do not echo engine lines to the console")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("html")
                        .long("html")
                        .help("Write an HTML report to this path")
                        .value_name("HTML")
                        .value_parser(clap::value_parser!(PathBuf))
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .help("Write the result as JSON to this path")
                        .value_name("JSON")
                        .value_parser(clap::value_parser!(PathBuf))
                        .action(ArgAction::Set),
                ),
        )
        .subcommand(
            Command::new("drive")
                .about("Act as a remote driver for a page URL carrying correlation parameters")
                .arg(
                    Arg::new("url")
                        .help("Page URL handed out by the coordinator")
                        .value_name("URL")
                        .required(true)
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("timeout-ms")
                        .long("timeout-ms")
                        .help("Per-test timeout in milliseconds")
                        .value_name("MS")
                        .value_parser(clap::value_parser!(u64))
                        .action(ArgAction::Set),
                ),
        )
        .subcommand(
            Command::new("init")
                .about("Create a crosstest.toml in the current directory")
                .arg(
                    Arg::new("non-interactive")
                        .long("non-interactive")
                        .help("Write the default config without prompting")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .help("Where to write the config")
                        .value_name("PATH")
                        .default_value(crate::core::config::DEFAULT_CONFIG_FILE)
                        .value_parser(clap::value_parser!(PathBuf))
                        .action(ArgAction::Set),
                ),
        )
}

/// Parses the command line and dispatches to the chosen command.
pub async fn run() -> Result<()> {
    let matches = build_cli().get_matches();

    match matches.subcommand() {
        Some(("run", run_matches)) => {
            let args = commands::run::RunArgs {
                config: run_matches.get_one::<PathBuf>("config").cloned(),
                parts: run_matches.get_one::<String>("parts").cloned(),
                groups: run_matches.get_one::<String>("groups").cloned(),
                tests: run_matches.get_one::<String>("tests").cloned(),
                timeout_ms: run_matches.get_one::<u64>("timeout-ms").copied(),
                no_web: run_matches.get_flag("no-web"),
                quiet: run_matches.get_flag("quiet"),
                html: run_matches.get_one::<PathBuf>("html").cloned(),
                json: run_matches.get_one::<PathBuf>("json").cloned(),
            };
            commands::run::execute(args).await?;
        }
        Some(("drive", drive_matches)) => {
            let url = drive_matches
                .get_one::<String>("url")
                .cloned()
                .unwrap_or_default();
            let timeout_ms = drive_matches.get_one::<u64>("timeout-ms").copied();
            commands::drive::execute(&url, timeout_ms).await?;
        }
        Some(("init", init_matches)) => {
            let non_interactive = init_matches.get_flag("non-interactive");
            let output = init_matches
                .get_one::<PathBuf>("output")
                .cloned()
                .unwrap_or_else(|| PathBuf::from(crate::core::config::DEFAULT_CONFIG_FILE));
            commands::init::run_init_wizard(&output, non_interactive)?;
        }
        _ => {
            // Clap has already printed help for a missing subcommand.
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        build_cli().debug_assert();
    }

    #[test]
    fn run_flags_parse() {
        let matches = build_cli()
            .try_get_matches_from(["crosstest", "run", "--parts", "a;b", "--quiet", "--no-web"])
            .unwrap();
        let (name, sub) = matches.subcommand().unwrap();
        assert_eq!(name, "run");
        assert_eq!(sub.get_one::<String>("parts").map(String::as_str), Some("a;b"));
        assert!(sub.get_flag("quiet"));
        assert!(sub.get_flag("no-web"));
    }
}
