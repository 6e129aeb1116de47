//! # Command Module Unit Tests / Command 模块单元测试
//!
//! Command parsing, URL templates and output forwarding of supervised
//! processes.
//!
//! 命令解析、URL 模板以及受监管进程的输出转发。

use crosstest::core::models::SERVER_EXECUTOR;
use crosstest::core::output::OutputAggregator;
use crosstest::infra::command::{ParsedCommand, ProcessGroup, Supervised};
use crosstest::{CommandSpec, Error, Level, ProcessSpec, RunOptions};
use std::sync::Arc;

fn quiet_output() -> Arc<OutputAggregator> {
    let options = RunOptions {
        quiet: true,
        ..RunOptions::default()
    };
    Arc::new(OutputAggregator::new(SERVER_EXECUTOR, &options, None, None))
}

#[cfg(test)]
mod parse_tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn test_environment_variables_are_expanded() {
        let home = std::env::var("HOME").unwrap();
        let cmd = ParsedCommand::from_line("ls $HOME ~/logs").unwrap();
        assert_eq!(cmd.args, [home.clone(), format!("{home}/logs")]);
        assert_eq!(cmd.display, "ls $HOME ~/logs");
    }

    #[test]
    fn test_argv_is_taken_verbatim() {
        let spec = CommandSpec::Argv(vec!["echo".into(), "$HOME".into(), "a b".into()]);
        let cmd = ParsedCommand::from_spec(&spec).unwrap();
        assert_eq!(cmd.program, "echo");
        assert_eq!(cmd.args, ["$HOME", "a b"]);
    }

    #[test]
    fn test_template_display_shows_the_url() {
        let url = "http://localhost:1/?crosstest_id=x";
        let cmd = ParsedCommand::from_template("open -a Safari", url).unwrap();
        assert_eq!(cmd.display, format!("open -a Safari \"{url}\""));

        let cmd = ParsedCommand::from_template("browser --url={{url}}", url).unwrap();
        assert_eq!(cmd.args, [format!("--url={url}")]);
        assert_eq!(cmd.display, format!("browser --url={url}"));
    }

    #[test]
    fn test_invalid_lines_are_rejected() {
        assert!(matches!(
            ParsedCommand::from_line(""),
            Err(Error::InvalidCommand(_))
        ));
        assert!(matches!(
            ParsedCommand::from_line("run \"half quoted"),
            Err(Error::InvalidCommand(_))
        ));
    }
}

#[cfg(all(test, unix))]
mod process_tests {
    use super::*;

    #[tokio::test]
    async fn test_stdout_and_stderr_are_forwarded_with_levels() {
        let output = quiet_output();
        output.install();
        let cmd = ParsedCommand::from_line("sh -c 'echo out; echo err 1>&2'").unwrap();
        let mut child = Supervised::spawn(&cmd, output.clone()).unwrap();
        let status = child.wait().await.unwrap();
        assert!(status.success());
        child.kill().await;

        let result = output.take_result();
        let out = result
            .output
            .iter()
            .find(|m| m.text.ends_with("]> out"))
            .unwrap();
        assert_eq!(out.level, Level::Log);
        assert!(out.text.starts_with("[sh PID: "));
        let err = result
            .output
            .iter()
            .find(|m| m.text.ends_with("]> err"))
            .unwrap();
        assert_eq!(err.level, Level::Error);
    }

    #[tokio::test]
    async fn test_group_start_respects_the_grace_period() {
        let output = quiet_output();
        let mut group = ProcessGroup::new(output.clone());

        let mut quick = ProcessSpec::new("true");
        quick.start_timeout_ms = 500;
        group.start(&quick).await.unwrap();

        let mut long_running = ProcessSpec::new("sleep 30");
        long_running.start_timeout_ms = 50;
        group.start(&long_running).await.unwrap();
        assert_eq!(group.len(), 2);

        let mut failing = ProcessSpec::new("false");
        failing.start_timeout_ms = 500;
        let err = group.start(&failing).await.unwrap_err();
        assert!(matches!(err, Error::ExecCommandFailed { ref command } if command == "false"));

        group.kill_all().await;
        assert!(group.is_empty());
    }
}
