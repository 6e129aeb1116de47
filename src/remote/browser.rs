//! # Remote Test Stage Module / 远程测试阶段模块
//!
//! Starts the web processes and the coordination server, then works through
//! every browser chain. Each candidate of a chain gets a fresh session id and is
//! launched on the first page; it succeeds only when its driver asks for the
//! step past the last page. A candidate that fails to start, exits with an
//! error, or goes quiet for longer than the timeout is killed and the next one
//! is tried.
//!
//! 启动 Web 进程和协调服务器，然后依次处理每个浏览器链。
//! 只有驱动程序请求越过最后一页的步骤时，候选项才算成功。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::core::config::{BrowserChain, PageSpec, RunOptions};
use crate::core::error::{Error, Result};
use crate::core::models::Level;
use crate::core::output::OutputAggregator;
use crate::core::registry::Filters;
use crate::infra::command::{ParsedCommand, ProcessGroup, Supervised};
use crate::remote::protocol::{PageContext, RelayedMessage};
use crate::remote::server::{SessionEvent, StepCoordinator};

/// Runs the remote stage.
pub async fn run_web_tests(
    options: &RunOptions,
    filters: &Filters,
    output: &Arc<OutputAggregator>,
) -> Result<()> {
    output.log("");
    output.log("Start web tests...");
    output.log("--------------------");

    let mut processes = ProcessGroup::new(output.clone());
    let outcome = run_stage(options, filters, output, &mut processes).await;
    processes.kill_all().await;
    outcome
}

async fn run_stage(
    options: &RunOptions,
    filters: &Filters,
    output: &Arc<OutputAggregator>,
    processes: &mut ProcessGroup,
) -> Result<()> {
    for spec in options.web_processes.iter().filter(|p| p.is_selected_by(filters)) {
        if spec.command.is_empty() {
            return Err(Error::WebCommandUnset);
        }
        output.log(format!("Start process: {}", spec.command.display()));
        processes.start(spec).await?;
    }

    output.log(format!(
        "Start back server on port {}",
        options.web_testing_port
    ));
    let coordinator = StepCoordinator::new(options.web_testing_pages.clone());
    let server = coordinator.serve(options.web_testing_port).await?;
    let port = server.port();

    let mut outcome = Ok(());
    for chain in &options.web_browsers {
        outcome = run_chain(chain, options, &coordinator, port, output).await;
        if outcome.is_err() {
            break;
        }
    }
    server.shutdown().await;
    outcome
}

/// Tries the candidates of `chain` in order until one reaches the terminal step.
pub async fn run_chain(
    chain: &BrowserChain,
    options: &RunOptions,
    coordinator: &StepCoordinator,
    port: u16,
    output: &Arc<OutputAggregator>,
) -> Result<()> {
    let first = options
        .web_testing_pages
        .first()
        .ok_or_else(|| Error::InvalidOptions("web_testing_pages must not be empty".into()))?;
    let mut last_failure: Option<(String, String)> = None;

    for template in chain.candidates() {
        let run_id = uuid::Uuid::new_v4().to_string();
        let entry = entry_context(options, first, port, &run_id);
        let outcome = match entry.apply(&first.url) {
            Ok(url) => match ParsedCommand::from_template(template, &url) {
                Ok(command) => {
                    let watch = Attempt {
                        command: &command,
                        url: &url,
                        entry: &entry,
                        coordinator,
                        output,
                        timeout: options.timeout(),
                    };
                    watch
                        .launch()
                        .await
                        .map_err(|e| (command.display.clone(), e))
                }
                Err(e) => Err((template.clone(), e)),
            },
            Err(e) => Err((template.clone(), e)),
        };

        match outcome {
            Ok(()) => return Ok(()),
            Err((command, cause)) => {
                output.error(format!("Browser '{command}' failed: {cause}"));
                last_failure = Some((command, cause.to_string()));
            }
        }
    }

    let (command, cause) = last_failure.unwrap_or_default();
    Err(Error::BrowserTestFailed { command, cause })
}

/// Correlation parameters of the first page of an attempt.
fn entry_context(options: &RunOptions, first: &PageSpec, port: u16, run_id: &str) -> PageContext {
    PageContext {
        host: "localhost".to_string(),
        port,
        id: run_id.to_string(),
        step: 0,
        parts: options.parts.clone(),
        groups: options.groups.clone(),
        tests: options.tests.clone(),
        include: first.include.clone(),
        wait: first.wait.clone(),
    }
}

/// One candidate launched on the first page.
struct Attempt<'a> {
    command: &'a ParsedCommand,
    url: &'a str,
    entry: &'a PageContext,
    coordinator: &'a StepCoordinator,
    output: &'a Arc<OutputAggregator>,
    timeout: Duration,
}

impl Attempt<'_> {
    /// Opens a session for this candidate, launches it and watches it until it
    /// finishes the pages, fails or stalls. The browser is always killed and
    /// the session closed before returning.
    async fn launch(&self) -> Result<()> {
        let events = self.coordinator.open_session(&self.entry.id);
        self.output
            .log(format!("Start browser '{}' ...", self.command.display));

        let result = match Supervised::spawn(self.command, self.output.clone()) {
            Ok(mut browser) => {
                let result = self.watch(&mut browser, events).await;
                browser.kill().await;
                result
            }
            Err(e) => {
                self.output.error(format!(
                    "Failed to start browser '{}': {e}",
                    self.command.display
                ));
                Err(Error::ExecCommandFailed {
                    command: self.command.display.clone(),
                })
            }
        };

        self.coordinator.close_session();
        self.output.discard_test();
        result
    }

    async fn watch(
        &self,
        browser: &mut Supervised,
        mut events: mpsc::UnboundedReceiver<SessionEvent>,
    ) -> Result<()> {
        let watchdog = tokio::time::sleep(self.timeout);
        tokio::pin!(watchdog);
        let mut stall = format!("Page \"{}\" test timed out", self.url);
        let mut exited = false;

        loop {
            tokio::select! {
                event = events.recv() => {
                    watchdog.as_mut().reset(Instant::now() + self.timeout);
                    match event {
                        Some(SessionEvent::Step(index)) => {
                            if self.on_step(index)? {
                                return Ok(());
                            }
                        }
                        Some(SessionEvent::Message(message)) => {
                            if let Some(reason) = self.on_message(message) {
                                stall = reason;
                            }
                        }
                        None => return Err(Error::Timeout(stall)),
                    }
                }
                status = browser.wait(), if !exited => {
                    exited = true;
                    match status {
                        // A launcher that hands the page to an existing browser exits cleanly.
                        Ok(status) if status.success() => {}
                        _ => {
                            self.output.error(format!(
                                "Browser '{}' exited with an error.",
                                self.command.display
                            ));
                            return Err(Error::ExecCommandFailed {
                                command: self.command.display.clone(),
                            });
                        }
                    }
                }
                _ = &mut watchdog => return Err(Error::Timeout(stall)),
            }
        }
    }

    /// Returns `true` at the terminal step.
    fn on_step(&self, index: usize) -> Result<bool> {
        let Some(page) = self.coordinator.pages().get(index).filter(|p| !p.url.is_empty()) else {
            return Ok(true);
        };
        let next = self
            .entry
            .for_step(index, page.include.clone(), page.wait.clone())
            .apply(&page.url)?;
        self.output.forward(
            &self.command.program,
            Level::Log,
            crate::core::models::ENGINE_SOURCE,
            format!("Go to page {next}"),
        );
        Ok(false)
    }

    /// Applies a relayed line to the records. Returns the new stall message
    /// when the line changes what the watchdog is waiting for.
    fn on_message(&self, message: RelayedMessage) -> Option<String> {
        let program = &self.command.program;
        let mut stall = None;
        if let Some(test) = message.test.as_deref() {
            let part = message.part.as_deref().unwrap_or_default();
            let group = message.group.as_deref().unwrap_or_default();
            if message.is_start() {
                self.output.open_test(part, group, test, program);
                stall = Some(format!("[{part}][{group}][{test}] test timed out"));
            }
            if message.is_end() {
                self.output
                    .forward(program, message.level, &message.source, message.message);
                self.output.close_test(message.error);
                return Some("Browser command timed out".to_string());
            }
        }
        self.output
            .forward(program, message.level, &message.source, message.message);
        stall
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::Status;
    use serde_json::json;

    fn quiet_options() -> RunOptions {
        RunOptions {
            quiet: true,
            ..RunOptions::default()
        }
    }

    #[tokio::test]
    async fn chain_without_pages_is_rejected() {
        let output = Arc::new(OutputAggregator::new("server", &quiet_options(), None, None));
        let coordinator = StepCoordinator::new(Vec::new());
        let chain = BrowserChain::new(["firefox {{url}}"]);
        let err = run_chain(&chain, &quiet_options(), &coordinator, 4589, &output)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidOptions(_)));
    }

    #[test]
    fn relayed_end_with_a_plain_error_fails_the_record() {
        let options = quiet_options();
        let output = Arc::new(OutputAggregator::new("server", &options, None, None));
        let coordinator = StepCoordinator::new(vec![PageSpec::new("http://localhost/a.html")]);
        let command = ParsedCommand::from_template("firefox {{url}}", "http://localhost/a.html")
            .unwrap();
        let entry = entry_context(&options, &coordinator.pages()[0], 4589, "run-1");
        let attempt = Attempt {
            command: &command,
            url: "http://localhost/a.html",
            entry: &entry,
            coordinator: &coordinator,
            output: &output,
            timeout: Duration::from_secs(1),
        };

        let body = |command: &str, error: serde_json::Value| {
            RelayedMessage::from_body(&json!({
                "id": "run-1",
                "command": command,
                "part": "ui",
                "group": "form",
                "test": "submit",
                "level": "warn",
                "message": "line",
                "error": error,
            }))
            .unwrap()
        };

        let stall = attempt.on_message(body("start_test", json!(null)));
        assert_eq!(stall.as_deref(), Some("[ui][form][submit] test timed out"));
        let stall = attempt.on_message(body("end_test", json!("boom")));
        assert_eq!(stall.as_deref(), Some("Browser command timed out"));

        let result = output.take_result();
        assert_eq!(result.test_count, 1);
        assert_eq!(result.error_count, 1);
        let record = &result.tests[0];
        assert_eq!(record.status, Status::Error);
        assert_eq!(record.executor, "firefox");
        assert_eq!(record.error.as_ref().map(|e| e.message.as_str()), Some("boom"));
    }
}
