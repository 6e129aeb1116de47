//! # Output Aggregation Module / 输出聚合模块
//!
//! Every diagnostic line of a run passes through one `OutputAggregator`. A line
//! is stamped with the executor and the test that is current when it arrives,
//! then appended to that test's record and to the run's output, handed to the
//! `on_message` sink, broadcast to subscribers and, in a remote-driven run,
//! relayed to the coordinator.
//!
//! 一次运行的每一条诊断输出都经过同一个 `OutputAggregator`。每条输出都带上执行器
//! 和当前测试的信息，然后追加到测试记录和运行输出，交给 `on_message`，
//! 广播给订阅者，并在远程驱动的运行中转发给协调器。

use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::broadcast;

use crate::core::config::{MessageSink, RunOptions};
use crate::core::models::{ENGINE_SOURCE, ErrorInfo, Level, OutputMessage, RunResult, TestRecord};
use crate::infra::capture::suppressed;
use crate::remote::relay::RelayClient;

/// Test lifecycle marker carried by the start and end lines of a test.
#[derive(Debug, Clone, PartialEq)]
pub enum Lifecycle {
    Start,
    End(Option<ErrorInfo>),
}

/// Mutable state of the run in progress.
#[derive(Debug, Default)]
struct RunTask {
    result: RunResult,
    current: Option<TestRecord>,
}

/// Run-scoped collector of diagnostic output and test records.
/// 运行范围内的诊断输出和测试记录收集器。
pub struct OutputAggregator {
    executor: String,
    quiet: bool,
    installed: AtomicBool,
    task: Mutex<RunTask>,
    sink: Option<MessageSink>,
    subscribers: Option<broadcast::Sender<OutputMessage>>,
    relay: Mutex<Option<RelayClient>>,
}

impl OutputAggregator {
    pub fn new(
        executor: &str,
        options: &RunOptions,
        subscribers: Option<broadcast::Sender<OutputMessage>>,
        relay: Option<RelayClient>,
    ) -> Self {
        Self {
            executor: executor.to_string(),
            quiet: options.quiet,
            installed: AtomicBool::new(false),
            task: Mutex::new(RunTask::default()),
            sink: options.on_message.clone(),
            subscribers,
            relay: Mutex::new(relay),
        }
    }

    /// Tag of the executor running in this process.
    pub fn executor(&self) -> &str {
        &self.executor
    }

    pub fn install(&self) {
        self.installed.store(true, Ordering::SeqCst);
    }

    pub fn uninstall(&self) {
        self.installed.store(false, Ordering::SeqCst);
    }

    pub fn is_installed(&self) -> bool {
        self.installed.load(Ordering::SeqCst)
    }

    /// Records an intercepted ambient write.
    pub fn capture(&self, level: Level, source: &str, text: String) {
        let message = self.stamp(level, source, &self.executor, text);
        self.push(message, None);
    }

    /// An engine line at level `log`.
    pub fn log(&self, text: impl Into<String>) {
        self.engine(Level::Log, text.into(), None);
    }

    /// An engine line at level `error`.
    pub fn error(&self, text: impl Into<String>) {
        self.engine(Level::Error, text.into(), None);
    }

    /// An engine line carrying a test lifecycle marker.
    pub fn lifecycle(&self, level: Level, text: impl Into<String>, marker: Lifecycle) {
        self.engine(level, text.into(), Some(marker));
    }

    fn engine(&self, level: Level, text: String, marker: Option<Lifecycle>) {
        let message = self.stamp(level, ENGINE_SOURCE, &self.executor, text);
        if !self.quiet {
            echo(level, &message.text);
        }
        self.push(message, marker.as_ref());
    }

    /// Records a line produced by another executor, such as a remote driver.
    pub fn forward(&self, executor: &str, level: Level, source: &str, text: String) {
        let message = self.stamp(level, source, executor, text);
        if !self.quiet {
            echo(level, &format!("{source}; BROWSER:{executor} {}", message.text));
        }
        self.push(message, None);
    }

    /// Opens the record subsequent lines are attributed to.
    pub fn open_test(&self, part: &str, group: &str, name: &str, executor: &str) {
        self.lock().current = Some(TestRecord::pending(part, group, name, executor));
    }

    /// Closes the open record and appends it to the result.
    ///
    /// Returns `false` when no record was open.
    pub fn close_test(&self, error: Option<ErrorInfo>) -> bool {
        let mut task = self.lock();
        match task.current.take() {
            Some(mut record) => {
                record.finish(error);
                task.result.record(record);
                true
            }
            None => false,
        }
    }

    /// Drops an open record without recording it.
    pub fn discard_test(&self) {
        self.lock().current = None;
    }

    pub fn current_key(&self) -> Option<String> {
        self.lock().current.as_ref().map(TestRecord::key)
    }

    pub fn snapshot(&self) -> RunResult {
        self.lock().result.clone()
    }

    /// Moves the collected result out, leaving an empty one behind.
    pub fn take_result(&self) -> RunResult {
        std::mem::take(&mut self.lock().result)
    }

    /// Delivers every queued relay message, in order.
    pub async fn flush_relay(&self) {
        let relay = self
            .relay
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(relay) = relay {
            relay.flush().await;
        }
    }

    fn stamp(&self, level: Level, source: &str, executor: &str, text: String) -> OutputMessage {
        let task = self.lock();
        let current = task.current.as_ref();
        OutputMessage {
            level,
            source: source.to_string(),
            executor: executor.to_string(),
            timestamp: Utc::now(),
            text: text.trim_matches(['\r', '\n']).to_string(),
            part: current.map(|r| r.part.clone()),
            group: current.map(|r| r.group.clone()),
            test: current.map(|r| r.name.clone()),
        }
    }

    fn push(&self, message: OutputMessage, marker: Option<&Lifecycle>) {
        suppressed(|| {
            {
                let mut task = self.lock();
                if let Some(record) = task.current.as_mut() {
                    record.output.push(message.clone());
                }
                task.result.output.push(message.clone());
            }
            if let Some(sink) = &self.sink {
                sink.call(&message);
            }
            if let Some(subscribers) = &self.subscribers {
                let _ = subscribers.send(message.clone());
            }
            if let Some(relay) = self.relay.lock().unwrap_or_else(|e| e.into_inner()).as_ref() {
                relay.send(&message, marker);
            }
        });
    }

    fn lock(&self) -> MutexGuard<'_, RunTask> {
        self.task.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn echo(level: Level, text: &str) {
    suppressed(|| {
        if level.is_error() {
            tracing::error!(target: "crosstest", "{text}");
        } else {
            tracing::info!(target: "crosstest", "{text}");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::{SERVER_EXECUTOR, Status};
    use std::sync::Arc;

    fn quiet_options() -> RunOptions {
        RunOptions {
            quiet: true,
            ..RunOptions::default()
        }
    }

    #[test]
    fn lines_are_attributed_to_the_open_test() {
        let output = OutputAggregator::new(SERVER_EXECUTOR, &quiet_options(), None, None);
        output.log("header");
        output.open_test("p", "g", "t", SERVER_EXECUTOR);
        output.capture(Level::Info, "app", "inside\n".to_string());
        assert!(output.close_test(None));
        assert!(!output.close_test(None));

        let result = output.take_result();
        assert_eq!(result.output.len(), 2);
        assert_eq!(result.output[0].test, None);
        assert_eq!(result.output[1].test.as_deref(), Some("t"));
        assert_eq!(result.output[1].text, "inside");
        assert_eq!(result.tests[0].output.len(), 1);
        assert_eq!(result.tests[0].status, Status::Ok);
    }

    #[test]
    fn sink_and_subscribers_see_every_line() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_by_sink = seen.clone();
        let options = RunOptions {
            quiet: true,
            on_message: Some(MessageSink::new(move |m| {
                seen_by_sink.lock().unwrap().push(m.text.clone())
            })),
            ..RunOptions::default()
        };
        let (tx, mut rx) = broadcast::channel(8);
        let output = OutputAggregator::new(SERVER_EXECUTOR, &options, Some(tx), None);

        output.log("one");
        output.forward("firefox", Level::Warning, "page", "two".to_string());

        assert_eq!(*seen.lock().unwrap(), vec!["one", "two"]);
        assert_eq!(rx.try_recv().unwrap().text, "one");
        let forwarded = rx.try_recv().unwrap();
        assert_eq!(forwarded.executor, "firefox");
        assert_eq!(forwarded.level, Level::Warning);
    }

    #[test]
    fn discarded_records_are_not_counted() {
        let output = OutputAggregator::new(SERVER_EXECUTOR, &quiet_options(), None, None);
        output.open_test("p", "g", "t", "chromium");
        assert_eq!(output.current_key().as_deref(), Some("[p][g][t]"));
        output.discard_test();
        assert_eq!(output.snapshot().test_count, 0);
    }
}
