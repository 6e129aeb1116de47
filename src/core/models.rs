//! # Data Models Module / 数据模型模块
//!
//! This module defines the data structures a run produces: the aggregated
//! `RunResult`, one `TestRecord` per executed test, and the `OutputMessage`
//! stream collected from every executor.
//!
//! 此模块定义了一次运行产生的数据结构：聚合的 `RunResult`、每个已执行测试的
//! `TestRecord`，以及从所有执行器收集的 `OutputMessage` 流。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Executor tag of tests run inside the orchestrating process.
/// 在编排进程内运行的测试的执行器标签。
pub const SERVER_EXECUTOR: &str = "server";

/// Executor tag a remote driver uses for its own local pass.
/// 远程驱动程序在其本地执行中使用的执行器标签。
pub const DRIVER_EXECUTOR: &str = "driver";

/// Source name of the engine's own log lines.
pub const ENGINE_SOURCE: &str = "crosstest";

/// Severity of an `OutputMessage`.
/// `OutputMessage` 的严重级别。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace,
    Debug,
    Info,
    Log,
    Warning,
    Error,
    Test,
    Crash,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Log => "log",
            Level::Warning => "warning",
            Level::Error => "error",
            Level::Test => "test",
            Level::Crash => "crash",
        }
    }

    /// Parses a level name, accepting the common short spellings.
    pub fn from_name(name: &str) -> Option<Level> {
        let level = match name.trim().to_ascii_lowercase().as_str() {
            "trace" => Level::Trace,
            "debug" => Level::Debug,
            "info" => Level::Info,
            "log" => Level::Log,
            "warn" | "warning" => Level::Warning,
            "error" | "err" => Level::Error,
            "test" => Level::Test,
            "crash" => Level::Crash,
            _ => return None,
        };
        Some(level)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Level::Error | Level::Crash)
    }
}

impl From<&tracing::Level> for Level {
    fn from(level: &tracing::Level) -> Self {
        match *level {
            tracing::Level::TRACE => Level::Trace,
            tracing::Level::DEBUG => Level::Debug,
            tracing::Level::INFO => Level::Info,
            tracing::Level::WARN => Level::Warning,
            tracing::Level::ERROR => Level::Error,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One diagnostic line, stamped with whatever test was current when it was emitted.
/// 一条诊断输出，带有发出时当前测试的上下文。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputMessage {
    pub level: Level,
    pub source: String,
    pub executor: String,
    pub timestamp: DateTime<Utc>,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test: Option<String>,
}

/// Lifecycle state of a `TestRecord`.
/// `TestRecord` 的生命周期状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Pending,
    Ok,
    Error,
}

/// Category of a test failure.
/// 测试失败的类别。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    User,
    Timeout,
    Panic,
}

impl FailureKind {
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            FailureKind::Equal
                | FailureKind::NotEqual
                | FailureKind::Less
                | FailureKind::LessEqual
                | FailureKind::Greater
                | FailureKind::GreaterEqual
        )
    }
}

/// Serializable description of why a test failed.
/// 测试失败原因的可序列化描述。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub message: String,
    #[serde(default = "unknown_file")]
    pub file: String,
    #[serde(default)]
    pub line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<FailureKind>,
}

fn unknown_file() -> String {
    "unknown".to_string()
}

impl ErrorInfo {
    /// An error known only by its message.
    pub fn from_message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            file: unknown_file(),
            line: None,
            kind: None,
        }
    }

    /// Position as `file:line`, with `unknown` standing in for missing parts.
    pub fn position(&self) -> String {
        match self.line {
            Some(line) => format!("{}:{}", self.file, line),
            None => format!("{}:unknown", self.file),
        }
    }
}

/// The outcome of one executed test, local or remote.
/// 单个已执行测试（本地或远程）的结果。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestRecord {
    pub part: String,
    pub group: String,
    pub name: String,
    pub executor: String,
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
    #[serde(default)]
    pub output: Vec<OutputMessage>,
}

impl TestRecord {
    pub fn pending(part: &str, group: &str, name: &str, executor: &str) -> Self {
        Self {
            part: part.to_string(),
            group: group.to_string(),
            name: name.to_string(),
            executor: executor.to_string(),
            status: Status::Pending,
            error: None,
            output: Vec::new(),
        }
    }

    /// Closes the record: `ok` without an error, `error` with one.
    pub fn finish(&mut self, error: Option<ErrorInfo>) {
        self.status = if error.is_some() {
            Status::Error
        } else {
            Status::Ok
        };
        self.error = error;
    }

    pub fn is_failure(&self) -> bool {
        self.status == Status::Error
    }

    /// `[part][group][name]`, the key format used in every log line.
    pub fn key(&self) -> String {
        format!("[{}][{}][{}]", self.part, self.group, self.name)
    }
}

/// Aggregated result of a single run.
///
/// Records are only added through [`RunResult::record`], which keeps
/// `test_count == tests.len() == error_count + successful_count`.
///
/// 单次运行的聚合结果。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub error_count: usize,
    pub successful_count: usize,
    pub test_count: usize,
    pub tests: Vec<TestRecord>,
    pub output: Vec<OutputMessage>,
}

impl RunResult {
    /// Appends a closed record and updates the counters.
    pub fn record(&mut self, record: TestRecord) {
        if record.is_failure() {
            self.error_count += 1;
        } else {
            self.successful_count += 1;
        }
        self.test_count += 1;
        self.tests.push(record);
    }

    pub fn failed_tests(&self) -> impl Iterator<Item = &TestRecord> {
        self.tests.iter().filter(|t| t.is_failure())
    }

    pub fn is_success(&self) -> bool {
        self.error_count == 0
    }
}
