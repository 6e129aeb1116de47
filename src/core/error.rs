//! # Error Types Module / 错误类型模块
//!
//! Orchestration-level errors. A failing test body is never one of these: test
//! failures are recorded on their `TestRecord` (see `core::check::TestError`).
//!
//! 编排层错误。测试体失败不会成为这些错误，而是记录在对应的 `TestRecord` 上。

use std::path::PathBuf;

use thiserror::Error;

use crate::core::models::RunResult;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that abort a stage of the run pipeline or reject a protocol request.
#[derive(Error, Debug)]
pub enum Error {
    /// A `/getstep` or `/message` request carried an id that is not the active session's.
    #[error("Invalid test ID")]
    InvalidTestId,

    /// A `/getstep` request whose `step` is not an integer.
    #[error("Invalid request format for crosstest")]
    InvalidRequestFormat,

    /// A child process could not be spawned or exited with a non-zero status during its start window.
    #[error("Child process \"{command}\" exited with an error")]
    ExecCommandFailed { command: String },

    /// Every candidate of a browser fallback chain failed.
    #[error("Failed to run test in browser. Command: \"{command}\". {cause}")]
    BrowserTestFailed { command: String, cause: String },

    /// A relayed message could not be delivered to the coordinator.
    #[error("Failed to send message to test server \"{url}\"")]
    RelaySendFailed { url: String },

    /// A web process entry has no command.
    #[error("Web unit test command not set (options: web_processes.command)")]
    WebCommandUnset,

    /// The stall watchdog fired.
    #[error("{0}")]
    Timeout(String),

    #[error("Test [{part}][{group}][{name}] is already registered")]
    DuplicateTest {
        part: String,
        group: String,
        name: String,
    },

    #[error("Unknown include \"{0}\"")]
    UnknownInclude(String),

    #[error("Unknown wait hook \"{0}\"")]
    UnknownHook(String),

    #[error("Invalid command \"{0}\"")]
    InvalidCommand(String),

    #[error("Invalid run options: {0}")]
    InvalidOptions(String),

    #[error("Invalid page URL \"{0}\"")]
    InvalidPageUrl(String),

    #[error("Failed to start the coordination server on port {port}: {source}")]
    ServerBind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read config file {path}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("The run was cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Short machine-readable code used in protocol error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidTestId => "InvalidTestId",
            Error::InvalidRequestFormat => "InvalidRequestFormat",
            Error::ExecCommandFailed { .. } => "ExecCommandFailed",
            Error::BrowserTestFailed { .. } => "BrowserTestFailed",
            Error::RelaySendFailed { .. } => "RelaySendFailed",
            Error::WebCommandUnset => "WebCommandUnset",
            Error::Timeout(_) => "Timeout",
            Error::DuplicateTest { .. } => "DuplicateTest",
            Error::UnknownInclude(_) => "UnknownInclude",
            Error::UnknownHook(_) => "UnknownHook",
            Error::InvalidCommand(_) => "InvalidCommand",
            Error::InvalidOptions(_) => "InvalidOptions",
            Error::InvalidPageUrl(_) => "InvalidPageUrl",
            Error::ServerBind { .. } => "ServerBind",
            Error::Config { .. } => "Config",
            Error::Cancelled => "Cancelled",
            Error::Io(_) => "Io",
            Error::Http(_) => "Http",
            Error::Json(_) => "Json",
        }
    }
}

/// An orchestration failure together with everything recorded before it.
///
/// Stages that completed before the failure keep their records, so a remote
/// stage failure still hands back the local results.
///
/// 编排失败及其发生前已记录的全部结果。
#[derive(Error, Debug)]
#[error("{error}")]
pub struct RunFailure {
    #[source]
    pub error: Error,
    pub partial: RunResult,
}

impl RunFailure {
    pub fn new(error: Error, partial: RunResult) -> Self {
        Self { error, partial }
    }
}
