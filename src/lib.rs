//! # Crosstest Library / Crosstest 库
//!
//! A cross-environment test orchestration engine. The same registered test
//! bodies run in-process ("local") or inside externally launched browser-like
//! drivers ("remote"), and everything they produce ends up in one
//! `RunResult`.
//!
//! 跨环境测试编排引擎。同一组已注册的测试体既可以在进程内运行（本地），
//! 也可以在外部启动的类浏览器驱动程序中运行（远程），所有结果汇总到一个 `RunResult`。
//!
//! ## Modules / 模块
//!
//! - `core` - Registry, options, run pipeline and local execution
//! - `infra` - Process supervision and output capture
//! - `remote` - Coordination protocol, server, browser stage and driver
//! - `reporting` - Console, HTML and JSON reports
//! - `cli` - Command-line interface and commands
//!
//! - `core` - 注册表、选项、运行流水线和本地执行
//! - `infra` - 进程监管和输出捕获
//! - `remote` - 协调协议、服务器、浏览器阶段和驱动程序
//! - `reporting` - 控制台、HTML 和 JSON 报告
//! - `cli` - 命令行接口和命令

pub mod cli;
pub mod core;
pub mod infra;
pub mod remote;
pub mod reporting;

// Re-export commonly used items
pub use core::check::{
    TestContext, TestError, TestResult, equal, error, greater, greater_equal, less, less_equal,
    not_equal,
};
pub use core::config::{BrowserChain, CommandSpec, MessageSink, PageSpec, ProcessSpec, RunOptions, Wait};
pub use core::error::{Error, Result, RunFailure};
pub use core::models::{ErrorInfo, FailureKind, Level, OutputMessage, RunResult, Status, TestRecord};
pub use core::registry::{Filters, Registry, Selector, is_selected};
pub use core::session::RunSession;
