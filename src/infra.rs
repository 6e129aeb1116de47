//! # Infrastructure Module / 基础设施模块
//!
//! Child process supervision and the tracing layer that captures a run's
//! ambient output.
//!
//! 子进程监管，以及捕获运行期间输出的 tracing 层。

pub mod capture;
pub mod command;
