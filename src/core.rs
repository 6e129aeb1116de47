//! # Core Module / 核心模块
//!
//! This module contains the core functionality of crosstest: the test
//! registry, run options, data models, the local executor and the staged run
//! pipeline.
//!
//! 此模块包含 crosstest 的核心功能：测试注册表、运行选项、数据模型、
//! 本地执行器和分阶段的运行流水线。

pub mod check;
pub mod config;
pub mod error;
pub mod execution;
pub mod models;
pub mod output;
pub mod registry;
pub mod session;

// Re-exports
pub use output::OutputAggregator;
pub use session::RunSession;
