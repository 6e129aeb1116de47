//! # Reporting Module / 报告模块
//!
//! This module turns a `RunResult` into reports: a colored console summary,
//! a standalone HTML page and a JSON dump.
//!
//! 此模块将 `RunResult` 转换为报告：彩色控制台摘要、独立的 HTML 页面和 JSON 输出。

pub mod console;
pub mod html;

// Re-export common reporting functions
pub use console::{print_failure_details, print_summary};
pub use html::{generate_html_report, generate_json_report};
