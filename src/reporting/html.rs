//! # HTML Reporting Module / HTML 报告模块
//!
//! Renders a `RunResult` as a standalone HTML page: totals, one table row per
//! test and the captured output of each test behind a toggle.
//!
//! 将 `RunResult` 渲染为独立的 HTML 页面：汇总数字、每个测试一行，
//! 以及可折叠的测试输出。

use anyhow::{Context, Result};
use maud::{DOCTYPE, Markup, PreEscaped, html};
use std::fs;
use std::path::Path;

use crate::core::models::{RunResult, Status, TestRecord};

/// Embedded CSS styles for HTML reports / HTML 报告的嵌入式 CSS 样式
const HTML_STYLE: &str = r#"
body { font-family: -apple-system, "Segoe UI", sans-serif; margin: 2rem; color: #222; }
.summary-container { display: flex; gap: 2rem; margin-bottom: 1.5rem; }
.summary-item { display: flex; flex-direction: column; align-items: center; }
.count { font-size: 2rem; font-weight: bold; }
.passed-text { color: #2e7d32; }
.failed-text { color: #c62828; }
table { border-collapse: collapse; width: 100%; }
th, td { border-bottom: 1px solid #ddd; padding: 0.4rem 0.6rem; text-align: left; }
.status-cell { display: inline-block; padding: 0.1rem 0.5rem; border-radius: 4px; color: #fff; }
.status-ok { background: #2e7d32; }
.status-error { background: #c62828; }
.status-pending { background: #757575; }
.output-toggle { cursor: pointer; color: #1565c0; font-size: 0.85rem; }
.output-content { background: #f5f5f5; padding: 0.6rem; white-space: pre-wrap; }
"#;

/// Embedded JavaScript for HTML report interactivity / HTML 报告交互性的嵌入式 JavaScript
const HTML_SCRIPT: &str = r#"
function toggleOutput(id) {
  var row = document.getElementById(id);
  row.style.display = row.style.display === 'none' ? 'table-row' : 'none';
}
"#;

fn status_class(record: &TestRecord) -> &'static str {
    match record.status {
        Status::Ok => "status-ok",
        Status::Error => "status-error",
        Status::Pending => "status-pending",
    }
}

fn record_rows(index: usize, record: &TestRecord) -> Markup {
    let output_id = format!("output-{index}");
    let toggle = format!("toggleOutput('{output_id}')");
    html! {
        tr {
            td { (record.key()) }
            td { (record.executor) }
            td {
                div class={ "status-cell " (status_class(record)) } {
                    (format!("{:?}", record.status))
                }
                @if !record.output.is_empty() || record.error.is_some() {
                    div class="output-toggle" onclick=(toggle) { "Show output" }
                }
            }
            td {
                @if let Some(error) = &record.error {
                    (error.message) br; small { (error.position()) }
                }
            }
        }
        tr id=(output_id) style="display:none;" {
            td colspan="4" {
                pre class="output-content" {
                    @for line in &record.output {
                        (format!("[{}] {}: {}\n", line.level, line.source, line.text))
                    }
                }
            }
        }
    }
}

/// Renders the report markup.
pub fn render_html_report(result: &RunResult) -> Markup {
    html! {
        (DOCTYPE)
        html {
            head {
                meta charset="utf-8";
                title { "crosstest report" }
                style { (PreEscaped(HTML_STYLE)) }
            }
            body {
                h1 { "Test Report" }
                div class="summary-container" {
                    div class="summary-item" {
                        span class="count" { (result.test_count) }
                        span class="label" { "Total" }
                    }
                    div class="summary-item" {
                        span class="count passed-text" { (result.successful_count) }
                        span class="label" { "Passed" }
                    }
                    div class="summary-item" {
                        span class="count failed-text" { (result.error_count) }
                        span class="label" { "Failed" }
                    }
                }
                table {
                    thead {
                        tr { th { "Test" } th { "Executor" } th { "Status" } th { "Error" } }
                    }
                    tbody {
                        @for (i, record) in result.tests.iter().enumerate() {
                            (record_rows(i, record))
                        }
                    }
                }
                script { (PreEscaped(HTML_SCRIPT)) }
            }
        }
    }
}

/// Writes the HTML report to `output_path`.
///
/// 将 HTML 报告写入 `output_path`。
pub fn generate_html_report(result: &RunResult, output_path: &Path) -> Result<()> {
    let markup = render_html_report(result);
    fs::write(output_path, markup.into_string())
        .with_context(|| format!("Failed to write HTML report to {}", output_path.display()))
}

/// Writes the serialized `RunResult` to `output_path`.
pub fn generate_json_report(result: &RunResult, output_path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(result)?;
    fs::write(output_path, json)
        .with_context(|| format!("Failed to write JSON report to {}", output_path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::ErrorInfo;

    #[test]
    fn report_escapes_test_output() {
        let mut result = RunResult::default();
        let mut record = TestRecord::pending("p", "g", "<script>", "server");
        record.finish(Some(ErrorInfo {
            message: "a < b".into(),
            file: "tests/x.rs".into(),
            line: Some(4),
            kind: None,
        }));
        result.record(record);

        let page = render_html_report(&result).into_string();
        assert!(page.contains("[p][g][&lt;script&gt;]"));
        assert!(page.contains("a &lt; b"));
        assert!(page.contains("tests/x.rs:4"));
    }
}
