//! # Remote Driver Module / 远程驱动模块
//!
//! The client side of remote execution. A driver is handed a page URL with
//! correlation parameters, runs the registry's local pass with those filters
//! while relaying every line back to the coordinator, then asks for the next
//! step and follows it until the coordinator answers with the terminal step.
//!
//! 远程执行的客户端。驱动程序获得带有关联参数的页面 URL，使用这些过滤条件运行
//! 本地测试并将每一行输出转发回协调器，然后请求下一步，直到协调器返回终止步骤。

use crate::core::config::RunOptions;
use crate::core::error::{Error, Result};
use crate::core::models::RunResult;
use crate::core::registry::Registry;
use crate::core::session::RunSession;
use crate::remote::protocol::{StepRequest, StepResponse};
use crate::remote::relay::RelayTarget;

pub use crate::remote::protocol::PageContext;

/// What driving one page produced.
#[derive(Debug, Clone, PartialEq)]
pub struct PageOutcome {
    pub result: RunResult,
    /// URL of the next page, `None` at the terminal step.
    pub next: Option<String>,
}

/// Runs the tests of one page and asks the coordinator where to go next.
///
/// `base` supplies everything the URL does not carry (timeout, quiet, sink).
pub async fn drive_page(registry: &Registry, url: &str, base: &RunOptions) -> Result<PageOutcome> {
    let context = PageContext::from_url(url)?;
    let options = RunOptions {
        parts: context.parts.clone(),
        groups: context.groups.clone(),
        tests: context.tests.clone(),
        include: context.include.clone(),
        enable_local_tests: true,
        enable_web_tests: false,
        processes: Vec::new(),
        web_processes: Vec::new(),
        web_testing_pages: Vec::new(),
        ..base.clone()
    };

    let result = RunSession::new(registry, options)
        .with_relay(RelayTarget::from(&context))
        .with_delay(context.wait.clone())
        .run()
        .await
        .map_err(|failure| failure.error)?;

    let next = next_page(&context).await?;
    Ok(PageOutcome { result, next })
}

async fn next_page(context: &PageContext) -> Result<Option<String>> {
    let url = context.coordinator_url("getstep");
    let step = context.step + 1;
    let request = StepRequest {
        id: context.id.clone(),
        step,
    };

    let failed = |e: reqwest::Error| {
        tracing::warn!("getstep failed: {e}");
        Error::RelaySendFailed { url: url.clone() }
    };
    let reply: StepResponse = reqwest::Client::new()
        .post(&url)
        .json(&request)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(failed)?
        .json()
        .await
        .map_err(failed)?;

    match reply.url {
        Some(page) if !page.is_empty() => {
            let next = context
                .for_step(step, reply.include.unwrap_or_default(), reply.wait)
                .apply(&page)?;
            Ok(Some(next))
        }
        _ => Ok(None),
    }
}

/// Drives pages starting at `url` until the terminal step, returning the
/// result of every page in order.
pub async fn drive(registry: &Registry, url: &str, base: &RunOptions) -> Result<Vec<RunResult>> {
    let mut results = Vec::new();
    let mut current = url.to_string();
    loop {
        let outcome = drive_page(registry, &current, base).await?;
        results.push(outcome.result);
        match outcome.next {
            Some(next) => current = next,
            None => return Ok(results),
        }
    }
}
