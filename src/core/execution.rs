//! # Test Execution Engine Module / 测试执行引擎模块
//!
//! Runs the selected tests of a registry one at a time. Each body races a
//! per-test timer; a returned failure, a timeout or a panic all end up as an
//! `error` record, and the next test runs regardless.
//!
//! 逐个运行注册表中被选中的测试。每个测试体都与单独的计时器竞争；
//! 返回的失败、超时或 panic 都会记录为 `error`，然后继续运行下一个测试。

use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use crate::core::check::{TestContext, TestError, TestResult};
use crate::core::models::Level;
use crate::core::output::{Lifecycle, OutputAggregator};
use crate::core::registry::{Filters, Registry, TestCase, TestFuture};

/// Awaits a test body under `limit`, turning a timeout or a panic into a `TestError`.
pub async fn run_guarded(body: TestFuture, limit: Duration) -> TestResult {
    match tokio::time::timeout(limit, AssertUnwindSafe(body).catch_unwind()).await {
        Err(_) => Err(TestError::timeout()),
        Ok(Err(payload)) => Err(TestError::panic(panic_message(payload.as_ref()))),
        Ok(Ok(result)) => result,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("Test panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("Test panicked: {s}")
    } else {
        "Test panicked".to_string()
    }
}

/// Runs one test and records it on `output`.
pub async fn run_test_case(case: &TestCase, output: &OutputAggregator, limit: Duration) {
    let key = format!("[{}][{}][{}]", case.part, case.group, case.name);
    output.open_test(&case.part, &case.group, &case.name, output.executor());
    output.lifecycle(
        Level::Log,
        format!("Test {key} running ..."),
        Lifecycle::Start,
    );

    let ctx = TestContext::new(&case.part, &case.group, &case.name, output.executor());
    let outcome = run_guarded((case.body)(ctx), limit).await;

    match outcome {
        Ok(()) => {
            output.lifecycle(
                Level::Log,
                format!("Test {key} is completed."),
                Lifecycle::End(None),
            );
            output.close_test(None);
        }
        Err(failure) => {
            let info = failure.to_info();
            output.lifecycle(
                Level::Error,
                format!(
                    "Test {key} is failed. \nPosition: {}\nError:   {}",
                    info.position(),
                    info.message
                ),
                Lifecycle::End(Some(info.clone())),
            );
            output.close_test(Some(info));
        }
    }
}

/// Runs every test of `registry` matching `filters`, in registration order.
pub async fn run_local_tests(
    registry: &Registry,
    filters: &Filters,
    output: &OutputAggregator,
    limit: Duration,
) {
    let tests = registry.selected(filters);
    if !tests.is_empty() {
        output.log("");
        output.log("Start local tests...");
        output.log("--------------------");
    }
    for case in &tests {
        run_test_case(case, output, limit).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::RunOptions;
    use crate::core::models::{FailureKind, SERVER_EXECUTOR, Status};

    fn quiet_output() -> OutputAggregator {
        let options = RunOptions {
            quiet: true,
            ..RunOptions::default()
        };
        OutputAggregator::new(SERVER_EXECUTOR, &options, None, None)
    }

    #[tokio::test]
    async fn guarded_body_times_out() {
        let body: TestFuture = Box::pin(async {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok(())
        });
        let err = run_guarded(body, Duration::from_millis(20)).await.unwrap_err();
        assert_eq!(err.kind, FailureKind::Timeout);
    }

    #[tokio::test]
    async fn guarded_body_panic_is_caught() {
        let body: TestFuture = Box::pin(async { panic!("exploded") });
        let err = run_guarded(body, Duration::from_secs(1)).await.unwrap_err();
        assert_eq!(err.kind, FailureKind::Panic);
        assert!(err.message.contains("exploded"));
    }

    #[tokio::test]
    async fn failures_do_not_stop_the_pass() {
        let registry = Registry::new();
        registry
            .register_named("fails", |ctx: TestContext| async move { ctx.equal(1, 2) })
            .unwrap();
        registry
            .register_named("passes", |ctx: TestContext| async move { ctx.less(1, 2) })
            .unwrap();

        let output = quiet_output();
        run_local_tests(
            &registry,
            &Filters::default(),
            &output,
            Duration::from_secs(1),
        )
        .await;

        let result = output.take_result();
        assert_eq!(result.test_count, 2);
        assert_eq!(result.tests[0].status, Status::Error);
        assert_eq!(
            result.tests[0].error.as_ref().and_then(|e| e.kind),
            Some(FailureKind::Equal)
        );
        assert!(result.tests[0].error.as_ref().unwrap().file.ends_with("execution.rs"));
        assert_eq!(result.tests[1].status, Status::Ok);
        assert_eq!(result.tests[1].executor, SERVER_EXECUTOR);
    }
}
