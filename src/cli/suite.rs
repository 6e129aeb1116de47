//! # Smoke Suite Module / 冒烟测试套件模块
//!
//! Built-in smoke suite used by the `run` and `drive` commands.
//!
//! The `crosstest` binary has no way to load test code, so it ships a small
//! registry that exercises the pipeline end to end: comparisons, async bodies,
//! an include suite and a delay hook. Setting `CROSSTEST_SMOKE_FAIL=1` adds a
//! test that always fails, which is how the exit status is checked.
//!
//! `run` 和 `drive` 命令使用的内置冒烟测试套件。

use std::time::Duration;

use crate::core::check::TestContext;
use crate::core::error::Result;
use crate::core::registry::Registry;

/// Environment variable that adds a failing test to the suite.
pub const SMOKE_FAIL_ENV: &str = "CROSSTEST_SMOKE_FAIL";

/// Name of the include suite with the slower tests.
pub const SLOW_SUITE: &str = "slow";

/// Name of the delay hook, usable as `wait = "settle"` on a page.
pub const SETTLE_HOOK: &str = "settle";

/// Builds the smoke registry.
pub fn registry() -> Result<Registry> {
    let registry = Registry::new();

    registry.register("smoke", "check", "equal", |ctx: TestContext| async move {
        ctx.equal(2 + 2, 4)
    })?;
    registry.register("smoke", "check", "ordering", |ctx: TestContext| async move {
        ctx.less(1, 2)?;
        ctx.greater_equal("b", "a")
    })?;
    registry.register("smoke", "async", "sleep", |ctx: TestContext| async move {
        let started = std::time::Instant::now();
        tokio::time::sleep(Duration::from_millis(10)).await;
        ctx.greater_equal(started.elapsed(), Duration::from_millis(10))
    })?;
    registry.register("smoke", "async", "log", |ctx: TestContext| async move {
        tracing::info!("running on {}", ctx.executor());
        ctx.not_equal(ctx.executor(), "")
    })?;

    if std::env::var(SMOKE_FAIL_ENV).is_ok_and(|v| v == "1") {
        registry.register("smoke", "check", "forced-failure", |ctx: TestContext| async move {
            ctx.equal("expected", "actual")
        })?;
    }

    registry.provide_suite(SLOW_SUITE, |r: &Registry| {
        r.register("smoke", "slow", "tick", |ctx: TestContext| async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            ctx.equal(true, true)
        })
    });
    registry.provide_hook(SETTLE_HOOK, || async {
        tokio::time::sleep(Duration::from_millis(50)).await;
    });

    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suite_registers_smoke_tests() {
        let registry = registry().unwrap();
        assert!(registry.len() >= 4);
        assert!(registry.tests().iter().all(|t| t.part == "smoke"));

        registry.include(&[SLOW_SUITE.to_string()]).unwrap();
        assert!(registry.tests().iter().any(|t| t.group == "slow"));
    }
}
