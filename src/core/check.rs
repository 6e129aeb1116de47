//! # Check Helpers Module / 检查辅助模块
//!
//! Comparison helpers and the failure type returned by test bodies.
//! Every helper is `#[track_caller]`, so a failure points at the line in the
//! test body that made the call rather than at this module.
//!
//! 比较辅助函数和测试体返回的失败类型。
//! 所有辅助函数都标注了 `#[track_caller]`，因此失败位置指向测试体中的调用行。

use std::fmt::{self, Debug, Display};
use std::panic::Location;

use crate::core::models::{ErrorInfo, FailureKind};

/// Why a test body stopped.
/// 测试体停止的原因。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestError {
    pub kind: FailureKind,
    pub message: String,
    pub location: Option<&'static Location<'static>>,
}

impl TestError {
    #[track_caller]
    fn comparison(kind: FailureKind, left: &dyn Debug, right: &dyn Debug) -> Self {
        let message = match kind {
            FailureKind::Equal => format!("\"{left:?}\" and \"{right:?}\" are not equal"),
            FailureKind::NotEqual => format!("\"{left:?}\" and \"{right:?}\" are equal"),
            FailureKind::Less => format!("\"{left:?}\" is not less than \"{right:?}\""),
            FailureKind::LessEqual => {
                format!("\"{left:?}\" is not less than \"{right:?}\" or not equal")
            }
            FailureKind::Greater => format!("\"{left:?}\" is not greater than \"{right:?}\""),
            FailureKind::GreaterEqual => {
                format!("\"{left:?}\" is not greater than \"{right:?}\" or not equal")
            }
            _ => format!("{left:?} {right:?}"),
        };
        Self {
            kind,
            message,
            location: Some(Location::caller()),
        }
    }

    /// A failure raised explicitly by the test body.
    #[track_caller]
    pub fn user(info: impl Display) -> Self {
        Self {
            kind: FailureKind::User,
            message: info.to_string(),
            location: Some(Location::caller()),
        }
    }

    pub fn timeout() -> Self {
        Self {
            kind: FailureKind::Timeout,
            message: "Test timed out".to_string(),
            location: None,
        }
    }

    pub fn panic(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Panic,
            message: message.into(),
            location: None,
        }
    }

    /// Converts the failure to the serializable form stored on a `TestRecord`.
    pub fn to_info(&self) -> ErrorInfo {
        ErrorInfo {
            message: self.message.clone(),
            file: self
                .location
                .map(|l| l.file().to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            line: self.location.map(|l| l.line()),
            kind: Some(self.kind),
        }
    }
}

impl Display for TestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for TestError {}

/// Result type of a test body.
pub type TestResult = std::result::Result<(), TestError>;

/// Fails with `Equal` unless `left == right`.
#[track_caller]
pub fn equal<L, R>(left: L, right: R) -> TestResult
where
    L: PartialEq<R> + Debug,
    R: Debug,
{
    if left == right {
        Ok(())
    } else {
        Err(TestError::comparison(FailureKind::Equal, &left, &right))
    }
}

/// Fails with `NotEqual` if `left == right`.
#[track_caller]
pub fn not_equal<L, R>(left: L, right: R) -> TestResult
where
    L: PartialEq<R> + Debug,
    R: Debug,
{
    if left != right {
        Ok(())
    } else {
        Err(TestError::comparison(FailureKind::NotEqual, &left, &right))
    }
}

/// Fails with `Less` unless `left < right`.
#[track_caller]
pub fn less<L, R>(left: L, right: R) -> TestResult
where
    L: PartialOrd<R> + Debug,
    R: Debug,
{
    if left < right {
        Ok(())
    } else {
        Err(TestError::comparison(FailureKind::Less, &left, &right))
    }
}

/// Fails with `LessEqual` unless `left <= right`.
#[track_caller]
pub fn less_equal<L, R>(left: L, right: R) -> TestResult
where
    L: PartialOrd<R> + Debug,
    R: Debug,
{
    if left <= right {
        Ok(())
    } else {
        Err(TestError::comparison(FailureKind::LessEqual, &left, &right))
    }
}

/// Fails with `Greater` unless `left > right`.
#[track_caller]
pub fn greater<L, R>(left: L, right: R) -> TestResult
where
    L: PartialOrd<R> + Debug,
    R: Debug,
{
    if left > right {
        Ok(())
    } else {
        Err(TestError::comparison(FailureKind::Greater, &left, &right))
    }
}

/// Fails with `GreaterEqual` unless `left >= right`.
#[track_caller]
pub fn greater_equal<L, R>(left: L, right: R) -> TestResult
where
    L: PartialOrd<R> + Debug,
    R: Debug,
{
    if left >= right {
        Ok(())
    } else {
        Err(TestError::comparison(FailureKind::GreaterEqual, &left, &right))
    }
}

/// Fails the current test immediately: `error("bad state")?`.
#[track_caller]
pub fn error<T>(info: impl Display) -> Result<T, TestError> {
    Err(TestError::user(info))
}

/// Handle passed to every test body.
/// 传递给每个测试体的句柄。
#[derive(Debug, Clone)]
pub struct TestContext {
    part: String,
    group: String,
    name: String,
    executor: String,
}

impl TestContext {
    pub(crate) fn new(part: &str, group: &str, name: &str, executor: &str) -> Self {
        Self {
            part: part.to_string(),
            group: group.to_string(),
            name: name.to_string(),
            executor: executor.to_string(),
        }
    }

    pub fn part(&self) -> &str {
        &self.part
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `server` for in-process runs, `driver` inside a remote driver.
    pub fn executor(&self) -> &str {
        &self.executor
    }

    #[track_caller]
    pub fn equal<L: PartialEq<R> + Debug, R: Debug>(&self, left: L, right: R) -> TestResult {
        equal(left, right)
    }

    #[track_caller]
    pub fn not_equal<L: PartialEq<R> + Debug, R: Debug>(&self, left: L, right: R) -> TestResult {
        not_equal(left, right)
    }

    #[track_caller]
    pub fn less<L: PartialOrd<R> + Debug, R: Debug>(&self, left: L, right: R) -> TestResult {
        less(left, right)
    }

    #[track_caller]
    pub fn less_equal<L: PartialOrd<R> + Debug, R: Debug>(&self, left: L, right: R) -> TestResult {
        less_equal(left, right)
    }

    #[track_caller]
    pub fn greater<L: PartialOrd<R> + Debug, R: Debug>(&self, left: L, right: R) -> TestResult {
        greater(left, right)
    }

    #[track_caller]
    pub fn greater_equal<L: PartialOrd<R> + Debug, R: Debug>(
        &self,
        left: L,
        right: R,
    ) -> TestResult {
        greater_equal(left, right)
    }

    #[track_caller]
    pub fn error<T>(&self, info: impl Display) -> Result<T, TestError> {
        error(info)
    }
}
