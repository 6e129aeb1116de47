//! # Test Registry Module / 测试注册表模块
//!
//! Append-only store of test cases keyed by `(part, group, name)`, plus the
//! include suites and delay hooks a run can resolve by name. Also home of the
//! selection rule shared by tests, pre-test processes and web processes.
//!
//! 以 `(part, group, name)` 为键的只追加测试用例存储，以及运行时可按名称解析的
//! 包含套件和延迟钩子。选择规则也定义在这里。

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::core::check::{TestContext, TestResult};
use crate::core::error::{Error, Result};

/// Part and group name used when a registration omits them.
pub const DEFAULT_SCOPE: &str = "default";

pub type TestFuture = BoxFuture<'static, TestResult>;
pub type TestBody = Arc<dyn Fn(TestContext) -> TestFuture + Send + Sync>;
pub type SuiteLoader = Arc<dyn Fn(&Registry) -> Result<()> + Send + Sync>;
pub type WaitHook = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// A registered test.
/// 已注册的测试。
pub struct TestCase {
    pub part: String,
    pub group: String,
    pub name: String,
    pub body: TestBody,
}

impl std::fmt::Debug for TestCase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestCase")
            .field("part", &self.part)
            .field("group", &self.group)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// A set of names used as a filter or as a process's declared tags.
///
/// Deserializes from a list, or from a string holding one name or several
/// names joined with `;`.
///
/// 用作过滤器或进程标签的名称集合。可从列表或以 `;` 分隔的字符串反序列化。
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "SelectorRepr", into = "Vec<String>")]
pub struct Selector(Vec<String>);

#[derive(Deserialize)]
#[serde(untagged)]
enum SelectorRepr {
    Joined(String),
    List(Vec<String>),
}

impl From<SelectorRepr> for Selector {
    fn from(repr: SelectorRepr) -> Self {
        match repr {
            SelectorRepr::Joined(s) => Selector::parse(&s),
            SelectorRepr::List(list) => Selector(list),
        }
    }
}

impl From<Selector> for Vec<String> {
    fn from(selector: Selector) -> Self {
        selector.0
    }
}

impl Selector {
    /// Splits a `;`-joined list. Blank entries are dropped.
    pub fn parse(joined: &str) -> Self {
        Selector(
            joined
                .split(';')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    pub fn names(&self) -> &[String] {
        &self.0
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|n| n == name)
    }

    pub fn intersects(&self, other: &Selector) -> bool {
        self.0.iter().any(|n| other.contains(n))
    }
}

impl<S: Into<String>> FromIterator<S> for Selector {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Selector(iter.into_iter().map(Into::into).collect())
    }
}

impl std::fmt::Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0.join("; "))
    }
}

/// The selection rule: an unset side matches everything, otherwise the two
/// sets must share at least one name.
pub fn is_selected(tags: Option<&Selector>, filter: Option<&Selector>) -> bool {
    match (tags, filter) {
        (Some(tags), Some(filter)) => tags.intersects(filter),
        _ => true,
    }
}

/// Name filters of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filters {
    pub parts: Option<Selector>,
    pub groups: Option<Selector>,
    pub tests: Option<Selector>,
}

impl Filters {
    pub fn matches(&self, part: &str, group: &str, name: &str) -> bool {
        let pass = |filter: &Option<Selector>, value: &str| {
            filter.as_ref().is_none_or(|f| f.contains(value))
        };
        pass(&self.parts, part) && pass(&self.groups, group) && pass(&self.tests, name)
    }

    /// Whether a process declaring these tags should start for this run.
    pub fn selects(
        &self,
        parts: Option<&Selector>,
        groups: Option<&Selector>,
        tests: Option<&Selector>,
    ) -> bool {
        is_selected(tests, self.tests.as_ref())
            && is_selected(groups, self.groups.as_ref())
            && is_selected(parts, self.parts.as_ref())
    }
}

/// Append-only test registry.
///
/// Hold one `Registry` and pass it by reference to every `RunSession` that
/// should see the same tests. Runs on one registry are serialized.
///
/// 只追加的测试注册表。对同一注册表的运行是串行化的。
#[derive(Default)]
pub struct Registry {
    tests: RwLock<Vec<Arc<TestCase>>>,
    keys: Mutex<HashSet<(String, String, String)>>,
    suites: RwLock<HashMap<String, SuiteLoader>>,
    loaded_suites: Mutex<HashSet<String>>,
    hooks: RwLock<HashMap<String, WaitHook>>,
    pub(crate) run_lock: tokio::sync::Mutex<()>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `body` under `(part, group, name)`.
    pub fn register<F, Fut>(&self, part: &str, group: &str, name: &str, body: F) -> Result<()>
    where
        F: Fn(TestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = TestResult> + Send + 'static,
    {
        let key = (part.to_string(), group.to_string(), name.to_string());
        if !lock(&self.keys).insert(key) {
            return Err(Error::DuplicateTest {
                part: part.to_string(),
                group: group.to_string(),
                name: name.to_string(),
            });
        }
        let body: TestBody = Arc::new(move |ctx: TestContext| -> TestFuture { Box::pin(body(ctx)) });
        write(&self.tests).push(Arc::new(TestCase {
            part: part.to_string(),
            group: group.to_string(),
            name: name.to_string(),
            body,
        }));
        Ok(())
    }

    /// Registers under the `default` part.
    pub fn register_in_group<F, Fut>(&self, group: &str, name: &str, body: F) -> Result<()>
    where
        F: Fn(TestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = TestResult> + Send + 'static,
    {
        self.register(DEFAULT_SCOPE, group, name, body)
    }

    /// Registers under the `default` part and group.
    pub fn register_named<F, Fut>(&self, name: &str, body: F) -> Result<()>
    where
        F: Fn(TestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = TestResult> + Send + 'static,
    {
        self.register(DEFAULT_SCOPE, DEFAULT_SCOPE, name, body)
    }

    /// Registers under a generated unique name and returns it.
    pub fn register_anonymous<F, Fut>(&self, body: F) -> Result<String>
    where
        F: Fn(TestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = TestResult> + Send + 'static,
    {
        let name = uuid::Uuid::new_v4().to_string();
        self.register(DEFAULT_SCOPE, DEFAULT_SCOPE, &name, body)?;
        Ok(name)
    }

    /// All tests in registration order.
    pub fn tests(&self) -> Vec<Arc<TestCase>> {
        read(&self.tests).clone()
    }

    /// Tests matching every filter, in registration order.
    pub fn selected(&self, filters: &Filters) -> Vec<Arc<TestCase>> {
        read(&self.tests)
            .iter()
            .filter(|t| filters.matches(&t.part, &t.group, &t.name))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        read(&self.tests).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Makes a suite available to `include`. The loader runs at most once.
    pub fn provide_suite<F>(&self, name: &str, loader: F)
    where
        F: Fn(&Registry) -> Result<()> + Send + Sync + 'static,
    {
        write(&self.suites).insert(name.to_string(), Arc::new(loader));
    }

    /// Makes a named delay hook available to `Wait::Hook`.
    pub fn provide_hook<F, Fut>(&self, name: &str, hook: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let hook: WaitHook = Arc::new(move || -> BoxFuture<'static, ()> { Box::pin(hook()) });
        write(&self.hooks).insert(name.to_string(), hook);
    }

    pub(crate) fn hook(&self, name: &str) -> Option<WaitHook> {
        read(&self.hooks).get(name).cloned()
    }

    /// Loads every named suite that has not been loaded yet.
    pub fn include(&self, names: &[String]) -> Result<()> {
        for name in names {
            let loader = read(&self.suites)
                .get(name)
                .cloned()
                .ok_or_else(|| Error::UnknownInclude(name.clone()))?;
            if !lock(&self.loaded_suites).insert(name.clone()) {
                continue;
            }
            if let Err(e) = loader(self) {
                lock(&self.loaded_suites).remove(name);
                return Err(e);
            }
        }
        Ok(())
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

fn read<T>(l: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    l.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(l: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    l.write().unwrap_or_else(|e| e.into_inner())
}
