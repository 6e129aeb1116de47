//! # Configuration Module / 配置模块
//!
//! `RunOptions` enumerates every option a run recognizes together with its
//! default. It deserializes from TOML (`crosstest.toml`) and is validated once
//! when a run starts.
//!
//! `RunOptions` 列举了一次运行识别的所有选项及其默认值。
//! 它可以从 TOML（`crosstest.toml`）反序列化，并在运行开始时验证一次。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::core::error::{Error, Result};
use crate::core::models::OutputMessage;
use crate::core::registry::{Filters, Selector};

/// Default name of the configuration file.
pub const DEFAULT_CONFIG_FILE: &str = "crosstest.toml";

/// Callback receiving every `OutputMessage` of a run as it is produced.
#[derive(Clone)]
pub struct MessageSink(Arc<dyn Fn(&OutputMessage) + Send + Sync>);

impl MessageSink {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&OutputMessage) + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn call(&self, message: &OutputMessage) {
        (self.0)(message)
    }
}

impl fmt::Debug for MessageSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MessageSink(..)")
    }
}

/// A command given either as one line or as an argv list.
/// 以单行或参数列表形式给出的命令。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandSpec {
    Line(String),
    Argv(Vec<String>),
}

impl CommandSpec {
    pub fn is_empty(&self) -> bool {
        match self {
            CommandSpec::Line(line) => line.trim().is_empty(),
            CommandSpec::Argv(argv) => argv.first().is_none_or(|p| p.trim().is_empty()),
        }
    }

    /// The command as one display line.
    pub fn display(&self) -> String {
        match self {
            CommandSpec::Line(line) => line.clone(),
            CommandSpec::Argv(argv) => shlex::try_join(argv.iter().map(String::as_str))
                .unwrap_or_else(|_| argv.join(" ")),
        }
    }
}

impl Default for CommandSpec {
    fn default() -> Self {
        CommandSpec::Line(String::new())
    }
}

impl From<&str> for CommandSpec {
    fn from(line: &str) -> Self {
        CommandSpec::Line(line.to_string())
    }
}

/// An auxiliary process started before tests (or before web tests).
/// 在测试（或 Web 测试）之前启动的辅助进程。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessSpec {
    pub command: CommandSpec,
    /// Start grace period. A process still alive when it ends is assumed healthy.
    pub start_timeout_ms: u64,
    pub parts: Option<Selector>,
    pub groups: Option<Selector>,
    pub tests: Option<Selector>,
}

impl Default for ProcessSpec {
    fn default() -> Self {
        Self {
            command: CommandSpec::default(),
            start_timeout_ms: 1000,
            parts: None,
            groups: None,
            tests: None,
        }
    }
}

impl ProcessSpec {
    pub fn new(command: impl Into<CommandSpec>) -> Self {
        Self {
            command: command.into(),
            ..Self::default()
        }
    }

    pub fn start_timeout(&self) -> Duration {
        Duration::from_millis(self.start_timeout_ms)
    }

    pub fn is_selected_by(&self, filters: &Filters) -> bool {
        filters.selects(self.parts.as_ref(), self.groups.as_ref(), self.tests.as_ref())
    }
}

/// Pre-run delay: a fixed number of milliseconds or a hook provided by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Wait {
    Millis(u64),
    Hook(String),
}

/// One page of a remote run.
/// 远程运行中的一个页面。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageSpec {
    pub url: String,
    pub include: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wait: Option<Wait>,
}

impl PageSpec {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            ..Self::default()
        }
    }
}

/// A chain of browser candidates; the first one to finish the pages wins.
///
/// Deserializes from a single command string or from a list of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ChainRepr", into = "Vec<String>")]
pub struct BrowserChain(Vec<String>);

#[derive(Deserialize)]
#[serde(untagged)]
enum ChainRepr {
    One(String),
    Many(Vec<String>),
}

impl From<ChainRepr> for BrowserChain {
    fn from(repr: ChainRepr) -> Self {
        match repr {
            ChainRepr::One(command) => BrowserChain(vec![command]),
            ChainRepr::Many(commands) => BrowserChain(commands),
        }
    }
}

impl From<BrowserChain> for Vec<String> {
    fn from(chain: BrowserChain) -> Self {
        chain.0
    }
}

impl BrowserChain {
    pub fn new<S: Into<String>>(candidates: impl IntoIterator<Item = S>) -> Self {
        BrowserChain(candidates.into_iter().map(Into::into).collect())
    }

    pub fn candidates(&self) -> &[String] {
        &self.0
    }
}

fn default_browsers() -> Vec<BrowserChain> {
    vec![BrowserChain::new([
        "google-chrome",
        "chrome",
        "chromium",
        "firefox",
        "opera",
        "safari",
    ])]
}

/// Options of one run. Every field has a default; see `Default`.
/// 一次运行的选项。每个字段都有默认值。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunOptions {
    pub parts: Option<Selector>,
    pub groups: Option<Selector>,
    pub tests: Option<Selector>,
    pub enable_local_tests: bool,
    pub enable_web_tests: bool,
    /// Suites provided to the registry that must be loaded before running.
    pub include: Vec<String>,
    /// Suppresses the engine's own console lines. Captured output is unaffected.
    pub quiet: bool,
    /// Per-test timeout for local tests, stall timeout for remote ones.
    pub timeout_ms: u64,
    pub processes: Vec<ProcessSpec>,
    pub web_processes: Vec<ProcessSpec>,
    pub web_browsers: Vec<BrowserChain>,
    pub web_testing_pages: Vec<PageSpec>,
    pub web_testing_port: u16,
    #[serde(skip)]
    pub on_message: Option<MessageSink>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            parts: None,
            groups: None,
            tests: None,
            enable_local_tests: true,
            enable_web_tests: true,
            include: Vec::new(),
            quiet: false,
            timeout_ms: 30_000,
            processes: Vec::new(),
            web_processes: Vec::new(),
            web_browsers: default_browsers(),
            web_testing_pages: Vec::new(),
            web_testing_port: 4589,
            on_message: None,
        }
    }
}

impl RunOptions {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn filters(&self) -> Filters {
        Filters {
            parts: self.parts.clone(),
            groups: self.groups.clone(),
            tests: self.tests.clone(),
        }
    }

    /// Whether the remote stage has anything to do.
    pub fn runs_web_tests(&self) -> bool {
        self.enable_web_tests && !self.web_testing_pages.is_empty()
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config {
            path: DEFAULT_CONFIG_FILE.into(),
            source: Box::new(e),
        })
    }

    /// Checks the invariants the pipeline relies on.
    pub fn validate(&self) -> Result<()> {
        if self.timeout_ms == 0 {
            return Err(Error::InvalidOptions("timeout_ms must be greater than 0".into()));
        }
        if !self.runs_web_tests() {
            return Ok(());
        }
        if self.web_browsers.is_empty() {
            return Err(Error::InvalidOptions(
                "web_browsers must list at least one chain".into(),
            ));
        }
        for chain in &self.web_browsers {
            if chain.candidates().is_empty() || chain.candidates().iter().any(|c| c.trim().is_empty()) {
                return Err(Error::InvalidOptions(
                    "every web_browsers chain needs non-empty candidates".into(),
                ));
            }
        }
        if let Some(page) = self.web_testing_pages.iter().find(|p| p.url.trim().is_empty()) {
            return Err(Error::InvalidPageUrl(page.url.clone()));
        }
        Ok(())
    }
}

/// Reads and parses a TOML options file.
pub fn load_options(path: &Path) -> Result<RunOptions> {
    let content = std::fs::read_to_string(path).map_err(|e| Error::Config {
        path: path.to_path_buf(),
        source: Box::new(e),
    })?;
    toml::from_str(&content).map_err(|e| Error::Config {
        path: path.to_path_buf(),
        source: Box::new(e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let options = RunOptions::default();
        assert!(options.enable_local_tests);
        assert!(options.enable_web_tests);
        assert_eq!(options.timeout_ms, 30_000);
        assert_eq!(options.web_testing_port, 4589);
        assert_eq!(options.web_browsers[0].candidates()[0], "google-chrome");
        assert_eq!(ProcessSpec::default().start_timeout_ms, 1000);
        assert!(!options.runs_web_tests());
    }

    #[test]
    fn toml_merges_over_defaults() {
        let options = RunOptions::from_toml_str(
            r#"
parts = "unit;app"
timeout_ms = 500
web_browsers = ["firefox", ["chromium", "chrome"]]

[[processes]]
command = ["sleep", "5"]
groups = ["db"]

[[web_testing_pages]]
url = "http://localhost:8080/index.html"
include = ["widgets"]
wait = 200
"#,
        )
        .unwrap();

        assert_eq!(options.parts.unwrap().names(), ["unit", "app"]);
        assert_eq!(options.timeout_ms, 500);
        assert!(options.enable_local_tests);
        assert_eq!(options.web_browsers.len(), 2);
        assert_eq!(options.web_browsers[1].candidates(), ["chromium", "chrome"]);
        assert_eq!(
            options.processes[0].command,
            CommandSpec::Argv(vec!["sleep".into(), "5".into()])
        );
        assert_eq!(options.processes[0].start_timeout_ms, 1000);
        assert_eq!(options.web_testing_pages[0].wait, Some(Wait::Millis(200)));
    }

    #[test]
    fn validate_rejects_bad_remote_setup() {
        let mut options = RunOptions {
            web_testing_pages: vec![PageSpec::new("")],
            ..RunOptions::default()
        };
        assert!(matches!(options.validate(), Err(Error::InvalidPageUrl(_))));

        options.web_testing_pages = vec![PageSpec::new("http://localhost/")];
        options.web_browsers = vec![BrowserChain::new(Vec::<String>::new())];
        assert!(matches!(options.validate(), Err(Error::InvalidOptions(_))));

        options.enable_web_tests = false;
        assert!(options.validate().is_ok());

        options.timeout_ms = 0;
        assert!(options.validate().is_err());
    }

    #[test]
    fn command_display_joins_argv() {
        let cmd = CommandSpec::Argv(vec!["echo".into(), "two words".into()]);
        assert_eq!(cmd.display(), "echo 'two words'");
        assert!(CommandSpec::Line("  ".into()).is_empty());
    }
}
