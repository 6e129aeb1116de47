//! # Coordination Protocol Module / 协调协议模块
//!
//! Wire types of the two coordination calls (`POST /getstep`, `PUT /message`)
//! and the correlation parameters carried in a page URL's query string.
//!
//! 两个协调调用（`POST /getstep`、`PUT /message`）的传输类型，
//! 以及页面 URL 查询字符串中携带的关联参数。

use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::config::{PageSpec, Wait};
use crate::core::error::{Error, Result};
use crate::core::models::{ErrorInfo, Level, OutputMessage};
use crate::core::output::Lifecycle;
use crate::core::registry::{Filters, Selector};

/// Lifecycle command of a relayed start-of-test line.
pub const START_TEST: &str = "start_test";
/// Lifecycle command of a relayed end-of-test line.
pub const END_TEST: &str = "end_test";

/// Prefix of every correlation query parameter.
pub const PARAM_PREFIX: &str = "crosstest_";

/// Body of `POST /getstep` as sent by a driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRequest {
    pub id: String,
    pub step: usize,
}

/// Reply to `POST /getstep`. An absent `url` marks the terminal step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait: Option<Wait>,
}

impl From<&PageSpec> for StepResponse {
    fn from(page: &PageSpec) -> Self {
        Self {
            url: Some(page.url.clone()),
            include: Some(page.include.clone()),
            wait: page.wait.clone(),
        }
    }
}

/// Body of `PUT /message`: one output line of a remote executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayedMessage {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default)]
    pub part: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub test: Option<String>,
    #[serde(default = "default_level")]
    pub level: Level,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

fn default_level() -> Level {
    Level::Log
}

impl RelayedMessage {
    pub fn from_output(id: &str, message: &OutputMessage, marker: Option<&Lifecycle>) -> Self {
        let (command, error) = match marker {
            Some(Lifecycle::Start) => (Some(START_TEST.to_string()), None),
            Some(Lifecycle::End(error)) => (Some(END_TEST.to_string()), error.clone()),
            None => (None, None),
        };
        Self {
            id: id.to_string(),
            command,
            part: message.part.clone(),
            group: message.group.clone(),
            test: message.test.clone(),
            level: message.level,
            source: message.source.clone(),
            message: message.text.clone(),
            error,
        }
    }

    /// Reads a `/message` body leniently. Only `id` is required; fields of an
    /// unexpected type are coerced rather than rejecting the whole line, so a
    /// lifecycle event is never lost to a shape mismatch.
    pub fn from_body(body: &Value) -> Option<Self> {
        let id = body_id(body)?;
        Some(Self {
            id,
            command: text_field(body, "command"),
            part: text_field(body, "part"),
            group: text_field(body, "group"),
            test: text_field(body, "test"),
            level: text_field(body, "level")
                .and_then(|name| Level::from_name(&name))
                .unwrap_or(Level::Log),
            source: text_field(body, "source").unwrap_or_default(),
            message: text_field(body, "message").unwrap_or_default(),
            error: body.get("error").and_then(error_info),
        })
    }

    pub fn is_start(&self) -> bool {
        self.command.as_deref() == Some(START_TEST)
    }

    pub fn is_end(&self) -> bool {
        self.command.as_deref() == Some(END_TEST)
    }
}

/// Error body of a rejected request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

impl From<&Error> for ErrorBody {
    fn from(error: &Error) -> Self {
        Self {
            error: error.code().to_string(),
            message: error.to_string(),
        }
    }
}

/// Reads the `id` of a request body as a string, whatever its JSON type.
pub fn body_id(body: &Value) -> Option<String> {
    match body.get("id")? {
        Value::String(id) => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

/// A scalar field as text. Null and absent fields are `None`.
fn text_field(body: &Value, key: &str) -> Option<String> {
    match body.get(key)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Any truthy `error` value marks the test failed. A structured error keeps
/// its position; anything else becomes the message.
fn error_info(value: &Value) -> Option<ErrorInfo> {
    match value {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.is_empty() => None,
        Value::Number(n) if n.as_f64() == Some(0.0) => None,
        Value::String(s) => Some(ErrorInfo::from_message(s.clone())),
        Value::Object(map) => Some(
            serde_json::from_value::<ErrorInfo>(value.clone()).unwrap_or_else(|_| {
                match map.get("message") {
                    Some(Value::String(m)) => ErrorInfo::from_message(m.clone()),
                    _ => ErrorInfo::from_message(value.to_string()),
                }
            }),
        ),
        other => Some(ErrorInfo::from_message(other.to_string())),
    }
}

/// Reads the `step` of a `/getstep` body. Accepts a non-negative integer or a
/// string holding one.
pub fn body_step(body: &Value) -> Result<usize> {
    let step = match body.get("step") {
        Some(Value::Number(n)) => match n.as_u64() {
            Some(step) => Some(step),
            None => n.as_f64().filter(|f| f.fract() == 0.0 && *f >= 0.0).map(|f| f as u64),
        },
        Some(Value::String(s)) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    step.and_then(|s| usize::try_from(s).ok())
        .ok_or(Error::InvalidRequestFormat)
}

/// Correlation parameters linking a page load to a coordinator session.
///
/// 将页面加载与协调器会话关联起来的参数。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageContext {
    pub host: String,
    pub port: u16,
    pub id: String,
    pub step: usize,
    pub parts: Option<Selector>,
    pub groups: Option<Selector>,
    pub tests: Option<Selector>,
    pub include: Vec<String>,
    pub wait: Option<Wait>,
}

impl PageContext {
    /// Parses the correlation parameters out of a page URL.
    pub fn from_url(url: &str) -> Result<Self> {
        let parsed = Url::parse(url).map_err(|_| Error::InvalidPageUrl(url.to_string()))?;
        let mut host = None;
        let mut port = None;
        let mut id = None;
        let mut step = 0;
        let mut context = PageContext {
            host: String::new(),
            port: 0,
            id: String::new(),
            step: 0,
            parts: None,
            groups: None,
            tests: None,
            include: Vec::new(),
            wait: None,
        };

        for (key, value) in parsed.query_pairs() {
            let Some(name) = key.strip_prefix(PARAM_PREFIX) else {
                continue;
            };
            match name {
                "host" => host = Some(value.into_owned()),
                "port" => port = value.parse::<u16>().ok(),
                "id" => id = Some(value.into_owned()),
                "step" => step = value.parse::<usize>().unwrap_or(0),
                "parts" => context.parts = parse_list(&value).map(Selector::from_iter),
                "groups" => context.groups = parse_list(&value).map(Selector::from_iter),
                "tests" => context.tests = parse_list(&value).map(Selector::from_iter),
                "include" => context.include = parse_list(&value).unwrap_or_default(),
                "wait" => {
                    context.wait = match value.parse::<u64>() {
                        Ok(ms) => Some(Wait::Millis(ms)),
                        Err(_) if !value.is_empty() => Some(Wait::Hook(value.into_owned())),
                        Err(_) => None,
                    }
                }
                _ => {}
            }
        }

        context.host = host.unwrap_or_else(|| "localhost".to_string());
        context.port = port.ok_or_else(|| Error::InvalidPageUrl(url.to_string()))?;
        context.id = id.ok_or_else(|| Error::InvalidPageUrl(url.to_string()))?;
        context.step = step;
        Ok(context)
    }

    /// Appends these parameters to `base`, replacing any it already carries.
    pub fn apply(&self, base: &str) -> Result<String> {
        let mut url = Url::parse(base).map_err(|_| Error::InvalidPageUrl(base.to_string()))?;
        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(k, _)| !k.starts_with(PARAM_PREFIX))
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        {
            let mut query = url.query_pairs_mut();
            query.clear();
            for (k, v) in &kept {
                query.append_pair(k, v);
            }
            let param = |name: &str| format!("{PARAM_PREFIX}{name}");
            query.append_pair(&param("host"), &self.host);
            query.append_pair(&param("port"), &self.port.to_string());
            query.append_pair(&param("id"), &self.id);
            query.append_pair(&param("step"), &self.step.to_string());
            for (name, filter) in [
                ("parts", &self.parts),
                ("groups", &self.groups),
                ("tests", &self.tests),
            ] {
                if let Some(filter) = filter {
                    query.append_pair(&param(name), &serde_json::to_string(filter.names())?);
                }
            }
            query.append_pair(&param("include"), &serde_json::to_string(&self.include)?);
            match &self.wait {
                Some(Wait::Millis(ms)) => {
                    query.append_pair(&param("wait"), &ms.to_string());
                }
                Some(Wait::Hook(name)) => {
                    query.append_pair(&param("wait"), name);
                }
                None => {}
            }
        }
        Ok(url.to_string())
    }

    /// The same correlation moved to another page.
    pub fn for_step(&self, step: usize, include: Vec<String>, wait: Option<Wait>) -> Self {
        Self {
            step,
            include,
            wait,
            ..self.clone()
        }
    }

    pub fn filters(&self) -> Filters {
        Filters {
            parts: self.parts.clone(),
            groups: self.groups.clone(),
            tests: self.tests.clone(),
        }
    }

    pub fn coordinator_url(&self, path: &str) -> String {
        format!("http://{}:{}/{}", self.host, self.port, path.trim_start_matches('/'))
    }
}

fn parse_list(value: &str) -> Option<Vec<String>> {
    serde_json::from_str::<Vec<String>>(value).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context() -> PageContext {
        PageContext {
            host: "localhost".into(),
            port: 4589,
            id: "run-1".into(),
            step: 0,
            parts: Some(Selector::parse("ui")),
            groups: None,
            tests: Some(Selector::parse("a;b")),
            include: vec!["widgets".into()],
            wait: Some(Wait::Millis(20)),
        }
    }

    #[test]
    fn context_survives_a_page_url() {
        let url = context().apply("http://example.test/page.html?lang=en").unwrap();
        assert!(url.contains("lang=en"));
        let parsed = PageContext::from_url(&url).unwrap();
        assert_eq!(parsed, context());
    }

    #[test]
    fn stale_parameters_are_replaced() {
        let first = context().apply("http://example.test/").unwrap();
        let second = context().for_step(2, Vec::new(), None).apply(&first).unwrap();
        let parsed = PageContext::from_url(&second).unwrap();
        assert_eq!(parsed.step, 2);
        assert!(parsed.include.is_empty());
        assert_eq!(parsed.wait, None);
        assert_eq!(second.matches("crosstest_id").count(), 1);
    }

    #[test]
    fn url_without_port_is_rejected() {
        let err = PageContext::from_url("http://example.test/?crosstest_id=x").unwrap_err();
        assert!(matches!(err, Error::InvalidPageUrl(_)));
    }

    #[test]
    fn step_must_be_a_non_negative_integer() {
        assert_eq!(body_step(&json!({"step": 3})).unwrap(), 3);
        assert_eq!(body_step(&json!({"step": "4"})).unwrap(), 4);
        assert!(body_step(&json!({"step": "abc"})).is_err());
        assert!(body_step(&json!({"step": -1})).is_err());
        assert!(body_step(&json!({"step": 1.5})).is_err());
        assert!(body_step(&json!({})).is_err());
    }

    #[test]
    fn relayed_messages_carry_lifecycle_commands() {
        let message = OutputMessage {
            level: Level::Log,
            source: "crosstest".into(),
            executor: "driver".into(),
            timestamp: chrono::Utc::now(),
            text: "Test [p][g][t] running ...".into(),
            part: Some("p".into()),
            group: Some("g".into()),
            test: Some("t".into()),
        };
        let start = RelayedMessage::from_output("id", &message, Some(&Lifecycle::Start));
        assert!(start.is_start());
        let plain = RelayedMessage::from_body(&json!({"id": "id", "message": "hi"})).unwrap();
        assert_eq!(plain.level, Level::Log);
        assert!(!plain.is_start() && !plain.is_end());
    }

    #[test]
    fn loose_message_bodies_are_coerced() {
        let end = RelayedMessage::from_body(&json!({
            "id": 42,
            "command": "end_test",
            "part": "p",
            "group": "g",
            "test": "t",
            "level": "warn",
            "message": 7,
            "error": "boom",
        }))
        .unwrap();
        assert_eq!(end.id, "42");
        assert!(end.is_end());
        assert_eq!(end.level, Level::Warning);
        assert_eq!(end.message, "7");
        let error = end.error.unwrap();
        assert_eq!(error.message, "boom");
        assert_eq!(error.position(), "unknown:unknown");

        let odd = RelayedMessage::from_body(&json!({"id": "x", "level": "loud"})).unwrap();
        assert_eq!(odd.level, Level::Log);
        assert!(RelayedMessage::from_body(&json!({"message": "no id"})).is_none());
    }

    #[test]
    fn error_field_follows_truthiness() {
        let error = |value: Value| {
            RelayedMessage::from_body(&json!({"id": "x", "error": value}))
                .unwrap()
                .error
        };
        assert_eq!(error(Value::Null), None);
        assert_eq!(error(json!(false)), None);
        assert_eq!(error(json!("")), None);
        assert_eq!(error(json!(true)).unwrap().message, "true");
        let structured = error(json!({"message": "a != b", "file": "t.js", "line": 3})).unwrap();
        assert_eq!(structured.position(), "t.js:3");
        let partial = error(json!({"message": "odd", "line": "x"})).unwrap();
        assert_eq!(partial.message, "odd");
    }
}
