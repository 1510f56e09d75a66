use crate::safety::RiskLevel;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Closed set of argument value shapes an instruction may carry. A tagged
/// union instead of raw `serde_json::Value` so new shapes force exhaustive
/// match updates at compile time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgValue {
    Bool(bool),
    Int(i64),
    Str(String),
    List(Vec<String>),
    Map(BTreeMap<String, String>),
}

impl ArgValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ArgValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Append every string carried by this value (including inside lists and
    /// maps) to `out`, space-separated. Used by the policy engine's
    /// danger-pattern scan.
    pub fn flatten_into(&self, out: &mut String) {
        match self {
            ArgValue::Str(s) => {
                out.push(' ');
                out.push_str(s);
            }
            ArgValue::List(items) => {
                for item in items {
                    out.push(' ');
                    out.push_str(item);
                }
            }
            ArgValue::Map(map) => {
                for value in map.values() {
                    out.push(' ');
                    out.push_str(value);
                }
            }
            ArgValue::Bool(_) | ArgValue::Int(_) => {}
        }
    }
}

impl From<&str> for ArgValue {
    fn from(s: &str) -> Self {
        ArgValue::Str(s.to_string())
    }
}

impl From<String> for ArgValue {
    fn from(s: String) -> Self {
        ArgValue::Str(s)
    }
}

impl From<bool> for ArgValue {
    fn from(b: bool) -> Self {
        ArgValue::Bool(b)
    }
}

/// One proposed operation: which worker, which action, with what arguments.
///
/// `risk_level` is whatever the LLM claimed and is advisory only — the policy
/// engine always re-derives the authoritative risk before execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    pub worker: String,
    pub action: String,
    #[serde(default)]
    pub args: BTreeMap<String, ArgValue>,
    #[serde(default)]
    pub risk_level: Option<RiskLevel>,
    #[serde(default)]
    pub dry_run: bool,
}

impl Instruction {
    pub fn new(worker: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            worker: worker.into(),
            action: action.into(),
            args: BTreeMap::new(),
            risk_level: None,
            dry_run: false,
        }
    }

    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<ArgValue>) -> Self {
        self.args.insert(key.into(), value.into());
        self
    }

    /// Shorthand for the shell worker's `command` argument.
    pub fn command_arg(&self) -> Option<&str> {
        self.args.get("command").and_then(ArgValue::as_str)
    }

    /// A terminal chat response carrying `message`.
    pub fn chat_respond(message: impl Into<String>) -> Self {
        Instruction::new("chat", "respond").with_arg("message", message.into())
    }
}

/// The outcome of executing an instruction.
///
/// `task_completed` is the worker's own deterministic completion claim; it is
/// authoritative over the LLM's `is_final` hint. `data` carries structured
/// payload — a shell execution always includes `exit_code`, which is what
/// marks a failure as recoverable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerResult {
    pub success: bool,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    pub message: String,
    #[serde(default)]
    pub task_completed: bool,
    #[serde(default)]
    pub simulated: bool,
}

impl WorkerResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: None,
            message: message.into(),
            task_completed: false,
            simulated: false,
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: message.into(),
            task_completed: false,
            simulated: false,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn completed(mut self) -> Self {
        self.task_completed = true;
        self
    }

    pub fn simulated(mut self) -> Self {
        self.simulated = true;
        self
    }

    /// The exit code embedded in `data`, when present. Failures carrying one
    /// are command-level and eligible for bounded recovery; failures without
    /// one are system-level and fatal.
    pub fn exit_code(&self) -> Option<i64> {
        self.data
            .as_ref()
            .and_then(|d| d.get("exit_code"))
            .and_then(serde_json::Value::as_i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn arg_value_deserializes_each_shape() {
        let parsed: ArgValue = serde_json::from_value(json!("hello")).unwrap();
        assert_eq!(parsed, ArgValue::Str("hello".into()));

        let parsed: ArgValue = serde_json::from_value(json!(42)).unwrap();
        assert_eq!(parsed, ArgValue::Int(42));

        let parsed: ArgValue = serde_json::from_value(json!(true)).unwrap();
        assert_eq!(parsed, ArgValue::Bool(true));

        let parsed: ArgValue = serde_json::from_value(json!(["a", "b"])).unwrap();
        assert_eq!(parsed, ArgValue::List(vec!["a".into(), "b".into()]));

        let parsed: ArgValue = serde_json::from_value(json!({"k": "v"})).unwrap();
        assert_eq!(
            parsed,
            ArgValue::Map(BTreeMap::from([("k".into(), "v".into())]))
        );
    }

    #[test]
    fn flatten_collects_nested_strings() {
        let mut out = String::new();
        ArgValue::Str("top".into()).flatten_into(&mut out);
        ArgValue::List(vec!["one".into(), "two".into()]).flatten_into(&mut out);
        ArgValue::Map(BTreeMap::from([("k".into(), "deep".into())])).flatten_into(&mut out);
        ArgValue::Bool(true).flatten_into(&mut out);
        assert_eq!(out, " top one two deep");
    }

    #[test]
    fn instruction_parses_from_llm_json() {
        let raw = json!({
            "worker": "shell",
            "action": "execute_command",
            "args": {"command": "ls -la"},
            "risk_level": "safe",
            "dry_run": false
        });
        let instruction: Instruction = serde_json::from_value(raw).unwrap();
        assert_eq!(instruction.worker, "shell");
        assert_eq!(instruction.command_arg(), Some("ls -la"));
        assert_eq!(instruction.risk_level, Some(RiskLevel::Safe));
    }

    #[test]
    fn instruction_tolerates_missing_optional_fields() {
        let raw = json!({"worker": "chat", "action": "respond"});
        let instruction: Instruction = serde_json::from_value(raw).unwrap();
        assert!(instruction.args.is_empty());
        assert_eq!(instruction.risk_level, None);
        assert!(!instruction.dry_run);
    }

    #[test]
    fn worker_result_exit_code_extraction() {
        let result = WorkerResult::fail("exit 1").with_data(json!({"exit_code": 1}));
        assert_eq!(result.exit_code(), Some(1));

        let no_data = WorkerResult::fail("unknown worker");
        assert_eq!(no_data.exit_code(), None);
    }

    #[test]
    fn chat_respond_is_terminal_shape() {
        let instruction = Instruction::chat_respond("done");
        assert_eq!(instruction.worker, "chat");
        assert_eq!(instruction.action, "respond");
        assert_eq!(
            instruction.args.get("message").and_then(ArgValue::as_str),
            Some("done")
        );
    }
}
