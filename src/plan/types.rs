//! 计划数据模型：Action（工具调用 / 确认请求）、Plan、PlanMetadata、ToolResult
//!
//! JSON 形态与模型输出的规范格式一致：
//! `{"type": "tool_use", "tool_name": "...", "parameters": {...}}` 或
//! `{"type": "confirmation", "message": "...", "destructive": true}`。

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::plan::fingerprint::ActionFingerprint;

/// 直接回复用户的工具名（解释器兜底动作）
pub const RESPOND_TOOL: &str = "respond";
/// 文件搜索工具名（意图短语 "search for X" 合成）
pub const SEARCH_TOOL: &str = "search_files";
/// 读文件工具名（意图短语 "read <path>" 合成）
pub const READ_TOOL: &str = "read_file";

/// 一次工具调用：工具名 + 参数对象
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolAction {
    pub tool_name: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

impl ToolAction {
    /// 参数非对象时按空对象处理
    pub fn new(tool_name: impl Into<String>, parameters: Value) -> Self {
        let parameters = match parameters {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            tool_name: tool_name.into(),
            parameters,
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).and_then(|v| v.as_str())
    }

    pub fn parameters_value(&self) -> Value {
        Value::Object(self.parameters.clone())
    }

    pub fn fingerprint(&self) -> ActionFingerprint {
        ActionFingerprint::of(self)
    }

    /// 人类可读描述，如 `read_file(file_path=src/main.rs)`
    pub fn describe(&self) -> String {
        let params: Vec<String> = self
            .parameters
            .iter()
            .map(|(k, v)| match v {
                Value::String(s) => format!("{k}={}", truncate(s, 60)),
                other => format!("{k}={}", truncate(&other.to_string(), 60)),
            })
            .collect();
        format!("{}({})", self.tool_name, params.join(", "))
    }
}

/// 请求用户确认；destructive 缺省为 true
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmationAction {
    pub message: String,
    #[serde(default = "default_destructive")]
    pub destructive: bool,
}

fn default_destructive() -> bool {
    true
}

impl ConfirmationAction {
    pub fn new(message: impl Into<String>, destructive: bool) -> Self {
        Self {
            message: message.into(),
            destructive,
        }
    }
}

/// 计划中的单个动作
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    ToolUse(ToolAction),
    Confirmation(ConfirmationAction),
}

impl Action {
    pub fn tool(tool_name: impl Into<String>, parameters: Value) -> Self {
        Action::ToolUse(ToolAction::new(tool_name, parameters))
    }

    pub fn confirmation(message: impl Into<String>, destructive: bool) -> Self {
        Action::Confirmation(ConfirmationAction::new(message, destructive))
    }

    /// 直接回复用户的动作
    pub fn respond(message: impl Into<String>) -> Self {
        Action::ToolUse(
            ToolAction::new(RESPOND_TOOL, Value::Object(Map::new())).with_param("message", message.into()),
        )
    }

    pub fn as_tool(&self) -> Option<&ToolAction> {
        match self {
            Action::ToolUse(t) => Some(t),
            Action::Confirmation(_) => None,
        }
    }

    pub fn tool_name(&self) -> Option<&str> {
        self.as_tool().map(|t| t.tool_name.as_str())
    }

    pub fn is_confirmation(&self) -> bool {
        matches!(self, Action::Confirmation(_))
    }

    pub fn describe(&self) -> String {
        match self {
            Action::ToolUse(t) => t.describe(),
            Action::Confirmation(c) => format!("confirm({})", truncate(&c.message, 60)),
        }
    }
}

/// 计划元数据：由停止策略在执行前计算
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanMetadata {
    pub is_final: bool,
    pub confidence: f64,
    pub reasoning: String,
    pub expected_follow_up: bool,
}

impl Default for PlanMetadata {
    fn default() -> Self {
        Self {
            is_final: false,
            confidence: 1.0,
            reasoning: String::new(),
            expected_follow_up: true,
        }
    }
}

/// 一轮计划：有序动作 + 元数据
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub actions: Vec<Action>,
    pub metadata: PlanMetadata,
}

impl Plan {
    pub fn new(actions: Vec<Action>, metadata: PlanMetadata) -> Self {
        Self { actions, metadata }
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn tool_actions(&self) -> impl Iterator<Item = &ToolAction> {
        self.actions.iter().filter_map(Action::as_tool)
    }
}

/// 单个动作的执行结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub action_description: String,
    /// 因指纹已完成而跳过（未真正调用工具）
    #[serde(default)]
    pub skipped: bool,
}

impl ToolResult {
    pub fn ok(action_description: impl Into<String>, output: impl Into<Value>) -> Self {
        Self {
            success: true,
            output: Some(output.into()),
            error: None,
            action_description: action_description.into(),
            skipped: false,
        }
    }

    pub fn failed(action_description: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(error.into()),
            action_description: action_description.into(),
            skipped: false,
        }
    }

    pub fn skipped(action_description: impl Into<String>) -> Self {
        Self {
            success: true,
            output: Some(Value::String("Action already completed in previous step".to_string())),
            error: None,
            action_description: action_description.into(),
            skipped: true,
        }
    }

    /// 输出文本：字符串原样返回，其它 JSON 序列化
    pub fn output_text(&self) -> String {
        match &self.output {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        }
    }

    /// 供 prompt / 事件展示的单行摘要
    pub fn preview(&self, max_chars: usize) -> String {
        let body = if self.success {
            self.output_text()
        } else {
            format!("Error: {}", self.error.as_deref().unwrap_or("unknown"))
        };
        truncate(&body, max_chars)
    }
}

pub(crate) fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() > max_chars {
        format!("{}...", s.chars().take(max_chars).collect::<String>())
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_action_serde_uses_type_tag() {
        let action = Action::tool("read_file", json!({"file_path": "a.rs"}));
        let v = serde_json::to_value(&action).unwrap();
        assert_eq!(v["type"], "tool_use");
        assert_eq!(v["tool_name"], "read_file");
        assert_eq!(v["parameters"]["file_path"], "a.rs");

        let back: Action = serde_json::from_value(json!({
            "type": "confirmation",
            "message": "Overwrite?"
        }))
        .unwrap();
        assert_eq!(back, Action::confirmation("Overwrite?", true));
    }

    #[test]
    fn test_non_object_parameters_become_empty() {
        let action = ToolAction::new("git_status", json!("oops"));
        assert!(action.parameters.is_empty());
        assert_eq!(action.describe(), "git_status()");
    }

    #[test]
    fn test_describe_and_preview() {
        let action = ToolAction::new("read_file", json!({"file_path": "src/main.rs"}));
        assert_eq!(action.describe(), "read_file(file_path=src/main.rs)");

        let failed = ToolResult::failed(action.describe(), "not found");
        assert_eq!(failed.preview(100), "Error: not found");
        let skipped = ToolResult::skipped(action.describe());
        assert!(skipped.success && skipped.skipped);
        assert!(skipped.output_text().contains("already completed"));
    }
}
