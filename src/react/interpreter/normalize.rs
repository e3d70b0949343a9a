//! 把解析出的 JSON 值规范化为 Action 列表
//!
//! 接受的形态：
//! - `{"actions": [...]}`、裸数组 `[...]`、单个动作对象
//! - `{"type": "tool_use" | "confirmation", ...}`
//! - `{"action": "use_tool", "tool": ..., "parameters": ...}` / `{"action": "respond", "message": ...}`
//! - 工具名键：tool_name / tool / function / name / action；参数键：parameters / params / args / arguments / input
//! - OpenAI 风格 `{"function": {"name": ..., "arguments": "<json 字符串>"}}`
//! - `{"message": ...}` / `{"response": ...}` 视为直接回复

use serde_json::{Map, Value};

use crate::plan::{Action, ActionValidator, ToolAction};

const TOOL_KEYS: &[&str] = &["tool_name", "tool", "function", "name", "action"];
const PARAM_KEYS: &[&str] = &["parameters", "params", "args", "arguments", "input", "tool_input"];
const MESSAGE_KEYS: &[&str] = &["message", "response", "answer"];
const PROMPT_KEYS: &[&str] = &["message", "prompt", "question", "text"];

/// action 字段中表示"非工具名"的保留值
const RESERVED_ACTIONS: &[&str] = &[
    "use_tool", "tool_use", "tool_call", "respond", "reply", "answer", "final_answer", "confirm",
    "confirmation",
];

#[derive(Debug, Default)]
pub struct Normalized {
    pub actions: Vec<Action>,
    pub rejected: Vec<String>,
}

/// 值不具备计划形态时返回 None
pub fn normalize(value: &Value, validator: &dyn ActionValidator) -> Option<Normalized> {
    let elements: Vec<&Value> = match value {
        Value::Object(obj) => match obj.get("actions") {
            Some(Value::Array(items)) => items.iter().collect(),
            Some(single @ Value::Object(_)) => vec![single],
            Some(_) => return None,
            None => {
                action_from_value(value)?;
                vec![value]
            }
        },
        Value::Array(items) => {
            if !items.is_empty() && !items.iter().any(|v| action_from_value(v).is_some()) {
                return None;
            }
            items.iter().collect()
        }
        _ => return None,
    };

    let mut out = Normalized::default();
    for element in elements {
        match action_from_value(element) {
            Some(Action::ToolUse(tool)) => match validator.validate(tool) {
                Ok(valid) => out.actions.push(Action::ToolUse(valid)),
                Err(reason) => {
                    tracing::warn!(reason = %reason, "rejected action");
                    out.rejected.push(reason);
                }
            },
            Some(confirm) => out.actions.push(confirm),
            None => out
                .rejected
                .push(format!("unrecognised action: {}", preview(element))),
        }
    }
    Some(out)
}

/// 计划形态判断：能规范化即可
pub fn is_plan_shaped(value: &Value) -> bool {
    struct Probe;
    impl ActionValidator for Probe {
        fn validate(&self, action: ToolAction) -> Result<ToolAction, String> {
            Ok(action)
        }
    }
    normalize(value, &Probe).is_some()
}

fn action_from_value(value: &Value) -> Option<Action> {
    let obj = value.as_object()?;

    if let Some(kind) = str_field(obj, "type") {
        match kind.to_lowercase().as_str() {
            "confirmation" | "confirm" => return Some(confirmation(obj)),
            "tool_use" | "tool_call" | "tool" | "function" => return tool_from_object(obj).map(Action::ToolUse),
            "respond" | "response" | "message" => return respond(obj),
            _ => {}
        }
    }

    if let Some(kind) = str_field(obj, "action") {
        match kind.to_lowercase().as_str() {
            "use_tool" | "tool_use" | "tool_call" => return tool_from_object(obj).map(Action::ToolUse),
            "respond" | "reply" | "answer" | "final_answer" => return respond(obj),
            "confirm" | "confirmation" => return Some(confirmation(obj)),
            _ => {}
        }
    }

    if let Some(tool) = tool_from_object(obj) {
        return Some(Action::ToolUse(tool));
    }
    respond(obj)
}

fn tool_from_object(obj: &Map<String, Value>) -> Option<ToolAction> {
    let has_params = PARAM_KEYS.iter().any(|k| obj.contains_key(*k));
    for key in TOOL_KEYS {
        let Some(v) = obj.get(*key) else { continue };
        match v {
            Value::String(name) => {
                let name = name.trim();
                if name.is_empty() {
                    continue;
                }
                // 单独的 name / 保留的 action 值不构成工具名
                if *key == "name" && !has_params {
                    continue;
                }
                if *key == "action" && RESERVED_ACTIONS.contains(&name.to_lowercase().as_str()) {
                    continue;
                }
                return Some(ToolAction::new(name, params(obj)));
            }
            // {"function": {"name": ..., "arguments": ...}} / {"tool": {...}}
            Value::Object(inner) => {
                if let Some(mut tool) = tool_from_object(inner) {
                    if tool.parameters.is_empty() {
                        if let Value::Object(outer) = params(obj) {
                            tool.parameters = outer;
                        }
                    }
                    return Some(tool);
                }
            }
            _ => {}
        }
    }
    None
}

/// 参数对象；字符串形式的 JSON 会再解析一次
fn params(obj: &Map<String, Value>) -> Value {
    for key in PARAM_KEYS {
        match obj.get(*key) {
            Some(v @ Value::Object(_)) => return v.clone(),
            Some(Value::String(s)) => {
                if let Ok(v @ Value::Object(_)) = serde_json::from_str::<Value>(s) {
                    return v;
                }
            }
            _ => {}
        }
    }
    Value::Object(Map::new())
}

fn confirmation(obj: &Map<String, Value>) -> Action {
    let message = PROMPT_KEYS
        .iter()
        .find_map(|k| str_field(obj, k))
        .unwrap_or("Proceed with the planned actions?");
    let destructive = obj.get("destructive").and_then(Value::as_bool).unwrap_or(true);
    Action::confirmation(message, destructive)
}

fn respond(obj: &Map<String, Value>) -> Option<Action> {
    MESSAGE_KEYS
        .iter()
        .find_map(|k| str_field(obj, k))
        .map(Action::respond)
}

fn str_field<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    obj.get(key).and_then(Value::as_str)
}

fn preview(v: &Value) -> String {
    let s = v.to_string();
    if s.chars().count() > 80 {
        format!("{}...", s.chars().take(80).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::AcceptAll;
    use serde_json::json;

    fn actions(v: Value) -> Vec<Action> {
        normalize(&v, &AcceptAll).expect("plan shaped").actions
    }

    #[test]
    fn test_canonical_actions_list() {
        let a = actions(json!({"actions": [
            {"type": "tool_use", "tool_name": "read_file", "parameters": {"file_path": "a.rs"}},
            {"type": "confirmation", "message": "ok?", "destructive": false}
        ]}));
        assert_eq!(a[0], Action::tool("read_file", json!({"file_path": "a.rs"})));
        assert_eq!(a[1], Action::confirmation("ok?", false));
    }

    #[test]
    fn test_key_aliases() {
        for v in [
            json!({"tool": "git_status", "args": {"x": 1}}),
            json!({"tool_name": "git_status", "arguments": {"x": 1}}),
            json!({"function": "git_status", "params": {"x": 1}}),
            json!({"action": "git_status", "input": {"x": 1}}),
            json!({"name": "git_status", "parameters": {"x": 1}}),
            json!({"action": "use_tool", "tool": "git_status", "parameters": {"x": 1}}),
        ] {
            assert_eq!(actions(v), vec![Action::tool("git_status", json!({"x": 1}))]);
        }
    }

    #[test]
    fn test_openai_function_shape_with_string_arguments() {
        let a = actions(json!({"function": {"name": "read_file", "arguments": "{\"file_path\": \"b.rs\"}"}}));
        assert_eq!(a, vec![Action::tool("read_file", json!({"file_path": "b.rs"}))]);
    }

    #[test]
    fn test_respond_forms() {
        assert_eq!(actions(json!({"action": "respond", "message": "hi"})), vec![Action::respond("hi")]);
        assert_eq!(actions(json!({"response": "done"})), vec![Action::respond("done")]);
    }

    #[test]
    fn test_non_plan_values() {
        assert!(normalize(&json!({"foo": 1}), &AcceptAll).is_none());
        assert!(normalize(&json!([1, 2, 3]), &AcceptAll).is_none());
        assert!(normalize(&json!("text"), &AcceptAll).is_none());
        assert!(is_plan_shaped(&json!({"actions": []})));
        assert!(is_plan_shaped(&json!([{"tool": "x"}])));
    }

    #[test]
    fn test_unrecognised_elements_rejected() {
        let n = normalize(&json!({"actions": [{"tool": "x"}, {"weird": true}]}), &AcceptAll).unwrap();
        assert_eq!(n.actions.len(), 1);
        assert_eq!(n.rejected.len(), 1);
    }
}
