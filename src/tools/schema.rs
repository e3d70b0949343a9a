//! 计划格式 JSON Schema（schemars 自动生成）
//!
//! 注入 prompt，让模型按规范格式输出，减少解释器兜底的次数。

use std::collections::HashMap;

use schemars::{schema_for, JsonSchema};

/// 一轮计划（仅用于 Schema 生成）
#[allow(dead_code)]
#[derive(JsonSchema)]
struct PlanFormat {
    /// 按顺序执行的动作；任务已完成时返回空数组
    pub actions: Vec<ActionFormat>,
}

#[allow(dead_code)]
#[derive(JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ActionFormat {
    /// 调用一个工具
    ToolUse {
        /// 工具名，必须是 Available tools 中的一个
        tool_name: String,
        /// 工具参数，依工具不同而不同（file_path、pattern、content 等）
        parameters: HashMap<String, serde_json::Value>,
    },
    /// 在执行破坏性动作前请求用户确认
    Confirmation {
        message: String,
        destructive: bool,
    },
}

/// 返回计划格式的 JSON Schema 字符串
pub fn plan_schema_json() -> String {
    let schema = schema_for!(PlanFormat);
    serde_json::to_string_pretty(&schema).unwrap_or_else(|_| String::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_mentions_plan_fields() {
        let s = plan_schema_json();
        assert!(s.contains("actions"));
        assert!(s.contains("tool_name"));
        assert!(s.contains("confirmation"));
    }
}
