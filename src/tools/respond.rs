//! 解释型工具：直接回复用户、说明接下来的步骤
//!
//! 无副作用，在批次等待确认之前即可执行。

use async_trait::async_trait;
use serde_json::Value;

use crate::plan::RESPOND_TOOL;
use crate::tools::Tool;

/// 直接回复用户
pub struct RespondTool;

#[async_trait]
impl Tool for RespondTool {
    fn name(&self) -> &str {
        RESPOND_TOOL
    }

    fn description(&self) -> &str {
        "Reply to the user directly when no tool is needed or the task is done. Args: {\"message\": \"text\"}"
    }

    fn required_params(&self) -> &[&'static str] {
        &["message"]
    }

    fn param_aliases(&self) -> &[(&'static str, &'static str)] {
        &[("text", "message"), ("response", "message"), ("answer", "message")]
    }

    fn is_destructive(&self) -> bool {
        false
    }

    fn is_explanatory(&self) -> bool {
        true
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let message = args
            .get("message")
            .and_then(|v| v.as_str())
            .ok_or("Missing required parameter: message")?;
        Ok(message.to_string())
    }
}

/// 向用户说明计划中的步骤
pub struct ExplainStepsTool;

#[async_trait]
impl Tool for ExplainStepsTool {
    fn name(&self) -> &str {
        "explain_steps"
    }

    fn description(&self) -> &str {
        "Explain the planned steps to the user before acting. Args: {\"steps\": [\"step 1\", \"step 2\"]}"
    }

    fn param_aliases(&self) -> &[(&'static str, &'static str)] {
        &[("plan", "steps"), ("explanation", "steps")]
    }

    fn is_destructive(&self) -> bool {
        false
    }

    fn is_explanatory(&self) -> bool {
        true
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        match args.get("steps") {
            Some(Value::Array(steps)) => Ok(steps
                .iter()
                .enumerate()
                .map(|(i, s)| match s {
                    Value::String(t) => format!("{}. {}", i + 1, t),
                    other => format!("{}. {}", i + 1, other),
                })
                .collect::<Vec<_>>()
                .join("\n")),
            Some(Value::String(s)) => Ok(s.clone()),
            _ => Ok("(no steps)".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_respond_and_explain() {
        assert_eq!(RespondTool.execute(json!({"message": "hi"})).await.unwrap(), "hi");
        assert!(RespondTool.execute(json!({})).await.is_err());
        let out = ExplainStepsTool
            .execute(json!({"steps": ["read config", "update value"]}))
            .await
            .unwrap();
        assert_eq!(out, "1. read config\n2. update value");
        assert!(RespondTool.is_explanatory() && !RespondTool.is_destructive());
    }
}
