//! 工具执行器
//!
//! 持有 ToolRegistry 与全局超时，execute(action) 在超时内调用 registry.dispatch，
//! 结果统一转为 ToolResult（失败与超时都是值，不是错误）；每次调用输出结构化审计日志（JSON）。

use std::time::{Duration, Instant};

use tokio::time::timeout;

use crate::core::AgentError;
use crate::plan::{ActionValidator, ToolAction, ToolResult};
use crate::tools::ToolRegistry;

/// 工具执行器：对每次调用施加超时
pub struct ToolExecutor {
    registry: ToolRegistry,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// 执行单个工具动作并输出 JSON 审计日志
    pub async fn execute(&self, action: &ToolAction) -> ToolResult {
        let start = Instant::now();
        let description = action.describe();
        let result = timeout(self.timeout, self.registry.dispatch(action)).await;

        let (ok, outcome): (bool, &str) = match &result {
            Ok(Ok(_)) => (true, "ok"),
            Ok(Err(_)) => (false, "error"),
            Err(_) => (false, "timeout"),
        };
        let duration_ms = start.elapsed().as_millis() as u64;
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": action.tool_name,
            "ok": ok,
            "outcome": outcome,
            "duration_ms": duration_ms,
            "args_preview": args_preview(&action.parameters_value()),
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        match result {
            Ok(Ok(content)) => ToolResult::ok(description, content),
            Ok(Err(e)) => ToolResult::failed(description, e.to_string()),
            Err(_) => ToolResult::failed(
                description,
                AgentError::ToolTimeout {
                    tool: action.tool_name.clone(),
                    after: self.timeout,
                }
                .to_string(),
            ),
        }
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registry.tool_names()
    }
}

/// 解释器与执行器共用同一注册表的别名与必填规则
impl ActionValidator for ToolExecutor {
    fn validate(&self, action: ToolAction) -> Result<ToolAction, String> {
        self.registry.validate(action)
    }
}

fn args_preview(args: &serde_json::Value) -> String {
    let s = args.to_string();
    if s.len() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
