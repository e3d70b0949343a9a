//! 工具注册表
//!
//! 所有工具实现 Tool trait（name / description / execute），由 ToolRegistry 按名注册与查找；
//! 注册表同时回答执行器的策略问题：是否破坏性、是否解释型、失败是否中止批次，
//! 并作为 ActionValidator 在解释阶段规范化参数名、检查必填字段。

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::core::AgentError;
use crate::plan::{ActionValidator, ToolAction};

/// 工具 trait：名称、描述（供 LLM 理解）、参数 schema、异步执行（args 为 JSON）
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（用于 JSON 中的 "tool_name" 字段）
    fn name(&self) -> &str;

    /// 工具描述（供 LLM 理解功能）
    fn description(&self) -> &str;

    /// 参数 JSON Schema；默认空对象
    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": self.required_params(),
        })
    }

    /// 必填参数名
    fn required_params(&self) -> &[&'static str] {
        &[]
    }

    /// 参数别名 (alias, canonical)，如 ("path", "file_path")
    fn param_aliases(&self) -> &[(&'static str, &'static str)] {
        &[]
    }

    /// 是否有副作用；默认视为有，只读工具需显式声明 false
    fn is_destructive(&self) -> bool {
        true
    }

    /// 解释型工具（说明步骤、直接回复）在批准前即可执行
    fn is_explanatory(&self) -> bool {
        false
    }

    /// 执行工具
    async fn execute(&self, args: Value) -> Result<String, String>;
}

/// 工具注册表：按名称存储 Arc<dyn Tool>，另持有失败不中止批次的工具名单
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    non_critical: HashSet<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        let name = tool.name().to_string();
        self.tools.insert(name, Arc::new(tool));
    }

    /// 失败后不中止批次的工具（如搜索）
    pub fn with_non_critical<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.non_critical.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// 未注册的工具按破坏性处理
    pub fn is_destructive(&self, name: &str) -> bool {
        self.tools.get(name).map(|t| t.is_destructive()).unwrap_or(true)
    }

    pub fn is_explanatory(&self, name: &str) -> bool {
        self.tools.get(name).map(|t| t.is_explanatory()).unwrap_or(false)
    }

    pub fn is_critical(&self, name: &str) -> bool {
        !self.non_critical.contains(name)
    }

    /// 调用工具；未注册返回 HallucinatedTool
    pub async fn dispatch(&self, action: &ToolAction) -> Result<String, AgentError> {
        let tool = self
            .tools
            .get(&action.tool_name)
            .ok_or_else(|| AgentError::HallucinatedTool(action.tool_name.clone()))?;
        tool.execute(action.parameters_value())
            .await
            .map_err(AgentError::ToolExecutionFailed)
    }

    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// 返回 (name, description) 列表，用于生成 prompt 中的 Available tools 段落
    pub fn tool_descriptions(&self) -> Vec<(String, String)> {
        let mut list: Vec<(String, String)> = self
            .tools
            .iter()
            .map(|(name, tool)| (name.clone(), tool.description().to_string()))
            .collect();
        list.sort();
        list
    }

    /// 工具 schema JSON（名称、描述、参数），与实际注册的工具一致
    pub fn to_schema_json(&self) -> String {
        let tools: Vec<Value> = self
            .tool_names()
            .iter()
            .filter_map(|name| self.tools.get(name).map(|t| (name, t)))
            .map(|(name, tool)| {
                serde_json::json!({
                    "name": name,
                    "description": tool.description(),
                    "parameters": tool.parameters_schema(),
                    "destructive": tool.is_destructive(),
                })
            })
            .collect();
        serde_json::to_string_pretty(&tools).unwrap_or_else(|_| "[]".to_string())
    }
}

impl ActionValidator for ToolRegistry {
    /// 已注册工具：别名改写为标准名并检查必填字段；未注册工具原样放行，由执行阶段报告
    fn validate(&self, mut action: ToolAction) -> Result<ToolAction, String> {
        let Some(tool) = self.tools.get(&action.tool_name) else {
            return Ok(action);
        };
        for (alias, canonical) in tool.param_aliases() {
            if !action.parameters.contains_key(*canonical) {
                if let Some(v) = action.parameters.remove(*alias) {
                    action.parameters.insert((*canonical).to_string(), v);
                }
            }
        }
        let missing: Vec<&str> = tool
            .required_params()
            .iter()
            .copied()
            .filter(|p| !action.parameters.contains_key(*p))
            .collect();
        if missing.is_empty() {
            Ok(action)
        } else {
            Err(format!(
                "{} missing required parameter(s): {}",
                action.tool_name,
                missing.join(", ")
            ))
        }
    }
}
