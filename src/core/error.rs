//! Agent 错误类型与恢复动作
//!
//! 与 RecoveryEngine 配合：根据 AgentError 与连续失败次数决定 RetryPlanning / Abort。

use std::time::Duration;

use thiserror::Error;

use crate::llm::LlmError;

/// 编排过程中可能出现的错误（模型调用、工具、取消等）
#[derive(Error, Debug)]
pub enum AgentError {
    /// 模型调用失败（网络 / 非 2xx / 返回异常）
    #[error("Provider error: {0}")]
    ProviderError(#[from] LlmError),

    #[error("Provider timeout after {0}s")]
    ProviderTimeout(u64),

    /// 没有任何可用模型，无法路由
    #[error("No models available for routing")]
    NoModelsAvailable,

    #[error("Cancelled")]
    Cancelled,

    #[error("Tool execution failed: {0}")]
    ToolExecutionFailed(String),

    #[error("Tool timeout: {tool} after {after:?}")]
    ToolTimeout { tool: String, after: Duration },

    #[error("Hallucinated tool: {0}")]
    HallucinatedTool(String),

    #[error("Path escape attempt: {0}")]
    PathEscape(String),
}

impl AgentError {
    /// 是否为规划阶段的模型失败（计入重试预算）
    pub fn is_provider_failure(&self) -> bool {
        matches!(self, AgentError::ProviderError(_) | AgentError::ProviderTimeout(_))
    }
}

/// 恢复引擎根据错误类型给出的建议动作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    /// 本轮视为空计划，下一轮重新规划
    RetryPlanning,
    /// 终止当前请求
    Abort(String),
}
