//! 错误恢复引擎
//!
//! 根据 AgentError 类型与连续失败次数返回 RecoveryAction，供循环控制器决定重新规划还是终止。

use crate::core::{AgentError, RecoveryAction};

/// 模型失败允许一次重试，再次连续失败则终止
#[derive(Debug, Clone)]
pub struct RecoveryEngine {
    provider_retries: u32,
}

impl Default for RecoveryEngine {
    fn default() -> Self {
        Self { provider_retries: 1 }
    }
}

impl RecoveryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_provider_retries(mut self, retries: u32) -> Self {
        self.provider_retries = retries;
        self
    }

    /// consecutive_failures：包含本次在内的连续模型失败次数
    pub fn handle(&self, err: &AgentError, consecutive_failures: u32) -> RecoveryAction {
        match err {
            AgentError::ProviderError(_) | AgentError::ProviderTimeout(_) => {
                if consecutive_failures <= self.provider_retries {
                    RecoveryAction::RetryPlanning
                } else {
                    RecoveryAction::Abort(format!(
                        "model provider failed {consecutive_failures} times in a row: {err}"
                    ))
                }
            }
            AgentError::Cancelled => RecoveryAction::Abort("cancelled".to_string()),
            AgentError::NoModelsAvailable => RecoveryAction::Abort(err.to_string()),
            _ => RecoveryAction::Abort(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmError;

    #[test]
    fn test_provider_error_retried_once() {
        let engine = RecoveryEngine::new();
        let err = AgentError::ProviderError(LlmError::Network("connection reset".into()));
        assert_eq!(engine.handle(&err, 1), RecoveryAction::RetryPlanning);
        assert!(matches!(engine.handle(&err, 2), RecoveryAction::Abort(_)));
    }

    #[test]
    fn test_timeout_counts_as_provider_failure() {
        let engine = RecoveryEngine::new().with_provider_retries(2);
        let err = AgentError::ProviderTimeout(30);
        assert_eq!(engine.handle(&err, 2), RecoveryAction::RetryPlanning);
        assert!(matches!(engine.handle(&err, 3), RecoveryAction::Abort(_)));
    }

    #[test]
    fn test_cancelled_aborts() {
        let engine = RecoveryEngine::new();
        match engine.handle(&AgentError::Cancelled, 0) {
            RecoveryAction::Abort(reason) => assert_eq!(reason, "cancelled"),
            other => panic!("Expected Abort, got {other:?}"),
        }
    }
}
