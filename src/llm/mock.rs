//! Mock LLM 客户端（用于测试与无 API Key 的本地运行）
//!
//! - MockLlmClient：从 prompt 中取出用户请求，回显为 respond 计划
//! - ScriptedLlmClient：按队列依次返回预设回复 / 错误 / 延迟回复，并记录每次调用

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::llm::{LlmClient, LlmError};

/// Mock 客户端：回显用户请求
#[derive(Debug, Default)]
pub struct MockLlmClient;

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, prompt: &str, _model: &str, _temperature: f32) -> Result<String, LlmError> {
        let request = prompt
            .lines()
            .find_map(|l| l.strip_prefix("User request:"))
            .map(str::trim)
            .unwrap_or("(no input)");
        let plan = serde_json::json!({
            "action": "respond",
            "message": format!("Echo from Mock: {request}"),
        });
        Ok(plan.to_string())
    }

    fn models(&self) -> Vec<String> {
        vec!["mock-chat".to_string()]
    }
}

/// 预设回复
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Text(String),
    Error(LlmError),
    /// 延迟后返回文本（用于超时与取消测试）
    Delayed(Duration, String),
}

/// 一次被记录的调用
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub model: String,
    pub prompt: String,
}

/// 脚本化客户端：队列耗尽后返回 fallback（默认空计划）
pub struct ScriptedLlmClient {
    models: Vec<String>,
    replies: Mutex<VecDeque<ScriptedReply>>,
    fallback: String,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedLlmClient {
    pub fn new(models: Vec<String>) -> Self {
        Self {
            models,
            replies: Mutex::new(VecDeque::new()),
            fallback: r#"{"actions": []}"#.to_string(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_reply(self, text: impl Into<String>) -> Self {
        self.push(ScriptedReply::Text(text.into()));
        self
    }

    pub fn with_error(self, err: LlmError) -> Self {
        self.push(ScriptedReply::Error(err));
        self
    }

    pub fn with_delayed_reply(self, delay: Duration, text: impl Into<String>) -> Self {
        self.push(ScriptedReply::Delayed(delay, text.into()));
        self
    }

    pub fn with_fallback(mut self, text: impl Into<String>) -> Self {
        self.fallback = text.into();
        self
    }

    pub fn push(&self, reply: ScriptedReply) {
        if let Ok(mut q) = self.replies.lock() {
            q.push_back(reply);
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, prompt: &str, model: &str, _temperature: f32) -> Result<String, LlmError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedCall {
                model: model.to_string(),
                prompt: prompt.to_string(),
            });
        }
        let next = self.replies.lock().ok().and_then(|mut q| q.pop_front());
        match next {
            Some(ScriptedReply::Text(t)) => Ok(t),
            Some(ScriptedReply::Error(e)) => Err(e),
            Some(ScriptedReply::Delayed(d, t)) => {
                tokio::time::sleep(d).await;
                Ok(t)
            }
            None => Ok(self.fallback.clone()),
        }
    }

    fn models(&self) -> Vec<String> {
        self.models.clone()
    }
}
