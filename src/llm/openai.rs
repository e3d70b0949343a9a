//! OpenAI 兼容 API 客户端
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url）；模型名按调用传入，
//! 同一客户端可服务路由器选出的多个模型。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::chat::{
    ChatCompletionRequestMessage, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;

use crate::llm::{LlmClient, LlmError};

/// 传输层失败归为 Network，请求参数问题归为 InvalidRequest，其余按 API 错误处理
fn map_openai_error(err: OpenAIError) -> LlmError {
    match err {
        OpenAIError::Reqwest(e) => LlmError::Network(e.to_string()),
        OpenAIError::InvalidArgument(msg) => LlmError::InvalidRequest(msg),
        other => LlmError::Api(other.to_string()),
    }
}

/// Token 使用统计（累计值）
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: Arc<AtomicU64>,
    pub completion_tokens: Arc<AtomicU64>,
    pub total_tokens: Arc<AtomicU64>,
}

impl TokenUsage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, prompt: u64, completion: u64) {
        self.prompt_tokens.fetch_add(prompt, Ordering::Relaxed);
        self.completion_tokens.fetch_add(completion, Ordering::Relaxed);
        self.total_tokens.fetch_add(prompt + completion, Ordering::Relaxed);
    }

    pub fn get(&self) -> (u64, u64, u64) {
        (
            self.prompt_tokens.load(Ordering::Relaxed),
            self.completion_tokens.load(Ordering::Relaxed),
            self.total_tokens.load(Ordering::Relaxed),
        )
    }
}

/// OpenAI 兼容客户端：持有 Client 与可路由的模型列表
pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    models: Vec<String>,
    pub usage: TokenUsage,
}

impl OpenAiClient {
    pub fn new(base_url: Option<&str>, models: Vec<String>, api_key: Option<&str>) -> Self {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_else(|| "sk-placeholder".to_string());

        let config = if let Some(url) = base_url {
            OpenAIConfig::new().with_api_base(url).with_api_key(api_key)
        } else {
            OpenAIConfig::new().with_api_key(api_key)
        };

        Self {
            client: Client::with_config(config),
            models,
            usage: TokenUsage::new(),
        }
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn token_usage(&self) -> (u64, u64, u64) {
        self.usage.get()
    }

    fn models(&self) -> Vec<String> {
        self.models.clone()
    }

    async fn complete(&self, prompt: &str, model: &str, temperature: f32) -> Result<String, LlmError> {
        let message = ChatCompletionRequestUserMessageArgs::default()
            .content(prompt.to_string())
            .build()
            .map_err(|e| LlmError::InvalidRequest(e.to_string()))?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(model)
            .temperature(temperature)
            .messages(vec![ChatCompletionRequestMessage::User(message)])
            .build()
            .map_err(|e| LlmError::InvalidRequest(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(map_openai_error)?;

        if let Some(usage) = &response.usage {
            self.usage
                .add(usage.prompt_tokens as u64, usage.completion_tokens as u64);
        }

        let content = response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default();

        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_openai::error::ApiError;

    #[test]
    fn test_openai_errors_map_to_provider_kinds() {
        let api = OpenAIError::ApiError(ApiError {
            message: "model overloaded".to_string(),
            r#type: None,
            param: None,
            code: None,
        });
        assert!(matches!(map_openai_error(api), LlmError::Api(m) if m.contains("model overloaded")));

        let bad = OpenAIError::InvalidArgument("temperature out of range".to_string());
        assert_eq!(
            map_openai_error(bad),
            LlmError::InvalidRequest("temperature out of range".to_string())
        );
    }
}
