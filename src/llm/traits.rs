//! 模型提供方抽象
//!
//! 所有后端（OpenAI 兼容 / DeepSeek / Mock）实现 LlmClient：按调用指定模型名的 complete（非流式）
//! 与 complete_stream（流式 Token）；models() 列出可供路由的模型名。

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::{stream, Stream, StreamExt};
use thiserror::Error;

/// 提供方错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    #[error("network error: {0}")]
    Network(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

/// 模型提供方 trait
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 非流式完成：单条 prompt、指定模型与温度
    async fn complete(&self, prompt: &str, model: &str, temperature: f32) -> Result<String, LlmError>;

    /// 流式完成，返回 Token 流；默认把 complete 的结果包成单元素流
    async fn complete_stream(
        &self,
        prompt: &str,
        model: &str,
        temperature: f32,
    ) -> Result<TokenStream, LlmError> {
        let content = self.complete(prompt, model, temperature).await?;
        Ok(Box::pin(stream::iter(vec![Ok(content)])))
    }

    /// 可供路由的模型名
    fn models(&self) -> Vec<String>;

    /// 累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}

/// 将 Token 流拼接为完整文本；中途出错时返回错误
pub async fn collect_stream(mut stream: TokenStream) -> Result<String, LlmError> {
    let mut out = String::new();
    while let Some(chunk) = stream.next().await {
        out.push_str(&chunk?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_collect_stream_concatenates_tokens() {
        let tokens: TokenStream = Box::pin(stream::iter(vec![
            Ok("{\"actions\"".to_string()),
            Ok(": []}".to_string()),
        ]));
        assert_eq!(collect_stream(tokens).await.unwrap(), "{\"actions\": []}");
    }

    #[tokio::test]
    async fn test_collect_stream_propagates_error() {
        let tokens: TokenStream = Box::pin(stream::iter(vec![
            Ok("partial".to_string()),
            Err(LlmError::Network("reset".into())),
        ]));
        assert!(collect_stream(tokens).await.is_err());
    }
}
