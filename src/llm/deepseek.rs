//! DeepSeek API 客户端（OpenAI 兼容格式）
//!
//! - Base URL: https://api.deepseek.com
//! - 模型: deepseek-chat (常规对话), deepseek-reasoner (思考模式)
//!
//! 两个模型都交给路由器：reasoner 推断为 reasoning 型，chat 推断为 chat 型。

use crate::llm::OpenAiClient;

pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";
pub const DEEPSEEK_CHAT: &str = "deepseek-chat";
pub const DEEPSEEK_REASONER: &str = "deepseek-reasoner";

/// 创建 DeepSeek 客户端
///
/// - 优先使用环境变量 `DEEPSEEK_API_KEY`
/// - `models` 为空时使用 deepseek-chat + deepseek-reasoner
pub fn create_deepseek_client(models: &[String]) -> OpenAiClient {
    let api_key = std::env::var("DEEPSEEK_API_KEY")
        .ok()
        .or_else(|| std::env::var("OPENAI_API_KEY").ok())
        .unwrap_or_else(|| "sk-placeholder".to_string());

    let models = if models.is_empty() {
        vec![DEEPSEEK_CHAT.to_string(), DEEPSEEK_REASONER.to_string()]
    } else {
        models.to_vec()
    };

    OpenAiClient::new(Some(DEEPSEEK_BASE_URL), models, Some(api_key.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmClient;

    #[test]
    fn test_default_models() {
        let client = create_deepseek_client(&[]);
        assert_eq!(client.models(), vec![DEEPSEEK_CHAT.to_string(), DEEPSEEK_REASONER.to_string()]);
    }
}
