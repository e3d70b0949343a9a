//! LLM 层：模型提供方抽象与实现（OpenAI 兼容 / DeepSeek / Mock）、复杂度分析与多模型路由

pub mod complexity;
pub mod deepseek;
pub mod mock;
pub mod openai;
pub mod router;
pub mod traits;

pub use complexity::{analyze as analyze_complexity, TaskComplexity, TaskType};
pub use deepseek::{create_deepseek_client, DEEPSEEK_CHAT, DEEPSEEK_REASONER};
pub use mock::{MockLlmClient, ScriptedLlmClient, ScriptedReply};
pub use openai::{OpenAiClient, TokenUsage};
pub use router::{
    ModelCapability, ModelInfo, ModelRouter, ModelType, PerformanceHistory, RouterSettings,
    RoutingDecision,
};
pub use traits::{collect_stream, LlmClient, LlmError, TokenStream};
