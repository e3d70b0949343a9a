//! Headless Agent 运行时
//!
//! 从配置构建 Planner / PlanExecutor / PlanInterpreter / Recovery，
//! process_request 对单条用户请求跑编排循环，并把请求与回复追加到对话历史。

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::core::{ConfirmationChannel, RecoveryEngine};
use crate::llm::{create_deepseek_client, LlmClient, MockLlmClient, ModelRouter, OpenAiClient, PerformanceHistory};
use crate::plan::{ActionValidator, PlanExecutor};
use crate::react::{
    run_loop, Conversation, LoopEvent, LoopReport, LoopSession, Message, NoContext, Planner, PlanInterpreter,
};
use crate::tools::{builtin_registry, ToolExecutor};

const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

/// 按 [llm].provider 与 API Key 选择后端；缺少 Key 时退回 Mock
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let provider = cfg.llm.provider.to_lowercase();
    let has_deepseek_key = std::env::var("DEEPSEEK_API_KEY").is_ok();
    let has_openai_key = std::env::var("OPENAI_API_KEY").is_ok();

    match provider.as_str() {
        "mock" => {
            tracing::info!("Using Mock LLM");
            Arc::new(MockLlmClient)
        }
        "deepseek" if has_deepseek_key || has_openai_key => {
            let client = create_deepseek_client(&cfg.llm.models);
            tracing::info!(models = ?client.models(), "Using DeepSeek LLM");
            Arc::new(client)
        }
        "openai" if has_openai_key => {
            let models = if cfg.llm.models.is_empty() {
                vec![DEFAULT_OPENAI_MODEL.to_string()]
            } else {
                cfg.llm.models.clone()
            };
            tracing::info!(models = ?models, "Using OpenAI LLM");
            Arc::new(OpenAiClient::new(cfg.llm.base_url.as_deref(), models, None))
        }
        other => {
            tracing::warn!(provider = %other, "No API key set or provider unknown, using Mock LLM");
            Arc::new(MockLlmClient)
        }
    }
}

/// 预构建的 Agent 组件，可多个请求共享
pub struct AgentComponents {
    pub config: AppConfig,
    pub planner: Planner,
    pub executor: PlanExecutor,
    pub interpreter: PlanInterpreter,
    pub recovery: RecoveryEngine,
}

impl AgentComponents {
    pub fn from_config(cfg: AppConfig) -> Self {
        let llm = create_llm_from_config(&cfg);
        Self::with_llm(cfg, llm)
    }

    /// 使用指定的 LLM 客户端（测试注入 ScriptedLlmClient）
    pub fn with_llm(cfg: AppConfig, llm: Arc<dyn LlmClient>) -> Self {
        if let Err(e) = std::fs::create_dir_all(&cfg.app.workspace_root) {
            tracing::warn!(error = %e, path = %cfg.app.workspace_root.display(), "failed to create workspace");
        }
        let registry = builtin_registry(&cfg.app.workspace_root, &cfg.tools.test_command)
            .with_non_critical(cfg.tools.non_critical.iter().cloned());
        let tools = Arc::new(ToolExecutor::new(registry, cfg.tools.tool_timeout_secs));
        let validator: Arc<dyn ActionValidator> = tools.clone();

        let history = Arc::new(PerformanceHistory::new(cfg.router.history_capacity));
        let router = Arc::new(ModelRouter::new(cfg.router.settings(), history));
        let planner = Planner::new(llm, router)
            .with_temperature(cfg.llm.temperature)
            .with_request_timeout(cfg.llm.timeouts.request_timeout());

        Self {
            recovery: RecoveryEngine::default().with_provider_retries(cfg.agent.provider_retries),
            planner,
            executor: PlanExecutor::new(tools),
            interpreter: PlanInterpreter::new(validator),
            config: cfg,
        }
    }

    pub fn new_conversation(&self) -> Conversation {
        Conversation::new(self.config.app.max_context_turns)
    }

    /// 处理单条用户请求，返回执行报告；回复写回对话历史
    pub async fn process_request(
        &self,
        conversation: &mut Conversation,
        request: &str,
        confirm: &dyn ConfirmationChannel,
        cancel_token: CancellationToken,
        event_tx: Option<&UnboundedSender<LoopEvent>>,
    ) -> LoopReport {
        let report = {
            let mut session = LoopSession::new(&self.planner, &self.executor, &self.interpreter, confirm, cancel_token)
                .with_recovery(self.recovery.clone())
                .with_context_provider(&NoContext)
                .with_max_iterations(self.config.agent.max_iterations)
                .preapproved(self.config.agent.auto_approve)
                .with_history(conversation.messages());
            if let Some(tx) = event_tx {
                session = session.with_event_tx(tx);
            }
            run_loop(&session, request).await
        };
        conversation.push(Message::user(request));
        conversation.push(Message::assistant(report.response.clone()));
        report
    }
}
