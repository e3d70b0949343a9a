//! Planner：按路由结果调用模型，得到本轮计划的原始文本
//!
//! 每次调用都有超时并可被取消；成功调用的耗时回报给路由器。
//! 链式调用：推理模型先产出分析，分析拼入 prompt 后交给快速模型输出计划；
//! 推理模型失败时退回快速模型单独规划，快速模型失败时直接使用推理模型的输出。

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::core::AgentError;
use crate::llm::{collect_stream, LlmClient, ModelRouter, RoutingDecision, TaskComplexity};

const DEFAULT_TEMPERATURE: f32 = 0.1;
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// 一次规划的结果
#[derive(Debug, Clone)]
pub struct PlannerReply {
    pub text: String,
    /// 实际参与本次规划的模型（按调用顺序）
    pub models: Vec<String>,
}

pub struct Planner {
    llm: Arc<dyn LlmClient>,
    router: Arc<ModelRouter>,
    temperature: f32,
    request_timeout: Duration,
}

impl Planner {
    pub fn new(llm: Arc<dyn LlmClient>, router: Arc<ModelRouter>) -> Self {
        Self {
            llm,
            router,
            temperature: DEFAULT_TEMPERATURE,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn router(&self) -> &Arc<ModelRouter> {
        &self.router
    }

    /// 累计 token 使用统计
    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.llm.token_usage()
    }

    /// 对提供方当前可用的模型做路由
    pub fn route(&self, complexity: &TaskComplexity) -> Result<RoutingDecision, AgentError> {
        let available = self.router.profile(&self.llm.models());
        self.router
            .select(complexity, &available)
            .ok_or(AgentError::NoModelsAvailable)
    }

    pub async fn plan(
        &self,
        decision: &RoutingDecision,
        complexity: &TaskComplexity,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<PlannerReply, AgentError> {
        match (&decision.secondary, decision.chain) {
            (Some(fast), true) => self.plan_chained(&decision.primary, fast, complexity, prompt, cancel).await,
            _ => {
                let text = self.call(&decision.primary, prompt, cancel).await?;
                Ok(PlannerReply {
                    text,
                    models: vec![decision.primary.clone()],
                })
            }
        }
    }

    async fn plan_chained(
        &self,
        reasoning_model: &str,
        fast_model: &str,
        complexity: &TaskComplexity,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<PlannerReply, AgentError> {
        let analysis_prompt = format!(
            "{prompt}\n\n## Analysis phase\n\
             You are the reasoning phase of a two-model pipeline. Do not output the plan yet. \
             Analyse the request and describe the key insights, the specific requirements and the \
             implementation steps. Be concise; your analysis will guide the next model.\n\
             Task complexity: {}/10\nTask type: {:?}\n",
            complexity.score, complexity.task_type
        );

        let analysis = match self.call(reasoning_model, &analysis_prompt, cancel).await {
            Ok(a) => a,
            Err(AgentError::Cancelled) => return Err(AgentError::Cancelled),
            Err(e) => {
                tracing::warn!(model = %reasoning_model, error = %e, "reasoning phase failed, planning with fast model only");
                let text = self.call(fast_model, prompt, cancel).await?;
                return Ok(PlannerReply {
                    text,
                    models: vec![fast_model.to_string()],
                });
            }
        };

        let implementation_prompt = format!("{prompt}\n\n## Analysis from the reasoning phase\n{analysis}\n");
        match self.call(fast_model, &implementation_prompt, cancel).await {
            Ok(text) => Ok(PlannerReply {
                text,
                models: vec![reasoning_model.to_string(), fast_model.to_string()],
            }),
            Err(AgentError::Cancelled) => Err(AgentError::Cancelled),
            Err(e) => {
                tracing::warn!(model = %fast_model, error = %e, "fast phase failed, using reasoning output");
                Ok(PlannerReply {
                    text: analysis,
                    models: vec![reasoning_model.to_string()],
                })
            }
        }
    }

    /// 单次调用：超时视为提供方失败，取消立即返回
    async fn call(&self, model: &str, prompt: &str, cancel: &CancellationToken) -> Result<String, AgentError> {
        let started = Instant::now();
        tracing::debug!(model = %model, prompt_chars = prompt.len(), "calling provider");
        // 流式后端按 token 返回，这里拼接为完整回复
        let generate = async {
            let stream = self.llm.complete_stream(prompt, model, self.temperature).await?;
            collect_stream(stream).await
        };
        let outcome = tokio::select! {
            r = tokio::time::timeout(self.request_timeout, generate) => r,
            _ = cancel.cancelled() => return Err(AgentError::Cancelled),
        };
        // 失败与超时同样计入延迟历史
        let elapsed = started.elapsed();
        self.router.record_latency(model, elapsed);
        match outcome {
            Ok(Ok(text)) => {
                tracing::info!(model = %model, latency_ms = elapsed.as_millis() as u64, "provider replied");
                Ok(text)
            }
            Ok(Err(e)) => {
                tracing::warn!(model = %model, error = %e, latency_ms = elapsed.as_millis() as u64, "provider error");
                Err(AgentError::ProviderError(e))
            }
            Err(_) => {
                tracing::warn!(model = %model, timeout_secs = self.request_timeout.as_secs(), "provider timeout");
                Err(AgentError::ProviderTimeout(self.request_timeout.as_secs()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmError, PerformanceHistory, RouterSettings, ScriptedLlmClient};

    fn router() -> Arc<ModelRouter> {
        Arc::new(ModelRouter::new(RouterSettings::default(), Arc::new(PerformanceHistory::default())))
    }

    fn single(model: &str) -> RoutingDecision {
        RoutingDecision {
            primary: model.to_string(),
            chain: false,
            secondary: None,
            fitness: 0.0,
        }
    }

    fn chained() -> RoutingDecision {
        RoutingDecision {
            primary: "deepseek-reasoner".to_string(),
            chain: true,
            secondary: Some("qwen-mini".to_string()),
            fitness: 0.0,
        }
    }

    #[tokio::test]
    async fn test_single_call_records_latency() {
        let llm = Arc::new(ScriptedLlmClient::new(vec!["m".into()]).with_reply("{\"actions\": []}"));
        let r = router();
        let planner = Planner::new(llm.clone(), r.clone());
        let reply = planner
            .plan(&single("m"), &TaskComplexity::new(5, false, false), "p", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(reply.text, "{\"actions\": []}");
        assert_eq!(r.history().sample_count("m"), 1);
        assert_eq!(llm.calls()[0].model, "m");
    }

    #[tokio::test]
    async fn test_timeout_is_provider_failure() {
        let llm = Arc::new(
            ScriptedLlmClient::new(vec!["m".into()]).with_delayed_reply(Duration::from_secs(5), "late"),
        );
        let r = router();
        let planner = Planner::new(llm, r.clone()).with_request_timeout(Duration::from_millis(20));
        let err = planner
            .plan(&single("m"), &TaskComplexity::new(5, false, false), "p", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::ProviderTimeout(_)));
        assert!(err.is_provider_failure());
        assert_eq!(r.history().sample_count("m"), 1);
        assert!(r.history().average("m").unwrap() >= 0.02);
    }

    #[tokio::test]
    async fn test_provider_error_records_latency() {
        let llm = Arc::new(ScriptedLlmClient::new(vec!["m".into()]).with_error(LlmError::Api("overloaded".into())));
        let r = router();
        let planner = Planner::new(llm, r.clone());
        let err = planner
            .plan(&single("m"), &TaskComplexity::new(5, false, false), "p", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::ProviderError(_)));
        assert_eq!(r.history().sample_count("m"), 1);
    }

    #[tokio::test]
    async fn test_cancel_aborts_inflight_call() {
        let llm = Arc::new(
            ScriptedLlmClient::new(vec!["m".into()]).with_delayed_reply(Duration::from_secs(5), "late"),
        );
        let planner = Planner::new(llm, router());
        let cancel = CancellationToken::new();
        let c = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            c.cancel();
        });
        let err = planner
            .plan(&single("m"), &TaskComplexity::new(5, false, false), "p", &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Cancelled));
    }

    #[tokio::test]
    async fn test_chain_feeds_analysis_to_fast_model() {
        let llm = Arc::new(
            ScriptedLlmClient::new(vec!["deepseek-reasoner".into(), "qwen-mini".into()])
                .with_reply("ANALYSIS: read config first")
                .with_reply("{\"actions\": []}"),
        );
        let planner = Planner::new(llm.clone(), router());
        let reply = planner
            .plan(&chained(), &TaskComplexity::new(9, true, true), "PROMPT", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(reply.text, "{\"actions\": []}");
        assert_eq!(reply.models, vec!["deepseek-reasoner", "qwen-mini"]);
        let calls = llm.calls();
        assert_eq!(calls[0].model, "deepseek-reasoner");
        assert!(calls[0].prompt.contains("Task complexity: 9/10"));
        assert_eq!(calls[1].model, "qwen-mini");
        assert!(calls[1].prompt.contains("ANALYSIS: read config first"));
    }

    #[tokio::test]
    async fn test_chain_falls_back_to_reasoning_output() {
        let llm = Arc::new(
            ScriptedLlmClient::new(vec!["deepseek-reasoner".into(), "qwen-mini".into()])
                .with_reply("{\"actions\": []}")
                .with_error(LlmError::Network("reset".into())),
        );
        let planner = Planner::new(llm, router());
        let reply = planner
            .plan(&chained(), &TaskComplexity::new(9, true, true), "PROMPT", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(reply.text, "{\"actions\": []}");
        assert_eq!(reply.models, vec!["deepseek-reasoner"]);
    }

    #[tokio::test]
    async fn test_chain_reasoning_failure_uses_fast_model() {
        let llm = Arc::new(
            ScriptedLlmClient::new(vec!["deepseek-reasoner".into(), "qwen-mini".into()])
                .with_error(LlmError::Api("overloaded".into()))
                .with_reply("{\"actions\": []}"),
        );
        let planner = Planner::new(llm.clone(), router());
        let reply = planner
            .plan(&chained(), &TaskComplexity::new(9, true, true), "PROMPT", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(reply.models, vec!["qwen-mini"]);
        assert_eq!(llm.calls()[1].prompt, "PROMPT");
    }

    #[test]
    fn test_route_without_models() {
        let llm = Arc::new(ScriptedLlmClient::new(vec![]));
        let planner = Planner::new(llm, router());
        assert!(matches!(
            planner.route(&TaskComplexity::new(5, false, false)),
            Err(AgentError::NoModelsAvailable)
        ));
    }
}
