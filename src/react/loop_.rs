//! 循环控制器
//!
//! 每轮：收集上下文 -> 复杂度分析与路由 -> 构造 prompt -> 调用模型 -> 解释 ->
//! 过滤多余确认与已完成动作 -> 停止策略 -> 执行 -> 记录结果 -> 判断是否继续。
//! 终态：FINAL（停止策略判定完成）、EXHAUSTED（迭代次数用完）、ABORTED（取消、拒绝、模型连续失败）。
//! 单个请求内严格串行；可选 event_tx 向前端推送 LoopEvent。

use std::sync::Mutex;

use serde_json::json;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::core::{
    AgentError, ConfirmationChannel, LoopOutcome, LoopPhase, PhaseTracker, RecoveryAction, RecoveryEngine,
};
use crate::llm::analyze_complexity;
use crate::plan::{
    Action, CompletedFingerprints, ExecutionContext, ExecutionEvent, ExecutionLog, HaltReason, Plan,
    PlanExecutor, ToolResult, RESPOND_TOOL,
};
use crate::react::context::{ContextProvider, ContextSnapshot, Message, NoContext};
use crate::react::events::LoopEvent;
use crate::react::heuristics::{KeywordStopPolicy, StepContext, StopPolicy};
use crate::react::interpreter::PlanInterpreter;
use crate::react::planner::Planner;
use crate::react::prompt::{DefaultPromptBuilder, PromptBuilder, MAX_PRIOR_RESULTS};
use crate::tools::ToolRegistry;

/// 默认最大迭代次数
pub const DEFAULT_MAX_ITERATIONS: usize = 10;
/// 解释阶段被拒动作在执行日志中的占位工具名
pub const REJECTED_ACTION: &str = "rejected_action";
/// 事件中工具输出预览的最大字符数
const PREVIEW_CHARS: usize = 200;

/// 单个请求的执行报告
#[derive(Debug)]
pub struct LoopReport {
    pub request_id: Uuid,
    pub outcome: LoopOutcome,
    /// 给用户的回复：直接回复动作的内容，或执行进度汇总
    pub response: String,
    pub log: ExecutionLog,
    pub iterations: usize,
}

/// 循环会话配置
pub struct LoopSession<'a> {
    pub planner: &'a Planner,
    pub executor: &'a PlanExecutor,
    pub interpreter: &'a PlanInterpreter,
    pub confirm: &'a dyn ConfirmationChannel,
    pub cancel_token: CancellationToken,
    pub recovery: RecoveryEngine,
    pub context_provider: &'a dyn ContextProvider,
    /// None 时使用 DefaultPromptBuilder
    pub prompt_builder: Option<&'a dyn PromptBuilder>,
    pub stop_policy: &'a dyn StopPolicy,
    pub max_iterations: usize,
    /// 调用方已批准破坏性动作，不再请求确认
    pub preapproved: bool,
    /// 之前的对话
    pub history: &'a [Message],
    pub event_tx: Option<&'a UnboundedSender<LoopEvent>>,
}

impl<'a> LoopSession<'a> {
    pub fn new(
        planner: &'a Planner,
        executor: &'a PlanExecutor,
        interpreter: &'a PlanInterpreter,
        confirm: &'a dyn ConfirmationChannel,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            planner,
            executor,
            interpreter,
            confirm,
            cancel_token,
            recovery: RecoveryEngine::default(),
            context_provider: &NoContext,
            prompt_builder: None,
            stop_policy: &KeywordStopPolicy,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            preapproved: false,
            history: &[],
            event_tx: None,
        }
    }

    pub fn with_recovery(mut self, recovery: RecoveryEngine) -> Self {
        self.recovery = recovery;
        self
    }

    pub fn with_context_provider(mut self, provider: &'a dyn ContextProvider) -> Self {
        self.context_provider = provider;
        self
    }

    pub fn with_prompt_builder(mut self, builder: &'a dyn PromptBuilder) -> Self {
        self.prompt_builder = Some(builder);
        self
    }

    pub fn with_stop_policy(mut self, policy: &'a dyn StopPolicy) -> Self {
        self.stop_policy = policy;
        self
    }

    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max.max(1);
        self
    }

    pub fn preapproved(mut self, preapproved: bool) -> Self {
        self.preapproved = preapproved;
        self
    }

    pub fn with_history(mut self, history: &'a [Message]) -> Self {
        self.history = history;
        self
    }

    pub fn with_event_tx(mut self, tx: &'a UnboundedSender<LoopEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }
}

fn send_event(tx: Option<&UnboundedSender<LoopEvent>>, ev: LoopEvent) {
    if let Some(t) = tx {
        let _ = t.send(ev);
    }
}

/// 批次中所有工具都是只读时，确认请求多余
fn drop_redundant_confirmations(actions: Vec<Action>, registry: &ToolRegistry) -> (Vec<Action>, usize) {
    let mut tools = actions.iter().filter_map(Action::tool_name).peekable();
    let read_only = tools.peek().is_some() && tools.all(|t| !registry.is_destructive(t));
    if !read_only {
        return (actions, 0);
    }
    let before = actions.len();
    let kept: Vec<Action> = actions.into_iter().filter(|a| !a.is_confirmation()).collect();
    let dropped = before - kept.len();
    (kept, dropped)
}

/// 拆出指纹已完成的工具动作
fn split_completed(actions: Vec<Action>, completed: &CompletedFingerprints) -> (Vec<Action>, Vec<Action>) {
    actions
        .into_iter()
        .partition(|a| a.as_tool().map_or(true, |t| !completed.is_completed(t)))
}

/// 最近一次成功执行的直接回复
fn last_response(log: &ExecutionLog) -> Option<String> {
    log.entries()
        .iter()
        .rev()
        .find(|e| e.action.tool_name() == Some(RESPOND_TOOL) && e.result.success && !e.result.skipped)
        .map(|e| e.result.output_text())
}

fn compose_response(outcome: &LoopOutcome, log: &ExecutionLog, max_iterations: usize) -> String {
    match outcome {
        LoopOutcome::Final => last_response(log).unwrap_or_else(|| log.summary()),
        LoopOutcome::Exhausted => format!(
            "Reached the iteration limit ({max_iterations}) before the task was confirmed complete. {}",
            log.summary()
        ),
        LoopOutcome::Aborted { reason } => format!("Aborted: {reason}. {}", log.summary()),
    }
}

/// 执行循环，直到 FINAL / EXHAUSTED / ABORTED
pub async fn run_loop(session: &LoopSession<'_>, request: &str) -> LoopReport {
    let request_id = Uuid::new_v4();
    run_request(session, request, request_id)
        .instrument(tracing::info_span!("request", id = %request_id))
        .await
}

async fn run_request(session: &LoopSession<'_>, request: &str, request_id: Uuid) -> LoopReport {
    let tx = session.event_tx;
    let registry = session.executor.registry();
    let default_builder;
    let prompt_builder: &dyn PromptBuilder = match session.prompt_builder {
        Some(b) => b,
        None => {
            default_builder = DefaultPromptBuilder::default();
            &default_builder
        }
    };
    let tool_list = registry.tool_descriptions();

    let phase = Mutex::new(PhaseTracker::new());
    let advance = |next: LoopPhase| {
        if let Ok(mut p) = phase.lock() {
            p.advance(next);
        }
    };
    let observer = |ev: ExecutionEvent| match ev {
        ExecutionEvent::AwaitingApproval { message } => {
            advance(LoopPhase::AwaitingConfirmation);
            send_event(tx, LoopEvent::AwaitingApproval { message });
        }
        ExecutionEvent::Approved => {
            advance(LoopPhase::Executing);
            send_event(tx, LoopEvent::Approved);
        }
        ExecutionEvent::Skipped { description } => send_event(tx, LoopEvent::ActionSkipped { description }),
        ExecutionEvent::Finished { result } => send_event(
            tx,
            LoopEvent::ActionFinished {
                description: result.action_description.clone(),
                success: result.success,
                preview: result.preview(PREVIEW_CHARS),
            },
        ),
    };

    let mut log = ExecutionLog::new();
    let mut completed = CompletedFingerprints::new();
    let mut consecutive_failures: u32 = 0;
    let mut iterations = 0;
    let mut outcome = LoopOutcome::Exhausted;

    tracing::info!(request = %request, max_iterations = session.max_iterations, "loop started");

    'steps: for step in 1..=session.max_iterations {
        if session.cancel_token.is_cancelled() {
            outcome = LoopOutcome::aborted("cancelled");
            break;
        }
        iterations = step;
        if step > 1 {
            advance(LoopPhase::Planning);
        }
        send_event(
            tx,
            LoopEvent::StepStarted {
                step,
                max_steps: session.max_iterations,
            },
        );

        // 上下文与路由
        let external = tokio::select! {
            c = session.context_provider.gather(request) => c,
            _ = session.cancel_token.cancelled() => {
                outcome = LoopOutcome::aborted("cancelled");
                break;
            }
        };
        let snapshot = ContextSnapshot {
            step,
            request: request.to_string(),
            history: session.history.to_vec(),
            external,
            prior_results: log.recent_results(MAX_PRIOR_RESULTS).into_iter().cloned().collect(),
        };
        let complexity = analyze_complexity(request, snapshot.char_len(), session.history.len());
        let decision = match session.planner.route(&complexity) {
            Ok(d) => d,
            Err(e) => {
                outcome = LoopOutcome::aborted(e.to_string());
                break;
            }
        };
        send_event(
            tx,
            LoopEvent::ModelSelected {
                primary: decision.primary.clone(),
                chain: decision.chain,
                secondary: decision.secondary.clone(),
                complexity: complexity.score,
            },
        );

        // 规划
        let prompt = prompt_builder.build(&snapshot, &tool_list);
        let reply = match session
            .planner
            .plan(&decision, &complexity, &prompt, &session.cancel_token)
            .await
        {
            Ok(r) => {
                consecutive_failures = 0;
                r
            }
            Err(AgentError::Cancelled) => {
                outcome = LoopOutcome::aborted("cancelled");
                break;
            }
            Err(e) if e.is_provider_failure() => {
                consecutive_failures += 1;
                match session.recovery.handle(&e, consecutive_failures) {
                    RecoveryAction::RetryPlanning => {
                        tracing::warn!(step = step, error = %e, "planning failed, retrying next iteration");
                        send_event(tx, LoopEvent::PlanningFailed { error: e.to_string(), retry: true });
                        advance(LoopPhase::Planning);
                        continue 'steps;
                    }
                    RecoveryAction::Abort(reason) => {
                        send_event(tx, LoopEvent::PlanningFailed { error: e.to_string(), retry: false });
                        outcome = LoopOutcome::aborted(reason);
                        break;
                    }
                }
            }
            Err(e) => {
                outcome = LoopOutcome::aborted(e.to_string());
                break;
            }
        };

        // 解释
        let interpretation = session.interpreter.interpret(&reply.text);
        tracing::info!(
            step = step,
            model = %reply.models.join(" -> "),
            source = interpretation.label(),
            "plan interpreted"
        );
        let rejected = interpretation.rejected().to_vec();
        send_event(
            tx,
            LoopEvent::PlanInterpreted {
                source: interpretation.label().to_string(),
                actions: interpretation.actions().len(),
                rejected: rejected.len(),
            },
        );
        for reason in &rejected {
            let placeholder = Action::tool(REJECTED_ACTION, json!({}));
            log.record(step, placeholder, ToolResult::failed(REJECTED_ACTION, reason.clone()));
        }
        let actions = interpretation.into_actions();
        if actions.is_empty() && !rejected.is_empty() {
            // 全部动作被拒：把原因反馈给下一轮，不判定完成
            tracing::warn!(step = step, rejected = rejected.len(), "every planned action was rejected");
            continue;
        }

        // 过滤
        let (actions, redundant) = drop_redundant_confirmations(actions, registry);
        let (actions, already_done) = split_completed(actions, &completed);
        if redundant > 0 || !already_done.is_empty() {
            tracing::info!(
                redundant_confirmations = redundant,
                completed = already_done.len(),
                "filtered plan before execution"
            );
            send_event(
                tx,
                LoopEvent::ActionsFiltered {
                    redundant_confirmations: redundant,
                    completed: already_done.len(),
                },
            );
        }

        let metadata = session.stop_policy.evaluate(&StepContext {
            step,
            request,
            actions: &actions,
            log: &log,
        });
        tracing::info!(
            step = step,
            is_final = metadata.is_final,
            confidence = metadata.confidence,
            reasoning = %metadata.reasoning,
            "plan evaluated"
        );
        send_event(
            tx,
            LoopEvent::PlanEvaluated {
                is_final: metadata.is_final,
                confidence: metadata.confidence,
                reasoning: metadata.reasoning.clone(),
            },
        );
        for action in already_done {
            let result = ToolResult::skipped(action.describe());
            send_event(tx, LoopEvent::ActionSkipped { description: result.action_description.clone() });
            log.record(step, action, result);
        }

        // 执行
        advance(LoopPhase::Executing);
        let plan = Plan::new(actions, metadata);
        let ctx = ExecutionContext::new(session.confirm, &session.cancel_token)
            .preapproved(session.preapproved)
            .with_observer(&observer);
        let batch = match session.executor.execute(&plan, &mut completed, &ctx).await {
            Ok(b) => b,
            Err(e) => {
                outcome = LoopOutcome::aborted(if matches!(e, AgentError::Cancelled) {
                    "cancelled".to_string()
                } else {
                    e.to_string()
                });
                break;
            }
        };
        let halted = batch.halted.clone();
        for (action, result) in batch.records {
            log.record(step, action, result);
        }

        // 评估
        advance(LoopPhase::Evaluating);
        match halted {
            Some(HaltReason::Declined) => {
                outcome = LoopOutcome::aborted("declined");
                break;
            }
            Some(HaltReason::CriticalFailure { tool }) => {
                tracing::warn!(step = step, tool = %tool, "batch halted by critical failure, re-planning");
            }
            None if plan.metadata.is_final => {
                outcome = LoopOutcome::Final;
                break;
            }
            None => {}
        }
    }

    advance(LoopPhase::Done);
    let response = compose_response(&outcome, &log, session.max_iterations);
    tracing::info!(outcome = outcome.label(), iterations = iterations, actions = log.len(), "loop finished");
    send_event(
        tx,
        LoopEvent::Finished {
            outcome: outcome.label().to_string(),
            iterations,
        },
    );
    LoopReport {
        request_id,
        outcome,
        response,
        log,
        iterations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::ActionFingerprint;
    use crate::tools::Tool;
    use async_trait::async_trait;
    use serde_json::Value;

    struct Named(&'static str, bool);

    #[async_trait]
    impl Tool for Named {
        fn name(&self) -> &str {
            self.0
        }
        fn description(&self) -> &str {
            "test"
        }
        fn is_destructive(&self) -> bool {
            self.1
        }
        async fn execute(&self, _args: Value) -> Result<String, String> {
            Ok(String::new())
        }
    }

    fn registry() -> ToolRegistry {
        let mut r = ToolRegistry::new();
        r.register(Named("read_file", false));
        r.register(Named("write_file", true));
        r
    }

    #[test]
    fn test_redundant_confirmation_dropped_for_read_only_batch() {
        let actions = vec![
            Action::confirmation("ok?", true),
            Action::tool("read_file", json!({"file_path": "a"})),
        ];
        let (kept, dropped) = drop_redundant_confirmations(actions, &registry());
        assert_eq!(dropped, 1);
        assert_eq!(kept.len(), 1);

        let actions = vec![
            Action::confirmation("ok?", true),
            Action::tool("write_file", json!({"file_path": "a"})),
        ];
        let (kept, dropped) = drop_redundant_confirmations(actions, &registry());
        assert_eq!(dropped, 0);
        assert_eq!(kept.len(), 2);

        // 只有确认请求时保留
        let (kept, _) = drop_redundant_confirmations(vec![Action::confirmation("ok?", true)], &registry());
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn test_split_completed() {
        let done = Action::tool("write_file", json!({"file_path": "a", "content": "x"}));
        let mut completed = CompletedFingerprints::new();
        if let Some(t) = done.as_tool() {
            completed.insert(ActionFingerprint::of(t));
        }
        let (todo, skipped) = split_completed(
            vec![done.clone(), Action::tool("run_tests", json!({})), Action::confirmation("c", true)],
            &completed,
        );
        assert_eq!(todo.len(), 2);
        assert_eq!(skipped, vec![done]);
    }

    #[test]
    fn test_compose_response() {
        let mut log = ExecutionLog::new();
        let respond = Action::respond("all done");
        log.record(1, respond.clone(), ToolResult::ok(respond.describe(), "all done"));
        assert_eq!(compose_response(&LoopOutcome::Final, &log, 10), "all done");
        let exhausted = compose_response(&LoopOutcome::Exhausted, &log, 3);
        assert!(exhausted.contains("iteration limit (3)"));
        assert!(exhausted.contains("Executed 1/1"));
        let aborted = compose_response(&LoopOutcome::aborted("declined"), &ExecutionLog::new(), 3);
        assert!(aborted.starts_with("Aborted: declined."));
    }
}
