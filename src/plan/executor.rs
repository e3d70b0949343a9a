//! 计划执行器
//!
//! 按顺序执行一轮计划中的动作：
//! - 指纹已在完成集合中的工具动作直接跳过，不调用工具
//! - 批次含未完成的破坏性动作且调用方未预先批准时，一次确认覆盖整个批次；
//!   解释型工具可在批准前执行，其它动作都要等批准
//! - 关键工具失败中止批次剩余动作；非关键工具（如搜索）失败后继续
//! - 成功动作的指纹加入完成集合

use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::core::{AgentError, ConfirmationChannel};
use crate::plan::fingerprint::CompletedFingerprints;
use crate::plan::types::{Action, Plan, ToolResult};
use crate::tools::{ToolExecutor, ToolRegistry};

/// 批次中止原因
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum HaltReason {
    CriticalFailure { tool: String },
    Declined,
}

/// 执行过程通知（由循环控制器转成事件）
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    AwaitingApproval { message: String },
    Approved,
    Skipped { description: String },
    Finished { result: ToolResult },
}

/// 一轮批次的执行结果
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub records: Vec<(Action, ToolResult)>,
    pub halted: Option<HaltReason>,
    /// 本批次是否向用户请求过确认
    pub approval_requested: bool,
}

impl BatchOutcome {
    pub fn results(&self) -> impl Iterator<Item = &ToolResult> {
        self.records.iter().map(|(_, r)| r)
    }

    pub fn executed_count(&self) -> usize {
        self.records.iter().filter(|(_, r)| !r.skipped).count()
    }
}

/// 单次 execute 的调用上下文
pub struct ExecutionContext<'a> {
    pub confirm: &'a dyn ConfirmationChannel,
    pub cancel: &'a CancellationToken,
    pub preapproved: bool,
    observer: Option<&'a (dyn Fn(ExecutionEvent) + Send + Sync)>,
}

impl<'a> ExecutionContext<'a> {
    pub fn new(confirm: &'a dyn ConfirmationChannel, cancel: &'a CancellationToken) -> Self {
        Self {
            confirm,
            cancel,
            preapproved: false,
            observer: None,
        }
    }

    pub fn preapproved(mut self, preapproved: bool) -> Self {
        self.preapproved = preapproved;
        self
    }

    pub fn with_observer(mut self, observer: &'a (dyn Fn(ExecutionEvent) + Send + Sync)) -> Self {
        self.observer = Some(observer);
        self
    }

    fn notify(&self, event: ExecutionEvent) {
        if let Some(o) = self.observer {
            o(event);
        }
    }
}

pub struct PlanExecutor {
    tools: Arc<ToolExecutor>,
}

impl PlanExecutor {
    pub fn new(tools: Arc<ToolExecutor>) -> Self {
        Self { tools }
    }

    pub fn registry(&self) -> &ToolRegistry {
        self.tools.registry()
    }

    /// 执行一轮计划；只在取消时返回 Err
    pub async fn execute(
        &self,
        plan: &Plan,
        completed: &mut CompletedFingerprints,
        ctx: &ExecutionContext<'_>,
    ) -> Result<BatchOutcome, AgentError> {
        let registry = self.tools.registry();
        let pending_destructive: Vec<String> = plan
            .tool_actions()
            .filter(|a| registry.is_destructive(&a.tool_name) && !completed.is_completed(a))
            .map(|a| a.describe())
            .collect();
        let mut approved = ctx.preapproved || pending_destructive.is_empty();
        let mut outcome = BatchOutcome::default();

        for action in &plan.actions {
            if ctx.cancel.is_cancelled() {
                return Err(AgentError::Cancelled);
            }
            match action {
                Action::Confirmation(c) => {
                    if approved {
                        tracing::debug!(message = %c.message, "confirmation not required, skipping");
                        continue;
                    }
                    outcome.approval_requested = true;
                    if !self.await_approval(&c.message, c.destructive, ctx).await? {
                        outcome
                            .records
                            .push((action.clone(), ToolResult::failed(action.describe(), "User declined")));
                        outcome.halted = Some(HaltReason::Declined);
                        break;
                    }
                    approved = true;
                    outcome
                        .records
                        .push((action.clone(), ToolResult::ok(action.describe(), "Approved")));
                }
                Action::ToolUse(tool_action) => {
                    let fp = tool_action.fingerprint();
                    if completed.contains(&fp) {
                        tracing::info!(tool = %tool_action.tool_name, fingerprint = %fp.short(), "skipping completed action");
                        let result = ToolResult::skipped(tool_action.describe());
                        ctx.notify(ExecutionEvent::Skipped {
                            description: result.action_description.clone(),
                        });
                        outcome.records.push((action.clone(), result));
                        continue;
                    }

                    if !approved && !registry.is_explanatory(&tool_action.tool_name) {
                        outcome.approval_requested = true;
                        let message = format!(
                            "The plan contains destructive actions: {}",
                            pending_destructive.join(", ")
                        );
                        if !self.await_approval(&message, true, ctx).await? {
                            outcome
                                .records
                                .push((action.clone(), ToolResult::failed(action.describe(), "User declined")));
                            outcome.halted = Some(HaltReason::Declined);
                            break;
                        }
                        approved = true;
                    }

                    let result = tokio::select! {
                        r = self.tools.execute(tool_action) => r,
                        _ = ctx.cancel.cancelled() => return Err(AgentError::Cancelled),
                    };
                    if result.success {
                        completed.insert(fp);
                    }
                    let failed_critical = !result.success && registry.is_critical(&tool_action.tool_name);
                    ctx.notify(ExecutionEvent::Finished {
                        result: result.clone(),
                    });
                    outcome.records.push((action.clone(), result));

                    if failed_critical {
                        tracing::warn!(tool = %tool_action.tool_name, "critical tool failed, halting batch");
                        outcome.halted = Some(HaltReason::CriticalFailure {
                            tool: tool_action.tool_name.clone(),
                        });
                        break;
                    }
                }
            }
        }
        Ok(outcome)
    }

    async fn await_approval(
        &self,
        message: &str,
        destructive: bool,
        ctx: &ExecutionContext<'_>,
    ) -> Result<bool, AgentError> {
        ctx.notify(ExecutionEvent::AwaitingApproval {
            message: message.to_string(),
        });
        let granted = tokio::select! {
            ok = ctx.confirm.request_approval(message, destructive) => ok,
            _ = ctx.cancel.cancelled() => return Err(AgentError::Cancelled),
        };
        tracing::info!(granted = granted, "confirmation answered");
        if granted {
            ctx.notify(ExecutionEvent::Approved);
        }
        Ok(granted)
    }
}
