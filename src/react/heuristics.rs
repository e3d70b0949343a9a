//! 停止策略：每轮计划执行前计算 PlanMetadata（is_final / confidence / expected_follow_up / reasoning）
//!
//! 关键词基线，可通过 StopPolicy trait 整体替换。

use crate::plan::{Action, ExecutionLog, PlanMetadata, RESPOND_TOOL};

/// 探索类工具：出现即预期还有后续
pub const EXPLORATORY_TOOLS: &[&str] = &[
    "git_status",
    "git_diff",
    "read_file",
    "search_files",
    "brainstorm_search_terms",
    "list_directory",
];
/// 写入类工具
pub const WRITE_TOOLS: &[&str] = &["write_file", "edit_file"];
/// 收尾类工具：测试、lint、提交、总结
pub const COMPLETION_TOOLS: &[&str] = &["run_tests", "lint_code", "git_commit", "summarize_code", "analyze_code"];
/// 校验类工具：复杂任务结束前必须出现
pub const VALIDATION_TOOLS: &[&str] = &["evaluate_task", "run_tests"];
/// 历史较长时，只剩这些简单动作视为收尾
const SIMPLE_TOOLS: &[&str] = &["git_status", "git_diff", "read_file"];
/// 写入后若伴随这些动作则不再预期后续
const WRITE_FOLLOW_UP_CLEARERS: &[&str] = &["run_tests", "lint_code"];

/// 项目 / 应用级别的请求关键词
const COMPLEX_KEYWORDS: &[&str] = &[
    "create app",
    "build app",
    "application",
    "web app",
    "api",
    "database",
    "full stack",
    "multiple files",
    "project",
    "system",
    "implement",
    "features",
    "functionality",
    "website",
    "service",
];

/// 评估一轮计划所需的输入
#[derive(Debug, Clone, Copy)]
pub struct StepContext<'a> {
    /// 从 1 开始
    pub step: usize,
    pub request: &'a str,
    pub actions: &'a [Action],
    /// 之前各轮的执行记录（不含本轮）
    pub log: &'a ExecutionLog,
}

pub trait StopPolicy: Send + Sync {
    fn evaluate(&self, ctx: &StepContext<'_>) -> PlanMetadata;
}

/// 关键词启发式
#[derive(Debug, Clone, Default)]
pub struct KeywordStopPolicy;

impl StopPolicy for KeywordStopPolicy {
    fn evaluate(&self, ctx: &StepContext<'_>) -> PlanMetadata {
        let is_final = is_final(ctx);
        PlanMetadata {
            is_final,
            confidence: confidence(ctx.step, ctx.log.success_rate(), !ctx.actions.is_empty()),
            reasoning: reasoning(ctx.step, ctx.actions, is_final),
            expected_follow_up: expected_follow_up(ctx.step, ctx.actions),
        }
    }
}

/// 多个并列要求，或项目 / 应用级别的关键词
pub fn is_complex_request(request: &str) -> bool {
    let lower = request.to_lowercase();
    let has_keyword = COMPLEX_KEYWORDS.iter().any(|k| lower.contains(k));
    let multi_clause = lower.split(" and ").count() > 2 || lower.split(',').count() > 2;
    has_keyword || multi_clause
}

fn tool_names(actions: &[Action]) -> Vec<&str> {
    actions.iter().filter_map(Action::tool_name).collect()
}

fn any_in(names: &[&str], table: &[&str]) -> bool {
    names.iter().any(|n| table.contains(n))
}

pub fn is_final(ctx: &StepContext<'_>) -> bool {
    let names = tool_names(ctx.actions);
    // 无动作，或只剩确认请求
    if names.is_empty() {
        return true;
    }
    // 直接回复用户
    if names.iter().all(|n| *n == RESPOND_TOOL) {
        return true;
    }
    if ctx.log.len() > 3 && names.iter().all(|n| SIMPLE_TOOLS.contains(n)) {
        return true;
    }

    let appeared = |table: &[&str]| any_in(&names, table) || table.iter().any(|t| ctx.log.has_tool(t));

    if is_complex_request(ctx.request) {
        return appeared(VALIDATION_TOOLS) && ctx.step > 3;
    }
    appeared(COMPLETION_TOOLS) && ctx.step > 2
}

/// `max(0.1, min(1, 0.9^(step-1) × (0.5 + 0.5×rate) × (0.7 if no actions)))`；无历史时 rate 视为 1
pub fn confidence(step: usize, success_rate: Option<f64>, has_actions: bool) -> f64 {
    let exponent = step.saturating_sub(1).min(i32::MAX as usize) as i32;
    let mut c = 0.9_f64.powi(exponent);
    c *= 0.5 + 0.5 * success_rate.unwrap_or(1.0).clamp(0.0, 1.0);
    if !has_actions {
        c *= 0.7;
    }
    c.clamp(0.1, 1.0)
}

pub fn expected_follow_up(step: usize, actions: &[Action]) -> bool {
    if actions.is_empty() {
        return false;
    }
    let names = tool_names(actions);
    if any_in(&names, EXPLORATORY_TOOLS) {
        return true;
    }
    if any_in(&names, WRITE_TOOLS) && !any_in(&names, WRITE_FOLLOW_UP_CLEARERS) {
        return true;
    }
    step < 3
}

pub fn reasoning(step: usize, actions: &[Action], is_final: bool) -> String {
    if actions.is_empty() {
        return format!("No actions generated at step {step}, suggesting task completion");
    }
    let tools = tool_names(actions).join(", ");
    if is_final {
        format!("Step {step} appears final: {tools}")
    } else {
        format!("Step {step} with {} actions: {tools}", actions.len())
    }
}
