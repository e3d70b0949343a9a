//! 循环状态：LoopPhase 状态机与终态 LoopOutcome
//!
//! PLANNING → (AWAITING_CONFIRMATION) → EXECUTING → EVALUATING → PLANNING | 终态。
//! 任一非终态都可因取消或不可恢复错误直接进入 ABORTED。

use serde::Serialize;

/// 终态
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LoopOutcome {
    /// 停止策略判定完成
    Final,
    /// 迭代次数耗尽
    Exhausted,
    /// 取消、用户拒绝或不可恢复错误
    Aborted { reason: String },
}

impl LoopOutcome {
    pub fn aborted(reason: impl Into<String>) -> Self {
        LoopOutcome::Aborted {
            reason: reason.into(),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            LoopOutcome::Final => "FINAL",
            LoopOutcome::Exhausted => "EXHAUSTED",
            LoopOutcome::Aborted { .. } => "ABORTED",
        }
    }
}

/// 循环阶段
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoopPhase {
    Planning,
    AwaitingConfirmation,
    Executing,
    Evaluating,
    Done,
}

impl LoopPhase {
    /// 合法转移；Done 只能由非终态进入
    pub fn can_transition(&self, next: &LoopPhase) -> bool {
        use LoopPhase::*;
        match (self, next) {
            (Done, _) => false,
            (_, Done) => true,
            (Planning, Executing) | (Planning, Planning) => true,
            (Executing, AwaitingConfirmation) | (AwaitingConfirmation, Executing) => true,
            (Executing, Evaluating) | (AwaitingConfirmation, Evaluating) => true,
            (Evaluating, Planning) => true,
            _ => false,
        }
    }
}

/// 带转移校验的阶段跟踪器
#[derive(Debug)]
pub struct PhaseTracker {
    current: LoopPhase,
}

impl Default for PhaseTracker {
    fn default() -> Self {
        Self {
            current: LoopPhase::Planning,
        }
    }
}

impl PhaseTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> &LoopPhase {
        &self.current
    }

    /// 非法转移只记录警告，不中断循环
    pub fn advance(&mut self, next: LoopPhase) {
        if !self.current.can_transition(&next) {
            tracing::warn!(from = ?self.current, to = ?next, "unexpected loop phase transition");
        }
        tracing::debug!(from = ?self.current, to = ?next, "loop phase");
        self.current = next;
    }
}
