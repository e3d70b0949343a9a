//! 循环过程事件：用于前端 / CLI 流式展示规划、路由、确认、工具执行与结束状态

use serde::Serialize;

/// 单步过程事件（可序列化为 JSON 供前端展示）
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LoopEvent {
    /// 新一轮开始
    StepStarted { step: usize, max_steps: usize },
    /// 路由结果
    ModelSelected {
        primary: String,
        chain: bool,
        secondary: Option<String>,
        complexity: u8,
    },
    /// 解释器结果（来源标签 + 动作数 + 被拒动作数）
    PlanInterpreted {
        source: String,
        actions: usize,
        rejected: usize,
    },
    /// 执行前过滤掉的动作
    ActionsFiltered { redundant_confirmations: usize, completed: usize },
    /// 停止策略给出的元数据
    PlanEvaluated {
        is_final: bool,
        confidence: f64,
        reasoning: String,
    },
    /// 等待用户确认
    AwaitingApproval { message: String },
    Approved,
    /// 已完成的动作被跳过
    ActionSkipped { description: String },
    /// 工具返回（预览，避免过长）
    ActionFinished {
        description: String,
        success: bool,
        preview: String,
    },
    /// 规划失败（提供方错误 / 超时）
    PlanningFailed { error: String, retry: bool },
    /// 循环结束
    Finished { outcome: String, iterations: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_json_shape() {
        let v = serde_json::to_value(LoopEvent::StepStarted { step: 1, max_steps: 10 }).unwrap();
        assert_eq!(v["type"], "step_started");
        assert_eq!(v["max_steps"], 10);
        let v = serde_json::to_value(LoopEvent::Approved).unwrap();
        assert_eq!(v["type"], "approved");
    }
}
