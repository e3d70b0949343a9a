//! 解释阶段的动作校验
//!
//! 解释器对每个 ToolAction 调用 ActionValidator：可以规范化参数名（别名 → 标准名），
//! 缺少必填字段时返回 Err，该动作被丢弃并记入 rejected。

use crate::plan::types::ToolAction;

pub trait ActionValidator: Send + Sync {
    fn validate(&self, action: ToolAction) -> Result<ToolAction, String>;
}

/// 不做任何校验
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAll;

impl ActionValidator for AcceptAll {
    fn validate(&self, action: ToolAction) -> Result<ToolAction, String> {
        Ok(action)
    }
}
