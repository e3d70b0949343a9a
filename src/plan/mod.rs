//! 计划层：动作与计划数据模型、动作指纹、执行日志、动作校验、计划执行器

pub mod executor;
pub mod fingerprint;
pub mod log;
pub mod types;
pub mod validation;

pub use executor::{BatchOutcome, ExecutionContext, ExecutionEvent, HaltReason, PlanExecutor};
pub use fingerprint::{ActionFingerprint, CompletedFingerprints};
pub use log::{ExecutionLog, LogEntry};
pub use types::{
    Action, ConfirmationAction, Plan, PlanMetadata, ToolAction, ToolResult, READ_TOOL,
    RESPOND_TOOL, SEARCH_TOOL,
};
pub use validation::{AcceptAll, ActionValidator};
