//! 编排层：计划解释器、停止策略、上下文与 prompt、Planner、主循环

pub mod context;
pub mod events;
pub mod heuristics;
pub mod interpreter;
pub mod loop_;
pub mod planner;
pub mod prompt;

pub use context::{ContextProvider, ContextSnapshot, Conversation, Message, NoContext, Role, StaticContext};
pub use events::LoopEvent;
pub use heuristics::{KeywordStopPolicy, StepContext, StopPolicy};
pub use interpreter::{interpret, FallbackAction, FallbackKind, Interpretation, ParseSource, PlanInterpreter};
pub use loop_::{run_loop, LoopReport, LoopSession, DEFAULT_MAX_ITERATIONS};
pub use planner::{Planner, PlannerReply};
pub use prompt::{DefaultPromptBuilder, PromptBuilder};
