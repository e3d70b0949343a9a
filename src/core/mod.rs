//! 核心层：错误与恢复、循环状态、用户确认、关闭信号

pub mod confirmation;
pub mod error;
pub mod recovery;
pub mod shutdown;
pub mod state;

pub use confirmation::{AutoApprove, AutoDeny, ConfirmationChannel, StdinConfirmation};
pub use error::{AgentError, RecoveryAction};
pub use recovery::RecoveryEngine;
pub use shutdown::{ShutdownManager, ShutdownReason};
pub use state::{LoopOutcome, LoopPhase, PhaseTracker};
