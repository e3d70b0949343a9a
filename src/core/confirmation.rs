//! 用户确认通道
//!
//! 执行器在批次含破坏性动作且调用方未预先批准时，通过 ConfirmationChannel 请求批准；
//! 等待可能无限期阻塞，由调用方的 CancellationToken 打断。

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

/// 确认通道：返回 true 表示批准
#[async_trait]
pub trait ConfirmationChannel: Send + Sync {
    async fn request_approval(&self, message: &str, destructive: bool) -> bool;
}

/// 总是批准
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoApprove;

#[async_trait]
impl ConfirmationChannel for AutoApprove {
    async fn request_approval(&self, message: &str, _destructive: bool) -> bool {
        tracing::info!(message = %message, "auto-approved");
        true
    }
}

/// 总是拒绝
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoDeny;

#[async_trait]
impl ConfirmationChannel for AutoDeny {
    async fn request_approval(&self, message: &str, _destructive: bool) -> bool {
        tracing::info!(message = %message, "auto-denied");
        false
    }
}

/// 终端确认：打印提示，读取一行 y/yes 视为批准
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinConfirmation;

#[async_trait]
impl ConfirmationChannel for StdinConfirmation {
    async fn request_approval(&self, message: &str, destructive: bool) -> bool {
        let tag = if destructive { "[destructive] " } else { "" };
        let mut stdout = tokio::io::stdout();
        let prompt = format!("\n{tag}{message}\nProceed? [y/N] ");
        if stdout.write_all(prompt.as_bytes()).await.is_err() {
            return false;
        }
        let _ = stdout.flush().await;

        let mut line = String::new();
        let mut reader = BufReader::new(tokio::io::stdin());
        match reader.read_line(&mut line).await {
            Ok(_) => matches!(line.trim().to_lowercase().as_str(), "y" | "yes"),
            Err(e) => {
                tracing::warn!(error = %e, "failed to read confirmation");
                false
            }
        }
    }
}
