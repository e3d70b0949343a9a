//! 关闭信号：Ctrl+C / SIGTERM → CancellationToken
//!
//! 每个请求从 ShutdownManager 派生子 token；进程收到信号时所有在途请求在下一个挂起点进入 ABORTED。

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// 关闭原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    /// Ctrl+C
    UserInitiated,
    /// SIGTERM
    Signal,
}

/// 关闭信号管理器
#[derive(Clone)]
pub struct ShutdownManager {
    shutdown_token: CancellationToken,
    reason_tx: broadcast::Sender<ShutdownReason>,
}

impl ShutdownManager {
    pub fn new() -> Self {
        let (reason_tx, _) = broadcast::channel(1);
        Self {
            shutdown_token: CancellationToken::new(),
            reason_tx,
        }
    }

    pub fn token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// 单个请求的取消 token：可单独取消，进程关闭时随之取消
    pub fn request_token(&self) -> CancellationToken {
        self.shutdown_token.child_token()
    }

    pub fn shutdown(&self, reason: ShutdownReason) {
        let _ = self.reason_tx.send(reason);
        self.shutdown_token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ShutdownReason> {
        self.reason_tx.subscribe()
    }

    /// 安装系统信号处理器 (Ctrl+C, SIGTERM)
    pub fn install_signal_handlers(self: &Arc<Self>) {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            if let Ok(()) = tokio::signal::ctrl_c().await {
                tracing::info!("Received Ctrl+C, cancelling in-flight requests...");
                manager.shutdown(ShutdownReason::UserInitiated);
            }
        });

        #[cfg(unix)]
        {
            let manager = Arc::clone(self);
            tokio::spawn(async move {
                use tokio::signal::unix::{signal, SignalKind};
                if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                    sigterm.recv().await;
                    tracing::info!("Received SIGTERM, cancelling in-flight requests...");
                    manager.shutdown(ShutdownReason::Signal);
                }
            });
        }
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}
