//! 可观测性：tracing 订阅器
//!
//! RUST_LOG 优先；未设置时使用配置中的默认级别。

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// 初始化日志；重复调用（如测试中）时忽略
pub fn init(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .try_init();
}
