//! bee-pilot 命令行入口
//!
//! 用法：`bee-pilot "<request>"`。加载配置、初始化日志，跑一次编排循环并打印回复与执行摘要。

use std::sync::Arc;

use anyhow::Context;
use bee_pilot::agent::AgentComponents;
use bee_pilot::config::load_config;
use bee_pilot::core::{AutoApprove, ConfirmationChannel, ShutdownManager, StdinConfirmation};
use bee_pilot::react::LoopEvent;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let request = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if request.trim().is_empty() {
        anyhow::bail!("usage: bee-pilot \"<request>\"");
    }

    let cfg = load_config(None).context("Failed to load config")?;
    bee_pilot::observability::init(&cfg.logging.level);

    let shutdown = Arc::new(ShutdownManager::new());
    shutdown.install_signal_handlers();

    let confirm: Box<dyn ConfirmationChannel> = if cfg.agent.auto_approve {
        Box::new(AutoApprove)
    } else {
        Box::new(StdinConfirmation)
    };

    let agent = AgentComponents::from_config(cfg);
    let mut conversation = agent.new_conversation();

    // 进度事件打到日志
    let (event_tx, mut event_rx) = tokio::sync::mpsc::unbounded_channel::<LoopEvent>();
    let printer = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            if let Ok(line) = serde_json::to_string(&event) {
                tracing::debug!(event = %line, "loop event");
            }
        }
    });

    let report = agent
        .process_request(
            &mut conversation,
            &request,
            confirm.as_ref(),
            shutdown.request_token(),
            Some(&event_tx),
        )
        .await;
    drop(event_tx);
    let _ = printer.await;

    println!("{}", report.response);
    println!(
        "\n[{}] iterations: {}, actions: {}",
        report.outcome.label(),
        report.iterations,
        report.log.len()
    );
    let (prompt, completion, total) = agent.planner.token_usage();
    tracing::info!(prompt, completion, total, "token usage");

    Ok(())
}
