//! bee-pilot - Rust 智能体编排核心
//!
//! 模块划分：
//! - **agent**: 无头运行时，从配置组装各组件并处理单条请求
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误与恢复、循环状态、确认通道、关闭信号
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）、复杂度分析与模型路由
//! - **plan**: 动作与计划类型、指纹去重、执行日志、计划执行器
//! - **react**: 计划解释器、停止策略、Planner、编排主循环
//! - **tools**: 工具注册表、执行器与内置工具

pub mod agent;
pub mod config;
pub mod core;
pub mod llm;
pub mod observability;
pub mod plan;
pub mod react;
pub mod tools;

pub use agent::AgentComponents;
pub use react::{run_loop, LoopReport, LoopSession};
