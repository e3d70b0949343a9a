//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `PILOT__*` 覆盖（双下划线表示嵌套，如 `PILOT__LLM__PROVIDER=openai`）。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::llm::RouterSettings;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub agent: AgentSection,
    pub router: RouterSection,
    pub tools: ToolsSection,
    pub logging: LoggingSection,
}

/// [app] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    /// 沙箱根目录，工具只能访问其下的文件
    pub workspace_root: PathBuf,
    /// 对话历史保留轮数
    pub max_context_turns: usize,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            workspace_root: PathBuf::from("./workspace"),
            max_context_turns: 20,
        }
    }
}

/// [llm] 段：后端选择、可用模型、温度与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// openai / deepseek / mock
    pub provider: String,
    pub base_url: Option<String>,
    /// 交给路由器挑选的模型；为空时使用后端默认模型
    pub models: Vec<String>,
    pub temperature: f32,
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "deepseek".to_string(),
            base_url: None,
            models: Vec::new(),
            temperature: 0.1,
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmTimeoutsSection {
    /// 单次模型调用超时（秒）
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self { request: 120 }
    }
}

impl LlmTimeoutsSection {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request)
    }
}

/// [agent] 段：循环控制
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    pub max_iterations: usize,
    /// 模型调用失败后的重试次数
    pub provider_retries: u32,
    /// 跳过破坏性动作的确认
    pub auto_approve: bool,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            provider_retries: 1,
            auto_approve: false,
        }
    }
}

/// [router] 段：适配度打分参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RouterSection {
    /// 每个模型保留的延迟样本数
    pub history_capacity: usize,
    pub latency_weight: f64,
    pub context_penalty_weight: f64,
    pub chain_min_complexity: u8,
}

impl Default for RouterSection {
    fn default() -> Self {
        let settings = RouterSettings::default();
        Self {
            history_capacity: 20,
            latency_weight: settings.latency_weight,
            context_penalty_weight: settings.context_penalty_weight,
            chain_min_complexity: settings.chain_min_complexity,
        }
    }
}

impl RouterSection {
    pub fn settings(&self) -> RouterSettings {
        RouterSettings {
            latency_weight: self.latency_weight,
            context_penalty_weight: self.context_penalty_weight,
            chain_min_complexity: self.chain_min_complexity,
        }
    }
}

/// [tools] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    pub tool_timeout_secs: u64,
    /// 失败不中止批次的工具
    pub non_critical: Vec<String>,
    pub test_command: String,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: 30,
            non_critical: vec!["search_files".to_string(), "brainstorm_search_terms".to_string()],
            test_command: "cargo test".to_string(),
        }
    }
}

/// [logging] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// RUST_LOG 未设置时的默认级别
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 PILOT__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 PILOT__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("PILOT")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.llm.provider, "deepseek");
        assert_eq!(cfg.llm.timeouts.request, 120);
        assert_eq!(cfg.agent.max_iterations, 10);
        assert_eq!(cfg.agent.provider_retries, 1);
        assert!(!cfg.agent.auto_approve);
        assert_eq!(cfg.router.history_capacity, 20);
        assert_eq!(cfg.router.chain_min_complexity, 7);
        assert_eq!(cfg.tools.test_command, "cargo test");
        assert!(cfg.tools.non_critical.contains(&"search_files".to_string()));
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pilot.toml");
        std::fs::write(
            &path,
            "[llm]\nprovider = \"mock\"\nmodels = [\"gpt-4o-mini\", \"o1-mini\"]\n\n[agent]\nmax_iterations = 4\n\n[router]\nlatency_weight = 0.5\n",
        )
        .unwrap();
        let cfg = load_config(Some(path)).unwrap();
        assert_eq!(cfg.llm.provider, "mock");
        assert_eq!(cfg.llm.models, vec!["gpt-4o-mini", "o1-mini"]);
        assert_eq!(cfg.agent.max_iterations, 4);
        assert_eq!(cfg.agent.provider_retries, 1);
        assert_eq!(cfg.router.settings().latency_weight, 0.5);
        assert_eq!(cfg.router.settings().context_penalty_weight, 5.0);
    }
}
