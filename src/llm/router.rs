//! 多模型路由器
//!
//! 根据任务复杂度为每轮规划选择模型：
//! - 适应度 = w_r·reasoning + w_s·speed − 上下文惩罚 − 延迟惩罚
//! - 复杂度高且同时需要推理与速度时，推理模型先分析、快速模型再给出计划（链式）
//! - 延迟历史按模型分桶，环形缓冲只保留最近 N 次

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use serde::Serialize;

use crate::llm::complexity::{TaskComplexity, TaskType};

/// 模型类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelType {
    Reasoning,
    FastCompletion,
    Chat,
}

/// 模型能力画像（分数 1..=10）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelCapability {
    pub name: String,
    pub model_type: ModelType,
    pub reasoning_score: u8,
    pub speed_score: u8,
    pub context_window: usize,
    pub specializations: Vec<String>,
}

impl ModelCapability {
    pub fn new(name: impl Into<String>, model_type: ModelType) -> Self {
        Self {
            name: name.into(),
            model_type,
            reasoning_score: 6,
            speed_score: 6,
            context_window: 4096,
            specializations: Vec::new(),
        }
    }

    pub fn with_reasoning(mut self, score: u8) -> Self {
        self.reasoning_score = score;
        self
    }

    pub fn with_speed(mut self, score: u8) -> Self {
        self.speed_score = score;
        self
    }

    pub fn with_context_window(mut self, tokens: usize) -> Self {
        self.context_window = tokens;
        self
    }

    pub fn with_specializations(mut self, specs: &[&str]) -> Self {
        self.specializations = specs.iter().map(|s| s.to_string()).collect();
        self
    }

    /// 按模型名推断能力：名称切分为段，家族按段前缀匹配，尺寸按段全等匹配
    pub fn infer(name: &str) -> Self {
        let lower = name.to_lowercase();
        let segments: Vec<&str> = lower
            .split(|c: char| matches!(c, '-' | ':' | '_' | '/' | ' '))
            .filter(|s| !s.is_empty())
            .collect();

        let rule = INFERENCE_RULES.iter().find(|r| {
            let family = r.families.iter().any(|f| segments.iter().any(|s| s.starts_with(f)));
            let size = r.sizes.is_empty() || r.sizes.iter().any(|z| segments.contains(z));
            family && size
        });

        match rule {
            Some(r) => ModelCapability::new(name, r.model_type)
                .with_reasoning(r.reasoning)
                .with_speed(r.speed)
                .with_context_window(r.context_window)
                .with_specializations(r.specializations),
            None => ModelCapability::new(name, ModelType::Chat).with_specializations(&["general_chat"]),
        }
    }
}

struct InferenceRule {
    families: &'static [&'static str],
    sizes: &'static [&'static str],
    model_type: ModelType,
    reasoning: u8,
    speed: u8,
    context_window: usize,
    specializations: &'static [&'static str],
}

const CODER: &[&str] = &["coder", "code"];

const INFERENCE_RULES: &[InferenceRule] = &[
    InferenceRule {
        families: CODER,
        sizes: &["32b", "33b"],
        model_type: ModelType::Reasoning,
        reasoning: 9,
        speed: 4,
        context_window: 32768,
        specializations: &["code_analysis", "complex_reasoning", "refactoring"],
    },
    InferenceRule {
        families: CODER,
        sizes: &["14b"],
        model_type: ModelType::Chat,
        reasoning: 8,
        speed: 6,
        context_window: 16384,
        specializations: &["code_review", "debugging"],
    },
    InferenceRule {
        families: CODER,
        sizes: &["7b"],
        model_type: ModelType::FastCompletion,
        reasoning: 7,
        speed: 8,
        context_window: 8192,
        specializations: &["code_completion", "simple_edits"],
    },
    InferenceRule {
        families: CODER,
        sizes: &["1.5b", "2b"],
        model_type: ModelType::FastCompletion,
        reasoning: 5,
        speed: 10,
        context_window: 4096,
        specializations: &["quick_responses", "simple_completion"],
    },
    InferenceRule {
        families: &["llama"],
        sizes: &["70b", "72b"],
        model_type: ModelType::Reasoning,
        reasoning: 9,
        speed: 3,
        context_window: 32768,
        specializations: &["complex_reasoning", "analysis"],
    },
    InferenceRule {
        families: &["llama"],
        sizes: &["8b", "7b"],
        model_type: ModelType::Chat,
        reasoning: 6,
        speed: 7,
        context_window: 8192,
        specializations: &["general_chat", "explanations"],
    },
    InferenceRule {
        families: &["reasoner", "r1", "o1", "o3"],
        sizes: &[],
        model_type: ModelType::Reasoning,
        reasoning: 9,
        speed: 3,
        context_window: 65536,
        specializations: &["complex_reasoning", "analysis"],
    },
    InferenceRule {
        families: &["mini", "flash", "haiku", "phi"],
        sizes: &[],
        model_type: ModelType::FastCompletion,
        reasoning: 5,
        speed: 9,
        context_window: 8192,
        specializations: &["quick_responses"],
    },
    InferenceRule {
        families: &["deepseek"],
        sizes: &[],
        model_type: ModelType::Chat,
        reasoning: 8,
        speed: 6,
        context_window: 16384,
        specializations: &["code_generation", "programming"],
    },
];

/// 按模型分桶的延迟历史（秒）；写入在各自桶内串行，读取可能看到略旧的数据
#[derive(Debug)]
pub struct PerformanceHistory {
    capacity: usize,
    buckets: RwLock<HashMap<String, Arc<Mutex<VecDeque<f64>>>>>,
}

impl Default for PerformanceHistory {
    fn default() -> Self {
        Self::new(20)
    }
}

impl PerformanceHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            buckets: RwLock::new(HashMap::new()),
        }
    }

    fn bucket(&self, model: &str) -> Arc<Mutex<VecDeque<f64>>> {
        if let Some(b) = self
            .buckets
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(model)
        {
            return Arc::clone(b);
        }
        let mut map = self.buckets.write().unwrap_or_else(|p| p.into_inner());
        Arc::clone(map.entry(model.to_string()).or_default())
    }

    /// 追加一次延迟；超过容量时淘汰最旧样本
    pub fn record(&self, model: &str, latency: Duration) {
        let bucket = self.bucket(model);
        let mut samples = bucket.lock().unwrap_or_else(|p| p.into_inner());
        samples.push_back(latency.as_secs_f64());
        while samples.len() > self.capacity {
            samples.pop_front();
        }
    }

    /// 移动平均；无样本时为 None
    pub fn average(&self, model: &str) -> Option<f64> {
        let bucket = self
            .buckets
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(model)
            .cloned()?;
        let samples = bucket.lock().unwrap_or_else(|p| p.into_inner());
        if samples.is_empty() {
            None
        } else {
            Some(samples.iter().sum::<f64>() / samples.len() as f64)
        }
    }

    pub fn sample_count(&self, model: &str) -> usize {
        self.buckets
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(model)
            .map(|b| b.lock().unwrap_or_else(|p| p.into_inner()).len())
            .unwrap_or(0)
    }
}

/// 路由参数
#[derive(Debug, Clone)]
pub struct RouterSettings {
    /// 每秒平均延迟扣分
    pub latency_weight: f64,
    /// 超出上下文窗口比例的扣分系数
    pub context_penalty_weight: f64,
    /// 触发链式调用的最低复杂度
    pub chain_min_complexity: u8,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            latency_weight: 0.1,
            context_penalty_weight: 5.0,
            chain_min_complexity: 7,
        }
    }
}

const MAX_CONTEXT_PENALTY: f64 = 10.0;

/// 路由结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutingDecision {
    pub primary: String,
    pub chain: bool,
    pub secondary: Option<String>,
    pub fitness: f64,
}

/// 模型信息（introspection）
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    #[serde(flatten)]
    pub capability: ModelCapability,
    pub average_latency: Option<f64>,
    pub samples: usize,
}

/// 多模型路由器
pub struct ModelRouter {
    settings: RouterSettings,
    history: Arc<PerformanceHistory>,
    capabilities: RwLock<HashMap<String, ModelCapability>>,
}

impl ModelRouter {
    pub fn new(settings: RouterSettings, history: Arc<PerformanceHistory>) -> Self {
        Self {
            settings,
            history,
            capabilities: RwLock::new(HashMap::new()),
        }
    }

    pub fn history(&self) -> &Arc<PerformanceHistory> {
        &self.history
    }

    /// 显式登记能力画像（覆盖名称推断）
    pub fn register(&self, capability: ModelCapability) {
        self.capabilities
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .insert(capability.name.clone(), capability);
    }

    /// 取能力画像，未登记时按名称推断并缓存
    pub fn capability(&self, name: &str) -> ModelCapability {
        if let Some(c) = self
            .capabilities
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(name)
        {
            return c.clone();
        }
        let inferred = ModelCapability::infer(name);
        tracing::debug!(model = %name, model_type = ?inferred.model_type, "inferred model capability");
        self.capabilities
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .entry(name.to_string())
            .or_insert(inferred)
            .clone()
    }

    pub fn profile(&self, names: &[String]) -> Vec<ModelCapability> {
        names.iter().map(|n| self.capability(n)).collect()
    }

    pub fn record_latency(&self, model: &str, latency: Duration) {
        self.history.record(model, latency);
    }

    /// 适应度；上下文超窗只扣分，不排除
    pub fn fitness(&self, model: &ModelCapability, complexity: &TaskComplexity) -> f64 {
        let (w_r, w_s) = match (complexity.requires_reasoning, complexity.requires_speed) {
            (true, false) => (0.7, 0.3),
            (false, true) => (0.3, 0.7),
            _ => (0.5, 0.5),
        };
        let base = w_r * model.reasoning_score as f64 + w_s * model.speed_score as f64;

        let context_penalty = if complexity.estimated_tokens > model.context_window && model.context_window > 0 {
            let overflow = (complexity.estimated_tokens - model.context_window) as f64
                / model.context_window as f64;
            (self.settings.context_penalty_weight * overflow).min(MAX_CONTEXT_PENALTY)
        } else {
            0.0
        };

        let latency_penalty = self
            .history
            .average(&model.name)
            .map(|avg| avg * self.settings.latency_weight)
            .unwrap_or(0.0);

        base - context_penalty - latency_penalty
    }

    fn should_chain(&self, complexity: &TaskComplexity, available: usize) -> bool {
        available >= 2
            && complexity.score >= self.settings.chain_min_complexity
            && complexity.requires_reasoning
            && complexity.requires_speed
    }

    /// 选择模型；available 为空时返回 None
    pub fn select(&self, complexity: &TaskComplexity, available: &[ModelCapability]) -> Option<RoutingDecision> {
        if available.is_empty() {
            return None;
        }
        let scored: Vec<(&ModelCapability, f64)> = available
            .iter()
            .map(|m| (m, self.fitness(m, complexity)))
            .collect();

        if self.should_chain(complexity, available.len()) {
            if let Some((primary, secondary)) = pick_chain(&scored) {
                tracing::info!(
                    primary = %primary.0.name,
                    secondary = %secondary.0.name,
                    score = complexity.score,
                    "model chaining selected"
                );
                return Some(RoutingDecision {
                    primary: primary.0.name.clone(),
                    chain: true,
                    secondary: Some(secondary.0.name.clone()),
                    fitness: primary.1,
                });
            }
        }

        let (best, fitness) = best_by(&scored, |s| s.1)?;
        tracing::info!(model = %best.name, fitness = fitness, score = complexity.score, "model selected");
        Some(RoutingDecision {
            primary: best.name.clone(),
            chain: false,
            secondary: None,
            fitness,
        })
    }

    /// 各模型画像与平均延迟（保留两位小数）
    pub fn models_info(&self, names: &[String]) -> Vec<ModelInfo> {
        names
            .iter()
            .map(|n| ModelInfo {
                capability: self.capability(n),
                average_latency: self.history.average(n).map(|a| (a * 100.0).round() / 100.0),
                samples: self.history.sample_count(n),
            })
            .collect()
    }

    /// 按任务类型推荐模型
    pub fn suggest_for_task_type(&self, task_type: TaskType, names: &[String]) -> Option<String> {
        let models = self.profile(names);
        let suggestion = match task_type {
            TaskType::ComplexAnalysis | TaskType::Reasoning => best_matching(
                &models,
                |m| m.model_type == ModelType::Reasoning,
                |m| m.reasoning_score,
            ),
            TaskType::QuickResponse => best_matching(
                &models,
                |m| m.model_type == ModelType::FastCompletion,
                |m| m.speed_score,
            ),
            TaskType::CodeGeneration => best_matching(
                &models,
                |m| m.specializations.iter().any(|s| s.starts_with("code")),
                |m| m.reasoning_score,
            ),
            TaskType::General => None,
        };
        suggestion.or_else(|| best_matching(&models, |_| true, |m| m.reasoning_score + m.speed_score))
    }
}

fn best_matching<P, K>(models: &[ModelCapability], pred: P, key: K) -> Option<String>
where
    P: Fn(&ModelCapability) -> bool,
    K: Fn(&ModelCapability) -> u8,
{
    models
        .iter()
        .filter(|m| pred(m))
        .max_by_key(|m| key(m))
        .map(|m| m.name.clone())
}

/// 取最大值，平分时保留先出现者
fn best_by<'a, F>(scored: &[(&'a ModelCapability, f64)], key: F) -> Option<(&'a ModelCapability, f64)>
where
    F: Fn(&(&'a ModelCapability, f64)) -> f64,
{
    let mut best: Option<(&'a ModelCapability, f64)> = None;
    for s in scored {
        match best {
            Some(b) if key(&(b.0, b.1)) >= key(s) => {}
            _ => best = Some(*s),
        }
    }
    best
}

/// 主模型限定 reasoning 型，次模型限定 fast_completion 型；缺少对应类型时按推理分 / 速度分兜底
fn pick_chain<'a>(
    scored: &[(&'a ModelCapability, f64)],
) -> Option<((&'a ModelCapability, f64), (&'a ModelCapability, f64))> {
    let reasoning: Vec<_> = scored
        .iter()
        .copied()
        .filter(|s| s.0.model_type == ModelType::Reasoning)
        .collect();
    let primary = best_by(&reasoning, |s| s.1)
        .or_else(|| best_by(scored, |s| s.0.reasoning_score as f64))?;

    let rest: Vec<_> = scored
        .iter()
        .copied()
        .filter(|s| s.0.name != primary.0.name)
        .collect();
    let fast: Vec<_> = rest
        .iter()
        .copied()
        .filter(|s| s.0.model_type == ModelType::FastCompletion)
        .collect();
    let secondary = best_by(&fast, |s| s.1).or_else(|| best_by(&rest, |s| s.0.speed_score as f64))?;

    Some((primary, secondary))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router() -> ModelRouter {
        ModelRouter::new(RouterSettings::default(), Arc::new(PerformanceHistory::new(20)))
    }

    fn model_a() -> ModelCapability {
        ModelCapability::new("model-a", ModelType::Reasoning)
            .with_reasoning(9)
            .with_speed(2)
            .with_context_window(32768)
    }

    fn model_b() -> ModelCapability {
        ModelCapability::new("model-b", ModelType::FastCompletion)
            .with_reasoning(3)
            .with_speed(9)
            .with_context_window(32768)
    }

    #[test]
    fn test_fitness_depends_on_task() {
        let r = router();
        let models = vec![model_a(), model_b()];

        let speed_task = TaskComplexity::new(3, false, true);
        let d = r.select(&speed_task, &models).unwrap();
        assert_eq!(d.primary, "model-b");
        assert!(!d.chain);

        let reasoning_task = TaskComplexity::new(6, true, false);
        let d = r.select(&reasoning_task, &models).unwrap();
        assert_eq!(d.primary, "model-a");
    }

    #[test]
    fn test_chaining_picks_reasoning_then_fast() {
        let r = router();
        let models = vec![model_b(), model_a()];
        let task = TaskComplexity::new(8, true, true);
        let d = r.select(&task, &models).unwrap();
        assert!(d.chain);
        assert_eq!(d.primary, "model-a");
        assert_eq!(d.secondary.as_deref(), Some("model-b"));
    }

    #[test]
    fn test_chaining_falls_back_to_scores_when_types_missing() {
        let r = router();
        let a = ModelCapability::new("a", ModelType::Chat).with_reasoning(9).with_speed(2);
        let b = ModelCapability::new("b", ModelType::Chat).with_reasoning(3).with_speed(9);
        let d = r.select(&TaskComplexity::new(8, true, true), &[a, b]).unwrap();
        assert!(d.chain);
        assert_eq!(d.primary, "a");
        assert_eq!(d.secondary.as_deref(), Some("b"));
    }

    #[test]
    fn test_no_chaining_with_single_model_or_low_score() {
        let r = router();
        let d = r.select(&TaskComplexity::new(9, true, true), &[model_a()]).unwrap();
        assert!(!d.chain);
        assert_eq!(d.primary, "model-a");

        let d = r.select(&TaskComplexity::new(6, true, true), &[model_a(), model_b()]).unwrap();
        assert!(!d.chain);
    }

    #[test]
    fn test_empty_available_returns_none() {
        assert!(router().select(&TaskComplexity::new(5, false, false), &[]).is_none());
    }

    #[test]
    fn test_context_overflow_is_soft_penalty() {
        let r = router();
        let small = ModelCapability::new("small", ModelType::Chat)
            .with_reasoning(9)
            .with_speed(9)
            .with_context_window(1000);
        let task = TaskComplexity::new(5, false, false).with_estimated_tokens(1500);
        let f = r.fitness(&small, &task);
        assert!((f - (9.0 - 2.5)).abs() < 1e-9);

        // 唯一可用模型即使超窗也会被选中
        let d = r.select(&task.clone().with_estimated_tokens(1_000_000), &[small]).unwrap();
        assert_eq!(d.primary, "small");
    }

    #[test]
    fn test_latency_penalty_shifts_choice() {
        let r = router();
        let x = ModelCapability::new("x", ModelType::Chat).with_reasoning(7).with_speed(7);
        let y = ModelCapability::new("y", ModelType::Chat).with_reasoning(7).with_speed(7);
        for _ in 0..5 {
            r.record_latency("x", Duration::from_secs(10));
            r.record_latency("y", Duration::from_millis(500));
        }
        let d = r.select(&TaskComplexity::new(5, false, false), &[x, y]).unwrap();
        assert_eq!(d.primary, "y");
    }

    #[test]
    fn test_history_keeps_most_recent_samples() {
        let history = PerformanceHistory::new(20);
        for i in 1..=25 {
            history.record("m", Duration::from_secs(i));
        }
        assert_eq!(history.sample_count("m"), 20);
        // 剩余 6..=25
        let expected = (6..=25).sum::<u64>() as f64 / 20.0;
        assert!((history.average("m").unwrap() - expected).abs() < 1e-9);
        assert!(history.average("other").is_none());
    }

    #[test]
    fn test_concurrent_history_writes() {
        let history = Arc::new(PerformanceHistory::new(20));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let h = Arc::clone(&history);
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        h.record(&format!("m{}", t % 2), Duration::from_millis(100));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(history.sample_count("m0"), 20);
        assert_eq!(history.sample_count("m1"), 20);
    }

    #[test]
    fn test_capability_inference() {
        let c = ModelCapability::infer("qwen2.5-coder:32b");
        assert_eq!(c.model_type, ModelType::Reasoning);
        assert_eq!((c.reasoning_score, c.speed_score, c.context_window), (9, 4, 32768));

        let c = ModelCapability::infer("qwen2.5-coder:7b");
        assert_eq!(c.model_type, ModelType::FastCompletion);

        let c = ModelCapability::infer("qwen2.5-coder:1.5b");
        assert_eq!((c.reasoning_score, c.speed_score), (5, 10));

        let c = ModelCapability::infer("llama3.1:70b");
        assert_eq!(c.model_type, ModelType::Reasoning);

        assert_eq!(ModelCapability::infer("deepseek-reasoner").model_type, ModelType::Reasoning);
        assert_eq!(ModelCapability::infer("deepseek-chat").model_type, ModelType::Chat);
        assert_eq!(ModelCapability::infer("gpt-4o-mini").model_type, ModelType::FastCompletion);
        // 家族按段前缀匹配，不会误中子串
        assert_eq!(ModelCapability::infer("dolphin-mistral").model_type, ModelType::Chat);

        let unknown = ModelCapability::infer("some-model");
        assert_eq!((unknown.reasoning_score, unknown.speed_score, unknown.context_window), (6, 6, 4096));
    }

    #[test]
    fn test_registered_capability_overrides_inference() {
        let r = router();
        r.register(ModelCapability::new("deepseek-chat", ModelType::FastCompletion).with_speed(10));
        assert_eq!(r.capability("deepseek-chat").model_type, ModelType::FastCompletion);
    }

    #[test]
    fn test_models_info_and_suggestions() {
        let r = router();
        let names = vec!["qwen2.5-coder:32b".to_string(), "qwen2.5-coder:1.5b".to_string()];
        r.record_latency("qwen2.5-coder:32b", Duration::from_millis(1234));
        let info = r.models_info(&names);
        assert_eq!(info[0].average_latency, Some(1.23));
        assert_eq!(info[1].samples, 0);

        assert_eq!(
            r.suggest_for_task_type(TaskType::QuickResponse, &names).as_deref(),
            Some("qwen2.5-coder:1.5b")
        );
        assert_eq!(
            r.suggest_for_task_type(TaskType::ComplexAnalysis, &names).as_deref(),
            Some("qwen2.5-coder:32b")
        );
    }
}
