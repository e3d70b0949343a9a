//! Prompt 构造：可用工具 + 计划格式 Schema + 外部上下文 + 之前的执行结果 + 用户请求
//!
//! 纯函数，每轮调用一次。

use crate::plan::types::truncate;
use crate::react::context::{ContextSnapshot, Role};
use crate::tools::plan_schema_json;

/// 单条工具结果在 prompt 中的最大字符数
const RESULT_PREVIEW_CHARS: usize = 600;
/// 每轮带入上下文的历史结果条数
pub(crate) const MAX_PRIOR_RESULTS: usize = 12;

pub trait PromptBuilder: Send + Sync {
    /// tools: (name, description)
    fn build(&self, context: &ContextSnapshot, tools: &[(String, String)]) -> String;
}

#[derive(Debug, Clone)]
pub struct DefaultPromptBuilder {
    preamble: String,
    schema: String,
}

impl Default for DefaultPromptBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_PREAMBLE)
    }
}

const DEFAULT_PREAMBLE: &str = "You are a coding assistant working inside a local repository. \
Plan the next batch of tool calls needed to complete the user's request. \
Re-plan from the results so far; do not repeat steps that already succeeded. \
When the task is complete, return an empty actions list or a single respond action with your answer. \
Ask for confirmation before destructive changes.";

impl DefaultPromptBuilder {
    pub fn new(preamble: impl Into<String>) -> Self {
        Self {
            preamble: preamble.into(),
            schema: plan_schema_json(),
        }
    }
}

impl PromptBuilder for DefaultPromptBuilder {
    fn build(&self, context: &ContextSnapshot, tools: &[(String, String)]) -> String {
        let mut out = String::new();
        out.push_str(&self.preamble);
        out.push_str("\n\n## Available tools\n");
        for (name, desc) in tools {
            out.push_str(&format!("- {name}: {desc}\n"));
        }
        out.push_str("\n## Output format\nReply with a single JSON document matching this schema:\n```json\n");
        out.push_str(&self.schema);
        out.push_str("\n```\n");

        if !context.external.trim().is_empty() {
            out.push_str("\n## Context\n");
            out.push_str(context.external.trim());
            out.push('\n');
        }

        if !context.history.is_empty() {
            out.push_str("\n## Conversation\n");
            for m in &context.history {
                let role = match m.role {
                    Role::User => "user",
                    Role::Assistant => "assistant",
                };
                out.push_str(&format!("{role}: {}\n", m.content));
            }
        }

        if !context.prior_results.is_empty() {
            out.push_str(&format!("\n## Results so far (step {})\n", context.step));
            for r in &context.prior_results {
                let mark = if r.success { "ok" } else { "failed" };
                out.push_str(&format!(
                    "- [{mark}] {}: {}\n",
                    r.action_description,
                    truncate(&r.preview(RESULT_PREVIEW_CHARS), RESULT_PREVIEW_CHARS)
                ));
            }
        }

        out.push_str(&format!("\nUser request: {}\n", context.request));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::ToolResult;
    use crate::react::context::Message;

    fn snapshot() -> ContextSnapshot {
        ContextSnapshot {
            step: 2,
            request: "fix the failing test".into(),
            history: vec![Message::user("earlier question")],
            external: "src/lib.rs: pub fn add()".into(),
            prior_results: vec![ToolResult::ok("read_file(file_path=src/lib.rs)", "fn add() {}")],
        }
    }

    #[test]
    fn test_prompt_sections() {
        let tools = vec![("read_file".to_string(), "Read a file".to_string())];
        let p = DefaultPromptBuilder::default().build(&snapshot(), &tools);
        assert!(p.contains("- read_file: Read a file"));
        assert!(p.contains("\"actions\""));
        assert!(p.contains("src/lib.rs: pub fn add()"));
        assert!(p.contains("user: earlier question"));
        assert!(p.contains("[ok] read_file(file_path=src/lib.rs): fn add() {}"));
        assert!(p.trim_end().ends_with("User request: fix the failing test"));
    }

    #[test]
    fn test_prompt_is_deterministic() {
        let b = DefaultPromptBuilder::default();
        assert_eq!(b.build(&snapshot(), &[]), b.build(&snapshot(), &[]));
    }
}
