//! 执行日志：单次请求内只追加的 (step, action, result) 记录
//!
//! 停止策略读取其中的工具名与成功率；循环耗尽迭代次数时用 summary() 汇报部分进度。

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::plan::types::{Action, ToolResult};

/// 一条执行记录
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub step: usize,
    pub action: Action,
    pub result: ToolResult,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecutionLog {
    entries: Vec<LogEntry>,
}

impl ExecutionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, step: usize, action: Action, result: ToolResult) {
        self.entries.push(LogEntry {
            step,
            action,
            result,
            recorded_at: Utc::now(),
        });
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn results(&self) -> impl Iterator<Item = &ToolResult> {
        self.entries.iter().map(|e| &e.result)
    }

    /// 最近 n 条结果（按时间顺序）
    pub fn recent_results(&self, n: usize) -> Vec<&ToolResult> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).map(|e| &e.result).collect()
    }

    /// 成功率；无记录时为 None
    pub fn success_rate(&self) -> Option<f64> {
        if self.entries.is_empty() {
            return None;
        }
        let ok = self.entries.iter().filter(|e| e.result.success).count();
        Some(ok as f64 / self.entries.len() as f64)
    }

    /// 日志中是否出现过某工具
    pub fn has_tool(&self, name: &str) -> bool {
        self.entries
            .iter()
            .any(|e| e.action.tool_name() == Some(name))
    }

    pub fn tool_names(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter_map(|e| e.action.tool_name())
            .collect()
    }

    /// 进度汇总：整体结论 + 每个动作一行
    pub fn summary(&self) -> String {
        if self.entries.is_empty() {
            return "No actions were executed.".to_string();
        }
        let total = self.entries.len();
        let ok = self.entries.iter().filter(|e| e.result.success).count();
        let headline = if ok == total {
            format!("Successfully completed {total} actions")
        } else {
            format!("Partially completed ({ok}/{total} actions)")
        };

        let mut out = format!("{headline}. Executed {ok}/{total} actions successfully.\n");
        for entry in &self.entries {
            let r = &entry.result;
            if r.success {
                let mark = if r.skipped { "=" } else { "✓" };
                out.push_str(&format!("  {mark} [step {}] {}\n", entry.step, r.action_description));
            } else {
                out.push_str(&format!(
                    "  ✗ [step {}] {}: {}\n",
                    entry.step,
                    r.action_description,
                    r.error.as_deref().unwrap_or("unknown error")
                ));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_summary_reports_partial_progress() {
        let mut log = ExecutionLog::new();
        assert_eq!(log.summary(), "No actions were executed.");
        assert!(log.success_rate().is_none());

        let read = Action::tool("read_file", json!({"file_path": "a.rs"}));
        let write = Action::tool("write_file", json!({"file_path": "a.rs"}));
        log.record(1, read.clone(), ToolResult::ok(read.describe(), "fn main() {}"));
        log.record(2, write.clone(), ToolResult::failed(write.describe(), "permission denied"));

        let summary = log.summary();
        assert!(summary.starts_with("Partially completed (1/2 actions)"));
        assert!(summary.contains("permission denied"));
        assert_eq!(log.success_rate(), Some(0.5));
        assert!(log.has_tool("write_file"));
        assert!(!log.has_tool("run_tests"));
    }

    #[test]
    fn test_recent_results_keeps_order() {
        let mut log = ExecutionLog::new();
        for i in 0..5 {
            let a = Action::tool("echo", json!({ "i": i }));
            log.record(1, a.clone(), ToolResult::ok(a.describe(), i));
        }
        let recent = log.recent_results(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].output, Some(json!(3)));
        assert_eq!(recent[1].output, Some(json!(4)));
    }

    #[test]
    fn test_entries_serialize_with_timestamp() {
        let mut log = ExecutionLog::new();
        let a = Action::tool("git_status", json!({}));
        log.record(1, a.clone(), ToolResult::ok(a.describe(), "clean"));

        let v = serde_json::to_value(&log).unwrap();
        let entry = &v["entries"][0];
        assert_eq!(entry["step"], json!(1));
        let stamp = entry["recorded_at"].as_str().unwrap();
        let parsed: DateTime<Utc> = stamp.parse().unwrap();
        assert_eq!(parsed, log.entries()[0].recorded_at);
    }
}
