//! 运行测试命令（默认 `cargo test`，可配置）

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;

use crate::tools::Tool;

/// 输出中保留的最大字符数（取尾部）
const MAX_OUTPUT_CHARS: usize = 8000;

pub struct RunTestsTool {
    project_root: PathBuf,
    command: Vec<String>,
    timeout: Duration,
}

impl RunTestsTool {
    /// command 按空白拆分，如 "cargo test" / "pytest -q"
    pub fn new(project_root: impl AsRef<Path>, command: &str) -> Self {
        let mut command: Vec<String> = command.split_whitespace().map(str::to_string).collect();
        if command.is_empty() {
            command = vec!["cargo".to_string(), "test".to_string()];
        }
        Self {
            project_root: project_root.as_ref().to_path_buf(),
            command,
            timeout: Duration::from_secs(300),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

fn tail(s: &str, max_chars: usize) -> String {
    let count = s.chars().count();
    if count <= max_chars {
        return s.to_string();
    }
    let skipped: String = s.chars().skip(count - max_chars).collect();
    format!("...{skipped}")
}

#[async_trait]
impl Tool for RunTestsTool {
    fn name(&self) -> &str {
        "run_tests"
    }

    fn description(&self) -> &str {
        "Run the project's test suite. Args: {\"filter\": \"optional test name filter\"}"
    }

    fn param_aliases(&self) -> &[(&'static str, &'static str)] {
        &[("test_name", "filter"), ("test", "filter")]
    }

    fn is_destructive(&self) -> bool {
        false
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let (program, rest) = self
            .command
            .split_first()
            .ok_or("No test command configured")?;
        let filter = args
            .get("filter")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|f| !f.is_empty());
        // 过滤串只作为位置参数，不能变成命令行选项
        if let Some(f) = filter {
            if f.starts_with('-') {
                return Err(format!("Invalid test filter: {f}"));
            }
        }
        let mut cmd = Command::new(program);
        cmd.args(rest).current_dir(&self.project_root).kill_on_drop(true);
        cmd.args(filter);
        tracing::info!(command = %self.command.join(" "), "run_tests");

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| "Test execution timed out".to_string())?
            .map_err(|e| format!("Failed to run tests: {}", e))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let success = output.status.success();

        let mut result = format!(
            "Test Result: {}\nExit Code: {}\n\n",
            if success { "✓ PASSED" } else { "✗ FAILED" },
            output.status.code().unwrap_or(-1)
        );
        if !stdout.is_empty() {
            result.push_str("STDOUT:\n");
            result.push_str(&tail(&stdout, MAX_OUTPUT_CHARS));
            result.push('\n');
        }
        if !stderr.is_empty() {
            result.push_str("STDERR:\n");
            result.push_str(&tail(&stderr, MAX_OUTPUT_CHARS));
        }

        if success {
            Ok(result)
        } else {
            Err(result)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tail_keeps_end() {
        assert_eq!(tail("abcdef", 3), "...def");
        assert_eq!(tail("ab", 3), "ab");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_status_maps_to_result() {
        let dir = tempfile::tempdir().unwrap();
        let ok = RunTestsTool::new(dir.path(), "true");
        assert!(ok.execute(json!({})).await.unwrap().contains("PASSED"));
        let failing = RunTestsTool::new(dir.path(), "false");
        assert!(failing.execute(json!({})).await.unwrap_err().contains("FAILED"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_filter_passed_as_positional_argument() {
        let dir = tempfile::tempdir().unwrap();
        let tool = RunTestsTool::new(dir.path(), "echo");
        let out = tool.execute(json!({"filter": "parser_handles_nesting"})).await.unwrap();
        assert!(out.contains("parser_handles_nesting"));

        let err = tool.execute(json!({"filter": "--release"})).await.unwrap_err();
        assert!(err.starts_with("Invalid test filter"));
        let err = tool.execute(json!({"filter": " -q"})).await.unwrap_err();
        assert!(err.starts_with("Invalid test filter"));
    }
}
