//! 沙箱文件系统工具
//!
//! SafeFs 绑定 root_dir，所有路径必须落在 root 下（禁止 ../ 逃逸）；
//! read_file / write_file / list_directory 基于 SafeFs。

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::core::AgentError;
use crate::tools::Tool;

/// 单次写入上限
const MAX_WRITE_BYTES: usize = 10 * 1024 * 1024;

/// 沙箱文件系统：绑定根目录，校验路径在根下，防止路径逃逸
#[derive(Debug, Clone)]
pub struct SafeFs {
    root_dir: PathBuf,
}

impl SafeFs {
    pub fn new(root_dir: impl AsRef<Path>) -> Self {
        let root = root_dir.as_ref().to_path_buf();
        let root_dir = root.canonicalize().unwrap_or(root);
        Self { root_dir }
    }

    pub fn root(&self) -> &Path {
        &self.root_dir
    }

    /// 已存在的路径：canonicalize 后必须在根下（符号链接也会被检查）
    pub fn resolve(&self, path: &str) -> Result<PathBuf, AgentError> {
        let path = path.trim_start_matches("./");
        let full = self.root_dir.join(path);
        let canonical = full
            .canonicalize()
            .map_err(|_| AgentError::ToolExecutionFailed(format!("Path not found: {}", path)))?;
        if canonical.starts_with(&self.root_dir) {
            Ok(canonical)
        } else {
            Err(AgentError::PathEscape(path.to_string())) // 如 ../../etc/passwd
        }
    }

    /// 待创建的路径：只允许相对路径且不含 `..`
    pub fn resolve_new(&self, path: &str) -> Result<PathBuf, AgentError> {
        let rel = Path::new(path.trim_start_matches("./"));
        let escapes = rel
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes || rel.as_os_str().is_empty() {
            return Err(AgentError::PathEscape(path.to_string()));
        }
        Ok(self.root_dir.join(rel))
    }

    pub fn read_file(&self, path: &str) -> Result<String, AgentError> {
        let resolved = self.resolve(path)?;
        std::fs::read_to_string(&resolved)
            .map_err(|e| AgentError::ToolExecutionFailed(format!("Read failed: {}", e)))
    }

    /// 写入文件（自动创建父目录），返回写入字节数
    pub fn write_file(&self, path: &str, content: &str) -> Result<usize, AgentError> {
        if content.len() > MAX_WRITE_BYTES {
            return Err(AgentError::ToolExecutionFailed(format!(
                "Content too large: {} bytes (max: {})",
                content.len(),
                MAX_WRITE_BYTES
            )));
        }
        let target = self.resolve_new(path)?;
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| AgentError::ToolExecutionFailed(format!("Failed to create parent directory: {}", e)))?;
            // 父目录可能是指向根外的符号链接
            let parent = parent
                .canonicalize()
                .map_err(|e| AgentError::ToolExecutionFailed(e.to_string()))?;
            if !parent.starts_with(&self.root_dir) {
                return Err(AgentError::PathEscape(path.to_string()));
            }
        }
        std::fs::write(&target, content)
            .map_err(|e| AgentError::ToolExecutionFailed(format!("Write failed: {}", e)))?;
        Ok(content.len())
    }

    pub fn list_dir(&self, path: &str) -> Result<Vec<String>, AgentError> {
        let base = if path.is_empty() || path == "." {
            self.root_dir.clone()
        } else {
            self.resolve(path)?
        };
        let mut entries = Vec::new();
        for e in std::fs::read_dir(&base)
            .map_err(|e| AgentError::ToolExecutionFailed(format!("List failed: {}", e)))?
        {
            let e = e.map_err(|e| AgentError::ToolExecutionFailed(e.to_string()))?;
            let name = e.file_name().to_string_lossy().to_string();
            if !name.starts_with('.') {
                let ty = if e.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                    "/"
                } else {
                    ""
                };
                entries.push(format!("{}{}", name, ty));
            }
        }
        entries.sort();
        Ok(entries)
    }
}

fn str_arg<'a>(args: &'a Value, key: &str) -> Result<&'a str, String> {
    args.get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| format!("Missing required parameter: {key}"))
}

/// 读取文件内容
pub struct ReadFileTool {
    fs: SafeFs,
}

impl ReadFileTool {
    pub fn new(fs: SafeFs) -> Self {
        Self { fs }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a file. Args: {\"file_path\": \"path relative to workspace\"}"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"file_path": {"type": "string"}},
            "required": ["file_path"],
        })
    }

    fn required_params(&self) -> &[&'static str] {
        &["file_path"]
    }

    fn param_aliases(&self) -> &[(&'static str, &'static str)] {
        &[("path", "file_path"), ("file", "file_path"), ("filename", "file_path")]
    }

    fn is_destructive(&self) -> bool {
        false
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let path = str_arg(&args, "file_path")?;
        tracing::info!(path = %path, "read_file");
        self.fs.read_file(path).map_err(|e| e.to_string())
    }
}

/// 写入（覆盖）文件
pub struct WriteFileTool {
    fs: SafeFs,
}

impl WriteFileTool {
    pub fn new(fs: SafeFs) -> Self {
        Self { fs }
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Create or overwrite a file. Args: {\"file_path\": \"path relative to workspace\", \"content\": \"full file content\"}"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": {"type": "string"},
                "content": {"type": "string"},
            },
            "required": ["file_path", "content"],
        })
    }

    fn required_params(&self) -> &[&'static str] {
        &["file_path", "content"]
    }

    fn param_aliases(&self) -> &[(&'static str, &'static str)] {
        &[("path", "file_path"), ("file", "file_path"), ("text", "content"), ("contents", "content")]
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let path = str_arg(&args, "file_path")?;
        let content = str_arg(&args, "content")?;
        tracing::info!(path = %path, bytes = content.len(), "write_file");
        let written = self.fs.write_file(path, content).map_err(|e| e.to_string())?;
        Ok(format!("Wrote {written} bytes to {path}"))
    }
}

/// 列出目录
pub struct ListDirTool {
    fs: SafeFs,
}

impl ListDirTool {
    pub fn new(fs: SafeFs) -> Self {
        Self { fs }
    }
}

#[async_trait]
impl Tool for ListDirTool {
    fn name(&self) -> &str {
        "list_directory"
    }

    fn description(&self) -> &str {
        "List a directory. Args: {\"path\": \"directory path, default '.'\"}"
    }

    fn param_aliases(&self) -> &[(&'static str, &'static str)] {
        &[("directory", "path"), ("dir", "path")]
    }

    fn is_destructive(&self) -> bool {
        false
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let path = args.get("path").and_then(|v| v.as_str()).unwrap_or(".");
        tracing::info!(path = %path, "list_directory");
        let entries = self.fs.list_dir(path).map_err(|e| e.to_string())?;
        Ok(entries.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let fs = SafeFs::new(dir.path());
        let write = WriteFileTool::new(fs.clone());
        let out = write
            .execute(json!({"file_path": "src/a.py", "content": "x = 1"}))
            .await
            .unwrap();
        assert!(out.contains("5 bytes"));

        let read = ReadFileTool::new(fs.clone());
        assert_eq!(read.execute(json!({"file_path": "src/a.py"})).await.unwrap(), "x = 1");

        let ls = ListDirTool::new(fs);
        assert_eq!(ls.execute(json!({})).await.unwrap(), "src/");
    }

    #[tokio::test]
    async fn test_escape_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let fs = SafeFs::new(dir.path());
        assert!(matches!(fs.resolve_new("../evil.txt"), Err(AgentError::PathEscape(_))));
        assert!(matches!(fs.resolve_new("/etc/passwd"), Err(AgentError::PathEscape(_))));
        let write = WriteFileTool::new(fs);
        assert!(write
            .execute(json!({"file_path": "../x", "content": ""}))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let read = ReadFileTool::new(SafeFs::new(dir.path()));
        let err = read.execute(json!({"file_path": "nope.rs"})).await.unwrap_err();
        assert!(err.contains("Path not found"));
    }
}
