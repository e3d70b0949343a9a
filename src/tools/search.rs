//! 代码搜索工具：在工作区内按字符串或正则搜索，返回文件与行号
//!
//! 跳过隐藏目录、target、node_modules 与超大文件。

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};

use crate::tools::{SafeFs, Tool};

/// 每个文件展示的最大匹配行数
const MAX_LINES_PER_FILE: usize = 10;
const MAX_LINE_CHARS: usize = 100;

enum Matcher {
    Literal(String),
    Regex(Regex),
}

impl Matcher {
    fn is_match(&self, line: &str) -> bool {
        match self {
            Matcher::Literal(p) => line.contains(p.as_str()),
            Matcher::Regex(re) => re.is_match(line),
        }
    }
}

struct FileMatches {
    file_path: PathBuf,
    lines: Vec<(usize, String)>,
}

pub struct SearchFilesTool {
    fs: SafeFs,
    max_results: usize,
    max_file_size: u64,
}

impl SearchFilesTool {
    pub fn new(fs: SafeFs) -> Self {
        Self {
            fs,
            max_results: 50,
            max_file_size: 1024 * 1024,
        }
    }

    pub fn with_limits(mut self, max_results: usize, max_file_size: u64) -> Self {
        self.max_results = max_results;
        self.max_file_size = max_file_size;
        self
    }

    fn search_file(&self, path: &Path, matcher: &Matcher) -> Vec<(usize, String)> {
        // 跳过无法读取的文件（二进制等）
        let Ok(content) = std::fs::read_to_string(path) else {
            return Vec::new();
        };
        content
            .lines()
            .enumerate()
            .filter(|(_, line)| matcher.is_match(line))
            .map(|(i, line)| (i + 1, line.to_string()))
            .collect()
    }

    fn search_dir(&self, dir: &Path, matcher: &Matcher, include: Option<&glob::Pattern>) -> Vec<FileMatches> {
        let mut results = Vec::new();
        for entry in walkdir::WalkDir::new(dir)
            .max_depth(10)
            .into_iter()
            .filter_entry(|e| {
                let name = e.file_name().to_string_lossy();
                e.depth() == 0 || (!name.starts_with('.') && name != "target" && name != "node_modules")
            })
            .filter_map(|e| e.ok())
        {
            if results.len() >= self.max_results {
                break;
            }
            if !entry.file_type().is_file() {
                continue;
            }
            if entry.metadata().map(|m| m.len() > self.max_file_size).unwrap_or(true) {
                continue;
            }
            let path = entry.path();
            if let Some(pattern) = include {
                let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
                if !pattern.matches(file_name) {
                    continue;
                }
            }
            let lines = self.search_file(path, matcher);
            if !lines.is_empty() {
                results.push(FileMatches {
                    file_path: path.to_path_buf(),
                    lines,
                });
            }
        }
        results
    }
}

#[async_trait]
impl Tool for SearchFilesTool {
    fn name(&self) -> &str {
        "search_files"
    }

    fn description(&self) -> &str {
        "Search the workspace for a string or regex. Args: {\"pattern\": \"text\", \"directory\": \"optional sub-directory\", \"include\": \"optional glob such as *.rs\", \"use_regex\": false}"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": {"type": "string"},
                "directory": {"type": "string"},
                "include": {"type": "string"},
                "use_regex": {"type": "boolean"},
            },
            "required": ["pattern"],
        })
    }

    fn required_params(&self) -> &[&'static str] {
        &["pattern"]
    }

    fn param_aliases(&self) -> &[(&'static str, &'static str)] {
        &[("query", "pattern"), ("term", "pattern"), ("path", "directory"), ("file_pattern", "include")]
    }

    fn is_destructive(&self) -> bool {
        false
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let pattern = args
            .get("pattern")
            .and_then(|v| v.as_str())
            .ok_or("Missing required parameter: pattern")?;
        let directory = args.get("directory").and_then(|v| v.as_str()).unwrap_or(".");
        let use_regex = args.get("use_regex").and_then(|v| v.as_bool()).unwrap_or(false);
        let include = match args.get("include").and_then(|v| v.as_str()) {
            Some(p) => Some(glob::Pattern::new(p).map_err(|e| format!("Invalid include pattern: {e}"))?),
            None => None,
        };
        let matcher = if use_regex {
            Matcher::Regex(Regex::new(pattern).map_err(|e| format!("Invalid regex pattern: {e}"))?)
        } else {
            Matcher::Literal(pattern.to_string())
        };

        let base = if directory.is_empty() || directory == "." {
            self.fs.root().to_path_buf()
        } else {
            self.fs.resolve(directory).map_err(|e| e.to_string())?
        };
        tracing::info!(pattern = %pattern, directory = %directory, "search_files");

        let results = if base.is_file() {
            let lines = self.search_file(&base, &matcher);
            if lines.is_empty() {
                Vec::new()
            } else {
                vec![FileMatches { file_path: base, lines }]
            }
        } else {
            self.search_dir(&base, &matcher, include.as_ref())
        };

        if results.is_empty() {
            return Ok(format!("No matches found for pattern '{}'", pattern));
        }

        let total: usize = results.iter().map(|r| r.lines.len()).sum();
        let mut output = format!("Found {} matches for pattern '{}'\n", total, pattern);
        for result in results {
            let shown = result
                .file_path
                .strip_prefix(self.fs.root())
                .unwrap_or(&result.file_path)
                .display()
                .to_string();
            output.push_str(&format!("\n{}:\n", shown));
            for (line_num, line) in result.lines.iter().take(MAX_LINES_PER_FILE) {
                let line = if line.chars().count() > MAX_LINE_CHARS {
                    format!("{}...", line.chars().take(MAX_LINE_CHARS).collect::<String>())
                } else {
                    line.clone()
                };
                output.push_str(&format!("  {:4}: {}\n", line_num, line));
            }
            if result.lines.len() > MAX_LINES_PER_FILE {
                output.push_str(&format!("  ... ({} more matches)\n", result.lines.len() - MAX_LINES_PER_FILE));
            }
        }
        Ok(output)
    }
}
