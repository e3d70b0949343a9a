//! 工具层：Tool trait 与注册表、带超时与审计日志的执行器、计划格式 Schema、内置工具

pub mod executor;
pub mod filesystem;
pub mod process;
pub mod registry;
pub mod respond;
pub mod schema;
pub mod search;

use std::path::Path;

pub use executor::ToolExecutor;
pub use filesystem::{ListDirTool, ReadFileTool, SafeFs, WriteFileTool};
pub use process::RunTestsTool;
pub use registry::{Tool, ToolRegistry};
pub use respond::{ExplainStepsTool, RespondTool};
pub use schema::plan_schema_json;
pub use search::SearchFilesTool;

/// 注册全部内置工具
pub fn builtin_registry(workspace: impl AsRef<Path>, test_command: &str) -> ToolRegistry {
    let fs = SafeFs::new(workspace.as_ref());
    let mut registry = ToolRegistry::new();
    registry.register(ReadFileTool::new(fs.clone()));
    registry.register(WriteFileTool::new(fs.clone()));
    registry.register(ListDirTool::new(fs.clone()));
    registry.register(SearchFilesTool::new(fs));
    registry.register(RunTestsTool::new(workspace.as_ref(), test_command));
    registry.register(ExplainStepsTool);
    registry.register(RespondTool);
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_registry_policies() {
        let dir = tempfile::tempdir().unwrap();
        let registry = builtin_registry(dir.path(), "cargo test");
        assert_eq!(
            registry.tool_names(),
            vec![
                "explain_steps",
                "list_directory",
                "read_file",
                "respond",
                "run_tests",
                "search_files",
                "write_file"
            ]
        );
        assert!(registry.is_destructive("write_file"));
        assert!(!registry.is_destructive("read_file"));
        assert!(registry.is_explanatory("explain_steps"));
    }
}
