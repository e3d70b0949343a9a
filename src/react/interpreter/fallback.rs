//! 意图短语兜底：从自由文本合成单个最小动作
//!
//! - "search for X" / "search 'X'" → `search_files{pattern: X}`
//! - "read src/main.rs" / "open file `a.toml`" → `read_file{file_path}`
//!
//! 多个短语同时出现时取文本中最靠前的一个。

use std::sync::OnceLock;

use regex::Regex;
use serde_json::json;

use crate::plan::{Action, READ_TOOL, SEARCH_TOOL};

static SEARCH_QUOTED_RE: OnceLock<Option<Regex>> = OnceLock::new();
static SEARCH_BARE_RE: OnceLock<Option<Regex>> = OnceLock::new();
static READ_RE: OnceLock<Option<Regex>> = OnceLock::new();

fn compiled(cell: &'static OnceLock<Option<Regex>>, pattern: &str) -> Option<&'static Regex> {
    cell.get_or_init(|| Regex::new(pattern).ok()).as_ref()
}

fn search_quoted() -> Option<&'static Regex> {
    compiled(
        &SEARCH_QUOTED_RE,
        r#"(?i)\bsearch(?:\s+(?:for|the\s+codebase\s+for|code\s+for))?\s+["'`]([^"'`\n]+)["'`]"#,
    )
}

fn search_bare() -> Option<&'static Regex> {
    compiled(&SEARCH_BARE_RE, r"(?i)\bsearch\s+for\s+([^\n.,;:!?]+)")
}

fn read_path() -> Option<&'static Regex> {
    compiled(
        &READ_RE,
        r#"(?i)\b(?:read|open|cat|view)\s+(?:the\s+)?(?:file\s+)?["'`]?([\w./\\-]*\w\.[A-Za-z0-9]+)["'`]?"#,
    )
}

/// 识别到意图短语时返回合成动作
pub fn intent_action(text: &str) -> Option<Action> {
    let mut best: Option<(usize, Action)> = None;
    let mut consider = |pos: usize, action: Action| {
        if best.as_ref().map_or(true, |(p, _)| pos < *p) {
            best = Some((pos, action));
        }
    };

    let quoted = search_quoted().and_then(|re| re.captures(text));
    let search = quoted.or_else(|| search_bare().and_then(|re| re.captures(text)));
    if let Some(caps) = search {
        if let (Some(whole), Some(term)) = (caps.get(0), caps.get(1)) {
            let term = term.as_str().trim();
            if !term.is_empty() {
                consider(whole.start(), Action::tool(SEARCH_TOOL, json!({ "pattern": term })));
            }
        }
    }

    if let Some(caps) = read_path().and_then(|re| re.captures(text)) {
        if let (Some(whole), Some(path)) = (caps.get(0), caps.get(1)) {
            consider(
                whole.start(),
                Action::tool(READ_TOOL, json!({ "file_path": path.as_str() })),
            );
        }
    }

    best.map(|(_, action)| action)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_phrases() {
        let a = intent_action("I will search for 'parse_config' in the code").unwrap();
        assert_eq!(a, Action::tool(SEARCH_TOOL, json!({"pattern": "parse_config"})));

        let a = intent_action("Let me search for TODO comments.").unwrap();
        assert_eq!(a, Action::tool(SEARCH_TOOL, json!({"pattern": "TODO comments"})));
    }

    #[test]
    fn test_read_phrases() {
        let a = intent_action("First, read src/main.rs to understand the entry point").unwrap();
        assert_eq!(a, Action::tool(READ_TOOL, json!({"file_path": "src/main.rs"})));

        let a = intent_action("Open the file `config/default.toml`.").unwrap();
        assert_eq!(a, Action::tool(READ_TOOL, json!({"file_path": "config/default.toml"})));
    }

    #[test]
    fn test_earliest_phrase_wins() {
        let a = intent_action("Read Cargo.toml, then search for 'tokio'").unwrap();
        assert_eq!(a.tool_name(), Some(READ_TOOL));
    }

    #[test]
    fn test_plain_prose_has_no_intent() {
        assert!(intent_action("The answer is 42.").is_none());
        assert!(intent_action("I read the docs yesterday").is_none());
    }
}
