//! 每轮规划的上下文：对话历史 + 外部提供的文件上下文 + 之前的工具结果
//!
//! 外部上下文对循环是不透明的，原样交给 PromptBuilder。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::plan::ToolResult;

/// 消息角色（与 LLM API 一致）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// 最近 N 轮对话（每轮 user + assistant，超出时丢弃最旧的消息）
#[derive(Clone, Debug)]
pub struct Conversation {
    messages: Vec<Message>,
    max_turns: usize,
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new(20)
    }
}

impl Conversation {
    pub fn new(max_turns: usize) -> Self {
        Self {
            messages: Vec::new(),
            max_turns,
        }
    }

    pub fn push(&mut self, msg: Message) {
        self.messages.push(msg);
        let keep = self.max_turns * 2;
        if self.messages.len() > keep {
            self.messages.drain(..self.messages.len() - keep);
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// 外部上下文来源（检索到的文件片段、最近查询等）
#[async_trait]
pub trait ContextProvider: Send + Sync {
    async fn gather(&self, request: &str) -> String;
}

/// 不提供外部上下文
#[derive(Debug, Clone, Default)]
pub struct NoContext;

#[async_trait]
impl ContextProvider for NoContext {
    async fn gather(&self, _request: &str) -> String {
        String::new()
    }
}

/// 固定文本上下文
#[derive(Debug, Clone)]
pub struct StaticContext(pub String);

#[async_trait]
impl ContextProvider for StaticContext {
    async fn gather(&self, _request: &str) -> String {
        self.0.clone()
    }
}

/// 单轮规划看到的全部上下文
#[derive(Debug, Clone)]
pub struct ContextSnapshot {
    pub step: usize,
    pub request: String,
    pub history: Vec<Message>,
    pub external: String,
    pub prior_results: Vec<ToolResult>,
}

impl ContextSnapshot {
    /// 字符总量，用于复杂度估计
    pub fn char_len(&self) -> usize {
        let history: usize = self.history.iter().map(|m| m.content.len()).sum();
        let results: usize = self
            .prior_results
            .iter()
            .map(|r| r.output_text().len() + r.error.as_deref().map_or(0, str::len))
            .sum();
        history + self.external.len() + results
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversation_prunes_oldest() {
        let mut c = Conversation::new(1);
        c.push(Message::user("a"));
        c.push(Message::assistant("b"));
        c.push(Message::user("c"));
        assert_eq!(c.len(), 2);
        assert_eq!(c.messages()[0].content, "b");
    }

    #[tokio::test]
    async fn test_providers() {
        assert!(NoContext.gather("x").await.is_empty());
        assert_eq!(StaticContext("files".into()).gather("x").await, "files");
    }

    #[test]
    fn test_snapshot_char_len() {
        let snap = ContextSnapshot {
            step: 1,
            request: "r".into(),
            history: vec![Message::user("abcd")],
            external: "xy".into(),
            prior_results: vec![ToolResult::ok("t()", "123"), ToolResult::failed("u()", "e")],
        };
        assert_eq!(snap.char_len(), 4 + 2 + 3 + 1);
    }
}
