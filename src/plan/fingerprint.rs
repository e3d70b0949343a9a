//! 动作指纹：对 (tool_name, parameters) 的规范化 JSON 取 SHA-256
//!
//! 规范化递归按键排序，保证同一动作无论参数键顺序如何都得到同一指纹。

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::plan::types::ToolAction;

/// 动作的稳定标识
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActionFingerprint(String);

impl ActionFingerprint {
    pub fn of(action: &ToolAction) -> Self {
        let mut buf = String::new();
        buf.push_str("{\"parameters\":");
        write_canonical(&action.parameters_value(), &mut buf);
        buf.push_str(",\"tool_name\":");
        write_canonical(&Value::String(action.tool_name.clone()), &mut buf);
        buf.push('}');

        let mut hasher = Sha256::new();
        hasher.update(buf.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 日志用短前缀
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl fmt::Display for ActionFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                if let Some(v) = map.get(*key) {
                    write_canonical(v, out);
                }
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// 单次请求内已成功完成的动作指纹集合；只增不减
#[derive(Debug, Clone, Default)]
pub struct CompletedFingerprints {
    inner: HashSet<ActionFingerprint>,
}

impl CompletedFingerprints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, fp: &ActionFingerprint) -> bool {
        self.inner.contains(fp)
    }

    pub fn is_completed(&self, action: &ToolAction) -> bool {
        self.contains(&action.fingerprint())
    }

    /// 返回是否为新插入
    pub fn insert(&mut self, fp: ActionFingerprint) -> bool {
        self.inner.insert(fp)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
