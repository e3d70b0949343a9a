//! 平衡定界符扫描：从任意位置的 `{` / `[` 出发找到匹配的闭合位置（跳过字符串内部），
//! 收集所有能解析的 JSON 片段、解析失败的平衡片段，以及第一个到文本末尾仍未闭合的起点。
//! 已解析片段内部的起点不再重新扫描，其子文档直接从解析结果中取出。

use serde_json::Value;

/// 扫描预算：所有起点累计检查的字节数上限
const MAX_SCAN_BYTES: usize = 16 * 1024 * 1024;

/// 可解析的候选
#[derive(Debug, Clone)]
pub struct Candidate {
    pub value: Value,
    pub start: usize,
    pub len: usize,
}

#[derive(Debug, Default)]
pub struct ScanResult {
    pub valid: Vec<Candidate>,
    /// 平衡但解析失败的片段 (start, end)，end 不含
    pub invalid: Vec<(usize, usize)>,
    /// 第一个直到文本末尾都未闭合的起点（截断）
    pub unterminated: Option<usize>,
}

enum MatchEnd {
    End(usize),
    Mismatch,
    Eof,
}

/// 返回匹配结果与检查过的字节数
fn match_end(bytes: &[u8], start: usize) -> (MatchEnd, usize) {
    let mut stack: Vec<u8> = Vec::new();
    let mut in_str = false;
    let mut escape = false;
    for (j, &b) in bytes.iter().enumerate().skip(start) {
        if in_str {
            if escape {
                escape = false;
            } else if b == b'\\' {
                escape = true;
            } else if b == b'"' {
                in_str = false;
            }
            continue;
        }
        match b {
            b'"' => in_str = true,
            b'{' => stack.push(b'}'),
            b'[' => stack.push(b']'),
            b'}' | b']' => {
                if stack.pop() != Some(b) {
                    return (MatchEnd::Mismatch, j + 1 - start);
                }
                if stack.is_empty() {
                    return (MatchEnd::End(j), j + 1 - start);
                }
            }
            _ => {}
        }
    }
    (MatchEnd::Eof, bytes.len() - start)
}

/// 已解析文档内部的对象与数组，作为子候选（位置取父文档起点，长度按序列化计）
fn push_nested(value: &Value, start: usize, out: &mut Vec<Candidate>) {
    let children: Box<dyn Iterator<Item = &Value>> = match value {
        Value::Object(map) => Box::new(map.values()),
        Value::Array(items) => Box::new(items.iter()),
        _ => return,
    };
    for child in children {
        if child.is_object() || child.is_array() {
            let len = serde_json::to_string(child).map(|s| s.len()).unwrap_or(0);
            out.push(Candidate {
                value: child.clone(),
                start,
                len,
            });
            push_nested(child, start, out);
        }
    }
}

pub fn scan(text: &str) -> ScanResult {
    let bytes = text.as_bytes();
    let mut result = ScanResult::default();
    let mut budget = MAX_SCAN_BYTES;
    // 最近一个可解析文档的结束位置（含）
    let mut covered_until: Option<usize> = None;

    for start in (0..bytes.len()).filter(|&i| bytes[i] == b'{' || bytes[i] == b'[') {
        if covered_until.is_some_and(|end| start <= end) {
            continue;
        }
        let (matched, examined) = match_end(bytes, start);
        match matched {
            MatchEnd::End(end) => {
                // 定界符都是 ASCII，切片边界落在字符边界上
                let slice = &text[start..=end];
                match serde_json::from_str::<Value>(slice) {
                    Ok(value) => {
                        covered_until = Some(end);
                        let mut nested = Vec::new();
                        push_nested(&value, start, &mut nested);
                        result.valid.push(Candidate {
                            value,
                            start,
                            len: slice.len(),
                        });
                        result.valid.extend(nested);
                    }
                    Err(_) => result.invalid.push((start, end + 1)),
                }
            }
            MatchEnd::Eof => {
                if result.unterminated.is_none() {
                    result.unterminated = Some(start);
                }
            }
            MatchEnd::Mismatch => {}
        }
        budget = budget.saturating_sub(examined);
        if budget == 0 {
            tracing::debug!(stopped_at = start, "candidate scan budget exhausted");
            break;
        }
    }
    result
}
