//! JSON 修复：去掉尾随逗号、修正非法转义与字符串内的裸控制字符、补全被截断的结构。
//! 三步依次应用，每一步对合法 JSON 都是恒等变换。

/// 依次应用全部修复
pub fn repair(text: &str) -> String {
    close_truncated(&fix_string_escapes(&strip_trailing_commas(text)))
}

/// 删除 `}` / `]` 之前的逗号（字符串外）
pub fn strip_trailing_commas(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut in_str = false;
    let mut escape = false;
    for (i, &c) in chars.iter().enumerate() {
        if in_str {
            out.push(c);
            if escape {
                escape = false;
            } else if c == '\\' {
                escape = true;
            } else if c == '"' {
                in_str = false;
            }
            continue;
        }
        if c == '"' {
            in_str = true;
        }
        if c == ',' {
            let next = chars[i + 1..].iter().find(|n| !n.is_whitespace());
            if matches!(next, Some(&'}') | Some(&']')) {
                continue;
            }
        }
        out.push(c);
    }
    out
}

/// 字符串内：非法转义的反斜杠加倍；裸换行 / 制表符转义
pub fn fix_string_escapes(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut in_str = false;
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if !in_str {
            if c == '"' {
                in_str = true;
            }
            out.push(c);
            i += 1;
            continue;
        }
        match c {
            '"' => {
                in_str = false;
                out.push(c);
            }
            '\\' => match chars.get(i + 1) {
                Some(&n) if matches!(n, '"' | '\\' | '/' | 'b' | 'f' | 'n' | 'r' | 't') => {
                    out.push('\\');
                    out.push(n);
                    i += 1;
                }
                Some(&'u') if is_unicode_escape(&chars, i + 2) => {
                    out.push_str("\\u");
                    i += 1;
                }
                // 非法转义或结尾的孤立反斜杠
                _ => out.push_str("\\\\"),
            },
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
        i += 1;
    }
    out
}

fn is_unicode_escape(chars: &[char], from: usize) -> bool {
    chars.len() >= from + 4 && chars[from..from + 4].iter().all(|c| c.is_ascii_hexdigit())
}

/// 补全截断：闭合未结束的字符串，给悬空的键补 `null`，去掉悬空逗号，按栈逆序补闭合符
pub fn close_truncated(text: &str) -> String {
    struct Frame {
        closer: char,
        after_colon: bool,
    }

    let mut stack: Vec<Frame> = Vec::new();
    let mut in_str = false;
    let mut escape = false;
    let mut pending_key = false;

    for c in text.chars() {
        if in_str {
            if escape {
                escape = false;
            } else if c == '\\' {
                escape = true;
            } else if c == '"' {
                in_str = false;
                if let Some(top) = stack.last() {
                    pending_key = top.closer == '}' && !top.after_colon;
                }
            }
            continue;
        }
        match c {
            '"' => in_str = true,
            '{' => stack.push(Frame { closer: '}', after_colon: false }),
            '[' => stack.push(Frame { closer: ']', after_colon: false }),
            '}' | ']' => {
                if stack.last().map(|f| f.closer) == Some(c) {
                    stack.pop();
                }
                pending_key = false;
            }
            ':' => {
                if let Some(top) = stack.last_mut() {
                    top.after_colon = true;
                }
                pending_key = false;
            }
            ',' => {
                if let Some(top) = stack.last_mut() {
                    top.after_colon = false;
                }
                pending_key = false;
            }
            _ => {}
        }
    }

    if stack.is_empty() && !in_str {
        return text.to_string();
    }

    let mut out = text.to_string();
    if in_str {
        if escape {
            out.pop();
        }
        out.push('"');
        if let Some(top) = stack.last() {
            pending_key = top.closer == '}' && !top.after_colon;
        }
    }

    let trimmed_len = out.trim_end().len();
    out.truncate(trimmed_len);
    if out.ends_with(',') {
        out.pop();
    } else if out.ends_with(':') {
        out.push_str("null");
    } else if pending_key {
        out.push_str(":null");
    }

    for frame in stack.iter().rev() {
        out.push(frame.closer);
    }
    out
}
