//! 去除模型输出中的思考段（<think>…</think> 等）

const MARKERS: &[(&str, &str)] = &[
    ("<think>", "</think>"),
    ("<thinking>", "</thinking>"),
    ("<reasoning>", "</reasoning>"),
    ("<reflection>", "</reflection>"),
];

/// 删除成对的思考段（大小写不敏感）；孤立的闭合标记连同之前的内容一起删除；
/// 未闭合的开始标记保持原样
pub fn strip_reasoning(text: &str) -> String {
    let mut out = text.to_string();
    for (open, close) in MARKERS {
        // ASCII 小写不改变字节偏移
        let lower = out.to_ascii_lowercase();
        if let Some(c) = lower.find(close) {
            let orphan = match lower.find(open) {
                Some(o) => c < o,
                None => true,
            };
            if orphan {
                out = out[c + close.len()..].to_string();
            }
        }

        loop {
            let lower = out.to_ascii_lowercase();
            let Some(o) = lower.find(open) else { break };
            let Some(rel) = lower[o + open.len()..].find(close) else { break };
            let end = o + open.len() + rel + close.len();
            out.replace_range(o..end, "");
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_paired_blocks() {
        let s = "<think>plan {\"a\": 1}</think>{\"actions\": []}";
        assert_eq!(strip_reasoning(s), "{\"actions\": []}");
        let s = "<THINKING>x</THINKING>ok<think>y</think>!";
        assert_eq!(strip_reasoning(s), "ok!");
    }

    #[test]
    fn test_orphan_close_drops_prefix() {
        assert_eq!(strip_reasoning("musing...</think> answer"), " answer");
    }

    #[test]
    fn test_unclosed_open_left_alone() {
        let s = "<think>still thinking";
        assert_eq!(strip_reasoning(s), s);
    }
}
