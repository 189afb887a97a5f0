//! 结构化回复解析
//!
//! LLM 返回的 JSON 常包在 ```json``` 代码块里，或夹杂说明文字与控制字符。
//! 先中和控制字符，再截取 JSON 块，最后按目标类型做严格反序列化；任何形状不符都返回 Err，由调用方走回退路径。

use serde::de::DeserializeOwned;

/// 把控制字符（含换行、制表符）替换为空格，避免字符串字面量内的裸控制字符导致解码失败
pub fn neutralize_control_chars(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect()
}

/// 从文本中截取 JSON 块：优先 ```json ... ```，否则取首个 `{`/`[` 到与之对应的最后一个 `}`/`]`
pub fn extract_json_block(text: &str) -> Option<&str> {
    let trimmed = text.trim();

    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        let block = rest.find("```").map(|end| &rest[..end]).unwrap_or(rest);
        return Some(block.trim());
    }

    let start = trimmed.find(['{', '['])?;
    let close = if trimmed[start..].starts_with('{') { '}' } else { ']' };
    let end = trimmed.rfind(close)?;
    (end > start).then(|| &trimmed[start..=end])
}

/// 中和控制字符 -> 截取 JSON 块 -> 反序列化为 `T`
pub fn parse_json_reply<T: DeserializeOwned>(raw: &str) -> Result<T, String> {
    let cleaned = neutralize_control_chars(raw);
    let block = extract_json_block(&cleaned).ok_or_else(|| "no JSON block in reply".to_string())?;
    serde_json::from_str(block).map_err(|e| format!("{e}: {block}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(serde::Deserialize, Debug)]
    struct Reply {
        confidence: f64,
    }

    #[test]
    fn parses_fenced_block() {
        let raw = "Sure!\n```json\n{\"confidence\": 0.8}\n```\nbye";
        let r: Reply = parse_json_reply(raw).unwrap();
        assert!((r.confidence - 0.8).abs() < f64::EPSILON);
    }

    #[test]
    fn parses_array_with_prose() {
        let names: Vec<String> = parse_json_reply("Names: [\"ACME\", \"Jane Doe\"] done").unwrap();
        assert_eq!(names, vec!["ACME", "Jane Doe"]);
    }

    #[test]
    fn control_chars_inside_strings_do_not_break_decoding() {
        let raw = "{\"confidence\": 0.5, \"note\": \"line\u{0001}one\nline two\"}";
        let r: Reply = parse_json_reply(raw).unwrap();
        assert!((r.confidence - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn shape_mismatch_is_an_error() {
        assert!(parse_json_reply::<Reply>("{\"confidence\": \"high\"}").is_err());
        assert!(parse_json_reply::<Reply>("no json here").is_err());
    }
}
