use serde_json::{Value, json};

pub const DEFAULT_PREVIEW_LINES: usize = 10;

/// Parses up to `max_lines` non-blank lines of JSONL text.
///
/// Lines that are not valid JSON come back as `{"line": <raw>}`.
pub fn parse_jsonl_preview(content: &str, max_lines: usize) -> Vec<Value> {
    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .take(max_lines)
        .map(|line| serde_json::from_str::<Value>(line).unwrap_or_else(|_| json!({ "line": line })))
        .collect()
}
