//! Minimalist frontmatter codec for per-task READMEs.
//!
//! Not a general YAML parser. Supported: scalars (bool/null/int/string
//! with JSON string escaping), inline lists `[…]`, inline maps
//! `{ k: v, … }`, and block lists with `  - ` items.

use serde_json::{Map, Number, Value};

use swarm_core::Task;

use crate::error::StoreError;

pub const FRONTMATTER_BOUNDARY: &str = "---";

#[derive(Debug, Clone, PartialEq)]
pub struct FrontmatterDoc {
    pub frontmatter: Map<String, Value>,
    pub body: String,
}

/// Serializer key order: the task fields first, everything else sorted.
const CANONICAL_KEYS: [&str; 11] = [
    "id",
    "title",
    "status",
    "priority",
    "owner",
    "depends_on",
    "tags",
    "verify",
    "commit",
    "comments",
    "created_at",
];

pub fn parse_frontmatter(text: &str) -> FrontmatterDoc {
    let lines: Vec<&str> = text.lines().collect();
    if lines.first().map(|line| line.trim()) != Some(FRONTMATTER_BOUNDARY) {
        return FrontmatterDoc {
            frontmatter: Map::new(),
            body: text.to_string(),
        };
    }
    let Some(end_idx) = lines[1..]
        .iter()
        .position(|line| line.trim() == FRONTMATTER_BOUNDARY)
        .map(|idx| idx + 1)
    else {
        return FrontmatterDoc {
            frontmatter: Map::new(),
            body: text.to_string(),
        };
    };
    let frontmatter = parse_frontmatter_lines(&lines[1..end_idx]);
    let body = lines[end_idx + 1..].join("\n");
    FrontmatterDoc {
        frontmatter,
        body: body.trim_start_matches('\n').to_string(),
    }
}

fn parse_frontmatter_lines(lines: &[&str]) -> Map<String, Value> {
    let mut data = Map::new();
    let mut current_list_key: Option<String> = None;
    for raw_line in lines {
        if raw_line.trim().is_empty() {
            continue;
        }
        if raw_line.trim_start().starts_with('#') {
            continue;
        }
        if raw_line.starts_with("  - ") {
            if let Some(key) = &current_list_key {
                let item_text = raw_line.trim()[1..].trim();
                let item = parse_value(item_text);
                match data.get_mut(key) {
                    Some(Value::Array(items)) => items.push(item),
                    _ => {
                        data.insert(key.clone(), Value::Array(vec![item]));
                    }
                }
                continue;
            }
        }
        current_list_key = None;
        let Some((key, raw_val)) = raw_line.split_once(':') else {
            continue;
        };
        let key = key.trim().to_string();
        let value = raw_val.trim();
        if value.is_empty() {
            data.insert(key.clone(), Value::Array(Vec::new()));
            current_list_key = Some(key);
            continue;
        }
        data.insert(key, parse_value(value));
    }
    data
}

fn parse_value(raw: &str) -> Value {
    let raw = raw.trim();
    if raw.starts_with('[') && raw.ends_with(']') {
        return parse_inline_list(raw);
    }
    if raw.starts_with('{') && raw.ends_with('}') {
        return parse_inline_map(raw);
    }
    parse_scalar(raw)
}

fn parse_scalar(raw: &str) -> Value {
    let raw = raw.trim();
    if raw.is_empty() {
        return Value::String(String::new());
    }
    match raw.to_lowercase().as_str() {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        "null" | "none" => return Value::Null,
        _ => {}
    }
    let bytes = raw.as_bytes();
    if bytes.len() >= 2 && bytes[0] == b'"' && bytes[bytes.len() - 1] == b'"' {
        if let Ok(text) = serde_json::from_str::<String>(raw) {
            return Value::String(text);
        }
        return Value::String(raw[1..raw.len() - 1].to_string());
    }
    if bytes.len() >= 2 && bytes[0] == b'\'' && bytes[bytes.len() - 1] == b'\'' {
        return Value::String(raw[1..raw.len() - 1].to_string());
    }
    if bytes.iter().all(|b| b.is_ascii_digit()) {
        if let Ok(number) = raw.parse::<u64>() {
            return Value::Number(Number::from(number));
        }
    }
    Value::String(raw.to_string())
}

fn parse_inline_list(raw: &str) -> Value {
    let inner = raw[1..raw.len() - 1].trim();
    if inner.is_empty() {
        return Value::Array(Vec::new());
    }
    Value::Array(
        split_top_level(inner, ',')
            .iter()
            .map(|item| parse_value(item))
            .collect(),
    )
}

fn parse_inline_map(raw: &str) -> Value {
    let inner = raw[1..raw.len() - 1].trim();
    let mut map = Map::new();
    if inner.is_empty() {
        return Value::Object(map);
    }
    for entry in split_top_level(inner, ',') {
        let Some((key, raw_val)) = entry.split_once(':') else {
            continue;
        };
        let key = strip_quotes(key.trim());
        map.insert(key, parse_value(raw_val.trim()));
    }
    Value::Object(map)
}

fn strip_quotes(raw: &str) -> String {
    let bytes = raw.as_bytes();
    if bytes.len() >= 2
        && bytes[0] == bytes[bytes.len() - 1]
        && (bytes[0] == b'"' || bytes[0] == b'\'')
    {
        if bytes[0] == b'"' {
            if let Ok(text) = serde_json::from_str::<String>(raw) {
                return text;
            }
        }
        return raw[1..raw.len() - 1].to_string();
    }
    raw.to_string()
}

/// Splits on `sep` outside quotes, brackets and braces.
fn split_top_level(value: &str, sep: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut buf = String::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    for ch in value.chars() {
        if let Some(open) = quote {
            buf.push(ch);
            if ch == open {
                quote = None;
            }
            continue;
        }
        match ch {
            '"' | '\'' => {
                buf.push(ch);
                quote = Some(ch);
            }
            '[' | '{' | '(' => {
                depth += 1;
                buf.push(ch);
            }
            ']' | '}' | ')' => {
                depth = depth.saturating_sub(1);
                buf.push(ch);
            }
            _ if ch == sep && depth == 0 => {
                let part = buf.trim().to_string();
                if !part.is_empty() {
                    parts.push(part);
                }
                buf.clear();
            }
            _ => buf.push(ch),
        }
    }
    let part = buf.trim().to_string();
    if !part.is_empty() {
        parts.push(part);
    }
    parts
}

fn format_scalar(value: &Value) -> String {
    match value {
        Value::Bool(true) => "true".to_string(),
        Value::Bool(false) => "false".to_string(),
        Value::Null => "null".to_string(),
        Value::Number(number) => number.to_string(),
        Value::String(text) => serde_json::to_string(text).unwrap_or_else(|_| "\"\"".to_string()),
        other => serde_json::to_string(other).unwrap_or_else(|_| "null".to_string()),
    }
}

fn format_inline_list(values: &[Value]) -> String {
    let parts: Vec<String> = values.iter().map(format_scalar).collect();
    format!("[{}]", parts.join(", "))
}

fn format_inline_map(values: &Map<String, Value>) -> String {
    let parts: Vec<String> = values
        .iter()
        .map(|(key, value)| format!("{key}: {}", format_scalar(value)))
        .collect();
    format!("{{ {} }}", parts.join(", "))
}

pub fn format_frontmatter(frontmatter: &Map<String, Value>) -> String {
    let mut ordered_keys: Vec<String> = CANONICAL_KEYS
        .iter()
        .filter(|key| frontmatter.contains_key(**key))
        .map(|key| key.to_string())
        .collect();
    let mut remaining: Vec<String> = frontmatter
        .keys()
        .filter(|key| !CANONICAL_KEYS.contains(&key.as_str()))
        .cloned()
        .collect();
    remaining.sort();
    ordered_keys.extend(remaining);

    let mut lines = vec![FRONTMATTER_BOUNDARY.to_string()];
    for key in ordered_keys {
        let value = &frontmatter[&key];
        match value {
            Value::Array(items) => {
                let all_objects =
                    !items.is_empty() && items.iter().all(|item| item.is_object());
                if all_objects {
                    lines.push(format!("{key}:"));
                    for item in items {
                        if let Value::Object(map) = item {
                            lines.push(format!("  - {}", format_inline_map(map)));
                        }
                    }
                } else {
                    lines.push(format!("{key}: {}", format_inline_list(items)));
                }
            }
            Value::Object(map) => {
                lines.push(format!("{key}: {}", format_inline_map(map)));
            }
            scalar => {
                lines.push(format!("{key}: {}", format_scalar(scalar)));
            }
        }
    }
    lines.push(FRONTMATTER_BOUNDARY.to_string());
    lines.join("\n")
}

pub fn task_to_frontmatter(task: &Task) -> Result<Map<String, Value>, StoreError> {
    match serde_json::to_value(task) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(StoreError::InvalidTask {
            message: "task did not serialize to an object".to_string(),
        }),
        Err(source) => Err(StoreError::InvalidTask {
            message: format!("task is not serializable: {source}"),
        }),
    }
}

pub fn task_from_frontmatter(frontmatter: &Map<String, Value>) -> Result<Task, StoreError> {
    serde_json::from_value(Value::Object(frontmatter.clone())).map_err(|source| {
        StoreError::InvalidTask {
            message: format!("invalid task frontmatter: {source}"),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use swarm_core::TaskStatus;

    #[test]
    fn parses_scalars_lists_and_maps() {
        let text = "\
---
id: \"202501020304-ABCD12\"
title: \"Add cache\"
status: \"DOING\"
doc_version: 3
dirty: false
tags: [\"code\", \"backend\"]
commit: { hash: \"abc1234def\", message: \"✅ ABCD12 close\" }
comments:
  - { author: \"CODER\", body: \"Start: working on it\" }
  - { author: \"REVIEWER\", body: \"Verified: looks good\" }
depends_on: []
---

# body text
";
        let doc = parse_frontmatter(text);
        assert_eq!(doc.body, "# body text");
        assert_eq!(doc.frontmatter["id"], Value::from("202501020304-ABCD12"));
        assert_eq!(doc.frontmatter["doc_version"], Value::from(3));
        assert_eq!(doc.frontmatter["dirty"], Value::from(false));
        assert_eq!(
            doc.frontmatter["tags"],
            Value::Array(vec![Value::from("code"), Value::from("backend")])
        );
        assert_eq!(doc.frontmatter["commit"]["hash"], Value::from("abc1234def"));
        assert_eq!(doc.frontmatter["comments"].as_array().unwrap().len(), 2);
        assert_eq!(
            doc.frontmatter["depends_on"],
            Value::Array(Vec::new())
        );
    }

    #[test]
    fn text_without_frontmatter_is_all_body() {
        let doc = parse_frontmatter("# just a doc\n");
        assert!(doc.frontmatter.is_empty());
        assert_eq!(doc.body, "# just a doc");
    }

    #[test]
    fn format_then_parse_round_trips() {
        let mut task = Task::new("202501020304-ABCD12", "Add cache");
        task.status = TaskStatus::Done;
        task.priority = Some("med".to_string());
        task.owner = Some("CODER".to_string());
        task.tags = vec!["code".to_string()];
        task.depends_on = vec!["202501020303-WXYZ99".to_string()];
        task.verify = vec!["make test".to_string()];
        task.commit = Some(swarm_core::CommitRecord {
            hash: "abc1234def".to_string(),
            message: "✅ ABCD12 close \"quoted\"".to_string(),
        });
        task.push_comment("CODER", "Start: line one\nline two");
        task.doc_version = Some(2);

        let map = task_to_frontmatter(&task).unwrap();
        let text = format_frontmatter(&map);
        assert!(text.starts_with("---\nid: "));
        assert!(text.contains("comments:\n  - { author: \"CODER\""));

        let parsed = parse_frontmatter(&format!("{text}\n\nbody\n"));
        let round = task_from_frontmatter(&parsed.frontmatter).unwrap();
        assert_eq!(round, task);
    }

    #[test]
    fn canonical_key_order_leads_with_id_and_title() {
        let mut task = Task::new("1", "t");
        task.doc_updated_by = Some("agentctl".to_string());
        let text = format_frontmatter(&task_to_frontmatter(&task).unwrap());
        assert!(text.starts_with("---\nid: "));
        let id_pos = text.find("id: ").unwrap();
        let title_pos = text.find("title: ").unwrap();
        let status_pos = text.find("status: ").unwrap();
        let doc_pos = text.find("doc_updated_by: ").unwrap();
        assert!(id_pos < title_pos);
        assert!(title_pos < status_pos);
        assert!(status_pos < doc_pos, "extras sort after canonical keys");
    }

    #[test]
    fn split_top_level_respects_nesting_and_quotes() {
        let parts = split_top_level("a, { b: \"x, y\" }, [1, 2]", ',');
        assert_eq!(parts, vec!["a", "{ b: \"x, y\" }", "[1, 2]"]);
    }

    #[test]
    fn unterminated_frontmatter_is_body() {
        let doc = parse_frontmatter("---\nid: \"x\"\n");
        assert!(doc.frontmatter.is_empty());
    }

    #[test]
    fn numeric_strings_with_signs_stay_strings() {
        assert_eq!(parse_scalar("-12"), Value::from("-12"));
        assert_eq!(parse_scalar("12"), Value::from(12));
    }
}
