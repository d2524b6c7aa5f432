//! PR artifact folder: meta.json, review.md and handoff notes.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::path::Path;

use crate::error::DocError;
use crate::sections::{extract_markdown_sections, is_placeholder_content};

pub const PR_META_FILE: &str = "meta.json";
pub const PR_DIFFSTAT_FILE: &str = "diffstat.txt";
pub const PR_VERIFY_LOG_FILE: &str = "verify.log";
pub const PR_REVIEW_FILE: &str = "review.md";
pub const HANDOFF_NOTES_HEADER: &str = "## Handoff Notes";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    #[default]
    Squash,
    Merge,
    Rebase,
}

impl MergeStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            MergeStrategy::Squash => "squash",
            MergeStrategy::Merge => "merge",
            MergeStrategy::Rebase => "rebase",
        }
    }
}

impl std::str::FromStr for MergeStrategy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "squash" => Ok(MergeStrategy::Squash),
            "merge" => Ok(MergeStrategy::Merge),
            "rebase" => Ok(MergeStrategy::Rebase),
            other => Err(format!("--merge-strategy must be squash|merge|rebase (got {other})")),
        }
    }
}

impl std::fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PrStatus {
    #[default]
    Open,
    Merged,
    Closed,
}

impl PrStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PrStatus::Open => "OPEN",
            PrStatus::Merged => "MERGED",
            PrStatus::Closed => "CLOSED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PrMeta {
    #[serde(default)]
    pub task_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_title: Option<String>,
    #[serde(default)]
    pub branch: String,
    #[serde(default)]
    pub base_branch: String,
    #[serde(default)]
    pub author: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head_sha: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge_strategy: Option<MergeStrategy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<PrStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merged_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge_commit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub close_commit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_verified_sha: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_verified_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handoff_applied_digest: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handoff_applied_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PrMeta {
    pub fn merge_strategy(&self) -> MergeStrategy {
        self.merge_strategy.unwrap_or_default()
    }
}

pub fn parse_pr_meta(text: &str, source_label: &str) -> Result<PrMeta, DocError> {
    serde_json::from_str(text).map_err(|source| DocError::Json {
        source_label: source_label.to_string(),
        source,
    })
}

/// Empty meta when the file does not exist yet.
pub fn load_pr_meta(path: &Path) -> Result<PrMeta, DocError> {
    if !path.exists() {
        return Ok(PrMeta::default());
    }
    let body = std::fs::read_to_string(path).map_err(|source| DocError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_pr_meta(&body, &path.display().to_string())
}

pub fn write_pr_meta(path: &Path, meta: &PrMeta) -> Result<(), DocError> {
    let value = serde_json::to_value(meta).map_err(|source| DocError::Json {
        source_label: path.display().to_string(),
        source,
    })?;
    let body = serde_json::to_string_pretty(&value).map_err(|source| DocError::Json {
        source_label: path.display().to_string(),
        source,
    })?;
    std::fs::write(path, body + "\n").map_err(|source| DocError::Write {
        path: path.to_path_buf(),
        source,
    })
}

pub fn review_template(task_id: &str) -> String {
    let mut lines = vec![format!("# Review: {task_id}"), String::new()];
    lines.extend(
        [
            "## Checklist",
            "",
            "- [ ] PR artifact complete (README/diffstat/verify.log)",
            "- [ ] No tasks snapshot changes in the task branch",
            "- [ ] Verify commands ran (or justified)",
            "- [ ] Scope matches task goal; risks understood",
            "",
            HANDOFF_NOTES_HEADER,
            "",
            "Add short handoff notes here as list items so INTEGRATOR can append them to the task on close.",
            "",
            "- CODER: ...",
            "- TESTER: ...",
            "- DOCS: ...",
            "- REVIEWER: ...",
            "",
            "## Notes",
            "",
            "- ...",
            "",
        ]
        .iter()
        .map(|line| line.to_string()),
    );
    lines.join("\n")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandoffNote {
    pub author: String,
    pub body: String,
}

/// `- <author>: <body>` bullets from the Handoff Notes section,
/// placeholders discarded.
pub fn parse_handoff_notes(text: &str) -> Vec<HandoffNote> {
    let sections = extract_markdown_sections(text);
    let Some(lines) = sections.get(HANDOFF_NOTES_HEADER.trim_start_matches("## ")) else {
        return Vec::new();
    };
    let mut notes = Vec::new();
    for raw in lines {
        let line = raw.trim();
        let Some(payload) = line.strip_prefix('-') else {
            continue;
        };
        let payload = payload.trim();
        if payload.is_empty() || is_placeholder_content(payload) {
            continue;
        }
        let Some((author, body)) = payload.split_once(':') else {
            continue;
        };
        let author = author.trim();
        let body = body.trim();
        if author.is_empty() || body.is_empty() || is_placeholder_content(body) {
            continue;
        }
        notes.push(HandoffNote {
            author: author.to_string(),
            body: body.to_string(),
        });
    }
    notes
}

/// sha256 over `\n`-joined `author:body` pairs.
pub fn handoff_digest(notes: &[HandoffNote]) -> String {
    let joined = notes
        .iter()
        .map(|note| format!("{}:{}", note.author, note.body))
        .collect::<Vec<_>>()
        .join("\n");
    hex::encode(Sha256::digest(joined.as_bytes()))
}

/// Appends a note bullet at the end of the Handoff Notes section,
/// idempotently. Pure; the caller writes the result back.
pub fn append_handoff_note(
    text: &str,
    author: &str,
    body: &str,
    path_label: &str,
) -> Result<String, DocError> {
    let note_line = format!("- {}: {}", author.trim(), body.trim());
    let lines: Vec<&str> = text.lines().collect();

    let Some(header_idx) = lines
        .iter()
        .position(|line| line.trim() == HANDOFF_NOTES_HEADER)
    else {
        return Err(DocError::MissingSection {
            section: HANDOFF_NOTES_HEADER.to_string(),
            path: path_label.to_string(),
        });
    };

    let section_end = lines
        .iter()
        .enumerate()
        .skip(header_idx + 1)
        .find(|(_, line)| line.trim().starts_with("## "))
        .map(|(idx, _)| idx)
        .unwrap_or(lines.len());

    if lines[header_idx + 1..section_end]
        .iter()
        .any(|line| line.trim_end() == note_line)
    {
        return Ok(text.to_string());
    }

    let mut insert_at = section_end;
    while insert_at > header_idx + 1 && lines[insert_at - 1].trim().is_empty() {
        insert_at -= 1;
    }

    let mut new_lines: Vec<String> = lines.iter().map(|line| line.to_string()).collect();
    new_lines.insert(insert_at, note_line);
    Ok(format!("{}\n", new_lines.join("\n").trim_end()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_strategy_parses_and_defaults() {
        assert_eq!("SQUASH".parse::<MergeStrategy>().unwrap(), MergeStrategy::Squash);
        assert_eq!("rebase".parse::<MergeStrategy>().unwrap(), MergeStrategy::Rebase);
        assert!("octopus".parse::<MergeStrategy>().is_err());
        assert_eq!(PrMeta::default().merge_strategy(), MergeStrategy::Squash);
    }

    #[test]
    fn pr_meta_round_trips_extra_fields() {
        let raw = r#"{"task_id":"T1","branch":"task/T1/x","base_branch":"main","author":"CODER","custom":"kept"}"#;
        let meta = parse_pr_meta(raw, "meta.json").unwrap();
        assert_eq!(meta.task_id, "T1");
        assert_eq!(meta.extra.get("custom"), Some(&Value::from("kept")));

        let value = serde_json::to_value(&meta).unwrap();
        assert_eq!(value["custom"], Value::from("kept"));
    }

    #[test]
    fn pr_status_serializes_screaming() {
        assert_eq!(serde_json::to_string(&PrStatus::Merged).unwrap(), "\"MERGED\"");
    }

    #[test]
    fn parses_handoff_notes_skipping_placeholders() {
        let review = review_template("T1");
        assert!(parse_handoff_notes(&review).is_empty(), "template has only stubs");

        let with_notes = review.replace(
            "- CODER: ...",
            "- CODER: cache invalidation is lazy; see src/cache.rs",
        );
        let notes = parse_handoff_notes(&with_notes);
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].author, "CODER");
        assert!(notes[0].body.contains("lazy"));
    }

    #[test]
    fn handoff_digest_is_order_sensitive_and_stable() {
        let a = HandoffNote {
            author: "CODER".to_string(),
            body: "one".to_string(),
        };
        let b = HandoffNote {
            author: "TESTER".to_string(),
            body: "two".to_string(),
        };
        let d1 = handoff_digest(&[a.clone(), b.clone()]);
        let d2 = handoff_digest(&[a.clone(), b.clone()]);
        let d3 = handoff_digest(&[b, a]);
        assert_eq!(d1, d2);
        assert_ne!(d1, d3);
        assert_eq!(d1.len(), 64);
    }

    #[test]
    fn append_handoff_note_is_idempotent() {
        let review = review_template("T1");
        let once = append_handoff_note(&review, "CODER", "done with the cache", "review.md")
            .expect("append");
        assert!(once.contains("- CODER: done with the cache"));
        let twice = append_handoff_note(&once, "CODER", "done with the cache", "review.md")
            .expect("append again");
        assert_eq!(once, twice);
    }

    #[test]
    fn append_handoff_note_requires_section() {
        let err = append_handoff_note("# no sections\n", "A", "b", "review.md")
            .expect_err("missing section");
        assert!(matches!(err, DocError::MissingSection { .. }));
    }
}
