//! Structured comment → commit message derivation.

use swarm_core::task_suffix;

use crate::error::PolicyError;

/// Collapses a comment body onto one line; newlines become ` | `.
pub fn normalize_comment_body_for_commit(body: &str) -> String {
    let unified = body.replace("\r\n", "\n").replace('\r', "\n");
    let mut parts: Vec<&str> = Vec::new();
    for piece in unified.split('\n') {
        let piece = piece.trim();
        if !piece.is_empty() {
            parts.push(piece);
        }
    }
    let joined = parts.join(" | ");
    joined.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Comment rule prefixes as (raw, label) pairs; the label drops a
/// trailing colon and lowercases.
pub fn comment_prefixes(rules: &[(String, usize)]) -> Vec<(String, String)> {
    rules
        .iter()
        .filter_map(|(prefix, _)| {
            let raw = prefix.trim().to_string();
            let label = raw.trim_end_matches(':').trim().to_lowercase();
            if raw.is_empty() || label.is_empty() {
                None
            } else {
                Some((raw, label))
            }
        })
        .collect()
}

/// Splits a known prefix off the front, case-insensitively.
pub fn split_comment_prefix<'a>(
    text: &'a str,
    prefixes: &[(String, String)],
) -> (Option<String>, &'a str) {
    let lowered = text.to_lowercase();
    for (raw_prefix, label) in prefixes {
        let prefix = raw_prefix.trim();
        if prefix.is_empty() {
            continue;
        }
        if lowered.starts_with(&prefix.to_lowercase()) {
            let remainder = text[prefix.len()..].trim();
            return (Some(label.clone()), remainder);
        }
    }
    (None, text)
}

/// First segment is the summary; the rest become details. Splits on
/// ` | `, `;`, ` -- ` or ` - `, falling back to sentence boundaries.
pub fn split_summary_and_details(text: &str) -> (String, Vec<String>) {
    let cleaned = text.trim();
    if cleaned.is_empty() {
        return (String::new(), Vec::new());
    }
    for separator in ["|", ";", "--", "-"] {
        if let Some(parts) = split_on_separator(cleaned, separator) {
            let mut iter = parts.into_iter();
            let summary = iter.next().unwrap_or_default();
            return (summary, iter.collect());
        }
    }
    let sentences = split_sentences(cleaned);
    if sentences.len() > 1 {
        let mut iter = sentences.into_iter();
        let summary = iter.next().unwrap_or_default();
        return (summary, iter.collect());
    }
    (cleaned.to_string(), Vec::new())
}

fn split_on_separator(text: &str, separator: &str) -> Option<Vec<String>> {
    // ` -- ` and ` - ` require surrounding whitespace so hyphenated words
    // survive; `|` and `;` split regardless.
    let candidates: Vec<String> = match separator {
        "|" | ";" => text
            .split(separator.chars().next().unwrap())
            .map(|part| part.trim().to_string())
            .filter(|part| !part.is_empty())
            .collect(),
        _ => {
            let spaced = format!(" {separator} ");
            if !text.contains(&spaced) {
                return None;
            }
            text.split(&spaced)
                .map(|part| part.trim().to_string())
                .filter(|part| !part.is_empty())
                .collect()
        }
    };
    if candidates.len() > 1 {
        Some(candidates)
    } else {
        None
    }
}

fn split_sentences(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let chars: Vec<char> = text.chars().collect();
    for (idx, ch) in chars.iter().enumerate() {
        current.push(*ch);
        let boundary = matches!(ch, '.' | '!' | '?')
            && chars.get(idx + 1).is_some_and(|next| next.is_whitespace());
        if boundary {
            let piece = current.trim().to_string();
            if !piece.is_empty() {
                out.push(piece);
            }
            current.clear();
        }
    }
    let piece = current.trim().to_string();
    if !piece.is_empty() {
        out.push(piece);
    }
    out
}

/// Normalizes a structured comment into `label: summary | details: …`.
pub fn format_comment_body_for_commit(body: &str, rules: &[(String, usize)]) -> String {
    let compact = normalize_comment_body_for_commit(body);
    if compact.is_empty() {
        return String::new();
    }
    let prefixes = comment_prefixes(rules);
    let (mut prefix_label, remainder) = split_comment_prefix(&compact, &prefixes);
    let (mut summary, details) = split_summary_and_details(remainder);
    if summary.is_empty() {
        summary = if remainder.is_empty() {
            compact.clone()
        } else {
            remainder.to_string()
        };
        if summary == compact {
            prefix_label = None;
        }
    }
    let summary = match prefix_label {
        Some(label) if !summary.is_empty() => format!("{label}: {summary}"),
        Some(label) => label,
        None => summary,
    };
    if !details.is_empty() {
        let details_text = details.join("; ");
        if !details_text.is_empty() {
            return format!("{summary} | details: {details_text}");
        }
    }
    summary
}

/// `<emoji> <suffix> <summary>` commit subject from a comment.
pub fn derive_commit_message_from_comment(
    task_id: &str,
    summary: &str,
    emoji: &str,
) -> Result<String, PolicyError> {
    let summary = summary.split_whitespace().collect::<Vec<_>>().join(" ");
    if summary.is_empty() {
        return Err(PolicyError::violation(
            "Comment body is required to build a commit message from the task comment",
        ));
    }
    let emoji = emoji.trim();
    if emoji.is_empty() {
        return Err(PolicyError::violation(
            "Emoji prefix is required when deriving commit messages from task comments",
        ));
    }
    let suffix = task_suffix(task_id);
    if suffix.is_empty() {
        return Err(PolicyError::violation(format!("Invalid task id: '{task_id}'")));
    }
    Ok(format!("{emoji} {suffix} {summary}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> Vec<(String, usize)> {
        vec![
            ("Start:".to_string(), 40),
            ("Blocked:".to_string(), 40),
            ("Verified:".to_string(), 60),
        ]
    }

    #[test]
    fn normalization_collapses_newlines_to_pipes() {
        assert_eq!(
            normalize_comment_body_for_commit("first line\n\nsecond   line\r\nthird"),
            "first line | second line | third"
        );
    }

    #[test]
    fn prefix_split_is_case_insensitive() {
        let prefixes = comment_prefixes(&rules());
        let (label, rest) = split_comment_prefix("start: doing the thing", &prefixes);
        assert_eq!(label.as_deref(), Some("start"));
        assert_eq!(rest, "doing the thing");

        let (none, all) = split_comment_prefix("just text", &prefixes);
        assert_eq!(none, None);
        assert_eq!(all, "just text");
    }

    #[test]
    fn summary_splits_on_pipe_then_details() {
        let (summary, details) =
            split_summary_and_details("implement cache | use LRU; cap at 1k");
        assert_eq!(summary, "implement cache");
        assert_eq!(details, vec!["use LRU; cap at 1k".to_string()]);
    }

    #[test]
    fn summary_splits_on_sentences_when_no_separator() {
        let (summary, details) = split_summary_and_details("Did the thing. It works now.");
        assert_eq!(summary, "Did the thing.");
        assert_eq!(details, vec!["It works now.".to_string()]);
    }

    #[test]
    fn hyphenated_words_do_not_split() {
        let (summary, details) = split_summary_and_details("add in-memory cache");
        assert_eq!(summary, "add in-memory cache");
        assert!(details.is_empty());
    }

    #[test]
    fn formatting_produces_label_summary_details() {
        let formatted = format_comment_body_for_commit(
            "Start: implementing the in-memory cache behind a feature flag\nfirst pass only",
            &rules(),
        );
        assert_eq!(
            formatted,
            "start: implementing the in-memory cache behind a feature flag | details: first pass only"
        );
    }

    #[test]
    fn formatting_without_prefix_keeps_text() {
        let formatted = format_comment_body_for_commit("quick progress note", &rules());
        assert_eq!(formatted, "quick progress note");
    }

    #[test]
    fn derive_builds_emoji_suffix_summary() {
        let message = derive_commit_message_from_comment(
            "202501020304-ABCD12",
            "start: implementing the cache",
            "🚧",
        )
        .expect("derive");
        assert_eq!(message, "🚧 ABCD12 start: implementing the cache");
    }

    #[test]
    fn derive_requires_summary_and_emoji() {
        assert!(derive_commit_message_from_comment("202501020304-ABCD12", "  ", "🚧").is_err());
        assert!(derive_commit_message_from_comment("202501020304-ABCD12", "x", " ").is_err());
    }
}
