//! Commit-subject rules: suffix mentions and meaningful summaries.

use std::collections::BTreeSet;

use swarm_core::{task_suffix, Task};

/// Maximal runs of alphanumerics, optionally joined by single dashes
/// (`abc-def` is one token, `a--b` is two).
pub fn scan_tokens(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        if !chars[i].is_ascii_alphanumeric() {
            i += 1;
            continue;
        }
        let start = i;
        while i < chars.len() && chars[i].is_ascii_alphanumeric() {
            i += 1;
        }
        let mut end = i;
        while i < chars.len()
            && chars[i] == '-'
            && i + 1 < chars.len()
            && chars[i + 1].is_ascii_alphanumeric()
        {
            i += 1;
            while i < chars.len() && chars[i].is_ascii_alphanumeric() {
                i += 1;
            }
            end = i;
        }
        tokens.push(chars[start..end].iter().collect());
    }
    tokens
}

/// Lowercased subject tokens plus their last-dash segments.
pub fn commit_subject_tokens(subject: &str) -> BTreeSet<String> {
    let mut normalized = BTreeSet::new();
    for token in scan_tokens(subject) {
        let lowered = token.to_lowercase();
        if let Some(idx) = lowered.rfind('-') {
            normalized.insert(lowered[idx + 1..].to_string());
        }
        normalized.insert(lowered);
    }
    normalized
}

/// The subject must contain the task suffix as a substring.
pub fn commit_subject_mentions_task(task_id: &str, subject: &str) -> bool {
    let suffix = task_suffix(task_id);
    !suffix.is_empty() && subject.contains(suffix)
}

/// Beyond the id/suffix and the configured generic tokens, at least one
/// token must remain.
pub fn commit_message_has_meaningful_summary(
    task_id: &str,
    message: &str,
    generic_tokens: &BTreeSet<String>,
) -> bool {
    let task_token = task_id.trim().to_lowercase();
    if task_token.is_empty() {
        return true;
    }
    let suffix = task_suffix(&task_token).to_string();
    scan_tokens(&message.to_lowercase())
        .into_iter()
        .any(|token| token != task_token && token != suffix && !generic_tokens.contains(&token))
}

pub fn collect_task_suffixes(tasks: &[Task]) -> Vec<String> {
    let mut suffixes: BTreeSet<String> = BTreeSet::new();
    for task in tasks {
        let suffix = task_suffix(task.id.trim());
        if !suffix.is_empty() {
            suffixes.insert(suffix.to_string());
        }
    }
    suffixes.into_iter().collect()
}

pub fn commit_subject_missing_error(
    task_ids: &[String],
    subject: &str,
    context: Option<&str>,
) -> String {
    let prefix = context.map(|ctx| format!("{ctx}: ")).unwrap_or_default();
    format!(
        "{prefix}Commit subject does not mention task suffix(es) for {}: '{subject}'",
        task_ids.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generic() -> BTreeSet<String> {
        ["start", "status", "mark", "done", "wip", "update", "tasks", "task"]
            .iter()
            .map(|token| token.to_string())
            .collect()
    }

    #[test]
    fn tokens_join_on_single_dashes_only() {
        assert_eq!(scan_tokens("add in-memory cache"), vec!["add", "in-memory", "cache"]);
        assert_eq!(scan_tokens("a--b"), vec!["a", "b"]);
        assert_eq!(scan_tokens("✨ ABCD12 add cache (no network)"),
            vec!["ABCD12", "add", "cache", "no", "network"]);
    }

    #[test]
    fn subject_tokens_include_last_dash_segments() {
        let tokens = commit_subject_tokens("✅ 202501020304-ABCD12 close");
        assert!(tokens.contains("202501020304-abcd12"));
        assert!(tokens.contains("abcd12"));
        assert!(tokens.contains("close"));
    }

    #[test]
    fn suffix_mention_is_substring_based() {
        assert!(commit_subject_mentions_task(
            "202501020304-ABCD12",
            "✨ ABCD12 add cache"
        ));
        assert!(!commit_subject_mentions_task(
            "202501020304-ABCD12",
            "✨ add cache"
        ));
    }

    #[test]
    fn generic_only_subjects_fail_the_meaningful_check() {
        assert!(!commit_message_has_meaningful_summary(
            "202501020304-ABCD12",
            "done tasks update",
            &generic()
        ));
        assert!(!commit_message_has_meaningful_summary(
            "202501020304-ABCD12",
            "ABCD12 wip",
            &generic()
        ));
        assert!(commit_message_has_meaningful_summary(
            "202501020304-ABCD12",
            "✨ ABCD12 add cache (no network)",
            &generic()
        ));
    }

    #[test]
    fn suffix_collection_is_sorted_and_unique() {
        let tasks = vec![
            Task::new("202501020304-ABCD12", "a"),
            Task::new("202501020305-ABCD12", "b"),
            Task::new("202501020306-WXYZ99", "c"),
        ];
        assert_eq!(collect_task_suffixes(&tasks), vec!["ABCD12", "WXYZ99"]);
    }

    #[test]
    fn missing_error_mentions_all_ids() {
        let message = commit_subject_missing_error(
            &["A-1".to_string(), "B-2".to_string()],
            "bad subject",
            Some("Branch 'task/x'"),
        );
        assert!(message.starts_with("Branch 'task/x': "));
        assert!(message.contains("A-1, B-2"));
    }
}
