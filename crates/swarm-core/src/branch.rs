//! Task branch naming: `{prefix}/{task-id}/{slug}`.

use crate::ids::{TASK_ID_MIN_SUFFIX_LEN, TASK_ID_TIMESTAMP_LEN};

pub fn task_branch_name(prefix: &str, task_id: &str, slug: &str) -> String {
    format!("{prefix}/{task_id}/{slug}")
}

pub fn task_branch_example(prefix: &str) -> String {
    format!("{prefix}/<task-id>/<slug>")
}

/// Extracts the task id from a task branch name, or None when the branch
/// does not match `{prefix}/<12 digits>-<A-Z0-9 suffix>/<slug>`.
pub fn parse_task_id_from_task_branch<'a>(prefix: &str, branch: &'a str) -> Option<&'a str> {
    let raw = branch.trim();
    let rest = raw.strip_prefix(prefix)?.strip_prefix('/')?;
    let (candidate, slug) = rest.split_once('/')?;
    if slug.is_empty() || slug.contains('/') {
        return None;
    }
    if !branch_task_id_matches(candidate) {
        return None;
    }
    Some(candidate)
}

// The branch grammar accepts the broader [0-9A-Z]{4,} suffix class so that
// ids minted by older tooling still parse.
fn branch_task_id_matches(candidate: &str) -> bool {
    let bytes = candidate.as_bytes();
    if bytes.len() < TASK_ID_TIMESTAMP_LEN + 1 + TASK_ID_MIN_SUFFIX_LEN {
        return false;
    }
    if !bytes[..TASK_ID_TIMESTAMP_LEN]
        .iter()
        .all(|b| b.is_ascii_digit())
    {
        return false;
    }
    if bytes[TASK_ID_TIMESTAMP_LEN] != b'-' {
        return false;
    }
    bytes[TASK_ID_TIMESTAMP_LEN + 1..]
        .iter()
        .all(|b| b.is_ascii_digit() || b.is_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_branch_name() {
        assert_eq!(
            task_branch_name("task", "202501020304-ABCD12", "add-cache"),
            "task/202501020304-ABCD12/add-cache"
        );
    }

    #[test]
    fn parses_task_id_from_branch() {
        assert_eq!(
            parse_task_id_from_task_branch("task", "task/202501020304-ABCD12/add-cache"),
            Some("202501020304-ABCD12")
        );
    }

    #[test]
    fn rejects_foreign_branches() {
        assert_eq!(parse_task_id_from_task_branch("task", "main"), None);
        assert_eq!(
            parse_task_id_from_task_branch("task", "feature/202501020304-ABCD12/x"),
            None
        );
        assert_eq!(
            parse_task_id_from_task_branch("task", "task/not-an-id/x"),
            None
        );
        assert_eq!(
            parse_task_id_from_task_branch("task", "task/202501020304-ABCD12"),
            None,
            "missing slug segment"
        );
        assert_eq!(
            parse_task_id_from_task_branch("task", "task/202501020304-ABCD12/a/b"),
            None,
            "extra path segment"
        );
    }

    #[test]
    fn branch_grammar_accepts_broader_suffix_class() {
        // "IL0U" is outside the generation alphabet but valid on branches.
        assert_eq!(
            parse_task_id_from_task_branch("task", "task/202501020304-IL0U/x"),
            Some("202501020304-IL0U")
        );
    }
}
