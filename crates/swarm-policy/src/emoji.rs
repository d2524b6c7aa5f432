//! Commit emoji inference from keywords and task status.

use swarm_core::TaskStatus;

pub const START_COMMIT_EMOJI: &str = "🚧";
pub const FINISH_COMMIT_EMOJI: &str = "✅";
pub const INTERMEDIATE_COMMIT_EMOJI_FALLBACK: &str = "🛠️";

pub const COMMIT_EMOJI_KEYWORDS: &[(&str, &[&str])] = &[
    ("⛔", &["blocked", "blocker", "blocking", "stuck", "waiting", "hold"]),
    ("🚑", &["hotfix", "urgent", "emergency"]),
    (
        "🐛",
        &[
            "fix", "bug", "bugs", "defect", "defects", "error", "errors", "crash", "regression",
            "issue",
        ],
    ),
    ("🔒", &["security", "vuln", "vulnerability", "auth", "encrypt", "encryption"]),
    ("⚡", &["perf", "performance", "optimize", "optimization", "speed", "latency"]),
    (
        "🧪",
        &[
            "test", "tests", "testing", "spec", "specs", "coverage", "verify", "verified",
            "validation",
        ],
    ),
    (
        "📝",
        &["doc", "docs", "docstring", "readme", "documentation", "guide", "changelog"],
    ),
    (
        "♻️",
        &["refactor", "refactoring", "cleanup", "simplify", "restructure", "rename"],
    ),
    ("🏗️", &["build", "ci", "pipeline", "release", "packaging"]),
    ("🔧", &["config", "configuration", "settings", "flag", "env", "toggle"]),
    ("📦", &["deps", "dependency", "dependencies", "upgrade", "bump", "vendor"]),
    ("🎨", &["ui", "ux", "style", "css", "theme", "layout"]),
    ("🧹", &["lint", "format", "formatting", "typo", "spelling"]),
];

/// First keyword group with a whole-word match wins, in table order.
pub fn infer_commit_emoji(text: &str) -> &'static str {
    let words: Vec<String> = text
        .to_lowercase()
        .split(|ch: char| !ch.is_ascii_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_string)
        .collect();
    if words.is_empty() {
        return INTERMEDIATE_COMMIT_EMOJI_FALLBACK;
    }
    for (emoji, keywords) in COMMIT_EMOJI_KEYWORDS {
        for keyword in *keywords {
            if words.iter().any(|word| word == keyword) {
                return emoji;
            }
        }
    }
    INTERMEDIATE_COMMIT_EMOJI_FALLBACK
}

/// DOING and DONE carry fixed emojis; anything else is inferred from the
/// comment body.
pub fn default_commit_emoji_for_status(status: TaskStatus, comment_body: Option<&str>) -> &'static str {
    match status {
        TaskStatus::Doing => START_COMMIT_EMOJI,
        TaskStatus::Done => FINISH_COMMIT_EMOJI,
        _ => infer_commit_emoji(comment_body.unwrap_or("")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_groups_match_whole_words() {
        assert_eq!(infer_commit_emoji("fix the crash in parser"), "🐛");
        assert_eq!(infer_commit_emoji("improve perf of lookups"), "⚡");
        assert_eq!(infer_commit_emoji("add tests for the cache"), "🧪");
        assert_eq!(infer_commit_emoji("update docs and readme"), "📝");
        assert_eq!(infer_commit_emoji("bump dependency versions"), "📦");
        assert_eq!(infer_commit_emoji("blocked waiting on review"), "⛔");
    }

    #[test]
    fn substrings_do_not_match() {
        // "prefix" contains "fix" but is not the word "fix".
        assert_eq!(infer_commit_emoji("prefix handling"), INTERMEDIATE_COMMIT_EMOJI_FALLBACK);
    }

    #[test]
    fn earlier_groups_win() {
        // "blocked" (first group) beats "fix" (third group).
        assert_eq!(infer_commit_emoji("blocked on a fix"), "⛔");
    }

    #[test]
    fn empty_text_falls_back() {
        assert_eq!(infer_commit_emoji("   "), INTERMEDIATE_COMMIT_EMOJI_FALLBACK);
    }

    #[test]
    fn status_defaults() {
        assert_eq!(default_commit_emoji_for_status(TaskStatus::Doing, None), "🚧");
        assert_eq!(default_commit_emoji_for_status(TaskStatus::Done, None), "✅");
        assert_eq!(
            default_commit_emoji_for_status(TaskStatus::Blocked, Some("blocked on infra")),
            "⛔"
        );
        assert_eq!(
            default_commit_emoji_for_status(TaskStatus::Todo, None),
            INTERMEDIATE_COMMIT_EMOJI_FALLBACK
        );
    }
}
