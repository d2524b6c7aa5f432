//! Per-task README: template, frontmatter split, auto-summary, doc merge.

pub const AUTO_SUMMARY_BEGIN: &str = "<!-- BEGIN AUTO SUMMARY -->";
pub const AUTO_SUMMARY_END: &str = "<!-- END AUTO SUMMARY -->";
pub const CHANGES_SUMMARY_HEADER: &str = "## Changes Summary (auto)";
pub const NO_FILE_CHANGES: &str = "- (no file changes)";

const AUTO_SUMMARY_LIMIT: usize = 20;

pub fn task_readme_template(task_id: &str, title: Option<&str>, sections: &[String]) -> String {
    let header = match title.map(str::trim).filter(|title| !title.is_empty()) {
        Some(title) => format!("# {task_id}: {title}"),
        None => format!("# {task_id}"),
    };
    let mut lines = vec![header, String::new()];
    for section in sections {
        lines.push(format!("## {section}"));
        lines.push(String::new());
        lines.push("- ...".to_string());
        lines.push(String::new());
    }
    lines.push(CHANGES_SUMMARY_HEADER.to_string());
    lines.push(String::new());
    lines.push(AUTO_SUMMARY_BEGIN.to_string());
    lines.push(NO_FILE_CHANGES.to_string());
    lines.push(AUTO_SUMMARY_END.to_string());
    lines.push(String::new());
    lines.join("\n")
}

/// Splits a leading `---` frontmatter block from the body. The block keeps
/// both boundary lines and a trailing newline.
pub fn split_frontmatter_block(text: &str) -> (String, String) {
    let lines: Vec<&str> = text.lines().collect();
    if lines.first().map(|line| line.trim()) != Some("---") {
        return (String::new(), text.to_string());
    }
    let Some(end_idx) = lines[1..]
        .iter()
        .position(|line| line.trim() == "---")
        .map(|idx| idx + 1)
    else {
        return (String::new(), text.to_string());
    };
    let front = format!("{}\n", lines[..=end_idx].join("\n").trim_end());
    let body = lines[end_idx + 1..].join("\n");
    let body = body.trim_start_matches('\n').to_string();
    (front, body)
}

/// Rewrites the innermost auto-summary block; None when the markers are
/// absent or the text is already up to date.
pub fn update_auto_summary(text: &str, changed: &[String]) -> Option<String> {
    let lines: Vec<&str> = text.lines().collect();
    let begin = lines
        .iter()
        .rposition(|line| line.trim() == AUTO_SUMMARY_BEGIN)?;
    let end = lines
        .iter()
        .enumerate()
        .skip(begin + 1)
        .find(|(_, line)| line.trim() == AUTO_SUMMARY_END)
        .map(|(idx, _)| idx)?;

    let mut summary_lines: Vec<String> = changed
        .iter()
        .take(AUTO_SUMMARY_LIMIT)
        .map(|name| format!("- `{name}`"))
        .collect();
    if summary_lines.is_empty() {
        summary_lines.push(NO_FILE_CHANGES.to_string());
    }

    let mut new_lines: Vec<String> = lines[..=begin].iter().map(|line| line.to_string()).collect();
    new_lines.extend(summary_lines);
    new_lines.extend(lines[end..].iter().map(|line| line.to_string()));
    let mut new_text = new_lines.join("\n");
    if text.ends_with('\n') {
        new_text.push('\n');
    }
    if new_text == text {
        None
    } else {
        Some(new_text)
    }
}

/// The three regions of a README body relative to the doc: prefix before
/// `## Summary`, the doc itself, and the tail from the auto-summary header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocRegion {
    pub prefix: String,
    pub doc: String,
    pub tail: String,
}

pub fn split_doc_region(body: &str) -> DocRegion {
    let lines: Vec<&str> = body.lines().collect();
    let doc_start = lines.iter().position(|line| line.trim_end() == "## Summary");
    let tail_start = lines
        .iter()
        .position(|line| line.trim_end() == CHANGES_SUMMARY_HEADER);

    let (prefix_end, doc_end) = match (doc_start, tail_start) {
        (Some(start), Some(tail)) if start <= tail => (start, tail),
        (Some(start), _) => (start, tail_start.unwrap_or(lines.len())),
        (None, Some(tail)) => (tail, tail),
        (None, None) => (lines.len(), lines.len()),
    };

    let join = |slice: &[&str]| -> String { slice.join("\n") };
    DocRegion {
        prefix: join(&lines[..prefix_end]),
        doc: join(&lines[prefix_end..doc_end]),
        tail: join(&lines[doc_end..]),
    }
}

/// Replaces the doc region, preserving prefix text and the auto block.
/// Returns the merged body and whether the normalized doc changed.
pub fn merge_doc_into_body(body: &str, new_doc: &str) -> (String, bool) {
    let region = split_doc_region(body);
    let old_normalized = normalize_doc(&region.doc);
    let new_normalized = normalize_doc(new_doc);
    let changed = old_normalized != new_normalized;

    let mut parts: Vec<String> = Vec::new();
    let prefix = region.prefix.trim_end();
    if !prefix.is_empty() {
        parts.push(prefix.to_string());
    }
    let doc = new_doc.trim_end();
    if !doc.is_empty() {
        parts.push(doc.to_string());
    }
    let tail = region.tail.trim_end();
    if !tail.is_empty() {
        parts.push(tail.to_string());
    }
    let mut merged = parts.join("\n\n");
    merged.push('\n');
    (merged, changed)
}

pub fn doc_of_body(body: &str) -> String {
    split_doc_region(body).doc.trim_end().to_string()
}

fn normalize_doc(doc: &str) -> String {
    doc.lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    fn sample_body() -> String {
        let sections = strings(&["Summary", "Scope"]);
        let template = task_readme_template("202501020304-ABCD12", Some("Add cache"), &sections);
        template + "\n"
    }

    #[test]
    fn template_contains_header_sections_and_auto_block() {
        let body = sample_body();
        assert!(body.starts_with("# 202501020304-ABCD12: Add cache"));
        assert!(body.contains("## Summary"));
        assert!(body.contains("## Scope"));
        assert!(body.contains(CHANGES_SUMMARY_HEADER));
        assert!(body.contains(AUTO_SUMMARY_BEGIN));
        assert!(body.contains(NO_FILE_CHANGES));
    }

    #[test]
    fn frontmatter_split_round_trips() {
        let text = "---\nid: \"X\"\n---\n\n# body\n";
        let (front, body) = split_frontmatter_block(text);
        assert_eq!(front, "---\nid: \"X\"\n---\n");
        assert_eq!(body, "# body\n");

        let (none_front, unchanged) = split_frontmatter_block("# no frontmatter\n");
        assert!(none_front.is_empty());
        assert_eq!(unchanged, "# no frontmatter\n");
    }

    #[test]
    fn unterminated_frontmatter_is_body() {
        let text = "---\nid: \"X\"\nno end\n";
        let (front, body) = split_frontmatter_block(text);
        assert!(front.is_empty());
        assert_eq!(body, text);
    }

    #[test]
    fn auto_summary_rewrites_between_markers() {
        let body = sample_body();
        let updated = update_auto_summary(&body, &strings(&["src/cache.rs", "src/lib.rs"]))
            .expect("update");
        assert!(updated.contains("- `src/cache.rs`"));
        assert!(updated.contains("- `src/lib.rs`"));
        assert!(!updated.contains(NO_FILE_CHANGES));

        // Second run with the same inputs is a no-op.
        assert_eq!(
            update_auto_summary(&updated, &strings(&["src/cache.rs", "src/lib.rs"])),
            None
        );
    }

    #[test]
    fn auto_summary_caps_at_twenty_paths() {
        let body = sample_body();
        let changed: Vec<String> = (0..30).map(|i| format!("file-{i}.rs")).collect();
        let updated = update_auto_summary(&body, &changed).expect("update");
        assert!(updated.contains("- `file-19.rs`"));
        assert!(!updated.contains("- `file-20.rs`"));
    }

    #[test]
    fn auto_summary_without_markers_is_none() {
        assert_eq!(update_auto_summary("# nothing here\n", &strings(&["a"])), None);
    }

    #[test]
    fn doc_region_splits_prefix_doc_and_tail() {
        let body = sample_body();
        let region = split_doc_region(&body);
        assert!(region.prefix.contains("# 202501020304-ABCD12"));
        assert!(region.doc.starts_with("## Summary"));
        assert!(region.doc.contains("## Scope"));
        assert!(region.tail.starts_with(CHANGES_SUMMARY_HEADER));
    }

    #[test]
    fn merge_replaces_doc_and_detects_change() {
        let body = sample_body();
        let new_doc = "## Summary\n\nReal summary.\n\n## Scope\n\n- the cache\n";
        let (merged, changed) = merge_doc_into_body(&body, new_doc);
        assert!(changed);
        assert!(merged.contains("Real summary."));
        assert!(merged.contains(AUTO_SUMMARY_BEGIN), "auto block preserved");
        assert!(merged.starts_with("# 202501020304-ABCD12"), "prefix preserved");

        // Same doc again: body unchanged, flag false.
        let (remerged, rechanged) = merge_doc_into_body(&merged, new_doc);
        assert!(!rechanged);
        assert_eq!(remerged, merged);
    }

    #[test]
    fn doc_of_body_extracts_summary_region() {
        let body = sample_body();
        let doc = doc_of_body(&body);
        assert!(doc.starts_with("## Summary"));
        assert!(!doc.contains(CHANGES_SUMMARY_HEADER));
    }
}
