//! Markdown `## ` sections: parsing, placeholders, validation, rendering.

use std::collections::BTreeMap;

/// Section name → body lines. Repeated headers merge into one entry.
pub fn extract_markdown_sections(text: &str) -> BTreeMap<String, Vec<String>> {
    let mut sections: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut current: Option<String> = None;
    for raw in text.lines() {
        let line = raw.trim_end();
        if let Some(name) = line.strip_prefix("## ") {
            let name = name.trim().to_string();
            sections.entry(name.clone()).or_default();
            current = Some(name);
            continue;
        }
        if let Some(name) = &current {
            sections.get_mut(name).expect("section exists").push(line.to_string());
        }
    }
    sections
}

/// Like `extract_markdown_sections` but keeps first-seen header order.
pub fn parse_doc_sections(text: &str) -> (BTreeMap<String, Vec<String>>, Vec<String>) {
    let mut sections: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut order: Vec<String> = Vec::new();
    let mut current: Option<String> = None;
    for raw in text.lines() {
        let line = raw.trim_end();
        if let Some(name) = line.strip_prefix("## ") {
            let name = name.trim().to_string();
            if !sections.contains_key(&name) {
                sections.insert(name.clone(), Vec::new());
                order.push(name.clone());
            }
            current = Some(name);
            continue;
        }
        if let Some(name) = &current {
            sections.get_mut(name).expect("section exists").push(line.to_string());
        }
    }
    (sections, order)
}

/// Placeholder lines never count as content: empty, "...", "tbd", "todo",
/// bullet-only "..." and all-dots lines.
pub fn is_placeholder_content(line: &str) -> bool {
    let stripped = line.trim();
    if stripped.is_empty() {
        return true;
    }
    let lowered = stripped.to_lowercase();
    if matches!(lowered.as_str(), "..." | "tbd" | "todo" | "- ..." | "* ...") {
        return true;
    }
    if is_bullet_only_dots(stripped) {
        return true;
    }
    stripped.chars().all(|ch| ch == '.')
}

fn is_bullet_only_dots(stripped: &str) -> bool {
    let Some(rest) = stripped
        .strip_prefix('-')
        .or_else(|| stripped.strip_prefix('*'))
    else {
        return false;
    };
    let rest = rest.trim();
    !rest.is_empty() && rest.chars().all(|ch| ch == '.')
}

pub fn trim_blank_lines(lines: &[String]) -> Vec<String> {
    let mut start = 0;
    let mut end = lines.len();
    while start < end && lines[start].trim().is_empty() {
        start += 1;
    }
    while end > start && lines[end - 1].trim().is_empty() {
        end -= 1;
    }
    lines[start..end].to_vec()
}

/// Inserts a section into an order list at its canonical position, or at
/// the end for unknown sections.
pub fn insert_section_order(order: &[String], section: &str, canonical: &[String]) -> Vec<String> {
    if order.iter().any(|name| name == section) {
        return order.to_vec();
    }
    if let Some(idx) = canonical.iter().position(|name| name == section) {
        for next_name in &canonical[idx + 1..] {
            if let Some(insert_at) = order.iter().position(|name| name == next_name) {
                let mut out = order[..insert_at].to_vec();
                out.push(section.to_string());
                out.extend_from_slice(&order[insert_at..]);
                return out;
            }
        }
    }
    let mut out = order.to_vec();
    out.push(section.to_string());
    out
}

/// Backfills required sections with a placeholder body.
pub fn ensure_required_sections(
    sections: &mut BTreeMap<String, Vec<String>>,
    order: Vec<String>,
    required: &[String],
    canonical: &[String],
) -> Vec<String> {
    let mut order = order;
    for name in required {
        if !sections.contains_key(name) {
            sections.insert(name.clone(), vec!["- ...".to_string()]);
            order = insert_section_order(&order, name, canonical);
        }
    }
    order
}

pub fn render_doc_sections(
    sections: &BTreeMap<String, Vec<String>>,
    order: &[String],
    canonical: &[String],
) -> String {
    let mut lines: Vec<String> = Vec::new();
    for name in order {
        let mut content = trim_blank_lines(sections.get(name).map(Vec::as_slice).unwrap_or(&[]));
        if content.is_empty() && canonical.iter().any(|section| section == name) {
            content = vec!["- ...".to_string()];
        }
        lines.push(format!("## {name}"));
        lines.push(String::new());
        lines.extend(content);
        lines.push(String::new());
    }
    let mut out = lines.join("\n");
    while out.ends_with('\n') {
        out.pop();
    }
    out.push('\n');
    out
}

/// Maps a name onto its canonical casing when it matches one.
pub fn normalize_doc_section_name(name: &str, canonical: &[String]) -> String {
    let raw = name.trim();
    if raw.is_empty() {
        return raw.to_string();
    }
    let lowered = raw.to_lowercase();
    for section in canonical {
        if section.to_lowercase() == lowered {
            return section.clone();
        }
    }
    raw.to_string()
}

/// Required sections that are absent or hold only placeholder lines.
pub fn validate_required_sections(text: &str, required: &[String]) -> (Vec<String>, Vec<String>) {
    let mut missing = Vec::new();
    let mut empty = Vec::new();
    let sections = extract_markdown_sections(text);
    for section in required {
        let Some(lines) = sections.get(section) else {
            missing.push(section.clone());
            continue;
        };
        let meaningful = lines
            .iter()
            .filter(|line| !line.trim().is_empty())
            .any(|line| !is_placeholder_content(line));
        if !meaningful {
            empty.push(section.clone());
        }
    }
    (missing, empty)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn extracts_sections_with_bodies() {
        let text = "intro\n## Summary\nline one\n\n## Risks\n- none\n";
        let sections = extract_markdown_sections(text);
        assert_eq!(sections["Summary"], strings(&["line one", ""]));
        assert_eq!(sections["Risks"], strings(&["- none"]));
    }

    #[test]
    fn parse_keeps_header_order() {
        let text = "## B\n\n## A\n\n";
        let (_, order) = parse_doc_sections(text);
        assert_eq!(order, strings(&["B", "A"]));
    }

    #[test]
    fn placeholder_detection() {
        assert!(is_placeholder_content(""));
        assert!(is_placeholder_content("  ...  "));
        assert!(is_placeholder_content("TBD"));
        assert!(is_placeholder_content("todo"));
        assert!(is_placeholder_content("- ..."));
        assert!(is_placeholder_content("* ..."));
        assert!(is_placeholder_content("....."));
        assert!(!is_placeholder_content("- run make test"));
        assert!(!is_placeholder_content("something real"));
    }

    #[test]
    fn insert_respects_canonical_positions() {
        let canonical = strings(&["Summary", "Scope", "Risks", "Notes"]);
        let order = strings(&["Summary", "Risks"]);
        assert_eq!(
            insert_section_order(&order, "Scope", &canonical),
            strings(&["Summary", "Scope", "Risks"])
        );
        assert_eq!(
            insert_section_order(&order, "Custom", &canonical),
            strings(&["Summary", "Risks", "Custom"])
        );
    }

    #[test]
    fn ensure_required_backfills_placeholders() {
        let canonical = strings(&["Summary", "Scope"]);
        let required = strings(&["Summary", "Scope"]);
        let mut sections = BTreeMap::new();
        sections.insert("Summary".to_string(), strings(&["real content"]));
        let order = ensure_required_sections(
            &mut sections,
            strings(&["Summary"]),
            &required,
            &canonical,
        );
        assert_eq!(order, strings(&["Summary", "Scope"]));
        assert_eq!(sections["Scope"], strings(&["- ..."]));
    }

    #[test]
    fn render_round_trips_through_parse() {
        let canonical = strings(&["Summary", "Scope"]);
        let mut sections = BTreeMap::new();
        sections.insert("Summary".to_string(), strings(&["", "the doc", ""]));
        sections.insert("Scope".to_string(), Vec::new());
        let rendered = render_doc_sections(&sections, &strings(&["Summary", "Scope"]), &canonical);
        assert_eq!(rendered, "## Summary\n\nthe doc\n\n## Scope\n\n- ...\n");

        let (reparsed, order) = parse_doc_sections(&rendered);
        assert_eq!(order, strings(&["Summary", "Scope"]));
        assert_eq!(trim_blank_lines(&reparsed["Summary"]), strings(&["the doc"]));
    }

    #[test]
    fn validation_reports_missing_and_empty() {
        let required = strings(&["Summary", "Scope", "Risks"]);
        let text = "## Summary\n\nreal\n\n## Scope\n\n- ...\n";
        let (missing, empty) = validate_required_sections(text, &required);
        assert_eq!(missing, strings(&["Risks"]));
        assert_eq!(empty, strings(&["Scope"]));
    }

    #[test]
    fn normalize_section_name_is_case_insensitive() {
        let canonical = strings(&["Verify Steps"]);
        assert_eq!(
            normalize_doc_section_name("verify steps", &canonical),
            "Verify Steps"
        );
        assert_eq!(normalize_doc_section_name("Other", &canonical), "Other");
    }
}
