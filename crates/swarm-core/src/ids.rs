//! Task id grammar and slug normalization.

/// Suffix alphabet: digits plus uppercase letters without I, L, O and U.
pub const TASK_ID_ALPHABET: &str = "0123456789ABCDEFGHJKMNPQRSTVWXYZ";

pub const TASK_ID_TIMESTAMP_LEN: usize = 12;
pub const TASK_ID_MIN_SUFFIX_LEN: usize = 4;

/// Checks the full task-id grammar: 12 timestamp digits, a dash, and a
/// suffix of at least four alphabet characters.
pub fn is_valid_task_id(id: &str) -> bool {
    let bytes = id.as_bytes();
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
        .all(|b| TASK_ID_ALPHABET.as_bytes().contains(b))
}

/// The human-facing short id: the segment after the last dash.
pub fn task_suffix(task_id: &str) -> &str {
    let raw = task_id.trim();
    match raw.rfind('-') {
        Some(idx) => &raw[idx + 1..],
        None => raw,
    }
}

/// Kebab-case a free-text slug; falls back to "work" when nothing is left.
pub fn normalize_slug(value: &str) -> String {
    let mut out = String::new();
    let mut pending_dash = false;
    for ch in value.trim().chars() {
        let lower = ch.to_ascii_lowercase();
        if lower.is_ascii_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(lower);
        } else {
            pending_dash = true;
        }
    }
    if out.is_empty() {
        "work".to_string()
    } else {
        out
    }
}

/// Validates and dedups a caller-provided id list; duplicate or empty ids
/// are input errors surfaced as messages.
pub fn normalize_task_ids<I, S>(values: I) -> Result<Vec<String>, String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = Vec::new();
    let mut seen = std::collections::BTreeSet::new();
    for value in values {
        let task_id = value.as_ref().trim().to_string();
        if task_id.is_empty() {
            return Err("task_id must be non-empty".to_string());
        }
        if !seen.insert(task_id.clone()) {
            return Err(format!("Duplicate task id: {task_id}"));
        }
        out.push(task_id);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_task_id_accepts_crockford_suffix() {
        assert!(is_valid_task_id("202501020304-ABCD12"));
        assert!(is_valid_task_id("202501020304-XYZ9"));
    }

    #[test]
    fn valid_task_id_rejects_bad_shapes() {
        assert!(!is_valid_task_id("20250102034-ABCD12"), "11 digits");
        assert!(!is_valid_task_id("202501020304-ABC"), "short suffix");
        assert!(!is_valid_task_id("202501020304_ABCD"), "no dash");
        assert!(!is_valid_task_id("202501020304-ABIL"), "I and L excluded");
        assert!(!is_valid_task_id("202501020304-abcd"), "lowercase suffix");
    }

    #[test]
    fn task_suffix_takes_segment_after_last_dash() {
        assert_eq!(task_suffix("202501020304-ABCD12"), "ABCD12");
        assert_eq!(task_suffix("plain"), "plain");
        assert_eq!(task_suffix(" a-b-c "), "c");
    }

    #[test]
    fn normalize_slug_collapses_punctuation() {
        assert_eq!(normalize_slug("Add Cache!"), "add-cache");
        assert_eq!(normalize_slug("  fix__the   thing "), "fix-the-thing");
        assert_eq!(normalize_slug("---"), "work");
        assert_eq!(normalize_slug(""), "work");
    }

    #[test]
    fn normalize_task_ids_rejects_duplicates_and_empties() {
        assert_eq!(
            normalize_task_ids(["a", "b"]).unwrap(),
            vec!["a".to_string(), "b".to_string()]
        );
        assert!(normalize_task_ids(["a", "a"]).is_err());
        assert!(normalize_task_ids(["  "]).is_err());
    }
}
