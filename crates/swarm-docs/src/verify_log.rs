//! Append-only verify log and `verified_sha=` extraction.

use std::io::Write;
use std::path::Path;

use crate::error::DocError;

pub const VERIFY_LOG_INITIAL: &str = "# Verify log\n\n";

/// Appends a `[timestamp] …` header plus optional captured output.
pub fn append_verify_log(path: &Path, header: &str, content: &str) -> Result<(), DocError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| DocError::Write {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| DocError::Write {
            path: path.to_path_buf(),
            source,
        })?;
    let mut block = format!("{}\n", header.trim_end());
    if !content.is_empty() {
        block.push_str(content.trim_end());
        block.push('\n');
    }
    block.push('\n');
    file.write_all(block.as_bytes()).map_err(|source| DocError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// The last `verified_sha=<hex>` in the log, scanning bottom-up.
pub fn extract_last_verified_sha(text: &str) -> Option<String> {
    for line in text.lines().rev() {
        if let Some(sha) = verified_sha_in_line(line) {
            return Some(sha);
        }
    }
    None
}

fn verified_sha_in_line(line: &str) -> Option<String> {
    let lowered = line.to_lowercase();
    let marker = "verified_sha=";
    let start = lowered.find(marker)? + marker.len();
    let rest = &lowered[start..];
    let sha: String = rest
        .chars()
        .take_while(|ch| ch.is_ascii_hexdigit())
        .take(40)
        .collect();
    if sha.len() >= 7 {
        Some(sha)
    } else {
        None
    }
}
