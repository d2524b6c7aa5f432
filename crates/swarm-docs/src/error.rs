use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum DocError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid JSON in {source_label}: {source}")]
    Json {
        source_label: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("missing section '{section}' in {path}")]
    MissingSection { section: String, path: String },
}
