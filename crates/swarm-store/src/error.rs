use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("missing file: {path}")]
    MissingFile { path: PathBuf },
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
    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid task record: {message}")]
    InvalidTask { message: String },
    #[error("unknown task id: {id}")]
    UnknownTask { id: String },
    #[error("task already exists: {id}")]
    DuplicateTask { id: String },
    #[error("backend configuration error: {message}")]
    BackendConfig { message: String },
    #[error("configured backend does not support {operation}")]
    Unsupported { operation: &'static str },
    #[error("failed to generate a unique task id")]
    IdGeneration,
    #[error("remote API error: {status} {body}")]
    RemoteHttp { status: u16, body: String },
    #[error("remote tracker unavailable")]
    RemoteUnavailable,
    #[error("duplicate task_id in remote tracker: {id}")]
    RemoteDuplicateTask { id: String },
    #[error("conflict detected for {task_id}\n{diff}")]
    SyncConflict { task_id: String, diff: String },
    #[error(transparent)]
    Doc(#[from] swarm_docs::DocError),
}
