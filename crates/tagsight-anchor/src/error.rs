/// An error type for anchor persistence and storage.
#[derive(thiserror::Error, Debug)]
pub enum AnchorError {
    /// Reading or writing the backing file failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The persisted record could not be encoded or decoded.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// The key-value store rejected the operation.
    #[error("Key-value store error: {0}")]
    Store(String),
}
