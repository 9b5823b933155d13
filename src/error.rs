use thiserror::Error;

/// Failures of the link store and link service.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("link not found")]
    NotFound,

    /// The short id is already taken. `cut_link` retries on this and never
    /// returns it.
    #[error("short id already exists")]
    AlreadyExists,

    #[error("access denied")]
    AccessDenied,

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("no free short id found after {0} attempts")]
    GenerationExhausted(usize),
}

pub type Result<T, E = LinkError> = std::result::Result<T, E>;
