//! Error kinds shared across the repository, session, submission, filter
//! and sync layers. Mirrors the `EINVAL`/`EACCES`/`NOTFOUND`/`EEXIST`/
//! `ENOMEM`/`EIO`/`PANIC` kinds from the wire specification rather than
//! wrapping the underlying key-value store's own error type.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SlnError {
    #[error("invalid argument: {0}")]
    Einval(String),

    #[error("permission denied")]
    Eacces,

    #[error("not found")]
    NotFound,

    #[error("already exists")]
    Eexist,

    #[error("out of memory")]
    Enomem,

    #[error("i/o error: {0}")]
    Eio(#[from] std::io::Error),

    /// Invariant violation. Intentionally fatal: callers that see this
    /// bubble it up rather than attempt recovery.
    #[error("invariant violation: {0}")]
    Panic(String),
}

impl SlnError {
    /// Maps an error kind to the HTTP status used by the dispatch layer.
    /// Positive/2xx outcomes never flow through this path.
    pub fn http_status(&self) -> u16 {
        match self {
            SlnError::Einval(_) => 400,
            SlnError::Eacces => 403,
            SlnError::NotFound => 404,
            SlnError::Eexist => 200, // treated as success by callers before this point
            SlnError::Enomem => 500,
            SlnError::Eio(_) => 500,
            SlnError::Panic(_) => 500,
        }
    }
}

pub type SlnResult<T> = Result<T, SlnError>;
