use thiserror::Error;

/// Admission failures. Exactly one reason is reported per denied request.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("API key not found")]
    NotFound,

    #[error("API key has expired")]
    Expired,

    #[error("API key has been revoked")]
    Revoked,

    #[error("API key does not have access to this sport")]
    ScopeDenied,

    #[error("Rate limit exceeded, retry after {retry_after}s")]
    RateLimited { retry_after: u64 },

    #[error("Storage unavailable")]
    Unavailable,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Database error: {0}")]
    Database(rusqlite::Error),
}

impl From<rusqlite::Error> for AuthError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::QueryReturnedNoRows => AuthError::NotFound,
            // A busy database must not stall the admission path; the caller
            // may retry, unlike the terminal denials above.
            rusqlite::Error::SqliteFailure(e, _)
                if e.code == rusqlite::ErrorCode::DatabaseBusy
                    || e.code == rusqlite::ErrorCode::DatabaseLocked =>
            {
                AuthError::Unavailable
            }
            other => AuthError::Database(other),
        }
    }
}

impl From<serde_json::Error> for AuthError {
    fn from(err: serde_json::Error) -> Self {
        AuthError::InvalidRequest(err.to_string())
    }
}
