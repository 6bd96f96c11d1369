//! Error types for site discovery queries.

use thiserror::Error;

pub type QueryResult<T> = std::result::Result<T, QueryError>;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("directory search failed: {0}")]
    Ldap(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("{program} exited with status {status}: {stderr}")]
    Command {
        program: String,
        status: i32,
        stderr: String,
    },

    #[error("failed to run command: {0}")]
    Io(#[from] std::io::Error),
}
