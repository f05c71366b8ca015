//! Pool error types.

use framemux_protocol::ProtocolError;
use thiserror::Error;

/// Errors returned by the connection pool and response streams.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("bad request, query should begin with 'Q'")]
    BadRequest,

    #[error("client count exceeded (max {max})")]
    ClientCountExceeded { max: usize },

    #[error("connect error: {0}")]
    Connect(#[source] std::io::Error),

    #[error("bad connection: {0}")]
    BadConnection(#[source] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("response ended before terminator ({buffered} bytes buffered)")]
    IncompleteResponse { buffered: usize },
}

impl PoolError {
    /// Returns whether the caller may reasonably retry the request.
    ///
    /// The pool itself never retries.
    pub fn is_retryable(&self) -> bool {
        match self {
            PoolError::ClientCountExceeded { .. } => true,
            PoolError::Connect(_) => true,
            PoolError::BadConnection(_) => true,
            PoolError::Io(_) => true,
            PoolError::IncompleteResponse { .. } => true,
            PoolError::BadRequest | PoolError::Protocol(_) => false,
        }
    }

    /// Returns whether the backend went away before finishing a response.
    pub fn is_incomplete_response(&self) -> bool {
        matches!(self, PoolError::IncompleteResponse { .. })
    }
}
