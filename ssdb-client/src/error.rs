//! Errors surfaced by the client, pool and connections.

use ssdb_common::{DecodeError, EncodeError, Status};
use thiserror::Error;

use crate::connection::BrokenCause;

/// Result type for the sync client.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors surfaced by the sync client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Network or IO failure while dialing, reading or writing.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Arguments could not be turned into wire bytes.
    #[error("encoding error: {0}")]
    Encode(#[from] EncodeError),
    /// Server sent bytes that do not frame as a response.
    #[error("protocol error: {0}")]
    Protocol(#[from] DecodeError),
    /// Operation attempted on a connection that already failed.
    #[error("connection is broken: {0}")]
    Broken(BrokenCause),
    /// A request was sent while the previous response is still unread.
    #[error("previous response has not been received")]
    PendingResponse,
    /// Server rejected the configured password.
    #[error("authentication failed: {status}")]
    AuthFailed { status: Status },
    /// Pool was closed before or while waiting for a connection.
    #[error("connection pool closed")]
    PoolClosed,
    /// Bounded acquire gave up waiting.
    #[error("timed out waiting for a pooled connection")]
    AcquireTimeout,
    /// Host and port did not resolve to any socket address.
    #[error("invalid address {0}")]
    InvalidAddress(String),
    /// Server answered with a failure status.
    #[error("server replied {status}{}", detail(.message))]
    Server {
        status: Status,
        message: Option<String>,
    },
    /// Response shape did not match the command.
    #[error("unexpected response")]
    UnexpectedResponse,
}

fn detail(message: &Option<String>) -> String {
    match message {
        Some(text) => format!(": {}", text),
        None => String::new(),
    }
}

impl ClientError {
    /// True for failures that leave a connection unusable.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ClientError::Io(_) | ClientError::Protocol(_) | ClientError::Broken(_)
        )
    }
}
