//! Client error types

use castline_transport::TransportError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClientError {
    #[error("connection to {address} failed: {source}")]
    ConnectionFailed {
        address: String,
        #[source]
        source: TransportError,
    },

    #[error("not connected")]
    NotConnected,

    #[error("already connected")]
    AlreadyConnected,

    #[error("a connection attempt is already in progress")]
    ConnectInProgress,

    #[error("timeout")]
    Timeout,

    #[error("invalid reply: {0}")]
    InvalidReply(#[from] castline_core::Error),

    #[error("transport error: {0}")]
    Transport(#[source] TransportError),
}

impl From<TransportError> for ClientError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Timeout => ClientError::Timeout,
            TransportError::NotConnected => ClientError::NotConnected,
            other => ClientError::Transport(other),
        }
    }
}
