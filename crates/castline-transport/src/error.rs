//! Transport error types

use castline_core::protocol::status;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, TransportError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    /// The remote rejected a request
    #[error("request rejected ({code}): {message}")]
    Rpc { code: u32, message: String },

    #[error("connection closed")]
    ConnectionClosed,

    #[error("not connected")]
    NotConnected,

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("timeout")]
    Timeout,

    #[error("transport error: {0}")]
    Other(String),
}

impl TransportError {
    /// The remote answered, and the answer was no
    pub fn is_rejection(&self) -> bool {
        matches!(self, TransportError::Rpc { .. })
    }

    /// The remote does not know the request type
    pub fn is_unknown_request(&self) -> bool {
        matches!(
            self,
            TransportError::Rpc {
                code: status::UNKNOWN_REQUEST_TYPE,
                ..
            }
        )
    }
}

impl From<castline_core::Error> for TransportError {
    fn from(e: castline_core::Error) -> Self {
        TransportError::Protocol(e.to_string())
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(e: serde_json::Error) -> Self {
        TransportError::Protocol(e.to_string())
    }
}

#[cfg(feature = "websocket")]
impl From<tokio_tungstenite::tungstenite::Error> for TransportError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match e {
            WsError::ConnectionClosed | WsError::AlreadyClosed => TransportError::ConnectionClosed,
            WsError::Url(e) => TransportError::InvalidUrl(e.to_string()),
            WsError::Io(e) => TransportError::ConnectionFailed(e.to_string()),
            other => TransportError::Other(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_classification() {
        let unknown = TransportError::Rpc {
            code: 204,
            message: "unknown".to_string(),
        };
        assert!(unknown.is_rejection());
        assert!(unknown.is_unknown_request());

        let not_running = TransportError::Rpc {
            code: 501,
            message: "output not running".to_string(),
        };
        assert!(not_running.is_rejection());
        assert!(!not_running.is_unknown_request());

        assert!(!TransportError::ConnectionClosed.is_rejection());
        assert!(!TransportError::Timeout.is_rejection());
    }

    #[test]
    fn test_core_error_becomes_protocol() {
        let err: TransportError = castline_core::Error::UnknownOpCode(42).into();
        assert_eq!(err, TransportError::Protocol("unknown op code: 42".to_string()));
    }
}
