//! Error types for castline core

use thiserror::Error;

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Envelope could not be encoded
    #[error("encode error: {0}")]
    EncodeError(String),

    /// Envelope could not be decoded
    #[error("decode error: {0}")]
    DecodeError(String),

    /// Op code outside the obs-websocket v5 set
    #[error("unknown op code: {0}")]
    UnknownOpCode(u8),

    /// Op code valid, but not expected in this direction
    #[error("unexpected op code {op} from {side}")]
    UnexpectedOpCode { op: u8, side: &'static str },

    /// A reply payload did not have the shape the request promises
    #[error("invalid reply to {request}: {reason}")]
    InvalidReply {
        request: &'static str,
        reason: String,
    },
}

impl Error {
    pub(crate) fn invalid_reply(request: &'static str, reason: impl ToString) -> Self {
        Error::InvalidReply {
            request,
            reason: reason.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        if e.is_data() || e.is_syntax() || e.is_eof() {
            Error::DecodeError(e.to_string())
        } else {
            Error::EncodeError(e.to_string())
        }
    }
}
