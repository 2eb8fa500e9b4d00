/*!
 * Error Types
 *
 * Failures are split by who recovers from them: store and decode errors
 * become ERROR responses on the wire, server errors end a connection or
 * the whole process.
 */

use smol_str::SmolStr;
use std::net::SocketAddr;
use thiserror::Error;

/// Outcome of a store operation that could not be applied
///
/// The `Display` text is the wire message body after the `ERR ` marker.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpaceError {
    /// READ or GET on a key that is not in the space
    #[error("{0} does not exist")]
    NotFound(SmolStr),
    /// PUT on a key that is already in the space
    #[error("{0} already exists")]
    AlreadyExists(SmolStr),
}

/// A request frame that could not be turned into a [`crate::Request`]
///
/// Decode errors never close the connection; the handler answers them
/// with an ERROR response and keeps reading.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Declared length is smaller than the header itself
    #[error("request too short")]
    TooShort,
    /// First three bytes are not decimal digits
    #[error("malformed length header")]
    BadHeader,
    /// Command code is not REA, GET or PUT
    #[error("invalid command")]
    InvalidCommand,
    /// PUT without a value segment
    #[error("PUT requires a value")]
    MissingValue,
    #[error("request is not valid UTF-8")]
    InvalidUtf8,
    /// Declared length disagrees with the bytes the peer actually sent
    #[error("length header does not match request")]
    LengthMismatch,
}

impl DecodeError {
    /// Header-level failures leave no way to find the next frame boundary.
    pub fn loses_framing(&self) -> bool {
        matches!(
            self,
            DecodeError::TooShort | DecodeError::BadHeader | DecodeError::LengthMismatch
        )
    }
}

/// Transport failures of the listener and its connections
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listener could not acquire its address; fatal
    #[error("failed to bind {addr}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    /// accept() failed in a way that is not retryable; fatal
    #[error("accept failed")]
    Accept(#[source] std::io::Error),
    /// I/O failure on one connection; ends only that handler
    #[error("connection fault")]
    Connection(#[from] std::io::Error),
    /// The OS refused to start a worker thread
    #[error("failed to spawn {0} thread")]
    Spawn(&'static str, #[source] std::io::Error),
}
