use std::io;

use thiserror::Error;

/// Errors that can occur when upgrading an HTTP request to a WebSocket.
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// A handshake header did not match expectations.
    #[error("invalid connection upgrade request: {field} must be {expected:?}, got {got:?}")]
    Header {
        /// The name of the header field.
        field: &'static str,
        /// The expected value.
        expected: &'static str,
        /// The actual value, if any.
        got: Option<String>,
    },
    /// `Sec-WebSocket-Key` was absent or empty.
    #[error("empty Sec-WebSocket-Key")]
    MissingKey,
    /// The HTTP layer cannot hand over its transport for this request.
    #[error("connection cannot be taken over")]
    NotHijackable,
    /// Taking over the transport failed.
    #[error("failed to take over the connection: {0}")]
    Hijack(#[source] io::Error),
    /// Writing the `101 Switching Protocols` response failed.
    #[error("failed to write handshake response: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("payload of {0} bytes does not fit a 64-bit frame length")]
    TooLarge(usize),
}

#[derive(Debug, Error)]
pub(crate) enum FrameError {
    #[error("frame payload of {len} bytes exceeds maximum of {max}")]
    TooLarge { len: u64, max: usize },
}

/// Errors returned by [`Connection::send`](crate::Connection::send).
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Encode(#[from] EncodeError),
}

/// The hub's coordination task is no longer running.
#[derive(Debug, Error)]
#[error("hub is no longer running")]
pub struct HubClosed;
