//! Error types
//!
//! Errors are split by the layer that raises them. Per-packet and
//! per-connection failures are usually logged and recovered where they
//! happen; only the variants that reach a task boundary are propagated.

use std::io;
use std::net::SocketAddr;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug)]
pub enum Error {
    /// Socket or file I/O failure
    Io(io::Error),
    /// Failed to bind a listener (fatal for that listener)
    Bind { addr: SocketAddr, source: io::Error },
    /// Wire format violation
    Protocol(ProtocolError),
    /// Request rejected locally by the control client
    Client(ClientError),
    /// Announcement store failure
    Store(StoreError),
    /// Frame source could not produce frames
    SourceUnavailable(String),
}

/// Wire format errors for both the UDP packet header and the control envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Datagram shorter than the fixed header
    PacketTooShort(usize),
    /// Header reports `packet_index >= total_packets` (or zero packets)
    InvalidPacketIndex { index: u16, total: u16 },
    /// Attempted to fragment a zero-length frame
    EmptyFrame,
    /// Frame needs more packets than the header can count
    FrameTooLarge { size: usize, chunk_size: usize },
    /// Control line is not valid JSON
    InvalidJson(String),
    /// Control envelope has no string `type` field
    MissingType,
    /// Control envelope carries a `type` this side does not handle
    UnknownMessageType(String),
    /// Known `type` with a payload that does not match its schema
    InvalidPayload(String),
    /// Control line exceeded the configured maximum without a newline
    LineTooLong(usize),
}

/// Errors raised locally by the control client before anything is sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// No live control connection
    NotConnected,
    /// Message is empty after trimming
    EmptyMessage,
    /// Message exceeds the character bound
    MessageTooLong { len: usize, max: usize },
}

/// Announcement store errors
#[derive(Debug)]
pub enum StoreError {
    Io(io::Error),
    Json(serde_json::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Bind { addr, source } => write!(f, "Failed to bind {}: {}", addr, source),
            Error::Protocol(e) => write!(f, "Protocol error: {}", e),
            Error::Client(e) => write!(f, "Client error: {}", e),
            Error::Store(e) => write!(f, "Store error: {}", e),
            Error::SourceUnavailable(reason) => write!(f, "Frame source unavailable: {}", reason),
        }
    }
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtocolError::PacketTooShort(len) => {
                write!(f, "Packet too short: {} bytes", len)
            }
            ProtocolError::InvalidPacketIndex { index, total } => {
                write!(f, "Invalid packet index {} of {}", index, total)
            }
            ProtocolError::EmptyFrame => write!(f, "Empty frame"),
            ProtocolError::FrameTooLarge { size, chunk_size } => {
                write!(f, "Frame of {} bytes too large for chunk size {}", size, chunk_size)
            }
            ProtocolError::InvalidJson(e) => write!(f, "Invalid JSON: {}", e),
            ProtocolError::MissingType => write!(f, "Missing message type"),
            ProtocolError::UnknownMessageType(t) => write!(f, "Unknown message type: {}", t),
            ProtocolError::InvalidPayload(e) => write!(f, "Invalid payload: {}", e),
            ProtocolError::LineTooLong(len) => write!(f, "Line too long: {} bytes", len),
        }
    }
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientError::NotConnected => write!(f, "Not connected to server"),
            ClientError::EmptyMessage => write!(f, "Message cannot be empty"),
            ClientError::MessageTooLong { len, max } => {
                write!(f, "Message too long ({} characters, max {})", len, max)
            }
        }
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Io(e) => write!(f, "{}", e),
            StoreError::Json(e) => write!(f, "invalid JSON: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Bind { source, .. } => Some(source),
            Error::Protocol(e) => Some(e),
            Error::Client(e) => Some(e),
            Error::Store(e) => Some(e),
            Error::SourceUnavailable(_) => None,
        }
    }
}

impl std::error::Error for ProtocolError {}

impl std::error::Error for ClientError {}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Io(e) => Some(e),
            StoreError::Json(e) => Some(e),
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<ProtocolError> for Error {
    fn from(e: ProtocolError) -> Self {
        Error::Protocol(e)
    }
}

impl From<ClientError> for Error {
    fn from(e: ClientError) -> Self {
        Error::Client(e)
    }
}

impl From<StoreError> for Error {
    fn from(e: StoreError) -> Self {
        Error::Store(e)
    }
}

impl From<io::Error> for StoreError {
    fn from(e: io::Error) -> Self {
        StoreError::Io(e)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Json(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_error_display() {
        let err = ProtocolError::PacketTooShort(3);
        assert_eq!(err.to_string(), "Packet too short: 3 bytes");

        let err: Error = ProtocolError::UnknownMessageType("bogus".into()).into();
        assert_eq!(err.to_string(), "Protocol error: Unknown message type: bogus");
    }

    #[test]
    fn test_client_error_display() {
        let err = ClientError::MessageTooLong { len: 501, max: 500 };
        assert_eq!(err.to_string(), "Message too long (501 characters, max 500)");
    }

    #[test]
    fn test_bind_error_has_source() {
        use std::error::Error as _;

        let err = Error::Bind {
            addr: "127.0.0.1:4000".parse().unwrap(),
            source: io::Error::new(io::ErrorKind::AddrInUse, "in use"),
        };
        assert!(err.source().is_some());
        assert!(err.to_string().starts_with("Failed to bind 127.0.0.1:4000"));
    }
}
