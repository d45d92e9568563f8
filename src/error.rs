use std::io;

use thiserror::Error;

/// A message from the peer could not be decoded.
///
/// Decode errors name the structure and field that failed so interop bugs
/// against real switches can be pinned to an exact offset. They are never
/// fatal to a connection; the parser logs and drops the message.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("truncated {structure}: ran out of bytes reading `{field}`")]
    Truncated {
        structure: &'static str,
        field: &'static str,
    },
    #[error("unexpected value {value} in field `{field}` of {structure}")]
    UnexpectedValue {
        value: String,
        field: &'static str,
        structure: &'static str,
    },
    #[error("unsupported message type code {0}")]
    UnsupportedMessageCode(u8),
}

impl DecodeError {
    pub(crate) fn truncated(structure: &'static str, field: &'static str) -> DecodeError {
        DecodeError::Truncated { structure, field }
    }

    pub(crate) fn unexpected<V: std::fmt::Display>(
        structure: &'static str,
        field: &'static str,
        value: V,
    ) -> DecodeError {
        DecodeError::UnexpectedValue {
            value: value.to_string(),
            field,
            structure,
        }
    }
}

/// Failure while establishing a switch connection. The connection is closed
/// and no registry state is touched.
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("connection closed during handshake")]
    ConnectionClosed,
    #[error("expected {expected} from peer, received {received}")]
    UnexpectedMessage {
        expected: &'static str,
        received: &'static str,
    },
    #[error("failed to queue {0} for the peer")]
    SendFailed(&'static str),
}

/// Transport failure on an established stream, published on the stream's
/// error channel. Terminal for the connection.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("connection read failed: {0}")]
    Read(io::Error),
    #[error("connection write failed: {0}")]
    Write(io::Error),
}

/// Failure detected before an outbound message was handed to the stream.
///
/// Errors occurring after the handoff (socket failures, end of stream) are
/// surfaced asynchronously via the stream error channel and the disconnect
/// path, not through `send` return values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SendError {
    #[error("outbound queue is full")]
    QueueFull,
    #[error("connection is shut down")]
    Closed,
}

/// An operation referenced a datapath id or port number that is not known.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LookupError {
    #[error("no switch registered for datapath id {0:#018x}")]
    UnknownSwitch(u64),
    #[error("no port {0} on this switch")]
    UnknownPort(u16),
}
