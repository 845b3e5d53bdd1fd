//! Errors produced while framing and marshalling.

use thiserror::Error;

/// Errors from header/frame parsing and marshalled object encode/decode.
///
/// Covers the protocol-layer slice of the unified error taxonomy: frame-shape
/// errors a peer can trigger, and object-codec errors a malformed description
/// string or truncated buffer can trigger.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Header magic did not match `0xBB 0xC5`.
    #[error("wrong magic number in received message")]
    MsgMagic,

    /// Fewer bytes were available than the header declared.
    #[error("received less data than expected: wanted {expected}, got {actual}")]
    RcvdLess {
        /// Bytes the header claimed.
        expected: usize,
        /// Bytes actually available.
        actual: usize,
    },

    /// A short write occurred while sending a frame.
    #[error("didn't manage to send all data: wanted {expected}, sent {actual}")]
    SentLess {
        /// Bytes that should have been written.
        expected: usize,
        /// Bytes actually written.
        actual: usize,
    },

    /// The peer closed the connection, possibly mid-frame.
    #[error("connection closed by remote peer")]
    ConnClosed,

    /// A message's declared shape was invalid: a meta string was expected
    /// but no NUL terminator was found, or the declared payload size exceeds
    /// the protocol's maximum.
    #[error("invalid message format")]
    MsgInvFmt,

    /// An object description string was malformed.
    #[error("invalid busybus object format")]
    ObjInvFmt,

    /// An object-builder operation exceeded the internal buffer limit.
    #[error("not enough space in buffer")]
    NoSpace,
}

/// Result alias for protocol-layer operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;
