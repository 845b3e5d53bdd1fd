//! The unified busybus error taxonomy.

use thiserror::Error;

/// Every non-success condition the daemon's core logic can raise.
///
/// `Success` has no variant here: idiomatic Rust represents "no error" as
/// `Result::Ok(())`, not as a value of the error type. `Io` wraps OS-level
/// failures (bind, accept, read, write) whose `Display` already carries the
/// errno message; every other variant is a fixed-string condition transcribed
/// from the daemon's original error table.
#[derive(Error, Debug)]
pub enum Error {
    /// Wraps an OS-level I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Allocation failure. Rust's allocator aborts on OOM rather than
    /// returning an error, so this variant exists for taxonomy completeness
    /// but is not constructed by this crate.
    #[error("out of memory")]
    NoMem,

    /// A caller passed an argument that fails a precondition (e.g. an empty
    /// method path).
    #[error("invalid argument")]
    InvalArg,

    /// A marshalled object's description string or buffer contents didn't
    /// match.
    #[error("invalid busybus object format")]
    ObjInvFmt,

    /// A frame's declared payload would overflow the maximum payload size.
    #[error("not enough space in buffer")]
    NoSpace,

    /// The peer closed the connection.
    #[error("connection closed by remote peer")]
    ConnClosed,

    /// A frame's meta/object payload was structurally invalid.
    #[error("invalid message format")]
    MsgInvFmt,

    /// A frame's magic number didn't match.
    #[error("wrong magic number in received message")]
    MsgMagic,

    /// A frame arrived with a message type invalid for the sender's role.
    #[error("received message of incorrect type")]
    MsgInvTypeRcvd,

    /// A session-open request was rejected.
    #[error("session open rejected")]
    SoRjctd,

    /// Fewer bytes were written than intended.
    #[error("didn't manage to send all data")]
    SentLess,

    /// Fewer bytes were read than the header declared.
    #[error("received less data than expected")]
    RcvdLess,

    /// An internal invariant was violated (a bug, not a peer fault).
    #[error("internal logic error")]
    LogicErr,

    /// No method is registered at the requested path.
    #[error("no such method")]
    NoMethod,

    /// A built-in or provider method returned an error.
    #[error("internal method error")]
    MethodErr,

    /// Registering a method failed (duplicate path or malformed descriptor).
    #[error("error registering the method")]
    MRegErr,

    /// A client attempted an operation its session-open role doesn't permit.
    #[error("client unauthorized")]
    CliUnauth,

    /// A readiness-wait was interrupted by a signal and should be retried.
    /// Tokio's reactor absorbs `EINTR` internally, so this variant exists for
    /// taxonomy completeness but is not constructed by this crate.
    #[error("poll interrupted by a signal")]
    PollIntr,

    /// Invalid key type for a hashmap. The source's hand-rolled hash map
    /// could be handed an invalid key type; `std::collections::HashMap` has
    /// no such failure mode, so this variant exists for taxonomy
    /// completeness but is not constructed by this crate.
    #[error("invalid key type for this map")]
    HmapInvType,

    /// Invalid regex pattern. No regex-based matching exists on this code
    /// path; kept for taxonomy completeness but not constructed.
    #[error("invalid regex pattern")]
    RegexPtrn,
}

impl From<busybus_proto::ProtocolError> for Error {
    fn from(e: busybus_proto::ProtocolError) -> Self {
        match e {
            busybus_proto::ProtocolError::MsgMagic => Self::MsgMagic,
            busybus_proto::ProtocolError::RcvdLess { .. } => Self::RcvdLess,
            busybus_proto::ProtocolError::SentLess { .. } => Self::SentLess,
            busybus_proto::ProtocolError::ConnClosed => Self::ConnClosed,
            busybus_proto::ProtocolError::MsgInvFmt => Self::MsgInvFmt,
            busybus_proto::ProtocolError::ObjInvFmt => Self::ObjInvFmt,
            busybus_proto::ProtocolError::NoSpace => Self::NoSpace,
        }
    }
}

/// Result alias for `busybus-core` operations.
pub type Result<T> = std::result::Result<T, Error>;
