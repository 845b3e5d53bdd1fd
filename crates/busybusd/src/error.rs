//! Daemon-level error type.
//!
//! Composes the protocol codec's errors, the core dispatch errors, and raw
//! I/O failures behind one enum so `?` works uniformly across transport,
//! framing, and routing code in this crate.

use thiserror::Error;

/// Errors the production event loop can encounter.
#[derive(Error, Debug)]
pub enum DaemonError {
    /// An OS-level I/O failure (bind, accept, read, write).
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A wire-framing or marshalled-object error.
    #[error(transparent)]
    Protocol(#[from] busybus_proto::ProtocolError),

    /// A core dispatch error (service tree, multiplexer).
    #[error(transparent)]
    Core(#[from] busybus_core::Error),

    /// The configured socket path exceeds [`crate::transport::MAX_SOCKPATH_LEN`].
    #[error("socket path exceeds {limit} bytes")]
    SockpathTooLong {
        /// The configured limit.
        limit: usize,
    },
}
