//! Pure protocol logic: the service tree, call multiplexer and per-connection
//! state machine. No sockets, no async runtime — the production event loop
//! in `busybusd` is the only consumer that touches I/O.

pub mod connection;
mod error;
pub mod multiplexer;
pub mod service_tree;

pub use connection::{Action, CloseReason, Connection, Role};
pub use error::{Error, Result};
pub use multiplexer::{Multiplexer, PendingCall};
pub use service_tree::{MethodEntry, Provider, ServiceTree};
