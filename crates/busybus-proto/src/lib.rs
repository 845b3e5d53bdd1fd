//! Wire framing and marshalled object codec for the busybus protocol.
//!
//! This crate is pure encode/decode logic: no sockets, no async runtime, no
//! global state. It's the layer both the daemon and any future client
//! implementation would share.

mod error;
mod frame;
mod header;
mod object;

pub use error::{ProtocolError, Result};
pub use frame::Frame;
pub use header::{ErrCode, Flags, MsgHeader, MsgType, SoType};
pub use object::{build, descr_valid, parse, repr, Object, Value};
