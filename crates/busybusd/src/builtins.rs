//! In-process (built-in) method hosting.
//!
//! Registration goes through the same [`busybus_core::ServiceTree::insert`]
//! path used for remote methods; only the provider tag differs
//! ([`busybus_core::Provider::Builtin`]). Invocation never touches a socket
//! and must not block the event loop.

use busybus_core::Error;
use busybus_proto::{build, parse, Object};
use bytes::Bytes;

/// Fully-qualified path of the daemon's only built-in method.
pub const ECHO_PATH: &str = "bbus.bbusd.echo";

/// Argument/return descriptor for `bbus.bbusd.echo`: one string in, the same
/// string out.
pub const ECHO_DESCR: &str = "s";

/// Invoke a built-in method by its fully-qualified path.
///
/// # Errors
/// [`Error::NoMethod`] if `path` names no built-in; [`Error::ObjInvFmt`] if
/// the argument object doesn't match `argdescr`.
pub fn invoke(path: &str, argdescr: &str, retdescr: &str, object: Option<Bytes>) -> Result<Object, Error> {
    match path {
        ECHO_PATH => {
            let mut obj = Object::from_buffer(object.unwrap_or_default().to_vec());
            let values = parse(&mut obj, argdescr)?;
            Ok(build(retdescr, &values)?)
        },
        _ => Err(Error::NoMethod),
    }
}
