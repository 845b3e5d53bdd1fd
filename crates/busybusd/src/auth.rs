//! Accept-time client authorization hook.
//!
//! Mirrors `bbus_accept_authfunc` in the original library: a pluggable
//! predicate over the peer credentials captured at accept, consulted once
//! per connection while its `SO` frame is being handled. A `NULL` authfunc
//! in the source means "no authentication"; the same default is expressed
//! here as a hook that authorizes every peer.

use crate::transport::Credentials;

/// Decide whether a connection, identified by the credentials captured via
/// `SO_PEERCRED` at accept, may complete its session-open handshake.
///
/// Returning `false` causes the daemon to reply `SORJCT` and close the
/// connection, exactly as an unrecognized session-open subtype does.
pub type AuthHook = fn(&Credentials) -> bool;

/// The default hook: authorizes every peer.
///
/// Credential authentication beyond this hook point (e.g. consulting a
/// group membership or allow-list) is out of scope; this function is the
/// thin surface the core dispatch needs, matching a `NULL` `authfunc` in the
/// original library.
#[must_use]
pub fn allow_all(_credentials: &Credentials) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_hook_authorizes_every_peer() {
        assert!(allow_all(&Credentials::default()));
        assert!(allow_all(&Credentials { pid: 1234, uid: 0, gid: 0 }));
    }
}
