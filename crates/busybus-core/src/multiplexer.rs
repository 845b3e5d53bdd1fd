//! Call multiplexer: allocates daemon-side correlation tokens for in-flight
//! remote calls and routes provider replies back to the waiting caller.

use std::collections::HashMap;

/// A call forwarded to a remote provider, awaiting its reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingCall {
    /// Connection id of the caller who is owed a reply.
    pub caller_id: u64,
    /// The token the caller used on its own `CLICALL` frame, which the
    /// eventual `CLIREPLY` must echo back so the caller can correlate it.
    pub caller_token: u32,
    /// Connection id of the provider the call was forwarded to, so a
    /// disconnect can be resolved to the calls it leaves stranded.
    pub provider_id: u64,
}

/// Tracks outstanding caller → provider calls, keyed by a daemon-allocated
/// token distinct from either peer's own token namespace.
#[derive(Debug, Default)]
pub struct Multiplexer {
    next_token: u32,
    pending: HashMap<u32, PendingCall>,
}

impl Multiplexer {
    /// Build an empty multiplexer. The first allocated token is `1`.
    #[must_use]
    pub fn new() -> Self {
        Self { next_token: 1, pending: HashMap::new() }
    }

    /// Allocate a fresh token and register a pending call under it.
    ///
    /// Tokens start at 1 and wrap past `u32::MAX` back to 1 (never 0), and
    /// allocation skips any token still live in the pending table, so a
    /// long-running daemon can never collide with a call still in flight.
    pub fn begin_call(&mut self, caller_id: u64, caller_token: u32, provider_id: u64) -> u32 {
        loop {
            let token = self.next_token;
            self.next_token = if self.next_token == u32::MAX { 1 } else { self.next_token + 1 };
            if !self.pending.contains_key(&token) {
                self.pending.insert(token, PendingCall { caller_id, caller_token, provider_id });
                return token;
            }
        }
    }

    /// Resolve a provider's reply token to the caller it's owed to,
    /// removing the pending entry.
    #[must_use]
    pub fn complete_call(&mut self, token: u32) -> Option<PendingCall> {
        self.pending.remove(&token)
    }

    /// Remove and return every call still pending on the given provider
    /// (called when that provider's connection closes).
    pub fn drain_provider(&mut self, provider_id: u64) -> Vec<PendingCall> {
        let tokens: Vec<u32> =
            self.pending.iter().filter(|(_, c)| c.provider_id == provider_id).map(|(t, _)| *t).collect();
        tokens.iter().filter_map(|t| self.pending.remove(t)).collect()
    }

    /// Remove every call pending on behalf of the given caller (called when
    /// that caller's connection closes, so a late provider reply finds
    /// nothing to route to).
    pub fn drain_caller(&mut self, caller_id: u64) {
        self.pending.retain(|_, c| c.caller_id != caller_id);
    }

    /// Number of calls currently in flight.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}
