//! Connection table.
//!
//! Owns every accepted socket alongside the pure [`Connection`] state
//! machine that goes with it. Backed by a [`Slab`] rather than a
//! `HashMap<u64, _>`: ids are dense and a freed slot is reused by the next
//! accept, mirroring the same reuse `quinn-proto` (already pulled in
//! transitively by the reference stack's QUIC transport) uses for its own
//! connection handles, instead of growing a counter forever.

use busybus_core::{Connection, Role};
use slab::Slab;
use tokio::net::UnixStream;

use crate::transport::Credentials;

/// One accepted connection: the live socket, its state machine, and the
/// credentials captured at accept time.
pub struct ConnSlot {
    /// The live socket.
    pub stream: UnixStream,
    /// Pure per-connection state machine.
    pub conn: Connection,
    /// Credentials captured via `SO_PEERCRED` at accept.
    pub credentials: Credentials,
}

/// All live connections, keyed by a stable id assigned at accept.
#[derive(Default)]
pub struct Connections {
    slots: Slab<ConnSlot>,
}

impl Connections {
    /// Build an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept a freshly connected socket into the table, returning its id.
    pub fn insert(&mut self, stream: UnixStream, credentials: Credentials) -> u64 {
        let entry = self.slots.vacant_entry();
        let id = entry.key() as u64;
        entry.insert(ConnSlot { stream, conn: Connection::new(id), credentials });
        id
    }

    /// Borrow a connection by id.
    #[must_use]
    pub fn get(&self, id: u64) -> Option<&ConnSlot> {
        self.slots.get(id as usize)
    }

    /// Mutably borrow a connection by id.
    pub fn get_mut(&mut self, id: u64) -> Option<&mut ConnSlot> {
        self.slots.get_mut(id as usize)
    }

    /// Remove a connection, returning its slot for teardown.
    pub fn remove(&mut self, id: u64) -> Option<ConnSlot> {
        if self.slots.contains(id as usize) { Some(self.slots.remove(id as usize)) } else { None }
    }

    /// Every live connection id, in slab (roughly insertion) order.
    pub fn ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.slots.iter().map(|(k, _)| k as u64)
    }

    /// Whether any connection is currently live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Connections currently settled into the monitor role.
    ///
    /// Derived from each connection's role rather than tracked as a second
    /// list: monitor broadcast content is an unimplemented stub (no traffic
    /// is copied to monitors yet, per the protocol's open questions), so
    /// there is nothing this subset needs beyond knowing who's listening.
    pub fn monitor_ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.slots.iter().filter(|(_, slot)| slot.conn.role() == Some(Role::Monitor)).map(|(k, _)| k as u64)
    }
}
