//! Pure, I/O-free per-connection state machine.
//!
//! A [`Connection`] only knows about frames in and [`Action`]s out; it never
//! touches a socket. The surrounding event loop is the sole place a byte is
//! ever read or written.

use busybus_proto::{ErrCode, Frame, MsgHeader, MsgType, SoType};

/// The role a connection settles into once its session-open handshake
/// succeeds. Mirrors [`busybus_proto::SoType`] minus the "not yet open"
/// case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Calls methods and awaits replies.
    Caller,
    /// Registers and serves methods.
    Service,
    /// Observes traffic passively.
    Monitor,
    /// Issues control messages.
    Control,
}

impl Role {
    fn from_sotype(sotype: SoType) -> Option<Self> {
        match sotype {
            SoType::Caller => Some(Self::Caller),
            SoType::Service => Some(Self::Service),
            SoType::Monitor => Some(Self::Monitor),
            SoType::Control => Some(Self::Control),
            SoType::None => None,
        }
    }
}

/// Lifecycle state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Waiting for the client's `SO` frame.
    AwaitingSessionOpen,
    /// Session open accepted; `Role` fixed for the connection's lifetime.
    Active(Role),
    /// The connection is being torn down; no further frames are processed.
    Closed,
}

/// Why a connection is being closed, for logging at the event loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The peer sent an explicit `CLOSE` frame.
    PeerRequested,
    /// The peer sent a message type its role doesn't permit.
    RoleViolation,
    /// The peer's `SO` frame carried an unrecognized session-open subtype.
    SessionOpenRejected,
    /// The transport reported EOF or an I/O error.
    TransportError,
    /// The idle timeout elapsed with no activity.
    IdleTimeout,
    /// A role-permitted frame's payload was malformed in a way the role gate
    /// can't catch (e.g. a `CLICALL` with no method path).
    MalformedRequest,
}

/// What the event loop should do in response to a [`Connection`] processing
/// one frame or tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Send `frame` back to this connection's peer.
    Reply(Frame),
    /// A role-permitted frame that needs routing through the service tree
    /// or call multiplexer; the event loop dispatches it and may itself
    /// produce further actions.
    Dispatch(Frame),
    /// Close this connection and tear down its resources.
    Close(CloseReason),
}

/// A single busybus connection's session state.
///
/// Generic over nothing: unlike the teacher's `Connection<I>`, busybus has no
/// per-connection timers that need a mockable clock beyond the event loop's
/// own tick, so idle-timeout bookkeeping lives in the event loop, which
/// stores last-activity as a plain value and calls [`Connection::check_idle`].
#[derive(Debug)]
pub struct Connection {
    id: u64,
    state: State,
    /// Client-provided name from the session-open meta string, kept for
    /// diagnostics only; busybus never re-transmits it.
    name: Option<String>,
}

impl Connection {
    /// Build a freshly accepted connection, awaiting its `SO` frame.
    #[must_use]
    pub fn new(id: u64) -> Self {
        Self { id, state: State::AwaitingSessionOpen, name: None }
    }

    /// This connection's id.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The role this connection settled into, if its handshake completed.
    #[must_use]
    pub fn role(&self) -> Option<Role> {
        match self.state {
            State::Active(role) => Some(role),
            _ => None,
        }
    }

    /// Whether this connection is closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state == State::Closed
    }

    /// The client-supplied name, if one was given at session-open.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Feed one received frame into the state machine.
    ///
    /// `authorized` is consulted only while awaiting the session-open frame
    /// (an accept-time authorization hook evaluated over the peer's
    /// credentials); it is ignored once the connection is active. Pass
    /// `true` when no such hook applies.
    ///
    /// Returns the action(s) the event loop must take. At most one
    /// [`Action::Close`] is ever returned, always last.
    #[must_use]
    pub fn handle_frame(&mut self, frame: Frame, authorized: bool) -> Vec<Action> {
        if self.state == State::Closed {
            return Vec::new();
        }

        match self.state {
            State::AwaitingSessionOpen => self.handle_session_open(frame, authorized),
            State::Active(role) => self.handle_active(role, frame),
            State::Closed => unreachable!(),
        }
    }

    fn handle_session_open(&mut self, frame: Frame, authorized: bool) -> Vec<Action> {
        let Some(MsgType::So) = frame.header.msgtype() else {
            self.state = State::Closed;
            return vec![Action::Close(CloseReason::RoleViolation)];
        };

        let Some(role) = frame.header.sotype().and_then(Role::from_sotype) else {
            return self.reject_session_open();
        };

        if !authorized {
            return self.reject_session_open();
        }

        self.name = frame.meta;
        self.state = State::Active(role);

        let reply = Frame::new(MsgHeader::build(MsgType::SoOk, ErrCode::Good), None, None);
        vec![Action::Reply(reply)]
    }

    /// Reply `SORJCT` and close: used both for an unrecognized session-open
    /// subtype and for an accept-time authorization hook returning
    /// unauthorized. The protocol treats both as the same failure.
    fn reject_session_open(&mut self) -> Vec<Action> {
        self.state = State::Closed;
        let reply = Frame::new(MsgHeader::build(MsgType::SoRjct, ErrCode::Good), None, None);
        vec![Action::Reply(reply), Action::Close(CloseReason::SessionOpenRejected)]
    }

    fn handle_active(&mut self, role: Role, frame: Frame) -> Vec<Action> {
        let Some(msgtype) = frame.header.msgtype() else {
            self.state = State::Closed;
            return vec![Action::Close(CloseReason::RoleViolation)];
        };

        if msgtype == MsgType::Close {
            self.state = State::Closed;
            return vec![Action::Close(CloseReason::PeerRequested)];
        }

        let permitted = match role {
            Role::Caller => matches!(msgtype, MsgType::CliCall),
            Role::Service => matches!(msgtype, MsgType::SrvReg | MsgType::SrvUnreg | MsgType::SrvReply),
            Role::Control => matches!(msgtype, MsgType::Ctrl),
            // A monitor only ever sends CLOSE; any other frame it sends is
            // silently discarded and the connection torn down.
            Role::Monitor => false,
        };

        if !permitted {
            self.state = State::Closed;
            return vec![Action::Close(CloseReason::RoleViolation)];
        }

        vec![Action::Dispatch(frame)]
    }

    /// Close the connection unconditionally (transport error, shutdown).
    pub fn close(&mut self) {
        self.state = State::Closed;
    }
}

#[cfg(test)]
mod tests {
    use busybus_proto::{ErrCode, MsgHeader, MsgType, SoType};

    use super::*;

    fn so_frame(sotype: SoType) -> Frame {
        let mut header = MsgHeader::build(MsgType::So, ErrCode::Good);
        header.set_sotype(sotype);
        Frame::new(header, None, None)
    }

    #[test]
    fn session_open_caller_accepted() {
        let mut conn = Connection::new(1);
        let actions = conn.handle_frame(so_frame(SoType::Caller), true);
        assert_eq!(actions.len(), 1);
        assert!(matches!(&actions[0], Action::Reply(f) if f.header.msgtype() == Some(MsgType::SoOk)));
        assert_eq!(conn.role(), Some(Role::Caller));
    }

    #[test]
    fn session_open_bad_sotype_rejected_and_closed() {
        let mut conn = Connection::new(1);
        let mut header = MsgHeader::build(MsgType::So, ErrCode::Good);
        header.set_sotype(SoType::None);
        let actions = conn.handle_frame(Frame::new(header, None, None), true);
        assert_eq!(actions.len(), 2);
        assert!(matches!(&actions[0], Action::Reply(f) if f.header.msgtype() == Some(MsgType::SoRjct)));
        assert!(matches!(actions[1], Action::Close(CloseReason::SessionOpenRejected)));
        assert!(conn.is_closed());
    }

    #[test]
    fn session_open_unauthorized_is_rejected_like_bad_sotype() {
        let mut conn = Connection::new(1);
        let actions = conn.handle_frame(so_frame(SoType::Caller), false);
        assert_eq!(actions.len(), 2);
        assert!(matches!(&actions[0], Action::Reply(f) if f.header.msgtype() == Some(MsgType::SoRjct)));
        assert!(matches!(actions[1], Action::Close(CloseReason::SessionOpenRejected)));
        assert!(conn.is_closed());
        assert_eq!(conn.role(), None);
    }

    #[test]
    fn non_so_frame_before_handshake_closes() {
        let mut conn = Connection::new(1);
        let frame = Frame::new(MsgHeader::build(MsgType::CliCall, ErrCode::Good), None, None);
        let actions = conn.handle_frame(frame, true);
        assert_eq!(actions, vec![Action::Close(CloseReason::RoleViolation)]);
    }

    #[test]
    fn caller_may_call_but_not_register() {
        let mut conn = Connection::new(1);
        conn.handle_frame(so_frame(SoType::Caller), true);

        let call = Frame::new(MsgHeader::build(MsgType::CliCall, ErrCode::Good), Some("a.b".into()), None);
        assert_eq!(conn.handle_frame(call.clone(), true), vec![Action::Dispatch(call)]);

        let reg = Frame::new(MsgHeader::build(MsgType::SrvReg, ErrCode::Good), Some("a.b,,".into()), None);
        assert_eq!(conn.handle_frame(reg, true), vec![Action::Close(CloseReason::RoleViolation)]);
    }

    #[test]
    fn monitor_only_accepts_close() {
        let mut conn = Connection::new(1);
        conn.handle_frame(so_frame(SoType::Monitor), true);

        let bogus = Frame::new(MsgHeader::build(MsgType::CliCall, ErrCode::Good), None, None);
        assert_eq!(conn.handle_frame(bogus, true), vec![Action::Close(CloseReason::RoleViolation)]);

        let mut conn = Connection::new(2);
        conn.handle_frame(so_frame(SoType::Monitor), true);
        let close = Frame::new(MsgHeader::build(MsgType::Close, ErrCode::Good), None, None);
        assert_eq!(conn.handle_frame(close, true), vec![Action::Close(CloseReason::PeerRequested)]);
    }

    #[test]
    fn peer_close_honored_in_every_role() {
        let mut conn = Connection::new(1);
        conn.handle_frame(so_frame(SoType::Service), true);
        let close = Frame::new(MsgHeader::build(MsgType::Close, ErrCode::Good), None, None);
        assert_eq!(conn.handle_frame(close, true), vec![Action::Close(CloseReason::PeerRequested)]);
        assert!(conn.is_closed());
    }

    #[test]
    fn frames_after_close_are_ignored() {
        let mut conn = Connection::new(1);
        conn.handle_frame(so_frame(SoType::Caller), true);
        conn.close();
        let call = Frame::new(MsgHeader::build(MsgType::CliCall, ErrCode::Good), Some("a.b".into()), None);
        assert_eq!(conn.handle_frame(call, true), Vec::new());
    }

    #[test]
    fn session_open_meta_is_stored_as_name() {
        let mut header = MsgHeader::build(MsgType::So, ErrCode::Good);
        header.set_sotype(SoType::Caller);
        let mut conn = Connection::new(1);
        conn.handle_frame(Frame::new(header, Some("my-client".into()), None), true);
        assert_eq!(conn.name(), Some("my-client"));
    }
}
