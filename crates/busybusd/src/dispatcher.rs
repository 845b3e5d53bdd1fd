//! Glue between the pure per-connection state machine and the service tree
//! plus call multiplexer: turns one role-permitted [`Frame`] into zero or
//! more frames addressed to other connections.

use busybus_core::{MethodEntry, Multiplexer, Provider, ServiceTree};
use busybus_proto::{descr_valid, ErrCode, Frame, MsgHeader, MsgType};
use bytes::Bytes;

use crate::builtins;

/// One frame this dispatcher wants delivered, or a connection to close.
#[derive(Debug)]
pub enum Outbound {
    /// Send the given frame to the given connection id.
    ToConn(u64, Frame),
    /// Close the given connection: a malformed request the role gate let
    /// through (e.g. a `CLICALL` with no method path).
    CloseConn(u64),
}

/// Owns the service tree and call multiplexer: the stateful pieces of
/// routing logic that aren't per-connection.
pub struct Dispatcher {
    /// Dotted-path method registry.
    pub tree: ServiceTree,
    /// Caller ↔ provider call correlation.
    pub mux: Multiplexer,
}

impl Dispatcher {
    /// Build a dispatcher with the daemon's built-in methods already
    /// registered.
    #[must_use]
    pub fn new() -> Self {
        let mut tree = ServiceTree::new();
        let entry = MethodEntry {
            provider: Provider::Builtin,
            argdescr: builtins::ECHO_DESCR.to_string(),
            retdescr: builtins::ECHO_DESCR.to_string(),
        };
        if let Err(e) = tree.insert(builtins::ECHO_PATH, entry) {
            // Unreachable on a fresh tree; logged instead of unwrapped so a
            // future change to the built-in table can't panic the daemon.
            tracing::error!(error = ?e, "failed to register built-in method");
        }
        Self { tree, mux: Multiplexer::new() }
    }

    /// Route one already role-permitted frame from connection `from`.
    pub fn dispatch(&mut self, from: u64, frame: Frame) -> Vec<Outbound> {
        match frame.header.msgtype() {
            Some(MsgType::CliCall) => self.handle_clicall(from, frame),
            Some(MsgType::SrvReg) => self.handle_srvreg(from, frame),
            Some(MsgType::SrvUnreg) => self.handle_srvunreg(from, frame),
            Some(MsgType::SrvReply) => self.handle_srvreply(frame),
            Some(MsgType::Ctrl) => self.handle_ctrl(from, frame),
            // The connection state machine only ever dispatches the types
            // above for the roles that reach this point.
            _ => vec![Outbound::CloseConn(from)],
        }
    }

    fn handle_clicall(&mut self, from: u64, frame: Frame) -> Vec<Outbound> {
        let token = frame.header.token();
        let Some(path) = frame.meta else {
            tracing::error!(conn = from, "CLICALL with no method path; closing connection");
            return vec![Outbound::CloseConn(from)];
        };

        let Some(entry) = self.tree.locate(&path).cloned() else {
            return vec![Outbound::ToConn(from, cli_reply(token, ErrCode::NoMethod, None))];
        };

        match entry.provider {
            Provider::Builtin => match builtins::invoke(&path, &entry.argdescr, &entry.retdescr, frame.object) {
                Ok(obj) => {
                    let object = Bytes::from(obj.as_bytes().to_vec());
                    vec![Outbound::ToConn(from, cli_reply(token, ErrCode::Good, Some(object)))]
                },
                Err(_) => vec![Outbound::ToConn(from, cli_reply(token, ErrCode::MethodErr, None))],
            },
            Provider::Remote(provider_id) => {
                let method = path.rsplit('.').next().unwrap_or(path.as_str()).to_string();
                let mux_token = self.mux.begin_call(from, token, provider_id);
                let mut header = MsgHeader::build(MsgType::SrvCall, ErrCode::Good);
                header.set_token(mux_token);
                let object = frame.object.unwrap_or_default();
                let srvcall = Frame::new(header, Some(method), Some(object));
                vec![Outbound::ToConn(provider_id, srvcall)]
            },
        }
    }

    fn handle_srvreg(&mut self, from: u64, frame: Frame) -> Vec<Outbound> {
        let Some(meta) = frame.meta else {
            return vec![Outbound::ToConn(from, srv_ack(ErrCode::MRegErr))];
        };
        let mut parts = meta.splitn(3, ',');
        let (Some(path), Some(argdescr), Some(retdescr)) = (parts.next(), parts.next(), parts.next()) else {
            return vec![Outbound::ToConn(from, srv_ack(ErrCode::MRegErr))];
        };
        if descr_valid(argdescr).is_err() || descr_valid(retdescr).is_err() {
            return vec![Outbound::ToConn(from, srv_ack(ErrCode::MRegErr))];
        }

        let full_path = format!("bbus.{path}");
        let entry =
            MethodEntry { provider: Provider::Remote(from), argdescr: argdescr.to_string(), retdescr: retdescr.to_string() };
        let errcode = match self.tree.insert(&full_path, entry) {
            Ok(()) => ErrCode::Good,
            Err(_) => ErrCode::MRegErr,
        };
        vec![Outbound::ToConn(from, srv_ack(errcode))]
    }

    /// `SRVUNREG` is stubbed, matching the original daemon: acknowledged and
    /// logged, never mutating the tree. [`busybus_core::ServiceTree::remove_path`]
    /// exists for the real removal this would perform, intentionally left
    /// unwired (see `DESIGN.md`).
    fn handle_srvunreg(&mut self, from: u64, frame: Frame) -> Vec<Outbound> {
        tracing::warn!(
            conn = from,
            meta = ?frame.meta,
            "SRVUNREG is unimplemented; acknowledging without mutating the service tree"
        );
        vec![Outbound::ToConn(from, srv_ack(ErrCode::Good))]
    }

    fn handle_srvreply(&mut self, frame: Frame) -> Vec<Outbound> {
        let token = frame.header.token();
        let Some(pending) = self.mux.complete_call(token) else {
            tracing::warn!(token, "SRVREPLY with no matching pending call; dropping");
            return Vec::new();
        };
        let mut header = MsgHeader::build(MsgType::CliReply, ErrCode::Good);
        header.set_token(pending.caller_token);
        let reply = Frame::new(header, None, Some(frame.object.unwrap_or_default()));
        vec![Outbound::ToConn(pending.caller_id, reply)]
    }

    /// The control-message grammar is unimplemented; every `CTRL` frame is
    /// acknowledged without interpreting its payload.
    fn handle_ctrl(&mut self, from: u64, frame: Frame) -> Vec<Outbound> {
        tracing::info!(conn = from, meta = ?frame.meta, "received CTRL message (grammar unimplemented)");
        let mut header = MsgHeader::build(MsgType::Ctrl, ErrCode::Good);
        header.set_token(frame.header.token());
        vec![Outbound::ToConn(from, Frame::new(header, None, None))]
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

fn cli_reply(token: u32, errcode: ErrCode, object: Option<Bytes>) -> Frame {
    let mut header = MsgHeader::build(MsgType::CliReply, errcode);
    header.set_token(token);
    Frame::new(header, None, object)
}

fn srv_ack(errcode: ErrCode) -> Frame {
    Frame::new(MsgHeader::build(MsgType::SrvAck, errcode), None, None)
}
