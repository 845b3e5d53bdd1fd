//! The single-task, lock-free event loop.
//!
//! Exactly one `select!` drives the whole daemon: new connections, one
//! readiness wait across every live socket, signal handling, and a periodic
//! tick. No connection's state is ever touched from more than one place at
//! once, so nothing here needs an `Arc`, a `Mutex`, or a second task.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::time::Duration;

use busybus_core::{Action, CloseReason, Provider};
use busybus_proto::{ErrCode, Frame, MsgHeader, MsgType};
use futures::future::select_all;
use tokio::net::UnixStream;
use tokio::signal::unix::{signal, SignalKind};
use tokio::time::MissedTickBehavior;

use crate::auth::{self, AuthHook};
use crate::connections::Connections;
use crate::dispatcher::{Dispatcher, Outbound};
use crate::error::DaemonError;
use crate::transport::{self, Credentials};

const TICK: Duration = Duration::from_millis(500);

/// Run the daemon until `SIGTERM` or `SIGINT`, listening on `sockpath`.
///
/// Equivalent to [`run_with_auth`] with [`auth::allow_all`].
///
/// # Errors
/// Propagates a failure to bind the listening socket or install the signal
/// handlers.
pub async fn run(sockpath: &Path) -> Result<(), DaemonError> {
    run_with_auth(sockpath, auth::allow_all).await
}

/// Run the daemon, consulting `authorize` at each session-open handshake.
///
/// # Errors
/// Propagates a failure to bind the listening socket or install the signal
/// handlers.
pub async fn run_with_auth(sockpath: &Path, authorize: AuthHook) -> Result<(), DaemonError> {
    let listener = transport::bind_listener(sockpath)?;
    tracing::info!(path = %sockpath.display(), "busybusd listening");

    let mut connections = Connections::new();
    let mut dispatcher = Dispatcher::new();

    let mut tick = tokio::time::interval(TICK);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    loop {
        tokio::select! {
            biased;

            _ = sigterm.recv() => {
                tracing::info!("received SIGTERM, shutting down");
                break;
            }
            _ = sigint.recv() => {
                tracing::info!("received SIGINT, shutting down");
                break;
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, _addr)) => accept_connection(&mut connections, stream),
                    Err(e) => tracing::warn!(error = %e, "accept failed"),
                }
            }
            ready_id = wait_readable(&connections) => {
                process_connection(&mut connections, &mut dispatcher, ready_id, authorize).await;
            }
            _ = tick.tick() => {
                // No idle-timeout policy is enforced yet; the tick exists as
                // the one place periodic bookkeeping would hook in.
            }
        }
    }

    transport::unlink_sockpath(sockpath);
    Ok(())
}

fn accept_connection(connections: &mut Connections, stream: UnixStream) {
    let credentials = match transport::peer_credentials(&stream) {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(error = %e, "failed to read peer credentials; proceeding with defaults");
            Credentials::default()
        },
    };
    let id = connections.insert(stream, credentials);
    tracing::debug!(conn = id, pid = credentials.pid, uid = credentials.uid, "accepted connection");
}

/// Wait for the first live connection to become readable, returning its id.
///
/// Resolves to a pending future forever when there are no connections, so
/// this arm of the `select!` simply never fires until one is accepted.
async fn wait_readable(connections: &Connections) -> u64 {
    if connections.is_empty() {
        return std::future::pending().await;
    }

    let futs: Vec<Pin<Box<dyn Future<Output = u64> + '_>>> = connections
        .ids()
        .filter_map(|id| {
            connections.get(id).map(|slot| {
                let fut: Pin<Box<dyn Future<Output = u64> + '_>> = Box::pin(async move {
                    let _ = slot.stream.readable().await;
                    id
                });
                fut
            })
        })
        .collect();

    let (id, _, _) = select_all(futs).await;
    id
}

async fn process_connection(connections: &mut Connections, dispatcher: &mut Dispatcher, id: u64, authorize: AuthHook) {
    let Some(slot) = connections.get_mut(id) else { return };
    let frame = transport::read_frame(&mut slot.stream).await;

    let frame = match frame {
        Ok(f) => f,
        Err(e) => {
            tracing::debug!(conn = id, error = %e, "transport error reading frame; closing connection");
            close_connection(connections, dispatcher, id, CloseReason::TransportError).await;
            return;
        },
    };

    let Some(slot) = connections.get_mut(id) else { return };
    // The authorization hook only matters while the handshake is pending;
    // `Connection::handle_frame` ignores it once a role has been settled.
    let authorized = slot.conn.role().is_some() || authorize(&slot.credentials);
    let actions = slot.conn.handle_frame(frame, authorized);

    let mut outbound: Vec<(u64, Frame)> = Vec::new();
    let mut close_reason = None;

    for action in actions {
        match action {
            Action::Reply(frame) => outbound.push((id, frame)),
            Action::Dispatch(frame) => {
                for out in dispatcher.dispatch(id, frame) {
                    match out {
                        Outbound::ToConn(target, frame) => outbound.push((target, frame)),
                        Outbound::CloseConn(target) if target == id => {
                            close_reason = Some(CloseReason::MalformedRequest);
                        },
                        Outbound::CloseConn(target) => {
                            close_connection(connections, dispatcher, target, CloseReason::MalformedRequest).await;
                        },
                    }
                }
            },
            Action::Close(reason) => close_reason = Some(reason),
        }
    }

    for (target, frame) in outbound {
        send_frame(connections, dispatcher, target, frame).await;
    }

    if let Some(reason) = close_reason {
        close_connection(connections, dispatcher, id, reason).await;
    }
}

async fn send_frame(connections: &mut Connections, dispatcher: &mut Dispatcher, id: u64, frame: Frame) {
    let Some(slot) = connections.get_mut(id) else { return };
    if let Err(e) = transport::write_frame(&mut slot.stream, &frame).await {
        tracing::debug!(conn = id, error = %e, "write failed; closing connection");
        close_connection(connections, dispatcher, id, CloseReason::TransportError).await;
    }
}

/// Tear down connection `id`, notify anyone waiting on a call it was
/// servicing, and unregister any methods it provided.
async fn close_connection(connections: &mut Connections, dispatcher: &mut Dispatcher, id: u64, reason: CloseReason) {
    if let Some(mut slot) = connections.remove(id) {
        tracing::debug!(conn = id, ?reason, "closing connection");
        slot.conn.close();
        let _ = slot.stream.shutdown().await;
    }

    // This connection's own pending outbound calls simply vanish with it;
    // there's no one left to deliver a reply to.
    dispatcher.mux.drain_caller(id);

    for pending in dispatcher.mux.drain_provider(id) {
        let Some(caller_slot) = connections.get_mut(pending.caller_id) else { continue };
        let mut header = MsgHeader::build(MsgType::CliReply, ErrCode::MethodErr);
        header.set_token(pending.caller_token);
        let frame = Frame::new(header, None, None);
        if transport::write_frame(&mut caller_slot.stream, &frame).await.is_err() {
            tracing::debug!(conn = pending.caller_id, "failed to notify caller of vanished provider");
        }
    }

    for path in dispatcher.tree.remove_provider(Provider::Remote(id)) {
        tracing::debug!(conn = id, path = %path, "unregistered method for disconnected provider");
    }
}
