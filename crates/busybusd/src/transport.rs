//! Unix-domain-socket transport.
//!
//! Bind/listen/accept, peer credential capture, and the vectored frame
//! read/write the pure state machine in `busybus-core` never touches
//! directly — this is the only module in the daemon that reads or writes a
//! socket.

use std::io::{self, IoSlice};
use std::os::fd::AsFd;
use std::path::Path;

use busybus_proto::{Frame, MsgHeader, ProtocolError};
use nix::sys::socket::sockopt::PeerCredentials;
use nix::sys::socket::getsockopt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};

use crate::error::DaemonError;

/// Credentials captured for a connection at accept time, via `SO_PEERCRED`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Credentials {
    /// Peer process id.
    pub pid: i32,
    /// Peer user id.
    pub uid: u32,
    /// Peer group id.
    pub gid: u32,
}

/// Largest socket path the daemon will bind to, matching `spec.md` §6.
pub const MAX_SOCKPATH_LEN: usize = 256;

/// Bind a listener at `path`, unlinking a stale socket file first (ignoring
/// absence).
///
/// # Errors
/// - [`DaemonError::SockpathTooLong`] if `path` exceeds [`MAX_SOCKPATH_LEN`]
///   bytes.
/// - Any I/O failure from unlinking (other than not-found) or from `bind`.
pub fn bind_listener(path: &Path) -> Result<UnixListener, DaemonError> {
    if path.as_os_str().len() > MAX_SOCKPATH_LEN {
        return Err(DaemonError::SockpathTooLong { limit: MAX_SOCKPATH_LEN });
    }

    match std::fs::remove_file(path) {
        Ok(()) => {},
        Err(e) if e.kind() == io::ErrorKind::NotFound => {},
        Err(e) => return Err(DaemonError::Io(e)),
    }
    Ok(UnixListener::bind(path)?)
}

/// Remove the socket file for a clean shutdown, ignoring absence.
pub fn unlink_sockpath(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "failed to unlink socket path on shutdown");
        }
    }
}

/// Capture the peer's credentials via `SO_PEERCRED`.
pub fn peer_credentials(stream: &UnixStream) -> Result<Credentials, DaemonError> {
    let creds =
        getsockopt(&stream.as_fd(), PeerCredentials).map_err(|e| DaemonError::Io(io::Error::from(e)))?;
    Ok(Credentials { pid: creds.pid(), uid: creds.uid(), gid: creds.gid() })
}

/// Read one complete frame off the wire: header, then however many payload
/// bytes it declares.
///
/// # Errors
/// - [`DaemonError::Protocol`]`(`[`ProtocolError::ConnClosed`]`)` if the peer
///   closed the connection before sending a header.
/// - [`DaemonError::Protocol`]`(`[`ProtocolError::RcvdLess`]`)` if the peer
///   closed mid-payload.
/// - [`DaemonError::Protocol`]`(`[`ProtocolError::MsgInvFmt`]`)` if the
///   header declares a payload larger than [`MsgHeader::MAX_PAYLOAD_SIZE`].
/// - [`DaemonError::Protocol`] for a bad magic number or malformed meta.
pub async fn read_frame(stream: &mut UnixStream) -> Result<Frame, DaemonError> {
    let mut header_buf = [0u8; MsgHeader::SIZE];
    if let Err(e) = stream.read_exact(&mut header_buf).await {
        return Err(if e.kind() == io::ErrorKind::UnexpectedEof {
            DaemonError::Protocol(ProtocolError::ConnClosed)
        } else {
            DaemonError::Io(e)
        });
    }

    let header = *MsgHeader::from_bytes(&header_buf)?;
    let payload_size = usize::from(header.payload_size());
    if payload_size > usize::from(MsgHeader::MAX_PAYLOAD_SIZE) {
        return Err(DaemonError::Protocol(ProtocolError::MsgInvFmt));
    }
    let mut payload = vec![0u8; payload_size];
    if payload_size > 0 {
        if let Err(e) = stream.read_exact(&mut payload).await {
            return Err(if e.kind() == io::ErrorKind::UnexpectedEof {
                DaemonError::Protocol(ProtocolError::RcvdLess { expected: payload_size, actual: 0 })
            } else {
                DaemonError::Io(e)
            });
        }
    }

    let mut whole = Vec::with_capacity(MsgHeader::SIZE + payload_size);
    whole.extend_from_slice(&header_buf);
    whole.extend_from_slice(&payload);
    Ok(Frame::decode(&whole)?)
}

/// Write one complete frame, vectored across header / meta / object.
///
/// A short write is fatal to the connection per the protocol's framing
/// contract ([`ProtocolError::SentLess`]); the caller closes the connection
/// on that error rather than retrying.
///
/// # Errors
/// [`DaemonError::Io`] on a write failure, [`DaemonError::Protocol`] if
/// fewer bytes were accepted than the frame's total size.
pub async fn write_frame(stream: &mut UnixStream, frame: &Frame) -> Result<(), DaemonError> {
    let header_bytes = frame.header.to_bytes();
    let meta_bytes = frame.meta.as_ref().map(|m| {
        let mut v = m.as_bytes().to_vec();
        v.push(0);
        v
    });

    let mut slices = vec![IoSlice::new(&header_bytes)];
    if let Some(m) = &meta_bytes {
        slices.push(IoSlice::new(m));
    }
    if let Some(o) = &frame.object {
        slices.push(IoSlice::new(o));
    }
    let total: usize = slices.iter().map(|s| s.len()).sum();

    let written = stream.write_vectored(&slices).await?;
    if written != total {
        return Err(DaemonError::Protocol(ProtocolError::SentLess { expected: total, actual: written }));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlong_sockpath_is_rejected_before_touching_the_filesystem() {
        let path: String = "/tmp/".to_string() + &"a".repeat(MAX_SOCKPATH_LEN);
        let err = bind_listener(Path::new(&path)).expect_err("path exceeds the limit");
        assert!(matches!(err, DaemonError::SockpathTooLong { limit } if limit == MAX_SOCKPATH_LEN));
    }

    #[tokio::test]
    async fn read_frame_rejects_oversized_declared_payload() {
        use busybus_proto::{ErrCode, MsgType};

        let (mut a, mut b) = UnixStream::pair().expect("socket pair");

        let mut header = MsgHeader::build(MsgType::CliCall, ErrCode::Good);
        header.set_payload_size(usize::from(MsgHeader::MAX_PAYLOAD_SIZE) + 1);
        a.write_all(&header.to_bytes()).await.expect("write oversized header");

        let err = read_frame(&mut b).await.expect_err("oversized payload must be rejected");
        assert!(matches!(err, DaemonError::Protocol(ProtocolError::MsgInvFmt)));
    }
}
