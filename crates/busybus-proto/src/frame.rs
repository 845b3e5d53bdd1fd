//! A complete wire frame: header plus an optional meta string and/or
//! marshalled object payload.

use bytes::{Bytes, BytesMut};

use crate::error::{ProtocolError, Result};
use crate::header::{Flags, MsgHeader};

/// A decoded or to-be-encoded frame.
///
/// The payload is split into an optional NUL-terminated meta string (method
/// paths, service descriptions, client names) and an optional marshalled
/// object, matching the `HAS_META`/`HAS_OBJECT` flag bits. Either, both, or
/// neither may be present depending on message type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The fixed header. `payload_size` and the `HAS_*` flags are kept in
    /// sync with `meta`/`object` by [`Frame::new`].
    pub header: MsgHeader,
    /// Optional meta string (method path, service descriptor, client name).
    pub meta: Option<String>,
    /// Optional marshalled object payload, as raw bytes.
    pub object: Option<Bytes>,
}

impl Frame {
    /// Build a frame, deriving the header's flags and payload size from
    /// `meta`/`object`.
    #[must_use]
    pub fn new(mut header: MsgHeader, meta: Option<String>, object: Option<Bytes>) -> Self {
        let mut size = 0usize;
        if let Some(m) = &meta {
            header.set_flag(Flags::HAS_META);
            size += m.len() + 1;
        }
        if let Some(o) = &object {
            header.set_flag(Flags::HAS_OBJECT);
            size += o.len();
        }
        header.set_payload_size(size);
        Self { header, meta, object }
    }

    /// Encode this frame to a flat byte buffer: header, then meta (if any,
    /// NUL-terminated), then object bytes (if any).
    ///
    /// # Errors
    ///
    /// [`ProtocolError::NoSpace`] if the declared payload would exceed
    /// [`MsgHeader::MAX_PAYLOAD_SIZE`].
    pub fn encode(&self) -> Result<Bytes> {
        let payload_size = usize::from(self.header.payload_size());
        if payload_size > usize::from(MsgHeader::MAX_PAYLOAD_SIZE) {
            return Err(ProtocolError::NoSpace);
        }

        let mut buf = BytesMut::with_capacity(MsgHeader::SIZE + payload_size);
        buf.extend_from_slice(&self.header.to_bytes());
        if let Some(meta) = &self.meta {
            buf.extend_from_slice(meta.as_bytes());
            buf.extend_from_slice(&[0]);
        }
        if let Some(object) = &self.object {
            buf.extend_from_slice(object);
        }
        Ok(buf.freeze())
    }

    /// Decode a frame from a complete buffer (header plus however many
    /// payload bytes the header declares). `bytes` must contain at least
    /// `header.payload_size()` bytes of payload past the header.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::RcvdLess`] if `bytes` is shorter than the header
    ///   plus its declared payload size.
    /// - [`ProtocolError::MsgInvFmt`] if `HAS_META` is set but no NUL
    ///   terminator is found within the payload.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let header = *MsgHeader::from_bytes(bytes)?;
        let payload_size = usize::from(header.payload_size());
        let total = MsgHeader::SIZE + payload_size;
        if bytes.len() < total {
            return Err(ProtocolError::RcvdLess { expected: total, actual: bytes.len() });
        }
        let mut payload = &bytes[MsgHeader::SIZE..total];

        let meta = if header.flags().is_set(Flags::HAS_META) {
            let nul = payload.iter().position(|&b| b == 0).ok_or(ProtocolError::MsgInvFmt)?;
            let s = std::str::from_utf8(&payload[..nul]).map_err(|_| ProtocolError::MsgInvFmt)?.to_owned();
            payload = &payload[nul + 1..];
            Some(s)
        } else {
            None
        };

        let object =
            if header.flags().is_set(Flags::HAS_OBJECT) { Some(Bytes::copy_from_slice(payload)) } else { None };

        Ok(Self { header, meta, object })
    }
}
