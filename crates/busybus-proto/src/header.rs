//! Fixed 12-byte message header with zero-copy parsing.
//!
//! The `MsgHeader` is serialized as raw binary (Big Endian network byte
//! order). Every multi-byte field is stored as a byte array rather than a
//! native integer, so the struct can be cast directly from untrusted wire
//! bytes without any host-endianness surprises.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::error::{ProtocolError, Result};

/// Message types carried in the `msgtype` field of the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MsgType {
    /// Session open.
    So = 0x01,
    /// Session open confirmed.
    SoOk = 0x02,
    /// Session open rejected.
    SoRjct = 0x03,
    /// Register service.
    SrvReg = 0x04,
    /// Unregister service.
    SrvUnreg = 0x05,
    /// Service registered (or error).
    SrvAck = 0x06,
    /// Client calls a method.
    CliCall = 0x07,
    /// Server replies to a client.
    CliReply = 0x08,
    /// Client emits a signal.
    CliSig = 0x09,
    /// Server calls a registered method.
    SrvCall = 0x0A,
    /// Method provider replies.
    SrvReply = 0x0B,
    /// Server sends a signal to handlers.
    SrvSig = 0x0C,
    /// Client closes session.
    Close = 0x0D,
    /// Control message.
    Ctrl = 0x0E,
    /// Monitoring message.
    Mon = 0x0F,
}

impl MsgType {
    /// Map a raw byte to a known message type, if any.
    #[must_use]
    pub fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            0x01 => Self::So,
            0x02 => Self::SoOk,
            0x03 => Self::SoRjct,
            0x04 => Self::SrvReg,
            0x05 => Self::SrvUnreg,
            0x06 => Self::SrvAck,
            0x07 => Self::CliCall,
            0x08 => Self::CliReply,
            0x09 => Self::CliSig,
            0x0A => Self::SrvCall,
            0x0B => Self::SrvReply,
            0x0C => Self::SrvSig,
            0x0D => Self::Close,
            0x0E => Self::Ctrl,
            0x0F => Self::Mon,
            _ => return None,
        })
    }
}

/// Session-open subtypes carried in the `sotype` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SoType {
    /// Not a session-open message.
    None = 0x00,
    /// Method caller.
    Caller = 0x01,
    /// Service provider.
    Service = 0x02,
    /// Message monitor.
    Monitor = 0x03,
    /// Control program.
    Control = 0x04,
}

impl SoType {
    /// Map a raw byte to a known session-open subtype, if any.
    #[must_use]
    pub fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            0x00 => Self::None,
            0x01 => Self::Caller,
            0x02 => Self::Service,
            0x03 => Self::Monitor,
            0x04 => Self::Control,
            _ => return None,
        })
    }
}

/// Protocol error codes carried in the `errcode` field of a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ErrCode {
    /// Success.
    Good = 0x00,
    /// No such method.
    NoMethod = 0x01,
    /// Error calling the method.
    MethodErr = 0x02,
    /// Error registering the method.
    MRegErr = 0x03,
}

impl ErrCode {
    /// Map a raw byte to a known error code, if any.
    #[must_use]
    pub fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            0x00 => Self::Good,
            0x01 => Self::NoMethod,
            0x02 => Self::MethodErr,
            0x03 => Self::MRegErr,
            _ => return None,
        })
    }
}

/// Flag bits carried in the `flags` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Flags(u8);

impl Flags {
    /// Payload carries a meta string.
    pub const HAS_META: u8 = 1 << 0;
    /// Payload carries a marshalled object.
    pub const HAS_OBJECT: u8 = 1 << 1;

    /// Build flags from a raw byte.
    #[must_use]
    pub fn from_byte(b: u8) -> Self {
        Self(b)
    }

    /// Raw byte representation.
    #[must_use]
    pub fn to_byte(self) -> u8 {
        self.0
    }

    /// Whether the given bit is set.
    #[must_use]
    pub fn is_set(self, bit: u8) -> bool {
        self.0 & bit != 0
    }

    /// Set the given bit.
    pub fn set(&mut self, bit: u8) {
        self.0 |= bit;
    }
}

/// Fixed 12-byte frame header (Big Endian network byte order).
///
/// Field layout, in wire order:
///
/// | Offset | Size | Field |
/// |---|---|---|
/// | 0 | 2 | magic |
/// | 2 | 1 | msgtype |
/// | 3 | 1 | sotype |
/// | 4 | 1 | errcode |
/// | 5 | 4 | token |
/// | 9 | 2 | payload_size |
/// | 11 | 1 | flags |
///
/// # Security
///
/// `#[repr(C, packed)]` plus `zerocopy` means every 12-byte pattern is a
/// valid `MsgHeader`: casting untrusted network bytes to this type cannot
/// produce undefined behavior. Validation (magic, payload bound) happens
/// explicitly in [`MsgHeader::from_bytes`], after the cast.
#[repr(C, packed)]
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct MsgHeader {
    magic: [u8; 2],
    msgtype: u8,
    sotype: u8,
    errcode: u8,
    token: [u8; 4],
    payload_size: [u8; 2],
    flags: u8,
}

impl MsgHeader {
    /// Size of the serialized header in bytes.
    pub const SIZE: usize = 12;

    /// Busybus magic number (`0xBB 0xC5`).
    pub const MAGIC: [u8; 2] = [0xBB, 0xC5];

    /// Largest payload a single message may carry.
    pub const MAX_PAYLOAD_SIZE: u16 = 4096;

    /// Build a header with the given message type and error code, all other
    /// fields zeroed.
    #[must_use]
    pub fn build(msgtype: MsgType, errcode: ErrCode) -> Self {
        Self {
            magic: Self::MAGIC,
            msgtype: msgtype as u8,
            sotype: SoType::None as u8,
            errcode: errcode as u8,
            token: [0; 4],
            payload_size: [0; 2],
            flags: 0,
        }
    }

    /// Parse a header from network bytes (zero-copy).
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::RcvdLess`] if fewer than [`Self::SIZE`] bytes are
    ///   available.
    /// - [`ProtocolError::MsgMagic`] if the magic number doesn't match.
    pub fn from_bytes(bytes: &[u8]) -> Result<&Self> {
        let header = Self::ref_from_prefix(bytes)
            .map_err(|_| ProtocolError::RcvdLess { expected: Self::SIZE, actual: bytes.len() })?
            .0;

        if header.magic != Self::MAGIC {
            return Err(ProtocolError::MsgMagic);
        }

        Ok(header)
    }

    /// Serialize this header to its wire representation.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let bytes = IntoBytes::as_bytes(self);
        let mut arr = [0u8; Self::SIZE];
        arr.copy_from_slice(bytes);
        arr
    }

    /// Raw message type byte.
    #[must_use]
    pub fn msgtype_raw(&self) -> u8 {
        self.msgtype
    }

    /// Message type, if recognized.
    #[must_use]
    pub fn msgtype(&self) -> Option<MsgType> {
        MsgType::from_u8(self.msgtype)
    }

    /// Session-open subtype, if recognized.
    #[must_use]
    pub fn sotype(&self) -> Option<SoType> {
        SoType::from_u8(self.sotype)
    }

    /// Set the session-open subtype.
    pub fn set_sotype(&mut self, sotype: SoType) {
        self.sotype = sotype as u8;
    }

    /// Protocol error code, if recognized.
    #[must_use]
    pub fn errcode(&self) -> Option<ErrCode> {
        ErrCode::from_u8(self.errcode)
    }

    /// Correlation token in host byte order.
    #[must_use]
    pub fn token(&self) -> u32 {
        u32::from_be_bytes(self.token)
    }

    /// Set the correlation token (converted to network byte order).
    pub fn set_token(&mut self, token: u32) {
        self.token = token.to_be_bytes();
    }

    /// Declared payload size in host byte order.
    #[must_use]
    pub fn payload_size(&self) -> u16 {
        u16::from_be_bytes(self.payload_size)
    }

    /// Set the payload size, saturating at the backing type's maximum
    /// (`u16::MAX`) rather than panicking on an oversized length.
    pub fn set_payload_size(&mut self, size: usize) {
        let clamped = u16::try_from(size).unwrap_or(u16::MAX);
        self.payload_size = clamped.to_be_bytes();
    }

    /// Protocol flags.
    #[must_use]
    pub fn flags(&self) -> Flags {
        Flags::from_byte(self.flags)
    }

    /// Set a single flag bit.
    pub fn set_flag(&mut self, bit: u8) {
        self.flags |= bit;
    }

    /// Whether a given flag bit is set.
    #[must_use]
    pub fn is_flag_set(&self, bit: u8) -> bool {
        self.flags & bit != 0
    }
}

impl std::fmt::Debug for MsgHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MsgHeader")
            .field("magic", &format!("{:#06x}", u16::from_be_bytes(self.magic)))
            .field("msgtype", &self.msgtype_raw())
            .field("sotype", &self.sotype)
            .field("errcode", &self.errcode)
            .field("token", &self.token())
            .field("payload_size", &self.payload_size())
            .field("flags", &self.flags())
            .finish()
    }
}

impl PartialEq for MsgHeader {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for MsgHeader {}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn header_size_is_twelve() {
        assert_eq!(std::mem::size_of::<MsgHeader>(), MsgHeader::SIZE);
        assert_eq!(MsgHeader::SIZE, 12);
    }

    #[test]
    fn reject_short_buffer() {
        let short = [0u8; 8];
        assert_eq!(
            MsgHeader::from_bytes(&short),
            Err(ProtocolError::RcvdLess { expected: 12, actual: 8 })
        );
    }

    #[test]
    fn reject_bad_magic() {
        let mut buf = [0u8; 12];
        buf[0..2].copy_from_slice(&[0x00, 0x00]);
        assert_eq!(MsgHeader::from_bytes(&buf), Err(ProtocolError::MsgMagic));
    }

    #[test]
    fn payload_size_saturates() {
        let mut hdr = MsgHeader::build(MsgType::CliCall, ErrCode::Good);
        hdr.set_payload_size(usize::from(u16::MAX) + 500);
        assert_eq!(hdr.payload_size(), u16::MAX);
    }

    #[test]
    fn flags_round_trip() {
        let mut hdr = MsgHeader::build(MsgType::CliCall, ErrCode::Good);
        assert!(!hdr.is_flag_set(Flags::HAS_META));
        hdr.set_flag(Flags::HAS_META);
        assert!(hdr.is_flag_set(Flags::HAS_META));
        assert!(!hdr.is_flag_set(Flags::HAS_OBJECT));
    }

    proptest! {
        #[test]
        fn header_round_trip(
            msgtype in 0x01u8..=0x0F,
            sotype in 0x00u8..=0x04,
            errcode in 0x00u8..=0x03,
            token in any::<u32>(),
            payload_size in 0u16..=MsgHeader::MAX_PAYLOAD_SIZE,
            flags in any::<u8>(),
        ) {
            let mut hdr = MsgHeader::build(
                MsgType::from_u8(msgtype).unwrap(),
                ErrCode::from_u8(errcode).unwrap(),
            );
            hdr.set_sotype(SoType::from_u8(sotype).unwrap());
            hdr.set_token(token);
            hdr.set_payload_size(payload_size as usize);
            hdr.flags = flags;

            let bytes = hdr.to_bytes();
            let parsed = MsgHeader::from_bytes(&bytes).unwrap();

            prop_assert_eq!(parsed.token(), token);
            prop_assert_eq!(parsed.payload_size(), payload_size);
            prop_assert_eq!(parsed.flags().to_byte(), flags);
            prop_assert_eq!(parsed.msgtype_raw(), msgtype);
        }
    }
}
