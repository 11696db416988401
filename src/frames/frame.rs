use bytes::{BufMut, Bytes, BytesMut};

use super::Opcode;
use crate::error::EncodeError;

// Byte 0
pub(crate) const FIN: u8 = 0b1000_0000;
pub(crate) const OPCODE_BITS: u8 = 0b0000_1111;
// Byte 1
pub(crate) const MASK: u8 = 0b1000_0000;
pub(crate) const LEN_BITS: u8 = 0b0111_1111;

/// Length indicator values that announce an extended length field.
pub(crate) const LEN_U16: u8 = 126;
pub(crate) const LEN_U64: u8 = 127;

/// A single WebSocket protocol unit.
///
/// Frames read off the wire always hold their payload unmasked, `masked` only records whether a
/// mask key was present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub fin: bool,
    pub opcode: Opcode,
    pub masked: bool,
    pub payload: Bytes,
}

impl Frame {
    #[must_use]
    pub fn new(opcode: Opcode, payload: impl Into<Bytes>) -> Self {
        Self {
            fin: true,
            opcode,
            masked: false,
            payload: payload.into(),
        }
    }

    #[must_use]
    pub fn text(payload: impl Into<Bytes>) -> Self { Self::new(Opcode::Text, payload) }

    #[must_use]
    pub fn binary(payload: impl Into<Bytes>) -> Self { Self::new(Opcode::Bin, payload) }

    #[must_use]
    pub fn close() -> Self { Self::new(Opcode::Close, Bytes::new()) }

    /// Serializes the frame the way a server sends it: FIN always set, never masked, and the
    /// length written in the smallest tier that fits.
    pub fn encode(&self) -> Result<Bytes, EncodeError> {
        let len = self.payload.len();
        let wire_len = u64::try_from(len).map_err(|_| EncodeError::TooLarge(len))?;

        tracing::trace!(opcode = ?self.opcode, len, "encoding frame");

        let mut buf = BytesMut::with_capacity(len + 10);
        buf.put_u8(FIN | (u8::from(self.opcode) & OPCODE_BITS));

        #[allow(clippy::cast_possible_truncation)]
        match wire_len {
            0..=125 => buf.put_u8(wire_len as u8),
            126..=0xFFFF => {
                buf.put_u8(LEN_U16);
                buf.put_u16(wire_len as u16);
            }
            _ => {
                buf.put_u8(LEN_U64);
                buf.put_u64(wire_len);
            }
        }

        buf.extend_from_slice(&self.payload);
        Ok(buf.freeze())
    }
}

#[cfg(test)]
mod tests {
    use paste::paste;

    use super::*;

    fn encoded_len_of(len: usize) -> Bytes { Frame::binary(vec![0xAB; len]).encode().unwrap() }

    #[test]
    fn server_frames_are_final_and_unmasked() {
        let bytes = Frame {
            fin: false,
            opcode: Opcode::Text,
            masked: true,
            payload: Bytes::from_static(b"hi"),
        }
        .encode()
        .unwrap();
        assert_eq!(&bytes[..], &[0x81, 0x02, b'h', b'i']);
    }

    #[test]
    fn close_frame_is_two_bytes() {
        assert_eq!(&Frame::close().encode().unwrap()[..], &[0x88, 0x00]);
    }

    #[test]
    fn reserved_opcode_is_written_raw() {
        let bytes = Frame::new(Opcode::Reserved(0x3), Bytes::new()).encode().unwrap();
        assert_eq!(bytes[0], 0x83);
    }

    #[test]
    fn len_125_has_no_extended_marker() {
        let bytes = encoded_len_of(125);
        assert_eq!(bytes[1], 125);
        assert_eq!(bytes.len(), 2 + 125);
    }

    #[test]
    fn len_126_uses_u16_tier() {
        let bytes = encoded_len_of(126);
        assert_eq!(bytes[1], LEN_U16);
        assert_eq!(&bytes[2..4], &126u16.to_be_bytes());
        assert_eq!(bytes.len(), 4 + 126);
    }

    #[test]
    fn len_65536_uses_u64_tier() {
        let bytes = encoded_len_of(65536);
        assert_eq!(bytes[1], LEN_U64);
        assert_eq!(&bytes[2..10], &65536u64.to_be_bytes());
        assert_eq!(bytes.len(), 10 + 65536);
    }

    macro_rules! tier_for_len {
        ($($len:expr => $header:expr),* $(,)?) => {
            $(paste! {
                #[test]
                fn [<header_len_for_ $len>]() {
                    let bytes = encoded_len_of($len);
                    assert_eq!(bytes.len() - $len, $header);
                    assert_eq!(bytes[0], FIN | u8::from(Opcode::Bin));
                    assert_eq!(bytes[1] & MASK, 0);
                }
            })*
        };
    }

    tier_for_len!(
        0 => 2,
        1 => 2,
        125 => 2,
        126 => 4,
        127 => 4,
        65535 => 4,
        65536 => 10,
    );
}
