use std::{io, ops::Deref};

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};

use super::{
    Frame, Opcode,
    frame::{FIN, LEN_BITS, LEN_U16, MASK, OPCODE_BITS},
};
use crate::error::FrameError;

type Result<T> = std::result::Result<T, FrameError>;

const READ_CHUNK: usize = 8 * 1024;

/// Incremental frame parser: bytes are pushed in as they arrive and frames are pulled out once
/// complete.
///
/// The decoder is permissive. Reserved bits are ignored, unknown opcodes are kept, and masked or
/// unmasked frames are accepted whichever side sent them.
pub(crate) struct FrameDecoder {
    buf: BytesMut,
    state: DecodeState,
    ctx: DecodeContext,
    max_payload: Option<usize>,
}

#[derive(Debug, Clone, Copy)]
enum DecodeState {
    Header,
    ExtendedLen,
    Mask,
    Payload,
}

#[derive(Debug)]
struct DecodeContext {
    fin: bool,
    opcode: Opcode,
    masked: bool,
    len_indicator: u8,
    payload_len: usize,
    mask_key: [u8; 4],
}

impl FrameDecoder {
    pub(crate) fn new(max_payload: Option<usize>) -> Self {
        Self {
            buf: BytesMut::with_capacity(READ_CHUNK),
            state: DecodeState::Header,
            ctx: DecodeContext {
                fin: false,
                opcode: Opcode::Cont,
                masked: false,
                len_indicator: 0,
                payload_len: 0,
                mask_key: [0; 4],
            },
            max_payload,
        }
    }

    pub(crate) fn push_bytes(&mut self, bytes: &[u8]) { self.buf.extend_from_slice(bytes); }

    /// Returns the next complete frame, or `None` if more bytes are needed.
    pub(crate) fn next_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            let next_state = match self.state {
                DecodeState::Header => {
                    let Some([b0, b1]) = self.pop_n() else {
                        return Ok(None);
                    };
                    self.parse_header(b0, b1)?
                }
                DecodeState::ExtendedLen => match self.parse_extended_len()? {
                    Some(state) => state,
                    None => return Ok(None),
                },
                DecodeState::Mask => {
                    let Some(key) = self.pop_n() else {
                        return Ok(None);
                    };
                    self.ctx.mask_key = key;
                    DecodeState::Payload
                }
                DecodeState::Payload => {
                    let Some(frame) = self.parse_payload() else {
                        return Ok(None);
                    };
                    self.state = DecodeState::Header;
                    return Ok(Some(frame));
                }
            };
            tracing::trace!(from = ?self.state, to = ?next_state, "decoder state transition");
            self.state = next_state;
        }
    }

    fn parse_header(&mut self, b0: u8, b1: u8) -> Result<DecodeState> {
        // 0   | 1 2 3 | 4 5 6 7
        // Fin | Rsv   | Opcode
        if b0 & !(FIN | OPCODE_BITS) != 0 {
            tracing::trace!(byte = b0, "reserved bits set, ignoring");
        }
        // 0    | 1 2 3 4 5 6 7
        // Mask | Payload len
        let len_indicator = b1 & LEN_BITS;
        self.ctx = DecodeContext {
            fin: b0 & FIN != 0,
            opcode: Opcode::from(b0 & OPCODE_BITS),
            masked: b1 & MASK != 0,
            len_indicator,
            payload_len: usize::from(len_indicator),
            mask_key: [0; 4],
        };

        // 126 and 127 are markers, never literal lengths
        if len_indicator >= LEN_U16 {
            Ok(DecodeState::ExtendedLen)
        } else {
            self.check_len(u64::from(len_indicator))?;
            Ok(self.after_len())
        }
    }

    fn parse_extended_len(&mut self) -> Result<Option<DecodeState>> {
        let declared = if self.ctx.len_indicator == LEN_U16 {
            // 126 => 2 bytes extended (u16)
            let Some(len_bytes) = self.pop_n() else {
                return Ok(None);
            };
            u64::from(u16::from_be_bytes(len_bytes))
        } else {
            // 127 => 8 bytes extended (u64)
            let Some(len_bytes) = self.pop_n() else {
                return Ok(None);
            };
            u64::from_be_bytes(len_bytes)
        };

        self.ctx.payload_len = self.check_len(declared)?;
        Ok(Some(self.after_len()))
    }

    fn check_len(&self, declared: u64) -> Result<usize> {
        let too_large = |max| FrameError::TooLarge {
            len: declared,
            max,
        };
        let len = usize::try_from(declared).map_err(|_| too_large(usize::MAX))?;
        match self.max_payload {
            Some(max) if len > max => {
                tracing::trace!(len, max, "payload larger than maximum size");
                Err(too_large(max))
            }
            _ => Ok(len),
        }
    }

    fn after_len(&self) -> DecodeState {
        if self.ctx.masked {
            DecodeState::Mask
        } else {
            DecodeState::Payload
        }
    }

    fn parse_payload(&mut self) -> Option<Frame> {
        if self.buf.len() < self.ctx.payload_len {
            // grow with the bytes that actually arrive, never by the declared length
            self.buf
                .reserve((self.ctx.payload_len - self.buf.len()).min(READ_CHUNK));
            return None;
        }

        let mut payload = self.buf.split_to(self.ctx.payload_len);
        if self.ctx.masked {
            super::mask(&mut payload, self.ctx.mask_key);
        }

        tracing::trace!(
            opcode = ?self.ctx.opcode,
            fin = self.ctx.fin,
            payload_len = payload.len(),
            masked = self.ctx.masked,
            "frame decoded"
        );
        Some(Frame {
            fin: self.ctx.fin,
            opcode: self.ctx.opcode,
            masked: self.ctx.masked,
            payload: payload.freeze(),
        })
    }

    fn pop_n<const N: usize>(&mut self) -> Option<[u8; N]> {
        if N > self.buf.len() {
            return None;
        }
        self.buf.split_to(N).deref().try_into().ok()
    }
}

/// Pulls whole frames off an async byte stream.
///
/// A frame is only returned once every payload byte has arrived. The stream ending part way
/// through a frame, or before one starts, is an `UnexpectedEof` error.
pub(crate) struct FrameReader<R> {
    reader: R,
    decoder: FrameDecoder,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub(crate) fn new(reader: R, max_payload: Option<usize>) -> Self {
        Self {
            reader,
            decoder: FrameDecoder::new(max_payload),
            buf: vec![0; READ_CHUNK],
        }
    }

    pub(crate) async fn read_frame(&mut self) -> io::Result<Frame> {
        loop {
            if let Some(frame) = self
                .decoder
                .next_frame()
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?
            {
                return Ok(frame);
            }

            let n = self.reader.read(&mut self.buf).await?;
            if n == 0 {
                return Err(io::ErrorKind::UnexpectedEof.into());
            }
            tracing::trace!(bytes = n, "read socket");
            self.decoder.push_bytes(&self.buf[..n]);
        }
    }
}
