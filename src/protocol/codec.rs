//! Frame codec — encode/decode over byte-oriented endpoints.
//!
//! Wire format:
//! ```text
//! ┌──────────┬─────────────────────────────┬──────────────┐
//! │ Type (1B)│ Body (type dependent)       │ Checksum (1B)│
//! └──────────┴─────────────────────────────┴──────────────┘
//!
//!  Status   = 2   body: error  (u8)
//!  BaudRate = 3   body: baud   (u32 LE)
//!  Control  = 4   body: command(u8)
//!  Data     = 5   body: len (u8, ≤ 64) + len bytes
//! ```
//!
//! The checksum is the XOR of every preceding byte of the frame.
//!
//! Decoding pulls from a blocking [`ByteSource`] exactly as many bytes as the
//! header says it needs, so a frame boundary is never crossed.  A short read
//! is reported as [`DecodeError::Incomplete`]; the source itself knows
//! whether that was a stop request or a timeout.

use heapless::Vec;

use super::{ControlCommand, DataPayload, Frame, MAX_PAYLOAD, StatusError};
use crate::error::{DecodeError, FrameError, TransportError};

const TYPE_STATUS: u8 = 2;
const TYPE_BAUD_RATE: u8 = 3;
const TYPE_CONTROL: u8 = 4;
const TYPE_DATA: u8 = 5;

/// Largest encoded frame: type + length + payload + checksum.
pub const MAX_FRAME_LEN: usize = 1 + 1 + MAX_PAYLOAD + 1;

/// Blocking pull side of a transport.
pub trait ByteSource {
    /// Fill as much of `buf` as possible.
    ///
    /// Blocks until `buf` is full or the source gives up; returns the
    /// number of bytes actually written.
    fn receive(&mut self, buf: &mut [u8]) -> usize;
}

/// Push side of a transport.
pub trait ByteSink {
    fn send(&mut self, data: &[u8]) -> Result<(), TransportError>;
}

/// Frame codec contract.
pub trait FrameCodec: Send + Sync {
    /// Serialise `frame` and hand the bytes to `sink` in a single call.
    fn encode(&self, frame: &Frame, sink: &mut impl ByteSink) -> Result<(), TransportError>;

    /// Pull exactly one frame out of `source`.
    fn decode(&self, source: &mut impl ByteSource) -> Result<Frame, DecodeError>;
}

/// The expansion link's frame layout.
#[derive(Debug, Clone, Copy, Default)]
pub struct WireCodec;

impl WireCodec {
    pub fn new() -> Self {
        Self
    }

    /// Serialise into a stack buffer.
    pub fn to_bytes(&self, frame: &Frame) -> Vec<u8, MAX_FRAME_LEN> {
        let mut out: Vec<u8, MAX_FRAME_LEN> = Vec::new();
        // Capacity is sized for the largest frame, pushes cannot fail.
        match frame {
            Frame::Status(error) => {
                let _ = out.push(TYPE_STATUS);
                let _ = out.push(*error as u8);
            }
            Frame::BaudRate(baud) => {
                let _ = out.push(TYPE_BAUD_RATE);
                let _ = out.extend_from_slice(&baud.to_le_bytes());
            }
            Frame::Control(command) => {
                let _ = out.push(TYPE_CONTROL);
                let _ = out.push(*command as u8);
            }
            Frame::Data(payload) => {
                let _ = out.push(TYPE_DATA);
                let _ = out.push(payload.len() as u8);
                let _ = out.extend_from_slice(payload);
            }
        }
        let sum = checksum(&out);
        let _ = out.push(sum);
        out
    }
}

impl FrameCodec for WireCodec {
    fn encode(&self, frame: &Frame, sink: &mut impl ByteSink) -> Result<(), TransportError> {
        sink.send(&self.to_bytes(frame))
    }

    fn decode(&self, source: &mut impl ByteSource) -> Result<Frame, DecodeError> {
        // Raw frame bytes, kept for the checksum.
        let mut raw: Vec<u8, MAX_FRAME_LEN> = Vec::new();

        let frame_type = read_into(source, &mut raw, 1)?[0];
        let frame = match frame_type {
            TYPE_STATUS => {
                let code = read_into(source, &mut raw, 1)?[0];
                Frame::Status(StatusError::from_u8(code).ok_or(FrameError::InvalidField(code))?)
            }
            TYPE_BAUD_RATE => {
                let bytes = read_into(source, &mut raw, 4)?;
                Frame::BaudRate(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
            }
            TYPE_CONTROL => {
                let code = read_into(source, &mut raw, 1)?[0];
                Frame::Control(ControlCommand::from_u8(code).ok_or(FrameError::InvalidField(code))?)
            }
            TYPE_DATA => {
                let len = read_into(source, &mut raw, 1)?[0] as usize;
                if len > MAX_PAYLOAD {
                    return Err(FrameError::PayloadTooLarge(len).into());
                }
                let bytes = read_into(source, &mut raw, len)?;
                Frame::Data(DataPayload::new(bytes)?)
            }
            other => return Err(FrameError::UnknownType(other).into()),
        };

        let expected = checksum(&raw);
        let mut actual = [0u8; 1];
        if source.receive(&mut actual) != 1 {
            return Err(DecodeError::Incomplete);
        }
        if actual[0] != expected {
            return Err(FrameError::Checksum {
                expected,
                actual: actual[0],
            }
            .into());
        }

        Ok(frame)
    }
}

/// Append `len` bytes from `source` to `raw` and return them.
fn read_into<'a>(
    source: &mut impl ByteSource,
    raw: &'a mut Vec<u8, MAX_FRAME_LEN>,
    len: usize,
) -> Result<&'a [u8], DecodeError> {
    let start = raw.len();
    // Callers never request more than the frame layout allows.
    raw.resize_default(start + len)
        .map_err(|()| DecodeError::Malformed(FrameError::PayloadTooLarge(len)))?;
    if source.receive(&mut raw[start..]) != len {
        return Err(DecodeError::Incomplete);
    }
    Ok(&raw[start..])
}

fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |acc, b| acc ^ b)
}

// ── Endpoint impls for in-memory buffers ────────────────────

impl<'a> ByteSource for &'a [u8] {
    fn receive(&mut self, buf: &mut [u8]) -> usize {
        let rest: &'a [u8] = *self;
        let n = buf.len().min(rest.len());
        buf[..n].copy_from_slice(&rest[..n]);
        *self = &rest[n..];
        n
    }
}

impl ByteSink for std::vec::Vec<u8> {
    fn send(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.extend_from_slice(data);
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────
