//! Expansion link protocol: frame model, wire codec and outbound chunking.
//!
//! ```text
//! ┌──────────────┐ bytes ┌──────────┐ Frame ┌──────────────────┐
//! │  UART (rx)   │──────▶│  Codec   │──────▶│  Session (phase) │
//! └──────────────┘       └──────────┘       └──────────────────┘
//!        ▲                    ▲                      │
//!        │                    │ Frame                │ Status / Data
//!        └──── write ─────────┴──────────────────────┘
//! ```
//!
//! A frame is one discrete message: a baud-rate request, a control command,
//! an RPC data chunk or a status reply.  Exactly how it is laid out on the
//! wire is owned by [`codec`].

pub mod chunked;
pub mod codec;

use core::ops::Deref;

use heapless::Vec;

use crate::error::FrameError;

/// Largest Data payload a single frame can carry.
pub const MAX_PAYLOAD: usize = 64;

/// Commands carried by a Control frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ControlCommand {
    /// Open an RPC tunnel over the link.
    StartRpc = 0,
    /// Close the RPC tunnel and return to normal operation.
    StopRpc = 1,
}

impl ControlCommand {
    pub fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::StartRpc),
            1 => Some(Self::StopRpc),
            _ => None,
        }
    }
}

/// Error code carried by a Status frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StatusError {
    /// The previous frame was accepted.
    None = 0,
    /// The previous frame was rejected (malformed or out of phase).
    Unknown = 1,
}

impl StatusError {
    pub fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::None),
            1 => Some(Self::Unknown),
            _ => None,
        }
    }
}

/// Bounded Data payload.
///
/// Can only be built from at most [`MAX_PAYLOAD`] bytes, so an oversized
/// Data frame is unrepresentable past this point.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataPayload(Vec<u8, MAX_PAYLOAD>);

impl DataPayload {
    pub fn new(bytes: &[u8]) -> Result<Self, FrameError> {
        Vec::from_slice(bytes)
            .map(Self)
            .map_err(|()| FrameError::PayloadTooLarge(bytes.len()))
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }
}

impl Deref for DataPayload {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

/// One decoded protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Accessory asks to switch the link to this baud rate.
    BaudRate(u32),
    /// Session control (start/stop the RPC tunnel).
    Control(ControlCommand),
    /// RPC byte stream chunk.
    Data(DataPayload),
    /// Reply to the previous frame.
    Status(StatusError),
}

impl Frame {
    /// Build a Data frame, rejecting payloads over [`MAX_PAYLOAD`].
    pub fn data(bytes: &[u8]) -> Result<Self, FrameError> {
        DataPayload::new(bytes).map(Self::Data)
    }

    /// Short name for log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BaudRate(_) => "BaudRate",
            Self::Control(_) => "Control",
            Self::Data(_) => "Data",
            Self::Status(_) => "Status",
        }
    }
}
