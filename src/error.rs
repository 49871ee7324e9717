//! Unified error types for the expansion service.
//!
//! Each concern gets a small `Copy` enum so errors can travel between the
//! worker, the lifecycle controller and the RPC tunnel without allocation.
//! None of these ever reach an end user: they end up as a lifecycle state
//! transition plus a log line.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Every fallible operation in the service funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A UART operation failed.
    Transport(TransportError),
    /// A frame could not be built or parsed.
    Frame(FrameError),
    /// Persisted settings could not be read or written.
    Settings(SettingsError),
    /// The worker thread could not be created.
    Spawn,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "transport: {e}"),
            Self::Frame(e) => write!(f, "frame: {e}"),
            Self::Settings(e) => write!(f, "settings: {e}"),
            Self::Spawn => write!(f, "worker thread spawn failed"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Transport errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// The UART is owned by someone else (console, another service).
    Busy,
    /// An operation was attempted with no UART bound.
    NotBound,
    /// The peripheral rejected the requested baud rate.
    UnsupportedBaud(u32),
    /// The driver failed to queue the outgoing bytes.
    WriteFailed,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Busy => write!(f, "UART busy"),
            Self::NotBound => write!(f, "UART not bound"),
            Self::UnsupportedBaud(baud) => write!(f, "unsupported baud rate {baud}"),
            Self::WriteFailed => write!(f, "UART write failed"),
        }
    }
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

// ---------------------------------------------------------------------------
// Frame errors
// ---------------------------------------------------------------------------

/// Reasons a frame is rejected at construction or on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// Data payload longer than [`MAX_PAYLOAD`](crate::protocol::MAX_PAYLOAD).
    PayloadTooLarge(usize),
    /// Header carried a frame type this codec does not know.
    UnknownType(u8),
    /// A Control or Status field carried an out-of-range value.
    InvalidField(u8),
    /// XOR checksum did not match the received bytes.
    Checksum { expected: u8, actual: u8 },
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PayloadTooLarge(len) => write!(f, "payload of {len} bytes too large"),
            Self::UnknownType(t) => write!(f, "unknown frame type 0x{t:02x}"),
            Self::InvalidField(v) => write!(f, "invalid field value 0x{v:02x}"),
            Self::Checksum { expected, actual } => {
                write!(f, "checksum mismatch (expected 0x{expected:02x}, got 0x{actual:02x})")
            }
        }
    }
}

impl From<FrameError> for Error {
    fn from(e: FrameError) -> Self {
        Self::Frame(e)
    }
}

/// Why a decode call did not yield a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// The byte source came up short (stop request or inactivity timeout).
    Incomplete,
    /// A full frame arrived but failed validation.
    Malformed(FrameError),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Incomplete => write!(f, "byte source ended mid-frame"),
            Self::Malformed(e) => write!(f, "malformed frame: {e}"),
        }
    }
}

impl From<FrameError> for DecodeError {
    fn from(e: FrameError) -> Self {
        Self::Malformed(e)
    }
}

// ---------------------------------------------------------------------------
// RPC errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcError {
    /// The engine has no free session slot.
    SessionLimit,
    /// The engine is not running.
    Unavailable,
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SessionLimit => write!(f, "no free RPC session"),
            Self::Unavailable => write!(f, "RPC engine unavailable"),
        }
    }
}

// ---------------------------------------------------------------------------
// Settings errors
// ---------------------------------------------------------------------------

/// Errors from [`SettingsPort`](crate::app::ports::SettingsPort) operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsError {
    /// Nothing stored yet (first boot).
    NotFound,
    /// Stored blob failed the version or deserialization check.
    Corrupted,
    /// Generic I/O error from the storage backend.
    IoError,
}

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "settings not found"),
            Self::Corrupted => write!(f, "settings corrupted"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl From<SettingsError> for Error {
    fn from(e: SettingsError) -> Self {
        Self::Settings(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Service-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
