//! Port traits — the hexagonal boundary between the expansion service and the
//! outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ Expansion (lifecycle + session)
//! ```
//!
//! Driven adapters (UART, hot-plug line, RPC engine, settings store, event
//! sinks) implement these traits.  The [`Expansion`](super::service::Expansion)
//! service consumes them via generics, so the session logic never touches a
//! peripheral directly and every path can be driven from host tests.
//!
//! ## Context notes
//!
//! - Hooks handed to [`SerialPort::set_receive_hook`] and
//!   [`DetectPort::arm`] may run in interrupt context.  They must not block,
//!   allocate or log.
//! - The [`RpcSendHook`] runs on whatever thread the RPC engine produces
//!   output from.  That is the worker itself when an engine answers from
//!   inside [`RpcEngine::feed`].

use core::fmt;
use core::time::Duration;
use std::sync::Arc;

use super::events::ExpansionEvent;
use crate::config::ExpansionSettings;
use crate::error::{RpcError, SettingsError, TransportError};

/// Hardware UART number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UartId(pub u8);

impl fmt::Display for UartId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UART{}", self.0)
    }
}

// ───────────────────────────────────────────────────────────────
// Serial port (driven adapter: wire ↔ worker)
// ───────────────────────────────────────────────────────────────

/// Called once per received byte, possibly from interrupt context.
pub type RxHook = Box<dyn Fn(u8) + Send + Sync>;

/// Exclusive UART binding used by the worker for one connection.
///
/// The worker is the only caller; it binds at connection start and unbinds
/// at connection end.
pub trait SerialPort: Send + 'static {
    /// Acquire `uart` and configure it for `baud`.
    fn bind(&mut self, uart: UartId, baud: u32) -> Result<(), TransportError>;

    /// Install (or with `None`, remove) the per-byte receive hook.
    fn set_receive_hook(&mut self, hook: Option<RxHook>);

    /// Reconfigure the bound UART's baud rate.
    fn set_baud(&mut self, baud: u32) -> Result<(), TransportError>;

    /// Write `data` in full.
    fn write(&mut self, data: &[u8]) -> Result<(), TransportError>;

    /// Release the UART.  Safe to call when nothing is bound.
    fn unbind(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Detection port (driven adapter: hot-plug line → lifecycle)
// ───────────────────────────────────────────────────────────────

/// Fired when activity is seen on the watched line.
pub type DetectHook = Arc<dyn Fn() + Send + Sync>;

/// Watches a UART's receive line for an accessory being attached.
pub trait DetectPort: Send + Sync + 'static {
    /// Start watching `uart`; `hook` fires on the first activity.
    ///
    /// Called with the service state lock held: `hook` must be invoked
    /// from another context, never from inside `arm`.
    fn arm(&self, uart: UartId, hook: DetectHook);

    /// Stop watching `uart`.  Safe to call when not armed.
    fn disarm(&self, uart: UartId);
}

// ───────────────────────────────────────────────────────────────
// RPC engine port (driven adapter: tunnel ↔ RPC subsystem)
// ───────────────────────────────────────────────────────────────

/// Receives every byte the RPC engine wants to send to the accessory.
pub type RpcSendHook = Box<dyn Fn(&[u8]) + Send + Sync>;

/// The system's RPC subsystem, seen from the tunnel.
pub trait RpcEngine: Send + Sync + 'static {
    /// One open RPC session.
    type Session: Send;

    /// Open a session whose output goes to `send`.
    fn open(&self, send: RpcSendHook) -> Result<Self::Session, RpcError>;

    /// Offer `data` to the session, waiting at most `timeout`.
    ///
    /// Returns how many bytes were accepted.
    fn feed(&self, session: &mut Self::Session, data: &[u8], timeout: Duration) -> usize;

    /// Close the session.  `send` is not called after this returns.
    fn close(&self, session: Self::Session);
}

// ───────────────────────────────────────────────────────────────
// Settings port (driven adapter: service ↔ persistent settings)
// ───────────────────────────────────────────────────────────────

/// Loads and persists the expansion settings blob.
pub trait SettingsPort {
    /// Load settings.  [`SettingsError::NotFound`] on first boot.
    fn load(&self) -> Result<ExpansionSettings, SettingsError>;

    /// Persist settings atomically.
    fn save(&mut self, settings: &ExpansionSettings) -> Result<(), SettingsError>;
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: service → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The service emits structured [`ExpansionEvent`]s through this port.
pub trait EventSink {
    fn emit(&mut self, event: &ExpansionEvent);
}
