//! Outbound expansion events.
//!
//! The [`Expansion`](super::service::Expansion) service emits these through
//! the [`EventSink`](super::ports::EventSink) port.  Adapters on the other
//! side decide what to do with them: log to the console, update a status
//! indicator, count reconnects, etc.

use super::ports::UartId;
use super::service::ServiceState;
use crate::session::worker::ExitReason;

/// Structured events emitted by the lifecycle controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpansionEvent {
    /// The service moved between lifecycle states.
    StateChanged { from: ServiceState, to: ServiceState },

    /// An accessory was detected and a worker started on `uart`.
    ConnectionStarted { uart: UartId },

    /// The worker on `uart` finished.
    ConnectionClosed { uart: UartId, reason: ExitReason },
}
