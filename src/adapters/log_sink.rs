//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing expansion events to the ESP-IDF
//! logger (which goes to the console UART / USB-CDC in production).

use log::{info, warn};

use crate::app::events::ExpansionEvent;
use crate::app::ports::EventSink;
use crate::session::worker::ExitReason;

/// Adapter that logs every [`ExpansionEvent`] to the serial console.
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LogEventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &ExpansionEvent) {
        match event {
            ExpansionEvent::StateChanged { from, to } => {
                info!("EXPN | {:?} -> {:?}", from, to);
            }
            ExpansionEvent::ConnectionStarted { uart } => {
                info!("EXPN | accessory detected on {}", uart);
            }
            ExpansionEvent::ConnectionClosed { uart, reason } => match reason {
                ExitReason::Error => warn!("EXPN | {} closed on error", uart),
                _ => info!("EXPN | {} closed ({:?})", uart, reason),
            },
        }
    }
}
