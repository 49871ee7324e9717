//! Link configuration and persisted expansion settings.
//!
//! [`LinkConfig`] holds the protocol timing and baud-rate parameters the
//! worker runs with; it is injected into the service so host tests can
//! shorten the inactivity window.  [`ExpansionSettings`] is the small blob
//! the settings store persists: which UART (if any) the service binds at boot.

use serde::{Deserialize, Serialize};

use crate::app::ports::UartId;

/// Baud rate every connection starts at.
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// The only rate the handshake accepts.
pub const NEGOTIATED_BAUD_RATE: u32 = 230_400;

/// Receive window after which an idle connection is torn down.
pub const INACTIVE_TIMEOUT_MS: u32 = 250;

/// Protocol timing and worker parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Baud rate the UART is bound at when a connection starts.
    pub default_baud: u32,
    /// Baud rate the accessory must request during the handshake.
    pub negotiated_baud: u32,
    /// Longest silence tolerated while waiting for input (milliseconds).
    pub inactivity_timeout_ms: u32,
    /// Bounded wait handed to the RPC engine per Data frame (milliseconds).
    pub rpc_feed_timeout_ms: u32,
    /// Longest time an RPC-thread write may wait for room in the outbound queue.
    pub outbound_timeout_ms: u32,
    /// Worker thread stack size (KiB).
    pub worker_stack_kb: usize,
    /// Worker thread FreeRTOS priority.
    pub worker_priority: u8,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            default_baud: DEFAULT_BAUD_RATE,
            negotiated_baud: NEGOTIATED_BAUD_RATE,
            inactivity_timeout_ms: INACTIVE_TIMEOUT_MS,
            rpc_feed_timeout_ms: INACTIVE_TIMEOUT_MS,
            outbound_timeout_ms: INACTIVE_TIMEOUT_MS,
            worker_stack_kb: 6,
            worker_priority: 10,
        }
    }
}

/// Persisted user selection.
///
/// `uart_index` is 0 when the service is switched off, otherwise the
/// selected UART plus one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpansionSettings {
    pub uart_index: u8,
}

impl ExpansionSettings {
    /// Settings that bind `uart` at boot (or nothing, for `None`).
    pub fn with_uart(uart: Option<UartId>) -> Self {
        Self {
            uart_index: uart.map_or(0, |id| id.0.saturating_add(1)),
        }
    }

    /// UART the service should be enabled on, if any.
    pub fn selected_uart(&self) -> Option<UartId> {
        self.uart_index.checked_sub(1).map(UartId)
    }
}
