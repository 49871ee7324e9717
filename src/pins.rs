//! GPIO / peripheral pin assignments for the expansion connector.
//!
//! Single source of truth — the UART and hot-plug drivers reference this
//! module rather than hard-coding pin numbers.
//!
//! The connector exposes two UARTs.  Hot-plug detection watches the RX pin
//! of the selected UART: an attached accessory pulls it low with its first
//! start bit.

use crate::app::ports::UartId;

// ---------------------------------------------------------------------------
// UART1 — main expansion port
// ---------------------------------------------------------------------------

pub const EXPANSION_UART1_TX_GPIO: i32 = 17;
pub const EXPANSION_UART1_RX_GPIO: i32 = 18;

// ---------------------------------------------------------------------------
// UART2 — auxiliary expansion port
// ---------------------------------------------------------------------------

pub const EXPANSION_UART2_TX_GPIO: i32 = 43;
pub const EXPANSION_UART2_RX_GPIO: i32 = 44;

/// TX / RX pin pair routed to `uart`, or `None` if the connector does not
/// carry it (UART0 is the console).
pub const fn expansion_uart_pins(uart: UartId) -> Option<(i32, i32)> {
    match uart.0 {
        1 => Some((EXPANSION_UART1_TX_GPIO, EXPANSION_UART1_RX_GPIO)),
        2 => Some((EXPANSION_UART2_TX_GPIO, EXPANSION_UART2_RX_GPIO)),
        _ => None,
    }
}
