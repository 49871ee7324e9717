//! Application core — the expansion lifecycle, zero direct I/O.
//!
//! This module holds the service that decides when a connection may run:
//! enable/disable, hot-plug reaction and recovery after a connection ends.
//! All interaction with hardware happens through **port traits** defined in
//! [`ports`], keeping this layer fully testable without real peripherals.

pub mod events;
pub mod ports;
pub mod service;
