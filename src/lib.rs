//! Accessory expansion service.
//!
//! Detects an add-on board on an expansion UART, negotiates the framed link
//! protocol with it and can tunnel the device's RPC channel over that link.
//! The pure-logic modules are exposed for integration testing; all
//! ESP-IDF-specific code is guarded by `#[cfg(target_os = "espidf")]`
//! within each module.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod drivers;
pub mod error;
pub mod pins;
pub mod protocol;
pub mod rpc;
pub mod session;

pub use app::service::{Expansion, ServiceState};
pub use error::{Error, Result};
