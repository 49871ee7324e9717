//! Adapters — concrete implementations of the hexagonal port traits.
//!
//! | Adapter      | Implements   | Connects to                     |
//! |--------------|--------------|---------------------------------|
//! | `log_sink`   | EventSink    | Serial log output               |
//! | `nvs`        | SettingsPort | NVS / in-memory store           |
//! | `rpc_bridge` | RpcEngine    | Threaded RPC handler per session|
//!
//! The UART and hot-plug adapters live in [`crate::drivers`] because they
//! are ESP-IDF only.

pub mod log_sink;
pub mod nvs;
pub mod rpc_bridge;
