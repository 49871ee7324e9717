//! Expansion firmware — main entry point.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  EspUart        EspHotplug     RpcBridge      NvsAdapter       │
//! │  (SerialPort)   (DetectPort)   (RpcEngine)    (SettingsPort)   │
//! │  LogEventSink (EventSink)                                      │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │            Expansion (lifecycle controller)            │    │
//! │  │  worker thread · session state machine · RPC tunnel    │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use log::{info, warn};

use expansion::adapters::log_sink::LogEventSink;
use expansion::adapters::nvs::NvsAdapter;
use expansion::adapters::rpc_bridge::{EchoHandler, RpcBridge, RpcHandler};
use expansion::config::LinkConfig;
use expansion::drivers::hotplug::EspHotplug;
use expansion::drivers::uart::EspUart;
use expansion::Expansion;

/// Concurrent RPC sessions the bridge serves (one per expansion link).
const RPC_MAX_SESSIONS: usize = 1;

/// Period of the idle status line.
const STATUS_INTERVAL: Duration = Duration::from_secs(60);

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  Expansion v{}                       ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    // ── 2. Settings store ─────────────────────────────────────
    let mut nvs = match NvsAdapter::new() {
        Ok(n) => n,
        Err(e) => {
            // Without NVS the service stays off; nothing selects a UART.
            warn!("NVS init failed ({}), expansion service not started", e);
            return Ok(());
        }
    };

    // ── 3. Adapters ───────────────────────────────────────────
    let rpc = Arc::new(RpcBridge::new(
        RPC_MAX_SESSIONS,
        Box::new(|| -> Box<dyn RpcHandler> { Box::new(EchoHandler) }),
    ));
    let service = Expansion::new(
        EspUart::new(),
        EspHotplug::new(),
        rpc,
        LinkConfig::default(),
        Box::new(LogEventSink::new()),
    );

    // ── 4. Boot sequence ──────────────────────────────────────
    if let Err(e) = service.on_system_start(&mut nvs) {
        warn!("Expansion: boot settings not applied: {}", e);
    }
    info!("Expansion: {:?} on {:?}", service.state(), service.uart());

    // ── 5. Idle ───────────────────────────────────────────────
    // The service runs on its own threads; main only reports status.
    loop {
        std::thread::sleep(STATUS_INTERVAL);
        info!("Expansion: {:?}", service.state());
    }
}
