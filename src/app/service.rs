//! Expansion service — the lifecycle controller.
//!
//! [`Expansion`] owns the service state, the UART binding and the worker
//! thread.  It exposes `enable`/`disable` to any thread, reacts to hot-plug
//! detection, and restores itself after a connection ends.  All I/O flows
//! through port traits, so the whole lifecycle runs against mock adapters.
//!
//! ```text
//!             enable(uart)                 on_detect()
//!  Disabled ───────────────▶ Enabled ─────────────────────▶ Running
//!     ▲                        ▲  ▲                            │
//!     │                        │  └──── worker exit: Timeout ──┤
//!     └────── disable() ───────┴─────── worker exit: Error ────┘
//! ```
//!
//! ## Locking
//!
//! - `control` serializes `enable`/`disable` and is held across the worker
//!   join.
//! - `inner` guards the state record and is only held for short, non-blocking
//!   transitions, never across a join.  A worker that times out can therefore
//!   always restore `Enabled` even while a `disable()` is waiting on it.
//! - Order: `control` → `inner` → `sink`.  The `serial` lock belongs to the
//!   worker for the duration of a connection.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::JoinHandle;

use log::{debug, error, info, warn};

use super::events::ExpansionEvent;
use super::ports::{DetectHook, DetectPort, EventSink, RpcEngine, SerialPort, SettingsPort, UartId};
use crate::config::{ExpansionSettings, LinkConfig};
use crate::drivers::task_pin::{Core, spawn_on_core};
use crate::error::{Error, SettingsError};
use crate::rpc::channels::LinkChannels;
use crate::session::worker::{self, ExitReason};

/// Coarse lifecycle state of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    /// No UART bound, no detection armed.
    Disabled,
    /// Detection armed, waiting for an accessory; no worker exists.
    Enabled,
    /// Exactly one worker is alive and owns the UART.
    Running,
}

struct Inner {
    state: ServiceState,
    uart: Option<UartId>,
    worker: Option<JoinHandle<()>>,
    /// Set while `disable()` is tearing down a running worker; the worker
    /// then leaves the final state to `disable()`.
    stop_requested: bool,
}

struct Shared<S, D, R> {
    control: Mutex<()>,
    inner: Mutex<Inner>,
    serial: Mutex<S>,
    detect: D,
    rpc: Arc<R>,
    channels: Arc<LinkChannels>,
    config: LinkConfig,
    sink: Mutex<Box<dyn EventSink + Send>>,
}

/// Recover the guard from a poisoned lock; the state record stays valid
/// across a panicking holder.
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ───────────────────────────────────────────────────────────────
// Expansion
// ───────────────────────────────────────────────────────────────

/// Handle to the expansion service.  Cheap to clone; every clone drives the
/// same service instance.
pub struct Expansion<S, D, R> {
    shared: Arc<Shared<S, D, R>>,
}

impl<S, D, R> Clone for Expansion<S, D, R> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S: SerialPort, D: DetectPort, R: RpcEngine> Expansion<S, D, R> {
    /// Build a disabled service.  Nothing is armed until [`enable`](Self::enable).
    pub fn new(
        serial: S,
        detect: D,
        rpc: Arc<R>,
        config: LinkConfig,
        sink: Box<dyn EventSink + Send>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                control: Mutex::new(()),
                inner: Mutex::new(Inner {
                    state: ServiceState::Disabled,
                    uart: None,
                    worker: None,
                    stop_requested: false,
                }),
                serial: Mutex::new(serial),
                detect,
                rpc,
                channels: Arc::new(LinkChannels::new()),
                config,
                sink: Mutex::new(sink),
            }),
        }
    }

    pub fn state(&self) -> ServiceState {
        lock(&self.shared.inner).state
    }

    /// UART selected by the last [`enable`](Self::enable), if any.
    pub fn uart(&self) -> Option<UartId> {
        lock(&self.shared.inner).uart
    }

    /// Boot-time entry point: apply the persisted selection.
    ///
    /// Missing or corrupted settings are replaced with defaults (service
    /// off).  On any error the service stays disabled.
    pub fn on_system_start(&self, settings: &mut impl SettingsPort) -> crate::Result<()> {
        match settings.load() {
            Ok(s) => {
                match s.selected_uart() {
                    Some(uart) => self.enable(uart),
                    None => info!("Expansion: disabled by settings"),
                }
                Ok(())
            }
            Err(e @ (SettingsError::NotFound | SettingsError::Corrupted)) => {
                warn!("Expansion: settings {}, writing defaults", e);
                settings.save(&ExpansionSettings::default())?;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Reset the service, then listen for an accessory on `uart`.
    pub fn enable(&self, uart: UartId) {
        let shared = &self.shared;
        let _control = lock(&shared.control);
        shared.disable_locked();

        let mut inner = lock(&shared.inner);
        inner.uart = Some(uart);
        inner.stop_requested = false;
        shared.transition(&mut inner, ServiceState::Enabled);
        shared.detect.arm(uart, Shared::detect_hook(shared));
        info!("Expansion: listening on {}", uart);
    }

    /// Stop any running connection and disarm detection.
    ///
    /// Blocks until the worker has exited, which takes at most one
    /// inactivity window plus one RPC feed timeout.
    pub fn disable(&self) {
        let _control = lock(&self.shared.control);
        self.shared.disable_locked();
    }

    /// Hot-plug entry point.  A no-op unless the service is `Enabled`.
    pub fn on_detect(&self) {
        Shared::on_detect(&self.shared);
    }
}

// ───────────────────────────────────────────────────────────────
// Shared internals
// ───────────────────────────────────────────────────────────────

impl<S: SerialPort, D: DetectPort, R: RpcEngine> Shared<S, D, R> {
    fn emit(&self, event: ExpansionEvent) {
        lock(&self.sink).emit(&event);
    }

    fn transition(&self, inner: &mut Inner, to: ServiceState) {
        let from = inner.state;
        if from != to {
            inner.state = to;
            self.emit(ExpansionEvent::StateChanged { from, to });
        }
    }

    fn detect_hook(this: &Arc<Self>) -> DetectHook {
        let weak: Weak<Self> = Arc::downgrade(this);
        Arc::new(move || {
            if let Some(shared) = weak.upgrade() {
                Shared::on_detect(&shared);
            }
        })
    }

    /// Body of `disable()`; the caller holds `control`.
    fn disable_locked(&self) {
        let (handle, uart) = {
            let mut inner = lock(&self.inner);
            match inner.state {
                ServiceState::Running => {
                    inner.stop_requested = true;
                    self.channels.request_stop();
                }
                // Disabled first, so a detection racing with us is a no-op.
                ServiceState::Enabled => self.transition(&mut inner, ServiceState::Disabled),
                ServiceState::Disabled => {}
            }
            (inner.worker.take(), inner.uart)
        };

        if let Some(handle) = handle {
            debug!("Expansion: waiting for worker");
            if handle.join().is_err() {
                error!("Expansion: worker panicked");
            }
        }
        // After the join: a timed-out worker may have re-armed detection.
        if let Some(uart) = uart {
            self.detect.disarm(uart);
        }

        let mut inner = lock(&self.inner);
        inner.stop_requested = false;
        self.transition(&mut inner, ServiceState::Disabled);
    }

    fn on_detect(this: &Arc<Self>) {
        let mut inner = lock(&this.inner);
        if inner.state != ServiceState::Enabled {
            debug!("Expansion: detect ignored in {:?}", inner.state);
            return;
        }
        let Some(uart) = inner.uart else {
            return;
        };

        // A previous worker that timed out has already finished its exit path.
        drop(inner.worker.take());
        this.channels.reset();
        inner.stop_requested = false;

        match Shared::spawn_worker(this, uart) {
            Ok(handle) => {
                inner.worker = Some(handle);
                this.transition(&mut inner, ServiceState::Running);
                this.emit(ExpansionEvent::ConnectionStarted { uart });
            }
            Err(e) => {
                // Still Enabled: keep listening so the next edge retries.
                error!("Expansion: {}", e);
                this.detect.arm(uart, Shared::detect_hook(this));
            }
        }
    }

    fn spawn_worker(this: &Arc<Self>, uart: UartId) -> crate::Result<JoinHandle<()>> {
        let shared = Arc::clone(this);
        spawn_on_core(
            Core::App,
            this.config.worker_priority,
            this.config.worker_stack_kb,
            "expansion\0",
            move || Shared::worker_main(&shared, uart),
        )
        .map_err(|e| {
            debug!("Expansion: spawn error: {}", e);
            Error::Spawn
        })
    }

    fn worker_main(this: &Arc<Self>, uart: UartId) {
        this.detect.disarm(uart);
        let exit = {
            let mut serial = lock(&this.serial);
            worker::run(uart, &mut *serial, &this.rpc, &this.channels, &this.config)
        };
        Shared::on_worker_exit(this, uart, exit);
    }

    fn on_worker_exit(this: &Arc<Self>, uart: UartId, exit: ExitReason) {
        let mut inner = lock(&this.inner);
        this.emit(ExpansionEvent::ConnectionClosed { uart, reason: exit });
        if inner.stop_requested {
            return;
        }

        match exit {
            ExitReason::Timeout => {
                this.transition(&mut inner, ServiceState::Enabled);
                this.detect.arm(uart, Shared::detect_hook(this));
            }
            ExitReason::Error | ExitReason::User | ExitReason::Unknown => {
                this.transition(&mut inner, ServiceState::Disabled);
            }
        }
    }
}
