//! Inter-context channels for one expansion link.
//!
//! Uses `embassy-sync` bounded channels and a signal to bridge the three
//! execution contexts that touch a connection.  Nothing here allocates or
//! blocks on the producer side of the receive path.
//!
//! ```text
//! ┌──────────────┐  u8 (try_send)  ┌──────────────┐  DataPayload  ┌──────────────┐
//! │ UART rx hook │───────────────▶│    Worker    │◀──────────────│  RPC thread  │
//! │ (interrupt)  │                 │ (sole writer)│               │  (engine)    │
//! └──────────────┘                 └──────────────┘               └──────────────┘
//!                                    ▲        ▲
//!                  stop (Signal)     │        │ staged bytes (engine answering
//!                  ┌──────────────┐  │        │ inside feed, on the worker)
//!                  │   disable()  │──┘
//!                  └──────────────┘
//! ```
//!
//! Output an engine produces on the worker thread itself is staged in a
//! plain buffer instead of the bounded queue: the worker cannot drain the
//! queue while it is blocked inside the engine.

use core::mem;
use core::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Instant};
use futures_lite::future;

use crate::protocol::DataPayload;
use crate::protocol::codec::MAX_FRAME_LEN;

/// Receive buffer depth (bytes).
pub const RX_DEPTH: usize = 256;

/// Outbound chunk queue depth.
pub const TX_DEPTH: usize = 8;

// A full frame plus the start of the next must fit while the worker is busy.
const _: () = assert!(RX_DEPTH >= 2 * MAX_FRAME_LEN);

/// What woke the worker up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Wake {
    /// A stop was requested.
    Stop,
    /// One received byte.
    Byte(u8),
    /// A chunk of RPC output waiting to be framed and written.
    Outbound(DataPayload),
    /// Nothing happened within the inactivity window.
    Timeout,
}

/// Channels shared between the receive hook, the worker and the RPC side.
pub struct LinkChannels {
    rx: Channel<CriticalSectionRawMutex, u8, RX_DEPTH>,
    tx: Channel<CriticalSectionRawMutex, DataPayload, TX_DEPTH>,
    stop: Signal<CriticalSectionRawMutex, ()>,
    rx_overruns: AtomicU32,
    staged: Mutex<Vec<u8>>,
}

impl LinkChannels {
    pub const fn new() -> Self {
        Self {
            rx: Channel::new(),
            tx: Channel::new(),
            stop: Signal::new(),
            rx_overruns: AtomicU32::new(0),
            staged: Mutex::new(Vec::new()),
        }
    }

    /// Queue one received byte.  Safe to call from interrupt context.
    pub fn push_rx(&self, byte: u8) {
        if self.rx.try_send(byte).is_err() {
            self.rx_overruns.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Queue a chunk of RPC output for the worker to write.
    ///
    /// Waits up to `timeout_ms` for room; returns `false` if the chunk was
    /// dropped.
    pub fn push_outbound(&self, chunk: DataPayload, timeout_ms: u32) -> bool {
        let timeout = Duration::from_millis(u64::from(timeout_ms));
        future::block_on(embassy_time::with_timeout(timeout, self.tx.send(chunk))).is_ok()
    }

    /// Ask the worker to stop at its next wait.
    pub fn request_stop(&self) {
        self.stop.signal(());
    }

    /// Keep RPC output produced on the worker thread until it can write it.
    pub fn stage_output(&self, bytes: &[u8]) {
        self.staged
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(bytes);
    }

    /// Take every staged byte, leaving the buffer empty.
    pub fn take_staged(&self) -> Vec<u8> {
        mem::take(&mut *self.staged.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Block until a stop request, a received byte or an outbound chunk
    /// arrives, or until `deadline` passes.
    ///
    /// A pending stop always wins over pending data.
    pub fn wait_until(&self, deadline: Instant) -> Wake {
        let stop = async {
            self.stop.wait().await;
            Wake::Stop
        };
        let rx = async { Wake::Byte(self.rx.receive().await) };
        let tx = async { Wake::Outbound(self.tx.receive().await) };

        let race = future::or(stop, future::or(rx, tx));
        future::block_on(embassy_time::with_deadline(deadline, race)).unwrap_or(Wake::Timeout)
    }

    /// Next outbound chunk, if one is already queued.
    pub fn try_outbound(&self) -> Option<DataPayload> {
        self.tx.try_receive().ok()
    }

    /// Discard all pending RPC output, queued or staged; returns the
    /// number of bytes dropped.
    pub fn drain_outbound(&self) -> usize {
        let mut dropped = self.take_staged().len();
        while let Ok(chunk) = self.tx.try_receive() {
            dropped += chunk.len();
        }
        dropped
    }

    /// Clear everything left over from a previous connection.
    pub fn reset(&self) {
        while self.rx.try_receive().is_ok() {}
        self.drain_outbound();
        self.stop.reset();
        self.rx_overruns.store(0, Ordering::Relaxed);
    }

    /// Bytes dropped by [`push_rx`](Self::push_rx) since the last call.
    pub fn take_overruns(&self) -> u32 {
        self.rx_overruns.swap(0, Ordering::Relaxed)
    }
}

impl Default for LinkChannels {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ────────────────────────────────────────────────────
