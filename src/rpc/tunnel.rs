//! RPC tunnel adapter — bridges a session to the system RPC engine.
//!
//! Inbound Data payloads are fed straight into the engine from the worker
//! thread.  Outbound bytes from the engine's own thread are cut into
//! Data-sized chunks and queued for the worker, which is the only context
//! that writes to the UART.  Bytes an engine sends from inside `feed` are
//! already on the worker and are staged instead.
//!
//! ```text
//!  worker ── feed(payload, timeout) ──▶ RpcEngine
//!    ▲                                     │ send hook (engine thread)
//!    │ DataPayload (LinkChannels tx)       ▼
//!    └──────────────────────────── chunk_payload()
//! ```

use core::sync::atomic::{AtomicBool, Ordering};
use core::time::Duration;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use log::{info, warn};

use super::channels::LinkChannels;
use crate::app::ports::{RpcEngine, RpcSendHook};
use crate::config::LinkConfig;
use crate::error::RpcError;
use crate::protocol::chunked::chunk_payload;
use crate::session::Tunnel;

/// One open RPC session carried over the expansion link.
pub struct RpcTunnel<R: RpcEngine> {
    engine: Arc<R>,
    session: R::Session,
    channels: Arc<LinkChannels>,
    /// Cleared before the engine session is closed; late output is dropped.
    open: Arc<AtomicBool>,
    feed_timeout: Duration,
}

impl<R: RpcEngine> RpcTunnel<R> {
    /// Open an engine session whose output is queued on `channels`.
    ///
    /// Must be called on the worker thread: output the engine produces on
    /// that same thread (inside `feed`) is staged rather than queued.
    pub fn open(
        engine: Arc<R>,
        channels: Arc<LinkChannels>,
        config: &LinkConfig,
    ) -> Result<Self, RpcError> {
        let open = Arc::new(AtomicBool::new(true));
        let gate = open.clone();
        let sink = channels.clone();
        let worker: ThreadId = thread::current().id();
        let outbound_timeout_ms = config.outbound_timeout_ms;

        let send: RpcSendHook = Box::new(move |bytes: &[u8]| {
            if !gate.load(Ordering::Acquire) {
                return;
            }
            if thread::current().id() == worker {
                sink.stage_output(bytes);
                return;
            }
            for chunk in chunk_payload(bytes) {
                let len = chunk.len();
                if !sink.push_outbound(chunk, outbound_timeout_ms) {
                    warn!("Tunnel: outbound queue full, dropped {} bytes", len);
                    return;
                }
            }
        });

        let session = engine.open(send)?;
        info!("Tunnel: session opened");

        Ok(Self {
            engine,
            session,
            channels,
            open,
            feed_timeout: Duration::from_millis(u64::from(config.rpc_feed_timeout_ms)),
        })
    }
}

impl<R: RpcEngine> Tunnel for RpcTunnel<R> {
    fn feed(&mut self, data: &[u8]) -> usize {
        self.engine.feed(&mut self.session, data, self.feed_timeout)
    }

    fn close(self) {
        self.open.store(false, Ordering::Release);
        self.engine.close(self.session);
        // Output of a closed session must not reach the next one.
        let dropped = self.channels.drain_outbound();
        if dropped > 0 {
            warn!("Tunnel: {} bytes of undelivered output dropped", dropped);
        }
        info!("Tunnel: session closed");
    }
}

// ── Tests ────────────────────────────────────────────────────
