//! Threaded RPC engine adapter.
//!
//! Implements [`RpcEngine`] by running an [`RpcHandler`] on its own thread
//! per session, the way the system RPC service runs independently of the
//! transports that feed it.  Inbound bytes cross over a bounded
//! `embassy-sync` channel; output is produced on the handler thread and
//! handed to the session's send hook from there.
//!
//! ```text
//!  worker ── feed() ──▶ inbox (Channel, 4 × 64B) ──▶ handler thread
//!                                                       │ on_bytes()
//!                        send hook ◀────────────────────┘
//! ```

use core::sync::atomic::{AtomicUsize, Ordering};
use core::time::Duration;
use std::sync::Arc;
use std::thread::JoinHandle;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;
use futures_lite::future;
use heapless::Vec;
use log::{debug, error, info};

use crate::app::ports::{RpcEngine, RpcSendHook};
use crate::drivers::task_pin::{Core, spawn_on_core};
use crate::error::RpcError;
use crate::protocol::MAX_PAYLOAD;

/// Inbound message depth per session.
const INBOX_DEPTH: usize = 4;

const HANDLER_STACK_KB: usize = 4;
const HANDLER_PRIORITY: u8 = 5;

/// Command processor driven by the bridge.
pub trait RpcHandler: Send {
    /// Process `data`; call `reply` for every chunk of output.
    fn on_bytes(&mut self, data: &[u8], reply: &dyn Fn(&[u8]));
}

/// Builds one handler per session.
pub type HandlerFactory = Box<dyn Fn() -> Box<dyn RpcHandler> + Send + Sync>;

struct Mailbox {
    inbox: Channel<CriticalSectionRawMutex, Vec<u8, MAX_PAYLOAD>, INBOX_DEPTH>,
    closing: Signal<CriticalSectionRawMutex, ()>,
}

/// Handle to one bridge session.
pub struct BridgeSession {
    id: usize,
    mailbox: Arc<Mailbox>,
    thread: Option<JoinHandle<()>>,
}

/// [`RpcEngine`] that runs handlers on dedicated threads.
pub struct RpcBridge {
    factory: HandlerFactory,
    max_sessions: usize,
    active: AtomicUsize,
    next_id: AtomicUsize,
}

impl RpcBridge {
    pub fn new(max_sessions: usize, factory: HandlerFactory) -> Self {
        Self {
            factory,
            max_sessions,
            active: AtomicUsize::new(0),
            next_id: AtomicUsize::new(0),
        }
    }

    /// Sessions currently open.
    pub fn active_sessions(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    fn reserve_slot(&self) -> Result<(), RpcError> {
        self.active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.max_sessions).then_some(n + 1)
            })
            .map(|_| ())
            .map_err(|_| RpcError::SessionLimit)
    }
}

fn handler_loop(mailbox: &Mailbox, mut handler: Box<dyn RpcHandler>, send: RpcSendHook) {
    loop {
        let next = future::block_on(future::or(
            async {
                mailbox.closing.wait().await;
                None
            },
            async { Some(mailbox.inbox.receive().await) },
        ));
        match next {
            Some(bytes) => handler.on_bytes(&bytes, &*send),
            None => break,
        }
    }
}

impl RpcEngine for RpcBridge {
    type Session = BridgeSession;

    fn open(&self, send: RpcSendHook) -> Result<BridgeSession, RpcError> {
        self.reserve_slot()?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let mailbox = Arc::new(Mailbox {
            inbox: Channel::new(),
            closing: Signal::new(),
        });
        let handler = (self.factory)();
        let thread_mailbox = mailbox.clone();
        let spawned = spawn_on_core(
            Core::Pro,
            HANDLER_PRIORITY,
            HANDLER_STACK_KB,
            "expansion-rpc\0",
            move || handler_loop(&thread_mailbox, handler, send),
        );

        match spawned {
            Ok(thread) => {
                info!("RpcBridge: session {} opened", id);
                Ok(BridgeSession {
                    id,
                    mailbox,
                    thread: Some(thread),
                })
            }
            Err(e) => {
                error!("RpcBridge: handler spawn failed: {}", e);
                self.active.fetch_sub(1, Ordering::AcqRel);
                Err(RpcError::Unavailable)
            }
        }
    }

    fn feed(&self, session: &mut BridgeSession, data: &[u8], timeout: Duration) -> usize {
        let timeout = embassy_time::Duration::from_micros(timeout.as_micros() as u64);
        let mut consumed = 0;
        for chunk in data.chunks(MAX_PAYLOAD) {
            let Ok(msg) = Vec::from_slice(chunk) else {
                break;
            };
            let sent = future::block_on(embassy_time::with_timeout(
                timeout,
                session.mailbox.inbox.send(msg),
            ));
            if sent.is_err() {
                debug!("RpcBridge: session {} inbox full", session.id);
                break;
            }
            consumed += chunk.len();
        }
        consumed
    }

    fn close(&self, mut session: BridgeSession) {
        session.mailbox.closing.signal(());
        if let Some(thread) = session.thread.take() {
            if thread.join().is_err() {
                error!("RpcBridge: session {} handler panicked", session.id);
            }
        }
        self.active.fetch_sub(1, Ordering::AcqRel);
        info!("RpcBridge: session {} closed", session.id);
    }
}

// ───────────────────────────────────────────────────────────────
// Built-in handlers
// ───────────────────────────────────────────────────────────────

/// Loopback handler: replies with every byte it receives.  Used for link
/// bring-up with an accessory.
pub struct EchoHandler;

impl RpcHandler for EchoHandler {
    fn on_bytes(&mut self, data: &[u8], reply: &dyn Fn(&[u8])) {
        reply(data);
    }
}

// ── Tests ────────────────────────────────────────────────────
