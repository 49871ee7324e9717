//! Mock adapters for integration tests.
//!
//! Every mock keeps its state behind an `Arc<Mutex<..>>` so a test can hold
//! a handle while the service owns the adapter itself.  The serial mock
//! records every call so tests can assert on the full wire history without
//! touching a real UART.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use expansion::app::events::ExpansionEvent;
use expansion::app::ports::{
    DetectHook, DetectPort, EventSink, RpcEngine, RpcSendHook, RxHook, SerialPort, UartId,
};
use expansion::config::LinkConfig;
use expansion::error::{RpcError, TransportError};
use expansion::protocol::Frame;
use expansion::protocol::codec::{FrameCodec, WireCodec};

// ── Helpers ───────────────────────────────────────────────────

/// Poll `cond` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}

/// Link parameters with a host-friendly inactivity window.
pub fn test_config(inactivity_timeout_ms: u32) -> LinkConfig {
    LinkConfig {
        inactivity_timeout_ms,
        rpc_feed_timeout_ms: 50,
        outbound_timeout_ms: 50,
        ..LinkConfig::default()
    }
}

/// Wire bytes for `frame`.
pub fn wire(frame: &Frame) -> Vec<u8> {
    let mut out = Vec::new();
    WireCodec.encode(frame, &mut out).unwrap();
    out
}

// ── Serial call record ────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SerialOp {
    Bind { uart: UartId, baud: u32 },
    SetBaud(u32),
    Write(Vec<u8>),
    Unbind,
}

#[derive(Default)]
struct SerialState {
    ops: Vec<SerialOp>,
    hook: Option<RxHook>,
    bound: bool,
    fail_bind: bool,
}

// ── MockSerial ────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct MockSerial {
    state: Arc<Mutex<SerialState>>,
}

impl MockSerial {
    pub fn new() -> Self {
        Self::default()
    }

    /// A port whose `bind` always fails with `Busy`.
    pub fn failing() -> Self {
        let serial = Self::default();
        serial.state.lock().unwrap().fail_bind = true;
        serial
    }

    pub fn ops(&self) -> Vec<SerialOp> {
        self.state.lock().unwrap().ops.clone()
    }

    pub fn is_bound(&self) -> bool {
        self.state.lock().unwrap().bound
    }

    /// True once the worker is listening for bytes.
    pub fn has_hook(&self) -> bool {
        self.state.lock().unwrap().hook.is_some()
    }

    /// Every byte written since the start, concatenated.
    pub fn written(&self) -> Vec<u8> {
        self.state
            .lock()
            .unwrap()
            .ops
            .iter()
            .filter_map(|op| match op {
                SerialOp::Write(bytes) => Some(bytes.as_slice()),
                _ => None,
            })
            .flatten()
            .copied()
            .collect()
    }

    /// Decode everything written so far.
    pub fn written_frames(&self) -> Vec<Frame> {
        let bytes = self.written();
        let mut source = bytes.as_slice();
        let mut frames = Vec::new();
        while !source.is_empty() {
            frames.push(WireCodec.decode(&mut source).unwrap());
        }
        frames
    }

    /// Deliver `bytes` through the receive hook, as the UART driver would.
    pub fn inject(&self, bytes: &[u8]) {
        let state = self.state.lock().unwrap();
        if let Some(hook) = state.hook.as_ref() {
            for &b in bytes {
                hook(b);
            }
        }
    }

    pub fn inject_frame(&self, frame: &Frame) {
        self.inject(&wire(frame));
    }
}

impl SerialPort for MockSerial {
    fn bind(&mut self, uart: UartId, baud: u32) -> Result<(), TransportError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_bind || state.bound {
            return Err(TransportError::Busy);
        }
        state.bound = true;
        state.ops.push(SerialOp::Bind { uart, baud });
        Ok(())
    }

    fn set_receive_hook(&mut self, hook: Option<RxHook>) {
        self.state.lock().unwrap().hook = hook;
    }

    fn set_baud(&mut self, baud: u32) -> Result<(), TransportError> {
        let mut state = self.state.lock().unwrap();
        if !state.bound {
            return Err(TransportError::NotBound);
        }
        state.ops.push(SerialOp::SetBaud(baud));
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let mut state = self.state.lock().unwrap();
        if !state.bound {
            return Err(TransportError::NotBound);
        }
        state.ops.push(SerialOp::Write(data.to_vec()));
        Ok(())
    }

    fn unbind(&mut self) {
        let mut state = self.state.lock().unwrap();
        if state.bound {
            state.bound = false;
            state.ops.push(SerialOp::Unbind);
        }
    }
}

// ── MockDetect ────────────────────────────────────────────────

#[derive(Default)]
struct DetectState {
    armed: Option<(UartId, DetectHook)>,
    arm_count: usize,
}

#[derive(Clone, Default)]
pub struct MockDetect {
    state: Arc<Mutex<DetectState>>,
}

impl MockDetect {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn armed_on(&self) -> Option<UartId> {
        self.state.lock().unwrap().armed.as_ref().map(|(uart, _)| *uart)
    }

    pub fn arm_count(&self) -> usize {
        self.state.lock().unwrap().arm_count
    }

    /// Simulate an edge on the watched line.  Returns `false` if unarmed.
    pub fn fire(&self) -> bool {
        // One shot, like the hardware watcher; the hook runs without our lock.
        let hook = self.state.lock().unwrap().armed.take().map(|(_, hook)| hook);
        match hook {
            Some(hook) => {
                hook();
                true
            }
            None => false,
        }
    }
}

impl DetectPort for MockDetect {
    fn arm(&self, uart: UartId, hook: DetectHook) {
        let mut state = self.state.lock().unwrap();
        state.armed = Some((uart, hook));
        state.arm_count += 1;
    }

    fn disarm(&self, uart: UartId) {
        let mut state = self.state.lock().unwrap();
        if matches!(state.armed, Some((armed, _)) if armed == uart) {
            state.armed = None;
        }
    }
}

// ── MockRpc ───────────────────────────────────────────────────

#[derive(Default)]
struct RpcStats {
    opened: usize,
    closed: usize,
    fed: Vec<u8>,
}

/// Synchronous RPC engine: replies from inside `feed`.
pub struct MockRpc {
    /// Each accepted byte is echoed this many times.
    repeat: usize,
    /// Most bytes accepted per `feed` call.
    accept_limit: Option<usize>,
    refuse_open: bool,
    stats: Mutex<RpcStats>,
}

pub struct MockRpcSession {
    send: RpcSendHook,
}

impl MockRpc {
    pub fn echo() -> Self {
        Self {
            repeat: 1,
            accept_limit: None,
            refuse_open: false,
            stats: Mutex::new(RpcStats::default()),
        }
    }

    /// Echo every accepted payload `repeat` times over.
    pub fn amplify(repeat: usize) -> Self {
        Self {
            repeat,
            ..Self::echo()
        }
    }

    /// Accept at most `limit` bytes per feed.
    pub fn accepting(limit: usize) -> Self {
        Self {
            accept_limit: Some(limit),
            ..Self::echo()
        }
    }

    pub fn refusing() -> Self {
        Self {
            refuse_open: true,
            ..Self::echo()
        }
    }

    pub fn opened(&self) -> usize {
        self.stats.lock().unwrap().opened
    }

    pub fn closed(&self) -> usize {
        self.stats.lock().unwrap().closed
    }

    pub fn fed(&self) -> Vec<u8> {
        self.stats.lock().unwrap().fed.clone()
    }
}

impl RpcEngine for MockRpc {
    type Session = MockRpcSession;

    fn open(&self, send: RpcSendHook) -> Result<MockRpcSession, RpcError> {
        if self.refuse_open {
            return Err(RpcError::SessionLimit);
        }
        self.stats.lock().unwrap().opened += 1;
        Ok(MockRpcSession { send })
    }

    fn feed(&self, session: &mut MockRpcSession, data: &[u8], _timeout: Duration) -> usize {
        let n = self.accept_limit.map_or(data.len(), |limit| limit.min(data.len()));
        let accepted = &data[..n];
        self.stats.lock().unwrap().fed.extend_from_slice(accepted);
        if !accepted.is_empty() {
            let reply: Vec<u8> = accepted.repeat(self.repeat);
            (session.send)(&reply);
        }
        n
    }

    fn close(&self, _session: MockRpcSession) {
        self.stats.lock().unwrap().closed += 1;
    }
}

// ── RecordingSink ─────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<ExpansionEvent>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ExpansionEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &ExpansionEvent) {
        self.events.lock().unwrap().push(*event);
    }
}
