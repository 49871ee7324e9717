//! Worker execution context — runs one connection end-to-end.
//!
//! ```text
//!  bind(default baud) ─▶ ┌─────────────────────────────────────┐
//!                        │ loop:                               │
//!                        │   decode(frame)   ◀── rx bytes      │
//!                        │   session.handle  ──▶ Status        │
//!                        │   flush outbound  ──▶ Data chunks   │
//!                        └─────────────────────────────────────┘
//!  close tunnel ◀─ unbind ◀─ decode fails (stop / timeout / error)
//! ```
//!
//! The worker is the only writer to the UART while it runs: Status replies,
//! and RPC output queued or staged by the tunnel, all leave through
//! [`Connection`].

use std::sync::Arc;

use embassy_time::{Duration, Instant};
use log::{debug, error, info, warn};

use super::{Session, SessionLink};
use crate::app::ports::{RpcEngine, SerialPort, UartId};
use crate::config::LinkConfig;
use crate::error::{DecodeError, RpcError, TransportError};
use crate::protocol::chunked::chunk_payload;
use crate::protocol::codec::{ByteSink, ByteSource, FrameCodec, WireCodec};
use crate::protocol::{DataPayload, Frame, StatusError};
use crate::rpc::channels::{LinkChannels, Wake};
use crate::rpc::tunnel::RpcTunnel;

/// Why a connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// Not decided yet.
    Unknown,
    /// A stop was requested by `disable()`.
    User,
    /// Transport or framing failure.
    Error,
    /// The accessory went quiet for a full inactivity window.
    Timeout,
}

/// The worker's view of one bound UART.
pub struct Connection<'a, S: SerialPort, R: RpcEngine> {
    serial: &'a mut S,
    channels: &'a Arc<LinkChannels>,
    rpc: &'a Arc<R>,
    config: &'a LinkConfig,
    codec: WireCodec,
    exit: ExitReason,
}

impl<'a, S: SerialPort, R: RpcEngine> Connection<'a, S, R> {
    pub fn new(
        serial: &'a mut S,
        channels: &'a Arc<LinkChannels>,
        rpc: &'a Arc<R>,
        config: &'a LinkConfig,
    ) -> Self {
        Self {
            serial,
            channels,
            rpc,
            config,
            codec: WireCodec::new(),
            exit: ExitReason::Unknown,
        }
    }

    pub fn exit_reason(&self) -> ExitReason {
        self.exit
    }

    /// Record why the connection is ending.  The first reason sticks.
    fn set_exit(&mut self, reason: ExitReason) {
        if self.exit == ExitReason::Unknown {
            self.exit = reason;
        }
    }

    fn send_frame(&mut self, frame: &Frame) -> Result<(), TransportError> {
        let codec = self.codec;
        codec.encode(frame, self)
    }

    /// Write every RPC chunk already queued, then anything staged.
    pub fn flush_outbound(&mut self) -> Result<(), TransportError> {
        while let Some(chunk) = self.channels.try_outbound() {
            self.send_frame(&Frame::Data(chunk))?;
        }
        let staged = self.channels.take_staged();
        for chunk in chunk_payload(&staged) {
            self.send_frame(&Frame::Data(chunk))?;
        }
        Ok(())
    }

    fn send_data(&mut self, chunk: DataPayload) -> bool {
        match self.send_frame(&Frame::Data(chunk)) {
            Ok(()) => true,
            Err(e) => {
                warn!("Worker: RPC output write failed: {}", e);
                self.set_exit(ExitReason::Error);
                false
            }
        }
    }
}

impl<S: SerialPort, R: RpcEngine> ByteSource for Connection<'_, S, R> {
    fn receive(&mut self, buf: &mut [u8]) -> usize {
        // Only received bytes count as activity.
        let window = Duration::from_millis(u64::from(self.config.inactivity_timeout_ms));
        let mut deadline = Instant::now() + window;
        let mut filled = 0;
        while filled < buf.len() {
            match self.channels.wait_until(deadline) {
                Wake::Byte(b) => {
                    buf[filled] = b;
                    filled += 1;
                    deadline = Instant::now() + window;
                }
                Wake::Outbound(chunk) => {
                    if !self.send_data(chunk) {
                        break;
                    }
                }
                Wake::Stop => {
                    self.set_exit(ExitReason::User);
                    break;
                }
                Wake::Timeout => {
                    self.set_exit(ExitReason::Timeout);
                    break;
                }
            }
        }
        filled
    }
}

impl<S: SerialPort, R: RpcEngine> ByteSink for Connection<'_, S, R> {
    fn send(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.serial.write(data)
    }
}

impl<S: SerialPort, R: RpcEngine> SessionLink for Connection<'_, S, R> {
    type Tunnel = RpcTunnel<R>;

    fn send_status(&mut self, status: StatusError) -> Result<(), TransportError> {
        self.send_frame(&Frame::Status(status))
    }

    fn set_baud(&mut self, baud: u32) -> Result<(), TransportError> {
        self.serial.set_baud(baud)?;
        info!("Worker: link switched to {} baud", baud);
        Ok(())
    }

    fn open_tunnel(&mut self) -> Result<RpcTunnel<R>, RpcError> {
        RpcTunnel::open(self.rpc.clone(), self.channels.clone(), self.config)
    }
}

/// Decode one frame and dispatch it.
///
/// `Ok(false)` means the byte source ran dry (stop or timeout) before a full
/// frame arrived; the connection has already recorded why.
fn step<S: SerialPort, R: RpcEngine>(
    conn: &mut Connection<'_, S, R>,
    session: &mut Session<RpcTunnel<R>>,
) -> crate::Result<bool> {
    let codec = conn.codec;
    let frame = match codec.decode(conn) {
        Ok(frame) => frame,
        Err(DecodeError::Incomplete) => return Ok(false),
        Err(DecodeError::Malformed(e)) => return Err(e.into()),
    };
    session.handle(frame, conn)?;
    conn.flush_outbound()?;
    Ok(true)
}

/// Run one connection on `uart` until stop, timeout or error.
///
/// Binds the UART, drives the session over it, then closes any open tunnel
/// and releases the UART before returning.
pub fn run<S: SerialPort, R: RpcEngine>(
    uart: UartId,
    serial: &mut S,
    rpc: &Arc<R>,
    channels: &Arc<LinkChannels>,
    config: &LinkConfig,
) -> ExitReason {
    if let Err(e) = serial.bind(uart, config.default_baud) {
        error!("Worker: cannot bind {}: {}", uart, e);
        return ExitReason::Error;
    }
    let hook_channels = channels.clone();
    serial.set_receive_hook(Some(Box::new(move |byte| hook_channels.push_rx(byte))));
    info!("Worker: {} bound at {} baud", uart, config.default_baud);

    let mut conn = Connection::new(serial, channels, rpc, config);
    let mut session: Session<RpcTunnel<R>> = Session::new(config.negotiated_baud);

    loop {
        match step(&mut conn, &mut session) {
            Ok(true) => {}
            Ok(false) => {
                conn.set_exit(ExitReason::Error);
                break;
            }
            Err(e) => {
                warn!("Worker: {}", e);
                conn.set_exit(ExitReason::Error);
                break;
            }
        }
    }

    let exit = conn.exit_reason();
    if session.finish() {
        debug!("Worker: tunnel closed on exit");
    }

    serial.set_receive_hook(None);
    serial.unbind();

    let overruns = channels.take_overruns();
    if overruns > 0 {
        warn!("Worker: {} rx bytes dropped (buffer full)", overruns);
    }
    info!("Worker: {} released ({:?})", uart, exit);
    exit
}

// ── Tests ────────────────────────────────────────────────────
