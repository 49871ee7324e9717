//! Session state machine for one expansion connection.
//!
//! The session interprets each decoded [`Frame`] against the current phase
//! and answers with exactly one Status frame.
//!
//! ```text
//!             BaudRate(negotiated)         Control(StartRpc)
//!  Handshake ─────────────────────▶ Normal ──────────────────▶ RpcTunnel
//!      ▲ │                            ▲  ◀──────────────────────  │ ▲
//!      └─┘ anything else:             │     Control(StopRpc)      │ │ Data: fed
//!          Status(Unknown)            └─ anything else ─┘         └─┘ to the tunnel
//! ```
//!
//! An out-of-phase frame never moves the phase backwards; it only gets a
//! `Status(Unknown)` so the accessory can retry.  The open tunnel lives
//! inside the `RpcTunnel` phase itself, so "tunnel open outside RpcTunnel"
//! cannot be expressed.

pub mod worker;

use core::mem;

use log::{debug, info, warn};

use crate::error::{RpcError, TransportError};
use crate::protocol::{ControlCommand, Frame, StatusError};

/// Session-level protocol stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Handshake,
    Normal,
    RpcTunnel,
}

/// An open RPC tunnel, owned by the session while in `RpcTunnel`.
pub trait Tunnel {
    /// Hand `data` to the RPC engine; returns how many bytes it accepted.
    fn feed(&mut self, data: &[u8]) -> usize;

    /// Release the tunnel.  Consumes it, so it is closed at most once.
    fn close(self);
}

/// What the session needs from the connection it runs on.
pub trait SessionLink {
    type Tunnel: Tunnel;

    /// Write one Status frame.
    fn send_status(&mut self, status: StatusError) -> Result<(), TransportError>;

    /// Switch the transport to `baud`.
    fn set_baud(&mut self, baud: u32) -> Result<(), TransportError>;

    /// Open a fresh RPC tunnel.
    fn open_tunnel(&mut self) -> Result<Self::Tunnel, RpcError>;
}

enum Phase<T> {
    Handshake,
    Normal,
    RpcTunnel(T),
}

/// Per-connection session state.  Starts in `Handshake`.
pub struct Session<T: Tunnel> {
    phase: Phase<T>,
    negotiated_baud: u32,
}

impl<T: Tunnel> Session<T> {
    pub fn new(negotiated_baud: u32) -> Self {
        Self {
            phase: Phase::Handshake,
            negotiated_baud,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        match self.phase {
            Phase::Handshake => SessionPhase::Handshake,
            Phase::Normal => SessionPhase::Normal,
            Phase::RpcTunnel(_) => SessionPhase::RpcTunnel,
        }
    }

    /// Dispatch one frame and send its Status reply.
    ///
    /// A transport error here is unrecoverable for the connection.  The
    /// phase is always updated before anything is written, so the tunnel is
    /// never lost on a failed write.
    pub fn handle<L>(&mut self, frame: Frame, link: &mut L) -> Result<(), TransportError>
    where
        L: SessionLink<Tunnel = T>,
    {
        let kind = frame.kind();
        let mut switch_to = None;

        let (next, reply) = match (mem::replace(&mut self.phase, Phase::Handshake), frame) {
            // ── Handshake ──
            (Phase::Handshake, Frame::BaudRate(rate)) => {
                if rate == self.negotiated_baud {
                    switch_to = Some(rate);
                    (Phase::Normal, StatusError::None)
                } else {
                    warn!("Session: rejected baud rate {}", rate);
                    (Phase::Handshake, StatusError::Unknown)
                }
            }
            (Phase::Handshake, Frame::Control(_) | Frame::Data(_) | Frame::Status(_)) => {
                (Phase::Handshake, StatusError::Unknown)
            }

            // ── Normal ──
            (Phase::Normal, Frame::Control(ControlCommand::StartRpc)) => {
                match link.open_tunnel() {
                    Ok(tunnel) => {
                        info!("Session: RPC tunnel open");
                        (Phase::RpcTunnel(tunnel), StatusError::None)
                    }
                    Err(e) => {
                        warn!("Session: cannot open RPC tunnel: {}", e);
                        (Phase::Normal, StatusError::Unknown)
                    }
                }
            }
            (
                Phase::Normal,
                Frame::Control(ControlCommand::StopRpc)
                | Frame::BaudRate(_)
                | Frame::Data(_)
                | Frame::Status(_),
            ) => (Phase::Normal, StatusError::Unknown),

            // ── RpcTunnel ──
            (Phase::RpcTunnel(mut tunnel), Frame::Data(payload)) => {
                let consumed = tunnel.feed(&payload);
                if consumed == payload.len() {
                    (Phase::RpcTunnel(tunnel), StatusError::None)
                } else {
                    warn!(
                        "Session: RPC took {}/{} bytes, restarting tunnel",
                        consumed,
                        payload.len()
                    );
                    tunnel.close();
                    match link.open_tunnel() {
                        Ok(fresh) => (Phase::RpcTunnel(fresh), StatusError::Unknown),
                        Err(e) => {
                            warn!("Session: tunnel restart failed: {}", e);
                            (Phase::Normal, StatusError::Unknown)
                        }
                    }
                }
            }
            (Phase::RpcTunnel(tunnel), Frame::Control(ControlCommand::StopRpc)) => {
                tunnel.close();
                info!("Session: RPC tunnel closed");
                (Phase::Normal, StatusError::None)
            }
            (
                Phase::RpcTunnel(tunnel),
                Frame::Control(ControlCommand::StartRpc) | Frame::BaudRate(_) | Frame::Status(_),
            ) => (Phase::RpcTunnel(tunnel), StatusError::Unknown),
        };

        self.phase = next;
        debug!("Session: {} -> {:?} in {:?}", kind, reply, self.phase());

        link.send_status(reply)?;
        if let Some(baud) = switch_to {
            link.set_baud(baud)?;
        }
        Ok(())
    }

    /// End the session, closing the tunnel if one is open.
    ///
    /// Returns `true` if a tunnel was closed.
    pub fn finish(self) -> bool {
        match self.phase {
            Phase::RpcTunnel(tunnel) => {
                tunnel.close();
                true
            }
            Phase::Handshake | Phase::Normal => false,
        }
    }
}

// ── Tests ────────────────────────────────────────────────────
