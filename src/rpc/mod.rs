//! RPC tunnelling over the expansion link.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                     Expansion RPC path                      │
//! │                                                            │
//! │  ┌──────────┐   ┌──────────┐   ┌───────────────────────┐  │
//! │  │  Worker   │──▶│  Tunnel  │──▶│  RpcEngine (port)     │  │
//! │  │ (session) │   │ (feed)   │   │  → system RPC         │  │
//! │  └──────────┘   └──────────┘   └───────────────────────┘  │
//! │       ▲                                    │               │
//! │       │         ┌──────────────────────────┘               │
//! │       │         ▼                                          │
//! │  ┌──────────────────┐                                      │
//! │  │ LinkChannels (tx)│   chunked Data frames                │
//! │  └──────────────────┘                                      │
//! └────────────────────────────────────────────────────────────┘
//! ```

pub mod channels;
pub mod tunnel;
