//! Clearline state-channel client
//!
//! Async runtime around the sans-IO core in `clearline-core`. A [`Client`]
//! owns one logical session with a clearing node: it opens the transport,
//! runs the session-key handshake, correlates round trips, dispatches server
//! pushes to a [`ClientHandler`], keeps the link alive and reconnects with
//! backoff when it drops.
//!
//! # Architecture
//!
//! ```text
//!  Client (facade) ──commands──> Driver task ──frames──> Transport
//!        ^                          │  ^                     │
//!        └──── oneshot replies ─────┘  └──── inbound ────────┘
//!                                   │
//!                                   └──> ClientHandler callbacks
//! ```
//!
//! The driver task is the only owner of connection state. The facade never
//! touches it directly, which is what makes the client safe to clone and
//! share across tasks.
//!
//! # Components
//!
//! - [`Client`]: connect, disconnect, open/close sessions, transfer
//! - [`ClientConfig`]: per-instance configuration, TOML-loadable
//! - [`ClientHandler`]: lifecycle and push callbacks
//! - [`ChannelBook`]: optional caller-side channel catalog
//! - [`SpendValidator`]: spend policy seam consulted by [`guarded_transfer`]
//! - [`TcpTransport`]: line-framed JSON over TCP

mod book;
mod client;
pub mod config;
mod driver;
mod env;
mod error;
mod handler;
mod handshake;
pub mod policy;
pub mod tcp;

pub use book::{Channel, ChannelBook};
pub use client::Client;
pub use config::{ClientConfig, ConfigError, ReconnectConfig};
pub use env::SystemEnv;
pub use error::ClientError;
pub use handler::{ClientEvent, ClientHandler, EventForwarder, NoopHandler};
pub use policy::{GuardedTransfer, LimitValidator, SpendDecision, SpendValidator, guarded_transfer};
pub use tcp::{LineSink, LineStream, TcpTransport, split_lines};
