//! Clearline protocol core logic
//!
//! Pure protocol logic for the Clearline state-channel client, decoupled from
//! I/O so it can be driven by a production runtime, a paused-clock test, or a
//! simulated clearing node alike.
//!
//! # Architecture
//!
//! State machines in this crate never touch sockets, clocks or randomness on
//! their own. Time is passed in as a parameter, randomness comes from an
//! [`env::Environment`], and transitions return declarative actions that a
//! driver executes. The async client in `clearline-client` is that driver.
//!
//! # Components
//!
//! - [`codec`]: builds signed request envelopes and parses inbound ones
//! - [`signer`]: the injected `sign(payload) -> signature` capability
//! - [`session_key`]: ephemeral per-connection signing identity
//! - [`auth`]: auth claim and the single-use, domain-bound auth signer
//! - [`correlator`]: request id to pending completion map with deadlines
//! - [`connection`]: connection lifecycle, keepalive and reconnect backoff
//! - [`transport`]: duplex text transport abstraction
//! - [`mod@env`]: environment abstraction (time, RNG)
//! - [`error`]: state machine errors

pub mod auth;
pub mod codec;
pub mod connection;
pub mod correlator;
pub mod env;
pub mod error;
pub mod session_key;
pub mod signer;
pub mod transport;

pub use auth::{AuthClaim, AuthSigner};
pub use codec::{CodecError, Inbound};
pub use connection::{
    Connection, ConnectionAction, ConnectionConfig, Phase, ReconnectPolicy,
};
pub use correlator::Correlator;
pub use env::Environment;
pub use error::ConnectionError;
pub use session_key::SessionKey;
pub use signer::{MessageSigner, Signature, SignerError};
pub use transport::{Transport, TransportSink, TransportStream};
