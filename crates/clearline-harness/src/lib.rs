//! Test harness for Clearline clients.
//!
//! A [`MockClearingNode`] that speaks the clearing node protocol with
//! realistic latencies, a seeded [`SimEnv`] for reproducible keys and
//! challenges, and transports for running the node in-process, behind a
//! TCP listener, or inside a turmoil simulation.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod memory;
pub mod net;
pub mod node;
pub mod sim_env;
pub mod wallet;

pub use memory::{MemorySink, MemoryStream, memory_link};
pub use net::{TurmoilTransport, serve_tcp, serve_turmoil};
pub use node::{JournalEntry, Latency, MockClearingNode, NodeConfig};
pub use sim_env::SimEnv;
pub use wallet::LocalWallet;
