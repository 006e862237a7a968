//! Wire format for the Clearline state-channel protocol.
//!
//! Every message on the wire is a JSON text frame holding a four-element body
//! and a detached signature list:
//!
//! ```text
//! {"req":[request_id, "method", [params], unix_timestamp], "sig":["0x…"]}
//! {"res":[request_id, "method", [params], unix_timestamp], "sig":["0x…"]}
//! ```
//!
//! Requests travel under `req`, responses and server pushes under `res`.
//! Pushes carry `request_id = 0` and are never correlated with a request.
//!
//! This crate only describes shapes. Signing and envelope assembly live in
//! `clearline-core`, which treats the body bytes produced here as the
//! signing payload.
#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod errors;
pub mod frame;
pub mod method;
pub mod payloads;
pub mod types;

pub use errors::{Result, WireError};
pub use frame::{Body, Envelope, PUSH_REQUEST_ID};
pub use method::Method;
pub use types::{Address, Amount, ChannelId, RequestId};
