//! Signing capability.
//!
//! The client never holds wallet key material. A wallet (hardware, remote
//! daemon, browser bridge) is injected as a [`MessageSigner`]; the session
//! key implements the same trait so envelope assembly does not care which one
//! signs.

use std::fmt;

use clearline_proto::Address;
use thiserror::Error;

/// Errors returned by a signer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SignerError {
    /// The signer refused to sign (user rejection, policy)
    #[error("signature rejected: {0}")]
    Rejected(String),

    /// The signer could not be reached
    #[error("signer unavailable: {0}")]
    Unavailable(String),

    /// A single-use signer was asked to sign twice
    #[error("single-use signer already consumed")]
    AlreadyUsed,
}

/// Detached signature bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct Signature(Vec<u8>);

impl Signature {
    /// Wrap raw signature bytes.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// `0x`-prefixed hex, the form carried in the `sig` array.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(&self.0))
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", self.to_hex())
    }
}

/// Something that can sign an opaque payload on behalf of an address.
pub trait MessageSigner: Send + Sync {
    /// Address the signatures are attributable to.
    fn address(&self) -> Address;

    /// Sign `message`.
    fn sign(&self, message: &[u8]) -> Result<Signature, SignerError>;
}
