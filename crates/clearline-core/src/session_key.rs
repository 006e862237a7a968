//! Ephemeral session keys.
//!
//! Every connect attempt generates a fresh Ed25519 key. The wallet authorizes
//! it once during the handshake, after which it signs every ordinary request
//! on that connection. Keys are never persisted and never survive a
//! reconnect: a new key means a new conversation with the clearing node.

use std::fmt;

use clearline_proto::Address;
use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use sha2::{Digest, Sha256};

use crate::{
    env::Environment,
    signer::{MessageSigner, Signature, SignerError},
};

/// Address derived from an Ed25519 public key: the trailing 20 bytes of its
/// SHA-256 digest.
pub fn address_for(key: &VerifyingKey) -> Address {
    let digest = Sha256::digest(key.as_bytes());
    Address::from_bytes(&digest[12..])
}

/// Ephemeral signing identity for one connection attempt.
pub struct SessionKey {
    signing_key: SigningKey,
    address: Address,
}

impl SessionKey {
    /// Generate a new key from environment randomness.
    pub fn generate<E: Environment>(env: &E) -> Self {
        let mut seed = [0u8; 32];
        env.random_bytes(&mut seed);
        Self::from_seed(seed)
    }

    /// Deterministic key from a 32-byte seed.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(&seed);
        let address = address_for(&signing_key.verifying_key());
        Self { signing_key, address }
    }

    /// Address the clearing node knows this key by.
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Public half, for verifying signatures in tests and tooling.
    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// Hex-encoded private key. Callers are responsible for not logging it.
    pub fn private_key_hex(&self) -> String {
        format!("0x{}", hex::encode(self.signing_key.to_bytes()))
    }
}

impl MessageSigner for SessionKey {
    fn address(&self) -> Address {
        self.address.clone()
    }

    fn sign(&self, message: &[u8]) -> Result<Signature, SignerError> {
        Ok(Signature::new(self.signing_key.sign(message).to_bytes().to_vec()))
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionKey")
            .field("address", &self.address)
            .field("signing_key", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use ed25519_dalek::Verifier;

    use super::*;

    #[test]
    fn seed_determines_address() {
        let a = SessionKey::from_seed([7; 32]);
        let b = SessionKey::from_seed([7; 32]);
        let c = SessionKey::from_seed([8; 32]);

        assert_eq!(a.address(), b.address());
        assert_ne!(a.address(), c.address());
        // 20 bytes of hex plus prefix
        assert_eq!(a.address().as_str().len(), 42);
    }

    #[test]
    fn signatures_verify_against_public_key() {
        let key = SessionKey::from_seed([1; 32]);
        let signature = key.sign(b"payload").unwrap();

        let raw = ed25519_dalek::Signature::from_slice(signature.as_bytes()).unwrap();
        assert!(key.verifying_key().verify(b"payload", &raw).is_ok());
        assert!(key.verifying_key().verify(b"tampered", &raw).is_err());
    }

    #[test]
    fn debug_does_not_leak_key_material() {
        let key = SessionKey::from_seed([9; 32]);
        let rendered = format!("{key:?}");
        assert!(rendered.contains("redacted"));
        assert!(!rendered.contains(&key.private_key_hex()[2..]));
    }
}
