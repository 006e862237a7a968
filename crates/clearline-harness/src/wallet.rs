//! In-process wallet for tests and demos.

use clearline_core::{
    Environment, MessageSigner, Signature, SignerError, session_key::address_for,
};
use clearline_proto::Address;
use ed25519_dalek::{Signer, SigningKey, VerifyingKey};

/// Wallet holding an Ed25519 key in memory.
pub struct LocalWallet {
    signing_key: SigningKey,
    address: Address,
}

impl LocalWallet {
    /// Deterministic wallet from a seed.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(&seed);
        let address = address_for(&signing_key.verifying_key());
        Self { signing_key, address }
    }

    /// Wallet from environment randomness.
    pub fn generate<E: Environment>(env: &E) -> Self {
        let mut seed = [0u8; 32];
        env.random_bytes(&mut seed);
        Self::from_seed(seed)
    }

    /// Public key, for verifying what the wallet signed.
    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }
}

impl MessageSigner for LocalWallet {
    fn address(&self) -> Address {
        self.address.clone()
    }

    fn sign(&self, message: &[u8]) -> Result<Signature, SignerError> {
        Ok(Signature::new(self.signing_key.sign(message).to_bytes().to_vec()))
    }
}

impl std::fmt::Debug for LocalWallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalWallet").field("address", &self.address).finish_non_exhaustive()
    }
}
