//! Handshake claim and the wallet-backed auth signer.
//!
//! # Protocol Flow
//!
//! 1. Client sends `auth_request` carrying the [`AuthClaim`] (wallet, session
//!    key, application, allowances, expiry, scope), signed by the session key
//! 2. Server answers with `auth_challenge` carrying an opaque string
//! 3. Client sends `auth_verify` echoing the challenge, signed by the wallet
//!    through an [`AuthSigner`]
//! 4. Server answers `{success: true}` and the session key is live
//!
//! The wallet never signs the raw envelope. It signs a typed digest that
//! binds the domain name, the full claim and the envelope bytes together, so
//! a proof produced for one application, session key or expiry cannot be
//! replayed for another.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use clearline_proto::{
    Address,
    payloads::{Allowance, AuthRequestParams},
};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::signer::{MessageSigner, Signature, SignerError};

/// Version tag mixed into every auth digest.
const AUTH_DIGEST_TAG: &[u8] = b"clearline/auth/v1";

/// What the wallet grants the session key for one connection attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthClaim {
    /// Wallet granting the authority
    pub wallet: Address,
    /// Session key receiving it
    pub session_key: Address,
    /// Application the grant is scoped to
    pub application: String,
    /// Spending ceilings
    pub allowances: Vec<Allowance>,
    /// Unix expiry
    pub expires_at: u64,
    /// Permission scope
    pub scope: String,
}

impl AuthClaim {
    /// Params for the `auth_request` message.
    pub fn request_params(&self) -> AuthRequestParams {
        AuthRequestParams {
            address: self.wallet.clone(),
            session_key: self.session_key.clone(),
            application: self.application.clone(),
            allowances: self.allowances.clone(),
            expires_at: self.expires_at,
            scope: self.scope.clone(),
        }
    }

    /// True once `unix_now` has reached the expiry.
    pub fn is_expired(&self, unix_now: u64) -> bool {
        unix_now >= self.expires_at
    }
}

/// Single-use signer for the `auth_verify` step.
pub struct AuthSigner {
    wallet: Arc<dyn MessageSigner>,
    claim: AuthClaim,
    domain: String,
    used: AtomicBool,
}

impl AuthSigner {
    /// Bind `wallet` to `claim` under `domain`.
    pub fn new(wallet: Arc<dyn MessageSigner>, claim: AuthClaim, domain: impl Into<String>) -> Self {
        Self { wallet, claim, domain: domain.into(), used: AtomicBool::new(false) }
    }

    /// The claim this signer is bound to.
    pub fn claim(&self) -> &AuthClaim {
        &self.claim
    }

    /// Digest the wallet actually signs for `payload`.
    pub fn typed_digest(&self, payload: &[u8]) -> Result<[u8; 32], SignerError> {
        let claim = serde_json::to_vec(&self.claim)
            .map_err(|e| SignerError::Rejected(format!("claim not encodable: {e}")))?;

        let mut hasher = Sha256::new();
        hasher.update(AUTH_DIGEST_TAG);
        hasher.update((self.domain.len() as u32).to_be_bytes());
        hasher.update(self.domain.as_bytes());
        hasher.update((claim.len() as u32).to_be_bytes());
        hasher.update(&claim);
        hasher.update(Sha256::digest(payload));
        Ok(hasher.finalize().into())
    }
}

impl MessageSigner for AuthSigner {
    fn address(&self) -> Address {
        self.wallet.address()
    }

    fn sign(&self, message: &[u8]) -> Result<Signature, SignerError> {
        if self.used.swap(true, Ordering::SeqCst) {
            return Err(SignerError::AlreadyUsed);
        }
        let digest = self.typed_digest(message)?;
        self.wallet.sign(&digest)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use clearline_proto::Amount;

    use super::*;

    /// Wallet double that records what it was asked to sign.
    struct RecordingWallet {
        seen: Mutex<Vec<Vec<u8>>>,
    }

    impl MessageSigner for RecordingWallet {
        fn address(&self) -> Address {
            Address::new("0xwallet")
        }

        fn sign(&self, message: &[u8]) -> Result<Signature, SignerError> {
            self.seen.lock().unwrap().push(message.to_vec());
            Ok(Signature::new(message.to_vec()))
        }
    }

    fn claim(expires_at: u64) -> AuthClaim {
        AuthClaim {
            wallet: Address::new("0xwallet"),
            session_key: Address::new("0xsession"),
            application: "clearline".into(),
            allowances: vec![Allowance { asset: "usdc".into(), amount: Amount::new(5) }],
            expires_at,
            scope: "console".into(),
        }
    }

    #[test]
    fn signer_is_single_use() {
        let wallet = Arc::new(RecordingWallet { seen: Mutex::new(Vec::new()) });
        let signer = AuthSigner::new(wallet.clone(), claim(100), "Clearline");

        assert!(signer.sign(b"verify").is_ok());
        assert_eq!(signer.sign(b"verify"), Err(SignerError::AlreadyUsed));
        assert_eq!(wallet.seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn wallet_signs_digest_not_raw_payload() {
        let wallet = Arc::new(RecordingWallet { seen: Mutex::new(Vec::new()) });
        let signer = AuthSigner::new(wallet.clone(), claim(100), "Clearline");

        signer.sign(b"verify").unwrap();
        let seen = wallet.seen.lock().unwrap();
        assert_eq!(seen[0].len(), 32);
        assert_ne!(seen[0], b"verify".to_vec());
    }

    #[test]
    fn digest_binds_domain_and_expiry() {
        let wallet: Arc<dyn MessageSigner> =
            Arc::new(RecordingWallet { seen: Mutex::new(Vec::new()) });

        let base = AuthSigner::new(wallet.clone(), claim(100), "Clearline");
        let other_domain = AuthSigner::new(wallet.clone(), claim(100), "Elsewhere");
        let other_expiry = AuthSigner::new(wallet, claim(101), "Clearline");

        let d = base.typed_digest(b"p").unwrap();
        assert_ne!(d, other_domain.typed_digest(b"p").unwrap());
        assert_ne!(d, other_expiry.typed_digest(b"p").unwrap());
        assert_ne!(d, base.typed_digest(b"q").unwrap());
    }

    #[test]
    fn request_params_mirror_claim() {
        let claim = claim(42);
        let params = claim.request_params();
        assert_eq!(params.address, claim.wallet);
        assert_eq!(params.session_key, claim.session_key);
        assert_eq!(params.expires_at, 42);
        assert!(claim.is_expired(42));
        assert!(!claim.is_expired(41));
    }
}
