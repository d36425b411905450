//! Cryptographic primitives for PPOR.
//!
//! SHA-256 with domain separation for commitments and proof digests, base64url
//! helpers for every binary wire field, and the ephemeral ed25519 keypair that
//! signs exactly one proof bundle before being discarded.
//!
//! # Security
//!
//! - The ephemeral signing key is generated from `OsRng`, never serialized,
//!   and zeroized on drop. Reusing it across rolls would allow cross-roll
//!   correlation, so there is deliberately no way to extract or import it.
//! - Never log private key material.

use crate::{Digest32, PporError, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use tracing::warn;

/// 64-byte ed25519 signature.
pub type SignatureBytes = [u8; 64];

/// 32-byte ed25519 public key.
pub type PublicKeyBytes = [u8; 32];

/// Domain separation tag for the canonical proof digest.
pub const PROOF_DIGEST_DOMAIN_V1: &[u8] = b"PPOR_PROOF_DIGEST_V1";

/// Compute a deterministic SHA-256 hash of a byte slice.
pub fn sha256(data: &[u8]) -> Digest32 {
    let mut hasher = Sha256::new();
    hasher.update(data);
    Digest32(hasher.finalize().into())
}

/// Compute a domain-separated SHA-256 hash: `H(domain || data)`.
pub fn sha256_domain(domain: &[u8], data: &[u8]) -> Digest32 {
    let mut hasher = Sha256::new();
    hasher.update(domain);
    hasher.update(data);
    Digest32(hasher.finalize().into())
}

/// Encode bytes as base64url without padding.
pub fn b64u_encode(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Decode unpadded base64url.
pub fn b64u_decode(s: &str) -> Result<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(s)
        .map_err(|e| PporError::InvalidInput(format!("invalid base64url: {e}")))
}

/// Ephemeral keypair bound to a single roll.
///
/// Generated fresh per roll and dropped with the roll; the private half never
/// leaves this struct.
pub struct EphemeralKeypair {
    signing_key: SigningKey,
}

impl EphemeralKeypair {
    /// Generate a fresh keypair from the OS CSPRNG.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Raw public key bytes.
    pub fn public_key(&self) -> PublicKeyBytes {
        self.signing_key.verifying_key().to_bytes()
    }

    /// Public key as base64url, the form embedded in the proof bundle.
    pub fn public_key_b64u(&self) -> String {
        b64u_encode(&self.public_key())
    }

    /// Sign a canonical proof digest.
    pub fn sign_digest(&self, digest: &Digest32) -> SignatureBytes {
        self.signing_key.sign(&digest.0).to_bytes()
    }
}

/// Verify an ed25519 signature over a canonical proof digest.
///
/// Both key and signature arrive base64url-encoded, straight off the wire.
pub fn verify_digest_signature(
    public_key_b64u: &str,
    digest: &Digest32,
    signature_b64u: &str,
) -> Result<()> {
    let key_bytes = b64u_decode(public_key_b64u)?;
    let key_bytes: PublicKeyBytes = key_bytes
        .try_into()
        .map_err(|_| PporError::CryptoError("public key must be exactly 32 bytes".into()))?;
    let verifying_key = VerifyingKey::from_bytes(&key_bytes)
        .map_err(|e| PporError::CryptoError(format!("invalid public key: {e}")))?;

    let sig_bytes = b64u_decode(signature_b64u)?;
    if sig_bytes.len() != 64 {
        return Err(PporError::SignatureInvalid("invalid signature length".into()));
    }
    let mut sig = [0u8; 64];
    sig.copy_from_slice(&sig_bytes);
    let signature = Signature::from_bytes(&sig);

    verifying_key.verify(&digest.0, &signature).map_err(|_| {
        warn!("proof signature verification failed");
        PporError::SignatureInvalid("signature verification failed".into())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_known_vector() {
        // SHA-256 of the empty string.
        assert_eq!(
            sha256(b"").to_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn domain_separation_changes_digest() {
        assert_ne!(sha256_domain(b"A", b"data"), sha256_domain(b"B", b"data"));
        assert_ne!(sha256_domain(b"A", b"data"), sha256(b"data"));
    }

    #[test]
    fn b64u_roundtrip_no_padding() {
        let bytes = [0xffu8, 0x00, 0x10, 0x80, 0x7f];
        let s = b64u_encode(&bytes);
        assert!(!s.contains('='));
        assert!(!s.contains('+'));
        assert!(!s.contains('/'));
        assert_eq!(b64u_decode(&s).unwrap(), bytes);
    }

    #[test]
    fn sign_and_verify_roundtrip() {
        let key = EphemeralKeypair::generate();
        let digest = sha256(b"bundle bytes");
        let sig = key.sign_digest(&digest);
        verify_digest_signature(&key.public_key_b64u(), &digest, &b64u_encode(&sig)).unwrap();
    }

    #[test]
    fn verify_rejects_wrong_digest() {
        let key = EphemeralKeypair::generate();
        let sig = key.sign_digest(&sha256(b"one"));
        let result =
            verify_digest_signature(&key.public_key_b64u(), &sha256(b"two"), &b64u_encode(&sig));
        assert!(matches!(result, Err(PporError::SignatureInvalid(_))));
    }

    #[test]
    fn verify_rejects_foreign_key() {
        let signer = EphemeralKeypair::generate();
        let other = EphemeralKeypair::generate();
        let digest = sha256(b"bundle");
        let sig = signer.sign_digest(&digest);
        let result =
            verify_digest_signature(&other.public_key_b64u(), &digest, &b64u_encode(&sig));
        assert!(matches!(result, Err(PporError::SignatureInvalid(_))));
    }

    #[test]
    fn verify_rejects_malformed_key() {
        let digest = sha256(b"bundle");
        let sig_b64u = b64u_encode(&[0u8; 64]);
        let result = verify_digest_signature(&b64u_encode(&[1u8; 16]), &digest, &sig_b64u);
        assert!(matches!(result, Err(PporError::CryptoError(_))));
    }
}
