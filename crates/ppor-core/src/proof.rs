//! Proof bundle assembly and signing.
//!
//! The proof is the unit of trust sent from client to server. Its canonical
//! digest is computed over the bundle serialized with the signature field
//! empty and the bulky audit payload excluded; signer and verifier share the
//! one implementation in [`canonical_digest`], so the two sides agree
//! byte-for-byte on what is hashed. Field order in the canonical view is
//! fixed by the struct definition.

use crate::crypto::{
    b64u_encode, sha256_domain, EphemeralKeypair, PROOF_DIGEST_DOMAIN_V1,
};
use crate::{
    AuditFrame, ChannelFlags, Digest32, DiceReading, LivenessMetrics, NoncePair, PporError,
    Result, StreamRoots, TimingMarks, PROTOCOL_VERSION,
};
use serde::{Deserialize, Serialize};

/// Signature scheme tag embedded in the attestation.
pub const SIGNATURE_SCHEME_ED25519: &str = "ed25519";

/// Embedded public key and signature over the canonical digest.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attestation {
    pub public_key_b64u: String,
    pub scheme: String,
    pub signature_b64u: String,
}

/// Spot-verification payload; excluded from the signed material.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
pub struct AuditPayload {
    pub frames: Vec<AuditFrame>,
}

/// The signed proof bundle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Proof {
    pub version: u32,
    pub dice: Vec<DiceReading>,
    pub stream_roots: StreamRoots,
    pub liveness: LivenessMetrics,
    pub channels: ChannelFlags,
    pub timing: TimingMarks,
    pub nonces: NoncePair,
    pub attestation: Attestation,
    pub audit: AuditPayload,
}

/// Everything the client hands the assembler; the assembler adds the key.
#[derive(Clone, Debug)]
pub struct ProofInput {
    pub dice: Vec<DiceReading>,
    pub stream_roots: StreamRoots,
    pub liveness: LivenessMetrics,
    pub channels: ChannelFlags,
    pub timing: TimingMarks,
    pub nonces: NoncePair,
    pub audit_frames: Vec<AuditFrame>,
}

/// Canonical view serialized for signing: signature emptied, audit dropped.
#[derive(Serialize)]
struct SignedView<'a> {
    version: u32,
    dice: &'a [DiceReading],
    stream_roots: &'a StreamRoots,
    liveness: &'a LivenessMetrics,
    channels: &'a ChannelFlags,
    timing: &'a TimingMarks,
    nonces: &'a NoncePair,
    attestation: Attestation,
}

/// Compute the canonical digest of a proof.
///
/// Deterministic: stable field order, signature field blanked, audit frames
/// excluded. This is the exact-format contract between signer and verifier.
pub fn canonical_digest(proof: &Proof) -> Result<Digest32> {
    let view = SignedView {
        version: proof.version,
        dice: &proof.dice,
        stream_roots: &proof.stream_roots,
        liveness: &proof.liveness,
        channels: &proof.channels,
        timing: &proof.timing,
        nonces: &proof.nonces,
        attestation: Attestation {
            public_key_b64u: proof.attestation.public_key_b64u.clone(),
            scheme: proof.attestation.scheme.clone(),
            signature_b64u: String::new(),
        },
    };
    let bytes = serde_json::to_vec(&view)
        .map_err(|e| PporError::SerializationError(format!("canonical proof encoding: {e}")))?;
    Ok(sha256_domain(PROOF_DIGEST_DOMAIN_V1, &bytes))
}

/// Assemble the canonical bundle, generate an ephemeral keypair, and sign.
///
/// The keypair lives only for the duration of this call; the private half is
/// never persisted or reused across rolls.
pub fn assemble_and_sign(input: ProofInput) -> Result<Proof> {
    let keypair = EphemeralKeypair::generate();
    let mut proof = Proof {
        version: PROTOCOL_VERSION,
        dice: input.dice,
        stream_roots: input.stream_roots,
        liveness: input.liveness,
        channels: input.channels,
        timing: input.timing,
        nonces: input.nonces,
        attestation: Attestation {
            public_key_b64u: keypair.public_key_b64u(),
            scheme: SIGNATURE_SCHEME_ED25519.to_string(),
            signature_b64u: String::new(),
        },
        audit: AuditPayload {
            frames: input.audit_frames,
        },
    };

    let digest = canonical_digest(&proof)?;
    let signature = keypair.sign_digest(&digest);
    proof.attestation.signature_b64u = b64u_encode(&signature);
    Ok(proof)
}
