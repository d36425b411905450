//! Core protocol logic for PPOR (Proof of Physical Origin and Randomness).
//!
//! Two remote players roll physical dice in front of a camera; the server
//! adjudicates the duel without trusting either client. The trust anchor is a
//! challenge/response scheme: the server issues nonces, the client derives a
//! deterministic stimulus schedule from them, captures multi-channel sensor
//! evidence while the dice tumble, commits the captured streams into Merkle
//! roots, and signs the bundle with an ephemeral key. The server re-derives
//! the same schedule from the stored nonce and scores the bundle against
//! fixed thresholds.
//!
//! Everything in this crate is pure and synchronous; the server-side nonce
//! lifecycle and HTTP surface live in `ppor-server`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod config;
pub mod crypto;
pub mod liveness;
pub mod merkle;
pub mod metrics;
pub mod proof;
pub mod stimulus;
pub mod tracker;
pub mod verify;

pub use config::PporConfig;
pub use proof::Proof;
pub use verify::{IntegrityScore, RejectReason, Verdict, Verifier};

/// Wire protocol version; a mismatch is an immediate rejection.
pub const PROTOCOL_VERSION: u32 = 1;

/// Dimensions of the reduced single-channel luminance frames.
pub const FRAME_LUMA_WIDTH: usize = 64;
pub const FRAME_LUMA_HEIGHT: usize = 36;

/// Candidate audio chirp frequencies (Hz), ultrasonic-adjacent.
pub const AUDIO_CHIRP_FREQS: [f64; 3] = [17_300.0, 18_300.0, 19_300.0];

/// Duration of an emitted chirp (ms).
pub const CHIRP_DURATION_MS: u32 = 35;

/// Upper bound on simultaneously tracked dice.
pub const MAX_DICE: usize = 5;

/// 32-byte digest newtype used for stream commitments and proof digests.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct Digest32(pub [u8; 32]);

impl Digest32 {
    /// Hex rendering for logs and debugging.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

/// The two independent 16-byte challenge nonces, base64url-encoded.
///
/// `session` seeds round-id derivation (via its digest); `stim` seeds the
/// deterministic stimulus schedule.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoncePair {
    pub session: String,
    pub stim: String,
}

/// A finalized per-die reading, produced by the dice tracker.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DiceReading {
    pub id: String,
    /// Pip count, 1..=6.
    pub value: u8,
    /// Exponentially smoothed tracking confidence in [0, 1].
    pub confidence: f64,
    /// Client-relative time (ms) at which the value settled.
    pub settle_t_ms: f64,
    /// Number of detected rotations; evidence the die physically tumbled.
    pub tumble_count: u32,
}

/// The five liveness metrics computed from the captured traces.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LivenessMetrics {
    /// Pearson correlation of observed vs. planned luminance, -1..1.
    pub r_luma: f64,
    /// Fraction of timing-beacon frames that failed to register, 0..1.
    pub barcode_err: f64,
    /// Mean haptic-pulse-to-IMU-spike distance (ms); 999 when unmatched.
    pub haptic_imu_ms: f64,
    /// Peak Goertzel signal-to-noise across candidate chirp frequencies (dB).
    pub chirp_snr: f64,
    /// Mean absolute deviation between normalized optical-flow and IMU series.
    pub vio_imu_dev: f64,
}

/// Which sensor channels were available during capture.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelFlags {
    pub video: bool,
    pub audio: bool,
    pub haptics: bool,
    pub imu: bool,
}

/// Client-relative timing marks (ms).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimingMarks {
    pub t_start: f64,
    pub t_settle: f64,
    pub t_send: f64,
}

/// Merkle roots of the committed evidence streams, base64url-encoded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamRoots {
    pub video: String,
    pub imu: String,
    pub audio: String,
}

/// A full-resolution thumbnail frame submitted for spot verification.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditFrame {
    pub t_ms: f64,
    /// 64x36 single-channel luminance buffer, base64url-encoded.
    pub luma_b64u: String,
}

/// Errors surfaced by the core crate.
///
/// Verifier rejections are NOT errors; they are typed [`verify::Verdict`]
/// outcomes. This enum covers caller contract violations and crypto failures.
#[derive(Debug, Error)]
pub enum PporError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("crypto error: {0}")]
    CryptoError(String),

    #[error("signature invalid: {0}")]
    SignatureInvalid(String),

    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("configuration error: {0}")]
    ConfigError(String),
}

pub type Result<T> = std::result::Result<T, PporError>;
