//! Server-side proof verification.
//!
//! The verifier re-derives the expected stimulus schedule from the stored
//! nonce and runs a fixed-order pipeline over the submitted bundle:
//! structural check, nonce binding, liveness thresholds, strict-mode channel
//! quorum, tumble count, barcode audit spot check, signature, commitment
//! root size, then the composite integrity score. Cheap failures are
//! reported before expensive signature verification. Every check is total:
//! malformed input yields a typed rejection, never a panic.

use crate::crypto::{b64u_decode, verify_digest_signature};
use crate::proof::{canonical_digest, Proof, SIGNATURE_SCHEME_ED25519};
use crate::stimulus::{build_schedule, DEFAULT_DURATION_MS};
use crate::{LivenessMetrics, NoncePair, PROTOCOL_VERSION};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

/// Fixed liveness thresholds. Not learned, not negotiable per client.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LivenessThresholds {
    pub r_luma_min: f64,
    pub barcode_err_max: f64,
    pub haptic_imu_ms_max: f64,
    pub chirp_snr_min_db: f64,
    pub vio_imu_dev_max: f64,
    pub min_tumble: u32,
}

impl Default for LivenessThresholds {
    fn default() -> Self {
        Self {
            r_luma_min: 0.82,
            barcode_err_max: 0.25,
            haptic_imu_ms_max: 10.0,
            chirp_snr_min_db: 6.0,
            vio_imu_dev_max: 0.35,
            min_tumble: 2,
        }
    }
}

/// Terminal, non-retryable rejection reasons for a single roll.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    VersionMismatch,
    NonceMismatch,
    NoncesMissingOrExpired,
    VisualLiveness,
    InsufficientChannels,
    TumbleLow,
    BarcodeAuditFail,
    SigInvalid,
    RootSize,
    MissingParams,
    Unauthorized,
    Malformed,
}

impl RejectReason {
    /// Wire spelling, matching the serde rename.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VersionMismatch => "version_mismatch",
            Self::NonceMismatch => "nonce_mismatch",
            Self::NoncesMissingOrExpired => "nonces_missing_or_expired",
            Self::VisualLiveness => "visual_liveness",
            Self::InsufficientChannels => "insufficient_channels",
            Self::TumbleLow => "tumble_low",
            Self::BarcodeAuditFail => "barcode_audit_fail",
            Self::SigInvalid => "sig_invalid",
            Self::RootSize => "root_size",
            Self::MissingParams => "missing_params",
            Self::Unauthorized => "unauthorized",
            Self::Malformed => "malformed",
        }
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Composite integrity score: the quantity downstream game logic consumes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntegrityScore {
    pub overall: f64,
    pub per_die: Vec<f64>,
}

/// Outcome of verifying one proof bundle. No partial credit: any failing
/// required check rejects the whole bundle.
#[derive(Clone, Debug, PartialEq)]
pub enum Verdict {
    Accepted(IntegrityScore),
    Rejected(RejectReason),
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }
}

fn clamp01(x: f64) -> f64 {
    x.clamp(0.0, 1.0)
}

/// Blend the five metrics into [0, 1] through metric-specific linear
/// windows, then weight: 0.30 luma, 0.15 barcode, 0.20 haptic, 0.20 chirp,
/// 0.15 vio. Per-die confidences are clamped and passed through.
pub fn integrity_score(lv: &LivenessMetrics, die_confidences: &[f64]) -> IntegrityScore {
    let r = clamp01((lv.r_luma - 0.7) / 0.3);
    let b = clamp01((0.4 - lv.barcode_err) / 0.4);
    let h = clamp01((10.0 - lv.haptic_imu_ms) / 10.0);
    let c = clamp01((lv.chirp_snr - 4.0) / 10.0);
    let v = clamp01((0.5 - lv.vio_imu_dev) / 0.5);
    IntegrityScore {
        overall: 0.30 * r + 0.15 * b + 0.20 * h + 0.20 * c + 0.15 * v,
        per_die: die_confidences.iter().map(|x| clamp01(*x)).collect(),
    }
}

/// Server-side proof verifier.
#[derive(Clone, Debug)]
pub struct Verifier {
    thresholds: LivenessThresholds,
    strict: bool,
    schedule_dur_ms: u32,
    min_audit_hits: usize,
}

impl Verifier {
    pub fn new(strict: bool) -> Self {
        Self {
            thresholds: LivenessThresholds::default(),
            strict,
            schedule_dur_ms: DEFAULT_DURATION_MS,
            min_audit_hits: 2,
        }
    }

    pub fn with_thresholds(mut self, thresholds: LivenessThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn with_schedule_duration(mut self, dur_ms: u32) -> Self {
        self.schedule_dur_ms = dur_ms;
        self
    }

    /// Verify one proof against the nonce pair stored for this roll.
    #[instrument(skip(self, proof, expected), fields(strict = self.strict))]
    pub fn verify(&self, proof: &Proof, expected: &NoncePair) -> Verdict {
        if proof.version != PROTOCOL_VERSION {
            return Verdict::Rejected(RejectReason::VersionMismatch);
        }
        if proof.nonces != *expected {
            warn!("submitted nonces do not match the stored challenge");
            return Verdict::Rejected(RejectReason::NonceMismatch);
        }

        let t = &self.thresholds;
        let lv = &proof.liveness;
        let ch = &proof.channels;

        let luma_pass = lv.r_luma >= t.r_luma_min;
        let barcode_pass = lv.barcode_err <= t.barcode_err_max;
        if !(luma_pass && barcode_pass) {
            debug!(r_luma = lv.r_luma, barcode_err = lv.barcode_err, "visual liveness failed");
            return Verdict::Rejected(RejectReason::VisualLiveness);
        }

        // Secondary channels auto-pass when the hardware was unavailable;
        // strict mode then requires a quorum of the conditional passes.
        let haptic_pass = if ch.haptics && ch.imu {
            lv.haptic_imu_ms <= t.haptic_imu_ms_max
        } else {
            true
        };
        let chirp_pass = if ch.audio {
            lv.chirp_snr >= t.chirp_snr_min_db
        } else {
            true
        };
        let vio_pass = if ch.video && ch.imu {
            lv.vio_imu_dev <= t.vio_imu_dev_max
        } else {
            true
        };

        if self.strict {
            let passed = [haptic_pass, chirp_pass, vio_pass]
                .iter()
                .filter(|p| **p)
                .count();
            if passed < 2 {
                return Verdict::Rejected(RejectReason::InsufficientChannels);
            }
        }

        for die in &proof.dice {
            if die.tumble_count < t.min_tumble {
                return Verdict::Rejected(RejectReason::TumbleLow);
            }
        }

        if let Some(reason) = self.audit_spot_check(proof, expected) {
            return Verdict::Rejected(reason);
        }

        if proof.attestation.scheme != SIGNATURE_SCHEME_ED25519 {
            return Verdict::Rejected(RejectReason::SigInvalid);
        }
        let digest = match canonical_digest(proof) {
            Ok(d) => d,
            Err(_) => return Verdict::Rejected(RejectReason::SigInvalid),
        };
        if verify_digest_signature(
            &proof.attestation.public_key_b64u,
            &digest,
            &proof.attestation.signature_b64u,
        )
        .is_err()
        {
            return Verdict::Rejected(RejectReason::SigInvalid);
        }

        for root in [
            &proof.stream_roots.video,
            &proof.stream_roots.imu,
            &proof.stream_roots.audio,
        ] {
            match b64u_decode(root) {
                Ok(bytes) if bytes.len() == 32 => {}
                _ => return Verdict::Rejected(RejectReason::RootSize),
            }
        }

        let confidences: Vec<f64> = proof.dice.iter().map(|d| d.confidence).collect();
        let score = integrity_score(lv, &confidences);
        debug!(overall = score.overall, "proof accepted");
        Verdict::Accepted(score)
    }

    /// Re-derive the schedule from the stored stim nonce and require at
    /// least `min_audit_hits` submitted audit frames to land on an "on"
    /// barcode frame. Cheaply catches pre-recorded video that ignored the
    /// real-time barcode. Skipped when no audit frames were submitted.
    fn audit_spot_check(&self, proof: &Proof, expected: &NoncePair) -> Option<RejectReason> {
        if proof.audit.frames.is_empty() {
            return None;
        }

        let stim_bytes = match b64u_decode(&expected.stim) {
            Ok(b) => b,
            Err(_) => return Some(RejectReason::Malformed),
        };
        let stim: [u8; 16] = match stim_bytes.try_into() {
            Ok(b) => b,
            Err(_) => return Some(RejectReason::Malformed),
        };
        let schedule = build_schedule(&stim, self.schedule_dur_ms);
        if schedule.barcode.len() < 2 {
            return Some(RejectReason::Malformed);
        }

        let last_idx = (schedule.barcode.len() - 1) as f64;
        let mut hits = 0usize;
        for frame in &proof.audit.frames {
            if frame.t_ms < 0.0 {
                continue;
            }
            let idx = (frame.t_ms / f64::from(schedule.dur_ms) * last_idx).round() as usize;
            if schedule.barcode.get(idx).copied() == Some(1) {
                hits += 1;
            }
        }
        if hits < self.min_audit_hits {
            return Some(RejectReason::BarcodeAuditFail);
        }
        None
    }
}
