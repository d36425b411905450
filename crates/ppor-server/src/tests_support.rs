//! Shared test fixtures for the server crate's unit tests.

use ppor_core::crypto::{b64u_decode, b64u_encode};
use ppor_core::proof::{assemble_and_sign, ProofInput};
use ppor_core::stimulus::build_schedule;
use ppor_core::{
    AuditFrame, ChannelFlags, DiceReading, LivenessMetrics, NoncePair, Proof, StreamRoots,
    TimingMarks,
};

/// Audit frames whose timestamps land on "on" barcode frames of the schedule
/// the verifier will re-derive from `stim`.
pub(crate) fn matching_audit_frames(stim: &[u8; 16], dur_ms: u32, count: usize) -> Vec<AuditFrame> {
    let schedule = build_schedule(stim, dur_ms);
    let last_idx = (schedule.barcode.len() - 1) as f64;
    schedule
        .barcode
        .iter()
        .enumerate()
        .filter_map(|(i, b)| (*b == 1).then_some(i))
        .take(count)
        .map(|idx| AuditFrame {
            t_ms: idx as f64 / last_idx * f64::from(schedule.dur_ms),
            luma_b64u: b64u_encode(&[100u8; 8]),
        })
        .collect()
}

/// A proof that passes every verifier check when submitted against `nonces`.
pub(crate) fn signed_proof_for(nonces: &NoncePair) -> Proof {
    let stim: [u8; 16] = b64u_decode(&nonces.stim)
        .ok()
        .and_then(|b| b.try_into().ok())
        .unwrap_or([0u8; 16]);
    assemble_and_sign(ProofInput {
        dice: vec![DiceReading {
            id: "d1".into(),
            value: 6,
            confidence: 0.9,
            settle_t_ms: 880.0,
            tumble_count: 3,
        }],
        stream_roots: StreamRoots {
            video: b64u_encode(&[1u8; 32]),
            imu: b64u_encode(&[2u8; 32]),
            audio: b64u_encode(&[3u8; 32]),
        },
        liveness: LivenessMetrics {
            r_luma: 0.95,
            barcode_err: 0.05,
            haptic_imu_ms: 2.0,
            chirp_snr: 12.0,
            vio_imu_dev: 0.1,
        },
        channels: ChannelFlags {
            video: true,
            audio: true,
            haptics: true,
            imu: true,
        },
        timing: TimingMarks {
            t_start: 0.0,
            t_settle: 880.0,
            t_send: 1450.0,
        },
        nonces: nonces.clone(),
        audit_frames: matching_audit_frames(&stim, 1400, 3),
    })
    .unwrap()
}
