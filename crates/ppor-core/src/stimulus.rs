//! Deterministic stimulus schedule generation.
//!
//! The schedule is a pure function of the 16-byte stim nonce and a target
//! duration: identical inputs always yield an identical schedule, on client
//! and server alike. This is the trust anchor that lets the verifier
//! recompute "what should have happened" without storing the schedule.
//!
//! The pseudo-random stream is a 128-bit xorshift keyed directly from the
//! nonce bytes. The draw order is part of the cross-side contract: sinusoid
//! amplitudes, phases, barcode placement, haptic offsets, chirp count, then
//! per-chirp time and frequency.

use crate::AUDIO_CHIRP_FREQS;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Default capture duration (ms).
pub const DEFAULT_DURATION_MS: u32 = 1400;

/// Schedule sampling rate (frames per second).
const SCHEDULE_FPS: f64 = 60.0;

/// Number of barcode "on" frames placed per schedule.
const BARCODE_ON_FRAMES: usize = 6;

/// A scheduled audio chirp: onset offset from roll start, and frequency.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChirpEvent {
    pub t_ms: u32,
    pub freq: f64,
}

/// The full stimulus schedule for one roll.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub dur_ms: u32,
    /// Per-frame brightness multiplier, hugging 1.0 within +/-3%.
    pub luma: Vec<f64>,
    /// Sparse binary timing-beacon array, one entry per frame.
    pub barcode: Vec<u8>,
    /// Haptic pulse offsets (ms).
    pub haptics: Vec<u32>,
    /// Audio chirp events.
    pub chirps: Vec<ChirpEvent>,
}

/// 128-bit xorshift stream seeded from the stim nonce.
///
/// Statistically adequate for stimulus placement; not a CSPRNG and not used
/// as one (the nonce itself carries the unpredictability).
#[derive(Clone, Debug)]
pub struct Xorshift128 {
    x: u32,
    y: u32,
    z: u32,
    w: u32,
}

impl Xorshift128 {
    /// Seed from 16 nonce bytes, big-endian word order.
    pub fn from_seed(seed: &[u8; 16]) -> Self {
        Self {
            x: u32::from_be_bytes([seed[0], seed[1], seed[2], seed[3]]),
            y: u32::from_be_bytes([seed[4], seed[5], seed[6], seed[7]]),
            z: u32::from_be_bytes([seed[8], seed[9], seed[10], seed[11]]),
            w: u32::from_be_bytes([seed[12], seed[13], seed[14], seed[15]]),
        }
    }

    /// Next value uniform in [0, 1).
    pub fn next_unit(&mut self) -> f64 {
        let t = self.x ^ (self.x << 11);
        self.x = self.y;
        self.y = self.z;
        self.z = self.w;
        self.w = self.w ^ (self.w >> 19) ^ t ^ (t >> 8);
        f64::from(self.w) / 4_294_967_296.0
    }
}

/// Build the stimulus schedule for a roll.
///
/// Pure and side-effect free. Malformed nonce length is a caller contract
/// violation, enforced by the `[u8; 16]` parameter type.
pub fn build_schedule(nonce_stim: &[u8; 16], dur_ms: u32) -> Schedule {
    let mut rand = Xorshift128::from_seed(nonce_stim);
    let frames = (f64::from(dur_ms) / 1000.0 * SCHEDULE_FPS).round() as usize;

    // Three summed sinusoids at fixed frequencies with seeded amplitude/phase.
    let a1 = 0.015 + rand.next_unit() * 0.01;
    let a2 = 0.01 + rand.next_unit() * 0.01;
    let a3 = 0.005 + rand.next_unit() * 0.005;
    let p1 = rand.next_unit() * PI * 2.0;
    let p2 = rand.next_unit() * PI * 2.0;
    let p3 = rand.next_unit() * PI * 2.0;

    let mut luma = Vec::with_capacity(frames);
    for i in 0..frames {
        let t = i as f64 / SCHEDULE_FPS;
        let v = 1.0
            + a1 * (2.0 * PI * 1.3 * t + p1).sin()
            + a2 * (2.0 * PI * 2.1 * t + p2).sin()
            + a3 * (2.0 * PI * 0.7 * t + p3).sin();
        luma.push(v.clamp(0.97, 1.03));
    }

    let mut barcode = vec![0u8; frames];
    if frames > 0 {
        let span = frames.saturating_sub(BARCODE_ON_FRAMES) as f64;
        for k in 0..BARCODE_ON_FRAMES {
            let base = (rand.next_unit() * span).floor() as usize;
            let idx = (base + k).min(frames - 1);
            barcode[idx] = 1;
        }
    }

    let haptics = (0..3)
        .map(|_| (300.0 + rand.next_unit() * 1200.0).floor() as u32)
        .collect();

    let n_chirps = 2 + (rand.next_unit() * 2.0).floor() as usize;
    let chirps = (0..n_chirps)
        .map(|_| {
            let t_ms = (250.0 + rand.next_unit() * 1400.0).floor() as u32;
            let fi = ((rand.next_unit() * AUDIO_CHIRP_FREQS.len() as f64).floor() as usize)
                .min(AUDIO_CHIRP_FREQS.len() - 1);
            ChirpEvent {
                t_ms,
                freq: AUDIO_CHIRP_FREQS[fi],
            }
        })
        .collect();

    Schedule {
        dur_ms,
        luma,
        barcode,
        haptics,
        chirps,
    }
}
