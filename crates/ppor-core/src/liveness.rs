//! Evidence extraction: the five liveness metrics.
//!
//! Each metric is a pure, stateless function over recorded traces, designed
//! so that a replayed or simulated feed scores poorly on at least one of
//! them. All are bit-for-bit reproducible given the same inputs; no clock or
//! I/O dependence.

use serde::{Deserialize, Serialize};

/// One reduced accelerometer sample: client-relative time and magnitude.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImuSample {
    pub t_ms: f64,
    pub mag: f64,
}

/// Haptic pulses only count as aligned when an IMU spike lands this close.
const HAPTIC_MATCH_WINDOW_MS: f64 = 30.0;

/// Reported when no haptic pulse found a nearby IMU sample.
pub const HAPTIC_ALIGN_FAIL_MS: f64 = 999.0;

/// Barcode frames must deviate from the local mean by this many local sigmas.
const BARCODE_DEVIATION_SIGMA: f64 = 1.2;

/// Barcode error reported when the schedule carries no "on" frames.
const BARCODE_DEFAULT_ERR: f64 = 0.3;

pub fn mean(values: &[f64]) -> f64 {
    let n = values.len().max(1) as f64;
    values.iter().sum::<f64>() / n
}

pub fn stddev(values: &[f64]) -> f64 {
    let m = mean(values);
    mean(&values.iter().map(|v| (v - m) * (v - m)).collect::<Vec<_>>()).sqrt()
}

/// Pearson correlation over the common prefix of `x` and `y`, clamped to
/// [-1, 1]; zero when either series is degenerate.
pub fn pearson(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len().min(y.len());
    if n == 0 {
        return 0.0;
    }
    let (mut sx, mut sy, mut sxx, mut syy, mut sxy) = (0.0, 0.0, 0.0, 0.0, 0.0);
    for i in 0..n {
        let (a, b) = (x[i], y[i]);
        sx += a;
        sy += b;
        sxx += a * a;
        syy += b * b;
        sxy += a * b;
    }
    let nf = n as f64;
    let cov = sxy - sx * sy / nf;
    let vx = sxx - sx * sx / nf;
    let vy = syy - sy * sy / nf;
    let denom = (vx * vy).sqrt();
    if denom == 0.0 || !denom.is_finite() {
        0.0
    } else {
        (cov / denom).clamp(-1.0, 1.0)
    }
}

/// `r_luma`: correlation between the observed mean-frame-luminance trace and
/// the planned brightness curve, resampled to the trace length via
/// nearest-index mapping. Higher is better.
pub fn luma_correlation(luma_trace: &[f64], planned: &[f64]) -> f64 {
    let len = luma_trace.len();
    if len < 2 || planned.len() < 2 {
        return 0.0;
    }
    let resampled: Vec<f64> = (0..len)
        .map(|i| {
            let idx = ((i as f64 / (len - 1) as f64) * (planned.len() - 1) as f64).round() as usize;
            planned[idx.min(planned.len() - 1)]
        })
        .collect();
    pearson(luma_trace, &resampled)
}

/// `barcode_err`: fraction of "on" barcode frames where the observed
/// luminance does NOT deviate from its local windowed mean by more than 1.2
/// local standard deviations. Lower is better; 0.3 when there are no "on"
/// frames, 1.0 when the trace is empty (fail closed).
pub fn barcode_error(luma_trace: &[f64], barcode: &[u8]) -> f64 {
    let total = barcode.iter().filter(|b| **b != 0).count();
    if total == 0 || barcode.len() < 2 {
        return BARCODE_DEFAULT_ERR;
    }
    let len = luma_trace.len();
    if len == 0 {
        return 1.0;
    }

    let mut missed = 0usize;
    for (i, on) in barcode.iter().enumerate() {
        if *on == 0 {
            continue;
        }
        let idx =
            ((i as f64 / (barcode.len() - 1) as f64) * (len - 1).max(0) as f64).round() as usize;
        let idx = idx.min(len - 1);
        let window = &luma_trace[idx.saturating_sub(2)..(idx + 3).min(len)];
        let m = mean(window);
        let s = stddev(window);
        // A beacon only registers when the frame deviates by MORE than 1.2
        // local sigmas; a perfectly flat trace therefore misses every beacon.
        if (luma_trace[idx] - m).abs() <= BARCODE_DEVIATION_SIGMA * s {
            missed += 1;
        }
    }
    missed as f64 / total as f64
}

/// `haptic_imu_ms`: average best time-distance between each commanded haptic
/// pulse and the nearest recorded IMU magnitude sample, restricted to
/// matches within 30 ms. Lower is better; 999 when nothing aligned.
pub fn haptic_imu_alignment(haptic_times_ms: &[f64], imu: &[ImuSample]) -> f64 {
    let mut deltas = Vec::new();
    for t in haptic_times_ms {
        let mut best = f64::INFINITY;
        for sample in imu {
            let dt = (sample.t_ms - t).abs();
            if dt < best {
                best = dt;
            }
        }
        if best < HAPTIC_MATCH_WINDOW_MS {
            deltas.push(best);
        }
    }
    if deltas.is_empty() {
        HAPTIC_ALIGN_FAIL_MS
    } else {
        deltas.iter().sum::<f64>() / deltas.len() as f64
    }
}

/// Single-bin Goertzel SNR at `freq`, in dB: signal power at that bin vs.
/// overall buffer variance.
pub fn goertzel_snr(samples: &[f32], sample_rate: f64, freq: f64) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let n = samples.len();
    let k = (0.5 + n as f64 * freq / sample_rate).round();
    let omega = 2.0 * std::f64::consts::PI * k / n as f64;
    let (cos, sin) = (omega.cos(), omega.sin());

    let (mut s_prev, mut s_prev2) = (0.0f64, 0.0f64);
    for sample in samples {
        let s = f64::from(*sample) + 2.0 * cos * s_prev - s_prev2;
        s_prev2 = s_prev;
        s_prev = s;
    }
    let real = s_prev - s_prev2 * cos;
    let imag = s_prev2 * sin;
    let power = real * real + imag * imag;

    let m = samples.iter().map(|s| f64::from(*s)).sum::<f64>() / n as f64;
    let var = samples
        .iter()
        .map(|s| {
            let d = f64::from(*s) - m;
            d * d
        })
        .sum::<f64>()
        / n as f64;

    10.0 * (power / (var + 1e-9)).log10()
}

/// `chirp_snr`: peak Goertzel SNR across the candidate chirp frequencies.
pub fn chirp_snr(samples: &[f32], sample_rate: f64, freqs: &[f64]) -> f64 {
    freqs
        .iter()
        .map(|f| goertzel_snr(samples, sample_rate, *f))
        .fold(f64::NEG_INFINITY, f64::max)
}

fn z_normalize(values: &[f64]) -> Vec<f64> {
    let m = mean(values);
    let s = stddev(values);
    let s = if s == 0.0 { 1.0 } else { s };
    values.iter().map(|v| (v - m) / s).collect()
}

/// `vio_imu_dev`: z-score the frame-to-frame pixel difference magnitudes and
/// the IMU acceleration magnitudes over their trailing overlap, then report
/// the mean absolute difference between the two normalized series. Large
/// deviation means visual motion and reported device motion disagree.
pub fn vio_imu_deviation(optical_flow_mag: &[f64], imu_mag: &[f64]) -> f64 {
    let n = optical_flow_mag.len().min(imu_mag.len());
    if n == 0 {
        return 1.0;
    }
    let a = z_normalize(&optical_flow_mag[optical_flow_mag.len() - n..]);
    let b = z_normalize(&imu_mag[imu_mag.len() - n..]);
    a.iter().zip(&b).map(|(x, y)| (x - y).abs()).sum::<f64>() / n as f64
}
