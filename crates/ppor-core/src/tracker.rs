//! Dice-value tracking over reduced luminance frames.
//!
//! Detection thresholds each frame at mean minus a scaled standard
//! deviation, flood-fills connected dark regions into pip candidates,
//! clusters nearby pips into die candidates, and estimates orientation from
//! the principal axis of the pip positions. Tracking matches detections to
//! existing tracks by nearest centre, counts tumbles on large angular
//! change, and drops tracks that go unseen.
//!
//! [`CaptureSession`] is the testable core of the client capture loop: it
//! consumes frames, maintains the luma trace and frame ring, and reports the
//! settle state that gates proof finalization.

use crate::crypto::b64u_encode;
use crate::{AuditFrame, DiceReading, MAX_DICE};
use std::collections::VecDeque;

/// A roll settles once a stable value has been reported this long.
pub const SETTLE_STABLE_MS: f64 = 200.0;

/// Tracks unseen for this long are dropped.
const TRACK_DROP_MS: f64 = 800.0;

/// Squared pixel distance within which a detection matches a track.
const TRACK_MATCH_DIST_SQ: f64 = 4000.0;

/// Angular change (rad) between matched frames that counts as a tumble.
const TUMBLE_ANGLE_RAD: f64 = 0.7;

/// Plausible pip blob area bounds (px).
const MIN_PIP_AREA: usize = 5;
const MAX_PIP_AREA: usize = 300;

/// Frames and trace samples retained by a capture session.
const RETAINED_FRAMES: usize = 240;

/// One die candidate detected in a single frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Detection {
    pub x: f64,
    pub y: f64,
    pub pips: u8,
    pub angle: f64,
    pub confidence: f64,
}

/// Ephemeral per-die tracking record.
#[derive(Clone, Debug, PartialEq)]
pub struct DieTrack {
    pub id: u32,
    pub value: u8,
    pub confidence: f64,
    pub x: f64,
    pub y: f64,
    pub angle: f64,
    pub tumble: u32,
    pub last_seen_ms: f64,
}

#[derive(Clone, Copy)]
struct PipBlob {
    x: i32,
    y: i32,
}

/// Detect pip clusters (die candidates) in a luminance frame.
///
/// `luma.len()` must equal `w * h`; anything else is a caller contract
/// violation.
pub fn detect_dice(luma: &[u8], w: usize, h: usize) -> Vec<Detection> {
    assert_eq!(luma.len(), w * h, "luma buffer does not match dimensions");
    if w < 3 || h < 3 {
        return Vec::new();
    }

    let n = luma.len() as f64;
    let (mut sum, mut sum2) = (0.0f64, 0.0f64);
    for v in luma {
        let v = f64::from(*v);
        sum += v;
        sum2 += v * v;
    }
    let mean = sum / n;
    let std = (sum2 / n - mean * mean).max(0.0).sqrt();
    let thr = (mean - 0.6 * std).clamp(10.0, 200.0);

    // Flood-fill connected dark regions over interior pixels (8-connected).
    let mut visited = vec![false; w * h];
    let mut blobs: Vec<PipBlob> = Vec::new();
    let mut queue: Vec<(usize, usize)> = Vec::new();

    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let idx = y * w + x;
            if visited[idx] {
                continue;
            }
            if f64::from(luma[idx]) >= thr {
                visited[idx] = true;
                continue;
            }
            visited[idx] = true;
            queue.clear();
            queue.push((x, y));
            let (mut area, mut sx, mut sy) = (0usize, 0usize, 0usize);
            let mut head = 0;
            while head < queue.len() {
                let (cx, cy) = queue[head];
                head += 1;
                area += 1;
                sx += cx;
                sy += cy;
                for dy in -1i32..=1 {
                    for dx in -1i32..=1 {
                        let nx = cx as i32 + dx;
                        let ny = cy as i32 + dy;
                        if nx <= 0 || nx >= (w - 1) as i32 || ny <= 0 || ny >= (h - 1) as i32 {
                            continue;
                        }
                        let nidx = ny as usize * w + nx as usize;
                        if !visited[nidx] && f64::from(luma[nidx]) < thr {
                            visited[nidx] = true;
                            queue.push((nx as usize, ny as usize));
                        }
                    }
                }
            }
            if (MIN_PIP_AREA..=MAX_PIP_AREA).contains(&area) {
                blobs.push(PipBlob {
                    x: (sx as f64 / area as f64).round() as i32,
                    y: (sy as f64 / area as f64).round() as i32,
                });
            }
        }
    }

    // Cluster pip blobs within a size-relative epsilon into die candidates.
    let eps = ((w.min(h) as f64) * 0.06).round().max(6.0);
    let eps_sq = eps * eps;
    let mut used = vec![false; blobs.len()];
    let mut dice = Vec::new();

    for i in 0..blobs.len() {
        if used[i] {
            continue;
        }
        used[i] = true;
        let mut cluster = vec![i];
        let mut j = 0;
        while j < cluster.len() {
            let a = blobs[cluster[j]];
            for (k, b) in blobs.iter().enumerate() {
                if used[k] {
                    continue;
                }
                let dx = f64::from(a.x - b.x);
                let dy = f64::from(a.y - b.y);
                if dx * dx + dy * dy <= eps_sq {
                    used[k] = true;
                    cluster.push(k);
                }
            }
            j += 1;
        }

        let pips = cluster.len();
        if !(1..=6).contains(&pips) {
            continue;
        }
        let cx = cluster.iter().map(|&k| f64::from(blobs[k].x)).sum::<f64>() / pips as f64;
        let cy = cluster.iter().map(|&k| f64::from(blobs[k].y)).sum::<f64>() / pips as f64;

        // Principal axis of the pip positions via the 2D covariance.
        let (mut cov_xx, mut cov_xy, mut cov_yy) = (0.0, 0.0, 0.0);
        for &k in &cluster {
            let dx = f64::from(blobs[k].x) - cx;
            let dy = f64::from(blobs[k].y) - cy;
            cov_xx += dx * dx;
            cov_xy += dx * dy;
            cov_yy += dy * dy;
        }
        let angle = 0.5 * (2.0 * cov_xy).atan2(cov_xx - cov_yy);

        dice.push(Detection {
            x: cx.round(),
            y: cy.round(),
            pips: pips as u8,
            angle,
            confidence: (pips as f64 / 6.0 + 0.3).min(1.0),
        });
    }

    dice
}

fn norm_angle(mut a: f64) -> f64 {
    while a > std::f64::consts::PI {
        a -= 2.0 * std::f64::consts::PI;
    }
    while a < -std::f64::consts::PI {
        a += 2.0 * std::f64::consts::PI;
    }
    a
}

/// Frame-to-frame die tracker.
#[derive(Debug, Default)]
pub struct DiceTracker {
    tracks: Vec<DieTrack>,
    next_id: u32,
}

impl DiceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tracks(&self) -> &[DieTrack] {
        &self.tracks
    }

    /// Match detections to tracks, spawn tracks for unmatched detections,
    /// and drop tracks unseen for too long.
    pub fn update(&mut self, detections: &[Detection], t_ms: f64) {
        let mut used = vec![false; detections.len()];

        for track in &mut self.tracks {
            let mut best = None;
            let mut best_dist = f64::INFINITY;
            for (i, det) in detections.iter().enumerate() {
                if used[i] {
                    continue;
                }
                let dx = track.x - det.x;
                let dy = track.y - det.y;
                let dist = dx * dx + dy * dy;
                if dist < best_dist {
                    best_dist = dist;
                    best = Some(i);
                }
            }
            if let Some(i) = best {
                if best_dist < TRACK_MATCH_DIST_SQ {
                    used[i] = true;
                    let det = &detections[i];
                    if norm_angle(det.angle - track.angle).abs() > TUMBLE_ANGLE_RAD {
                        track.tumble += 1;
                    }
                    track.x = det.x;
                    track.y = det.y;
                    track.angle = det.angle;
                    track.value = det.pips;
                    track.confidence = (track.confidence * 0.7 + det.confidence * 0.3).min(1.0);
                    track.last_seen_ms = t_ms;
                }
            }
        }

        for (i, det) in detections.iter().enumerate() {
            if used[i] {
                continue;
            }
            self.next_id += 1;
            self.tracks.push(DieTrack {
                id: self.next_id,
                value: det.pips,
                confidence: det.confidence,
                x: det.x,
                y: det.y,
                angle: det.angle,
                tumble: 1,
                last_seen_ms: t_ms,
            });
        }

        self.tracks.retain(|tr| t_ms - tr.last_seen_ms < TRACK_DROP_MS);
    }
}

/// Per-roll capture state: frame ring, luma trace, tracks, settle detection.
///
/// One session per roll attempt; torn down with the roll. Pure with respect
/// to time: the caller supplies every timestamp.
pub struct CaptureSession {
    width: usize,
    height: usize,
    tracker: DiceTracker,
    frames: VecDeque<(f64, Vec<u8>)>,
    luma_trace: VecDeque<f64>,
    settled_at: Option<f64>,
}

impl CaptureSession {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            tracker: DiceTracker::new(),
            frames: VecDeque::new(),
            luma_trace: VecDeque::new(),
            settled_at: None,
        }
    }

    /// Ingest one reduced luminance frame captured at `t_ms`.
    pub fn push_frame(&mut self, luma: &[u8], t_ms: f64) {
        self.frames.push_back((t_ms, luma.to_vec()));
        if self.frames.len() > RETAINED_FRAMES {
            self.frames.pop_front();
        }

        let detections = detect_dice(luma, self.width, self.height);
        self.tracker.update(&detections, t_ms);

        let frame_mean =
            luma.iter().map(|v| f64::from(*v)).sum::<f64>() / luma.len().max(1) as f64;
        self.luma_trace.push_back(frame_mean);
        if self.luma_trace.len() > RETAINED_FRAMES {
            self.luma_trace.pop_front();
        }

        if self.current_values().is_empty() {
            self.settled_at = None;
        } else if self.settled_at.is_none() {
            self.settled_at = Some(t_ms);
        }
    }

    /// Values currently reported by live tracks, capped at [`MAX_DICE`].
    pub fn current_values(&self) -> Vec<u8> {
        self.tracker
            .tracks()
            .iter()
            .map(|t| t.value)
            .filter(|v| (1..=6).contains(v))
            .take(MAX_DICE)
            .collect()
    }

    /// True once at least one die has reported a stable value continuously
    /// for [`SETTLE_STABLE_MS`].
    pub fn is_settled(&self, now_ms: f64) -> bool {
        self.settled_at
            .is_some_and(|t| now_ms - t >= SETTLE_STABLE_MS)
    }

    pub fn tracks(&self) -> &[DieTrack] {
        self.tracker.tracks()
    }

    /// The observed mean-frame-luminance trace.
    pub fn luma_trace(&self) -> Vec<f64> {
        self.luma_trace.iter().copied().collect()
    }

    /// The retained raw frames, oldest first, for stream commitment.
    pub fn frame_leaves(&self) -> Vec<&[u8]> {
        self.frames.iter().map(|(_, f)| f.as_slice()).collect()
    }

    /// Finalized per-die readings for the proof bundle.
    pub fn readings(&self) -> Vec<DiceReading> {
        let settle_t = self
            .settled_at
            .or_else(|| self.frames.back().map(|(t, _)| *t))
            .unwrap_or(0.0);
        self.tracker
            .tracks()
            .iter()
            .filter(|t| (1..=6).contains(&t.value))
            .take(MAX_DICE)
            .map(|t| DiceReading {
                id: format!("d{}", t.id),
                value: t.value,
                confidence: t.confidence,
                settle_t_ms: settle_t,
                tumble_count: t.tumble,
            })
            .collect()
    }

    /// Audit thumbnails: the last frame plus the frames at 60% and 30% of
    /// the retained window. Selection is tunable, not load-bearing.
    pub fn audit_frames(&self) -> Vec<AuditFrame> {
        let n = self.frames.len();
        if n == 0 {
            return Vec::new();
        }
        let mut picks = vec![
            n - 1,
            ((n as f64) * 0.6).floor() as usize,
            ((n as f64) * 0.3).floor() as usize,
        ];
        picks.sort_unstable();
        picks.dedup();
        picks
            .into_iter()
            .filter_map(|i| self.frames.get(i))
            .map(|(t_ms, luma)| AuditFrame {
                t_ms: *t_ms,
                luma_b64u: b64u_encode(luma),
            })
            .collect()
    }
}
