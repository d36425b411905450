//! Verification counters.
//!
//! Cheap atomic instrumentation for the verifier path; rendered by whatever
//! observability backend the host service wires up.

use crate::verify::Verdict;
use std::sync::atomic::{AtomicU64, Ordering};

/// A counter that can only increase.
#[derive(Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Counters for the proof verification path.
#[derive(Default)]
pub struct VerifierMetrics {
    pub verifications_total: Counter,
    pub accepted_total: Counter,
    pub rejected_total: Counter,
    pub challenges_issued_total: Counter,
}

impl VerifierMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_verdict(&self, verdict: &Verdict) {
        self.verifications_total.inc();
        if verdict.is_accepted() {
            self.accepted_total.inc();
        } else {
            self.rejected_total.inc();
        }
    }
}
