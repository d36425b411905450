//! Round history and reward bookkeeping.
//!
//! Round records are server-authoritative: appended only after successful
//! verification, immutable once written, and retained as a bounded trailing
//! window per room for in-session display.

use crate::service::{RewardLedger, RoomSink, RoundRecord};
use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;

/// In-memory per-room round history with a bounded window.
pub struct InMemoryRoomHistory {
    window: usize,
    rooms: RwLock<HashMap<String, VecDeque<RoundRecord>>>,
}

impl InMemoryRoomHistory {
    pub fn new(window: usize) -> Self {
        Self {
            window,
            rooms: RwLock::new(HashMap::new()),
        }
    }

    /// Recorded rounds for a room, oldest first.
    pub fn rounds(&self, room_id: &str) -> Vec<RoundRecord> {
        self.rooms
            .read()
            .ok()
            .and_then(|rooms| rooms.get(room_id).map(|r| r.iter().cloned().collect()))
            .unwrap_or_default()
    }
}

impl RoomSink for InMemoryRoomHistory {
    fn record_round(&self, room_id: &str, record: RoundRecord) {
        if let Ok(mut rooms) = self.rooms.write() {
            let history = rooms.entry(room_id.to_string()).or_default();
            history.push_back(record);
            while history.len() > self.window {
                history.pop_front();
            }
        }
    }
}

/// In-memory XP ledger.
#[derive(Default)]
pub struct InMemoryRewardLedger {
    xp: RwLock<HashMap<String, u64>>,
}

impl InMemoryRewardLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn xp(&self, user_id: &str) -> u64 {
        self.xp
            .read()
            .ok()
            .and_then(|xp| xp.get(user_id).copied())
            .unwrap_or(0)
    }
}

impl RewardLedger for InMemoryRewardLedger {
    fn credit_xp(&self, user_id: &str, amount: u64) {
        if let Ok(mut xp) = self.xp.write() {
            *xp.entry(user_id.to_string()).or_insert(0) += amount;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ppor_core::verify::IntegrityScore;

    fn record(round_id: &str) -> RoundRecord {
        RoundRecord {
            round_id: round_id.into(),
            user_id: "u1".into(),
            dice_values: vec![6],
            proof_digest_b64u: "digest".into(),
            signature_b64u: "sig".into(),
            integrity: IntegrityScore {
                overall: 0.9,
                per_die: vec![0.9],
            },
            timestamp_ms: 1000,
            fx_seed_b64u: "seed".into(),
        }
    }

    #[test]
    fn history_keeps_a_bounded_trailing_window() {
        let history = InMemoryRoomHistory::new(3);
        for i in 0..5 {
            history.record_round("r1", record(&format!("round-{i}")));
        }
        let rounds = history.rounds("r1");
        assert_eq!(rounds.len(), 3);
        assert_eq!(rounds[0].round_id, "round-2");
        assert_eq!(rounds[2].round_id, "round-4");
    }

    #[test]
    fn rooms_are_isolated() {
        let history = InMemoryRoomHistory::new(4);
        history.record_round("r1", record("a"));
        assert!(history.rounds("r2").is_empty());
    }

    #[test]
    fn ledger_accumulates_xp() {
        let ledger = InMemoryRewardLedger::new();
        ledger.credit_xp("u1", 12);
        ledger.credit_xp("u1", 20);
        assert_eq!(ledger.xp("u1"), 32);
        assert_eq!(ledger.xp("u2"), 0);
    }
}
