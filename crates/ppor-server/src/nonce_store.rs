//! Expiring store for issued challenge nonces.
//!
//! One challenge may be outstanding per `(room, user)` at a time: issuing a
//! new one overwrites (and thereby invalidates) any unconsumed predecessor,
//! and consumption is an atomic check-and-remove, so the first submission
//! wins and a replay finds nothing.

use ppor_core::NoncePair;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Store configuration.
#[derive(Clone, Debug)]
pub struct NonceStoreConfig {
    /// How long an unconsumed challenge stays valid.
    pub ttl_ms: i64,
}

impl Default for NonceStoreConfig {
    fn default() -> Self {
        Self { ttl_ms: 120_000 }
    }
}

/// A challenge bound to one roll attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IssuedChallenge {
    pub round_id: String,
    pub nonces: NoncePair,
    pub expires_at_ms: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum ConsumeError {
    /// Nothing stored, already consumed, or expired.
    #[error("challenge missing or expired")]
    MissingOrExpired,
    /// A challenge exists but belongs to a different round.
    #[error("challenge round mismatch")]
    RoundMismatch,
}

/// Storage trait so deployments can swap in an external KV.
pub trait ChallengeStore: Send + Sync {
    /// Store a fresh challenge, replacing any unconsumed one for this player.
    fn issue(&self, room_id: &str, user_id: &str, challenge: IssuedChallenge);

    /// Atomically look up and remove the challenge for `(room, user)`,
    /// provided it matches `round_id` and has not expired. The entry is left
    /// intact on a round mismatch.
    fn consume(
        &self,
        room_id: &str,
        user_id: &str,
        round_id: &str,
    ) -> Result<NoncePair, ConsumeError>;

    /// Drop every expired entry.
    fn purge_expired(&self);
}

pub(crate) fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// In-memory challenge store.
#[derive(Default)]
pub struct InMemoryChallengeStore {
    entries: RwLock<HashMap<(String, String), IssuedChallenge>>,
}

impl InMemoryChallengeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expiry timestamp for a challenge issued now.
    pub fn expiry_from_now(config: &NonceStoreConfig) -> i64 {
        now_ms() + config.ttl_ms
    }
}

impl ChallengeStore for InMemoryChallengeStore {
    fn issue(&self, room_id: &str, user_id: &str, challenge: IssuedChallenge) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert((room_id.to_string(), user_id.to_string()), challenge);
        }
    }

    fn consume(
        &self,
        room_id: &str,
        user_id: &str,
        round_id: &str,
    ) -> Result<NoncePair, ConsumeError> {
        let key = (room_id.to_string(), user_id.to_string());
        let mut entries = self
            .entries
            .write()
            .map_err(|_| ConsumeError::MissingOrExpired)?;

        let Some(entry) = entries.get(&key) else {
            return Err(ConsumeError::MissingOrExpired);
        };
        if now_ms() >= entry.expires_at_ms {
            entries.remove(&key);
            return Err(ConsumeError::MissingOrExpired);
        }
        if entry.round_id != round_id {
            return Err(ConsumeError::RoundMismatch);
        }
        let entry = entries.remove(&key).ok_or(ConsumeError::MissingOrExpired)?;
        Ok(entry.nonces)
    }

    fn purge_expired(&self) {
        let now = now_ms();
        if let Ok(mut entries) = self.entries.write() {
            entries.retain(|_, e| e.expires_at_ms > now);
        }
    }
}
