//! The roll service: challenge issuance and proof adjudication.
//!
//! Two operations form the protocol surface. `start_roll` authenticates the
//! player, mints the nonce pair, stores it with a TTL, and returns the
//! stimulus schedule. `submit_roll` re-authenticates, re-derives the round
//! id from the submitted session nonce, atomically consumes the stored
//! challenge, runs the verifier, and on success records the round and
//! credits the player's reward ledger.
//!
//! Room membership, authoritative room state, and rewards are external
//! collaborators, reached through traits.

use crate::nonce_store::{ChallengeStore, ConsumeError, IssuedChallenge, NonceStoreConfig};
use ppor_core::crypto::{b64u_encode, sha256};
use ppor_core::metrics::VerifierMetrics;
use ppor_core::stimulus::{build_schedule, Schedule};
use ppor_core::verify::{IntegrityScore, RejectReason, Verdict};
use ppor_core::{NoncePair, PporConfig, Proof, Verifier};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Bytes of presentation-effect seed attached to accepted rounds.
const FX_SEED_BYTES: usize = 8;

/// Authenticates a player against room membership. External collaborator.
pub trait RoomAuthenticator: Send + Sync {
    fn authenticate(&self, room_id: &str, user_id: &str, token: &str) -> bool;
}

/// Receives verified round records for the room's authoritative state.
pub trait RoomSink: Send + Sync {
    fn record_round(&self, room_id: &str, record: RoundRecord);
}

/// Credits rewards for accepted rolls.
pub trait RewardLedger: Send + Sync {
    fn credit_xp(&self, user_id: &str, amount: u64);
}

/// Server-authoritative record of one verified roll. Immutable once written.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoundRecord {
    pub round_id: String,
    pub user_id: String,
    pub dice_values: Vec<u8>,
    pub proof_digest_b64u: String,
    pub signature_b64u: String,
    pub integrity: IntegrityScore,
    pub timestamp_ms: i64,
    pub fx_seed_b64u: String,
}

/// Response to a successful `start_roll`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StartRollResponse {
    pub nonces: NoncePair,
    pub schedule: Schedule,
    pub round_id: String,
}

/// A verified, recorded roll.
#[derive(Clone, Debug)]
pub struct AcceptedRoll {
    pub record: RoundRecord,
    pub score: IntegrityScore,
    pub xp_awarded: u64,
}

/// Orchestrates the two protocol operations.
pub struct RollService {
    config: PporConfig,
    store_config: NonceStoreConfig,
    verifier: Verifier,
    store: Arc<dyn ChallengeStore>,
    auth: Arc<dyn RoomAuthenticator>,
    sink: Arc<dyn RoomSink>,
    ledger: Arc<dyn RewardLedger>,
    metrics: Arc<VerifierMetrics>,
}

fn derive_round_id(session_nonce: &[u8]) -> String {
    b64u_encode(&sha256(session_nonce).0)
}

impl RollService {
    pub fn new(
        config: PporConfig,
        store: Arc<dyn ChallengeStore>,
        auth: Arc<dyn RoomAuthenticator>,
        sink: Arc<dyn RoomSink>,
        ledger: Arc<dyn RewardLedger>,
    ) -> Self {
        let verifier = Verifier::new(config.strict_mode)
            .with_thresholds(config.thresholds)
            .with_schedule_duration(config.schedule_dur_ms);
        let store_config = NonceStoreConfig {
            ttl_ms: (config.nonce_ttl_secs * 1000) as i64,
        };
        Self {
            config,
            store_config,
            verifier,
            store,
            auth,
            sink,
            ledger,
            metrics: Arc::new(VerifierMetrics::new()),
        }
    }

    pub fn metrics(&self) -> Arc<VerifierMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Mint a challenge for one roll attempt.
    ///
    /// Any unconsumed previous challenge for this player is implicitly
    /// invalidated; the client must be able to regenerate the returned
    /// schedule from the stim nonce for verification parity.
    pub fn start_roll(
        &self,
        room_id: &str,
        user_id: &str,
        token: &str,
    ) -> Result<StartRollResponse, RejectReason> {
        if room_id.is_empty() || user_id.is_empty() || token.is_empty() {
            return Err(RejectReason::MissingParams);
        }
        if !self.auth.authenticate(room_id, user_id, token) {
            return Err(RejectReason::Unauthorized);
        }

        let mut session = [0u8; 16];
        let mut stim = [0u8; 16];
        OsRng.fill_bytes(&mut session);
        OsRng.fill_bytes(&mut stim);

        let nonces = NoncePair {
            session: b64u_encode(&session),
            stim: b64u_encode(&stim),
        };
        let round_id = derive_round_id(&session);
        let expires_at_ms =
            crate::nonce_store::InMemoryChallengeStore::expiry_from_now(&self.store_config);

        self.store.issue(
            room_id,
            user_id,
            IssuedChallenge {
                round_id: round_id.clone(),
                nonces: nonces.clone(),
                expires_at_ms,
            },
        );
        self.metrics.challenges_issued_total.inc();

        let schedule = build_schedule(&stim, self.config.schedule_dur_ms);
        debug!(room_id, user_id, round_id, "challenge issued");
        Ok(StartRollResponse {
            nonces,
            schedule,
            round_id,
        })
    }

    /// Adjudicate a submitted proof bundle.
    pub fn submit_roll(
        &self,
        room_id: &str,
        user_id: &str,
        token: &str,
        proof: &Proof,
    ) -> Result<AcceptedRoll, RejectReason> {
        if room_id.is_empty() || user_id.is_empty() || token.is_empty() {
            return Err(RejectReason::MissingParams);
        }
        if !self.auth.authenticate(room_id, user_id, token) {
            return Err(RejectReason::Unauthorized);
        }

        let session_bytes = ppor_core::crypto::b64u_decode(&proof.nonces.session)
            .map_err(|_| RejectReason::Malformed)?;
        let round_id = derive_round_id(&session_bytes);

        let nonces = self
            .store
            .consume(room_id, user_id, &round_id)
            .map_err(|e| match e {
                ConsumeError::MissingOrExpired => RejectReason::NoncesMissingOrExpired,
                ConsumeError::RoundMismatch => RejectReason::NonceMismatch,
            })?;

        let verdict = self.verifier.verify(proof, &nonces);
        self.metrics.record_verdict(&verdict);
        let score = match verdict {
            Verdict::Accepted(score) => score,
            Verdict::Rejected(reason) => {
                warn!(room_id, user_id, round_id, %reason, "roll rejected");
                return Err(reason);
            }
        };

        let proof_json = serde_json::to_vec(proof).map_err(|_| RejectReason::Malformed)?;
        let mut fx_seed = [0u8; FX_SEED_BYTES];
        OsRng.fill_bytes(&mut fx_seed);

        let record = RoundRecord {
            round_id: round_id.clone(),
            user_id: user_id.to_string(),
            dice_values: proof.dice.iter().map(|d| d.value).collect(),
            proof_digest_b64u: b64u_encode(&sha256(&proof_json).0),
            signature_b64u: proof.attestation.signature_b64u.clone(),
            integrity: score.clone(),
            timestamp_ms: crate::nonce_store::now_ms(),
            fx_seed_b64u: b64u_encode(&fx_seed),
        };

        self.sink.record_round(room_id, record.clone());
        let xp = (10.0 + score.overall * 20.0).round() as u64;
        self.ledger.credit_xp(user_id, xp);
        info!(room_id, user_id, round_id, overall = score.overall, xp, "roll accepted");

        Ok(AcceptedRoll {
            record,
            score,
            xp_awarded: xp,
        })
    }
}
