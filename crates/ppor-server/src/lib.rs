//! PPOR roll adjudication service.
//!
//! Wires the pure protocol logic from `ppor-core` into a stateful server:
//! an expiring challenge store, per-room round history, a reward ledger, and
//! an axum HTTP surface. Room membership is an external concern reached
//! through the [`service::RoomAuthenticator`] trait.

pub mod history;
pub mod nonce_store;
pub mod routes;
pub mod service;

#[cfg(test)]
pub(crate) mod tests_support;

pub use history::{InMemoryRewardLedger, InMemoryRoomHistory};
pub use nonce_store::{ChallengeStore, InMemoryChallengeStore, NonceStoreConfig};
pub use routes::{build_app, AppState};
pub use service::{
    AcceptedRoll, RewardLedger, RollService, RoomAuthenticator, RoomSink, RoundRecord,
    StartRollResponse,
};
