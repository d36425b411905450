//! End-to-end roll lifecycle: challenge issuance, client-side proof
//! assembly, and server-side adjudication, through both the service API and
//! the HTTP surface.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use ppor_core::crypto::b64u_encode;
use ppor_core::merkle::merkle_root;
use ppor_core::proof::{assemble_and_sign, ProofInput};
use ppor_core::stimulus::Schedule;
use ppor_core::verify::RejectReason;
use ppor_core::{
    AuditFrame, ChannelFlags, DiceReading, LivenessMetrics, PporConfig, Proof, StreamRoots,
    TimingMarks,
};
use ppor_server::service::RoomAuthenticator;
use ppor_server::{
    build_app, AppState, InMemoryChallengeStore, InMemoryRewardLedger, InMemoryRoomHistory,
    RollService, StartRollResponse,
};
use std::sync::Arc;
use tower::ServiceExt;

struct AllowAll;

impl RoomAuthenticator for AllowAll {
    fn authenticate(&self, _room: &str, _user: &str, _token: &str) -> bool {
        true
    }
}

struct Harness {
    service: RollService,
    history: Arc<InMemoryRoomHistory>,
    ledger: Arc<InMemoryRewardLedger>,
}

fn harness() -> Harness {
    let history = Arc::new(InMemoryRoomHistory::new(16));
    let ledger = Arc::new(InMemoryRewardLedger::new());
    let service = RollService::new(
        PporConfig::default(),
        Arc::new(InMemoryChallengeStore::new()),
        Arc::new(AllowAll),
        Arc::clone(&history) as Arc<dyn ppor_server::RoomSink>,
        Arc::clone(&ledger) as Arc<dyn ppor_server::RewardLedger>,
    );
    Harness {
        service,
        history,
        ledger,
    }
}

/// Audit frames whose timestamps land on beacon frames of the schedule the
/// server handed out.
fn audit_frames_from(schedule: &Schedule, count: usize) -> Vec<AuditFrame> {
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

/// What a well-behaved client assembles after capturing a real roll.
fn client_proof(start: &StartRollResponse) -> Proof {
    let video_frames = [vec![10u8; 64], vec![11u8; 64]];
    let imu_samples = [vec![1u8; 16], vec![2u8; 16]];
    let audio_chunks = [vec![3u8; 32], vec![4u8; 32]];
    let roots = StreamRoots {
        video: b64u_encode(&merkle_root(&video_frames).unwrap().0),
        imu: b64u_encode(&merkle_root(&imu_samples).unwrap().0),
        audio: b64u_encode(&merkle_root(&audio_chunks).unwrap().0),
    };

    assemble_and_sign(ProofInput {
        dice: vec![DiceReading {
            id: "d1".into(),
            value: 6,
            confidence: 0.9,
            settle_t_ms: 880.0,
            tumble_count: 3,
        }],
        stream_roots: roots,
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
        nonces: start.nonces.clone(),
        audit_frames: audit_frames_from(&start.schedule, 3),
    })
    .unwrap()
}

#[test]
fn full_roll_lifecycle() {
    let h = harness();

    let start = h.service.start_roll("r1", "u1", "tok").unwrap();
    assert_eq!(start.schedule.dur_ms, 1400);

    let proof = client_proof(&start);
    let accepted = h.service.submit_roll("r1", "u1", "tok", &proof).unwrap();
    assert!(
        accepted.score.overall > 0.8,
        "overall {}",
        accepted.score.overall
    );
    assert_eq!(accepted.score.per_die, vec![0.9]);
    assert_eq!(accepted.record.dice_values, vec![6]);
    assert_eq!(accepted.record.round_id, start.round_id);

    let rounds = h.history.rounds("r1");
    assert_eq!(rounds.len(), 1);
    assert_eq!(rounds[0], accepted.record);
    assert_eq!(h.ledger.xp("u1"), accepted.xp_awarded);

    // The consumed challenge cannot be replayed.
    assert_eq!(
        h.service.submit_roll("r1", "u1", "tok", &proof).unwrap_err(),
        RejectReason::NoncesMissingOrExpired
    );
}

#[test]
fn tampered_dice_value_fails_signature_check() {
    let h = harness();
    let start = h.service.start_roll("r1", "u1", "tok").unwrap();
    let mut proof = client_proof(&start);
    proof.dice[0].value = 1;
    assert_eq!(
        h.service.submit_roll("r1", "u1", "tok", &proof).unwrap_err(),
        RejectReason::SigInvalid
    );
    assert!(h.history.rounds("r1").is_empty());
    assert_eq!(h.ledger.xp("u1"), 0);
}

#[test]
fn nonce_substitution_is_rejected() {
    let h = harness();
    let start_a = h.service.start_roll("r1", "u1", "tok").unwrap();
    // A second challenge for the same player invalidates the first.
    let _start_b = h.service.start_roll("r1", "u1", "tok").unwrap();

    let proof = client_proof(&start_a);
    assert_eq!(
        h.service.submit_roll("r1", "u1", "tok", &proof).unwrap_err(),
        RejectReason::NonceMismatch
    );
}

#[tokio::test]
async fn full_roll_lifecycle_over_http() {
    let h = harness();
    let app = build_app(AppState {
        service: Arc::new(h.service),
    });

    let res = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/start-roll")
                .header("content-type", "application/json")
                .body(Body::from(
                    serde_json::json!({"room_id": "r1", "user_id": "u1", "token": "tok"})
                        .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(res.into_body(), 2 * 1024 * 1024)
        .await
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["ok"], true);
    let start: StartRollResponse = serde_json::from_value(serde_json::json!({
        "nonces": body["nonces"],
        "schedule": body["schedule"],
        "round_id": body["round_id"],
    }))
    .unwrap();

    let proof = client_proof(&start);
    let res = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/submit-roll")
                .header("content-type", "application/json")
                .body(Body::from(
                    serde_json::json!({
                        "room_id": "r1",
                        "user_id": "u1",
                        "token": "tok",
                        "proof": proof,
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(res.into_body(), 2 * 1024 * 1024)
        .await
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["ok"], true);
    assert_eq!(body["round_id"], start.round_id);
    assert_eq!(body["dice_values"], serde_json::json!([6]));
    assert!(body["integrity"]["overall"].as_f64().unwrap() > 0.8);
}
