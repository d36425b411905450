//! HTTP surface for the roll service.
//!
//! Three routes: `POST /api/start-roll`, `POST /api/submit-roll`, and
//! `GET /healthz`. Requests and responses are JSON. Rejections come back as
//! `{ "ok": false, "reason": "<wire spelling>" }` with 403 for authorization
//! failures and 400 for everything else.

use crate::service::{RollService, StartRollResponse};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use ppor_core::verify::{IntegrityScore, RejectReason};
use ppor_core::Proof;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<RollService>,
}

#[derive(Deserialize)]
struct StartRollRequest {
    room_id: String,
    user_id: String,
    token: String,
}

#[derive(Serialize)]
struct StartRollBody {
    ok: bool,
    #[serde(flatten)]
    response: StartRollResponse,
}

#[derive(Deserialize)]
struct SubmitRollRequest {
    room_id: String,
    user_id: String,
    token: String,
    proof: Proof,
}

#[derive(Serialize)]
struct SubmitRollBody {
    ok: bool,
    round_id: String,
    dice_values: Vec<u8>,
    integrity: IntegrityScore,
    xp_awarded: u64,
    fx_seed_b64u: String,
}

#[derive(Serialize)]
struct RejectBody {
    ok: bool,
    reason: &'static str,
}

fn reject(reason: RejectReason) -> Response {
    let status = match reason {
        RejectReason::Unauthorized => StatusCode::FORBIDDEN,
        _ => StatusCode::BAD_REQUEST,
    };
    (
        status,
        Json(RejectBody {
            ok: false,
            reason: reason.as_str(),
        }),
    )
        .into_response()
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn start_roll_handler(
    State(state): State<AppState>,
    Json(req): Json<StartRollRequest>,
) -> Response {
    match state.service.start_roll(&req.room_id, &req.user_id, &req.token) {
        Ok(response) => Json(StartRollBody { ok: true, response }).into_response(),
        Err(reason) => reject(reason),
    }
}

async fn submit_roll_handler(
    State(state): State<AppState>,
    Json(req): Json<SubmitRollRequest>,
) -> Response {
    let service = Arc::clone(&state.service);
    // Signature verification and schedule re-derivation are CPU-bound; keep
    // them off the async worker threads.
    let join = tokio::task::spawn_blocking(move || {
        service.submit_roll(&req.room_id, &req.user_id, &req.token, &req.proof)
    })
    .await;

    let result = match join {
        Ok(result) => result,
        Err(_) => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    };
    match result {
        Ok(accepted) => Json(SubmitRollBody {
            ok: true,
            round_id: accepted.record.round_id,
            dice_values: accepted.record.dice_values,
            integrity: accepted.score,
            xp_awarded: accepted.xp_awarded,
            fx_seed_b64u: accepted.record.fx_seed_b64u,
        })
        .into_response(),
        Err(reason) => reject(reason),
    }
}

/// Build the application router.
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .route("/api/start-roll", post(start_roll_handler))
        .route("/api/submit-roll", post(submit_roll_handler))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::{InMemoryRewardLedger, InMemoryRoomHistory};
    use crate::nonce_store::InMemoryChallengeStore;
    use crate::service::RoomAuthenticator;
    use axum::body::Body;
    use axum::http::Request;
    use ppor_core::PporConfig;
    use serde::de::DeserializeOwned;
    use tower::ServiceExt;

    struct AllowAll;

    impl RoomAuthenticator for AllowAll {
        fn authenticate(&self, _room: &str, _user: &str, _token: &str) -> bool {
            true
        }
    }

    fn test_app() -> Router {
        let service = RollService::new(
            PporConfig::default(),
            Arc::new(InMemoryChallengeStore::new()),
            Arc::new(AllowAll),
            Arc::new(InMemoryRoomHistory::new(8)),
            Arc::new(InMemoryRewardLedger::new()),
        );
        build_app(AppState {
            service: Arc::new(service),
        })
    }

    async fn read_json<T: DeserializeOwned>(res: axum::http::Response<Body>) -> T {
        let bytes = axum::body::to_bytes(res.into_body(), 2 * 1024 * 1024)
            .await
            .expect("read body");
        serde_json::from_slice(&bytes).expect("json")
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    #[tokio::test]
    async fn healthz_reports_version() {
        let res = test_app()
            .oneshot(
                Request::builder()
                    .uri("/healthz")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(res.status(), StatusCode::OK);
        let body: serde_json::Value = read_json(res).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn start_roll_returns_nonces_and_schedule() {
        let res = test_app()
            .oneshot(post_json(
                "/api/start-roll",
                serde_json::json!({"room_id": "r1", "user_id": "u1", "token": "tok"}),
            ))
            .await
            .expect("response");
        assert_eq!(res.status(), StatusCode::OK);
        let body: serde_json::Value = read_json(res).await;
        assert_eq!(body["ok"], true);
        assert!(body["round_id"].is_string());
        assert!(body["nonces"]["session"].is_string());
        assert!(body["nonces"]["stim"].is_string());
        assert_eq!(body["schedule"]["dur_ms"], 1400);
    }

    #[tokio::test]
    async fn missing_params_is_a_bad_request() {
        let res = test_app()
            .oneshot(post_json(
                "/api/start-roll",
                serde_json::json!({"room_id": "", "user_id": "u1", "token": "tok"}),
            ))
            .await
            .expect("response");
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = read_json(res).await;
        assert_eq!(body["ok"], false);
        assert_eq!(body["reason"], "missing_params");
    }

    #[tokio::test]
    async fn unauthorized_is_forbidden() {
        struct DenyAll;

        impl RoomAuthenticator for DenyAll {
            fn authenticate(&self, _room: &str, _user: &str, _token: &str) -> bool {
                false
            }
        }

        let service = RollService::new(
            PporConfig::default(),
            Arc::new(InMemoryChallengeStore::new()),
            Arc::new(DenyAll),
            Arc::new(InMemoryRoomHistory::new(8)),
            Arc::new(InMemoryRewardLedger::new()),
        );
        let app = build_app(AppState {
            service: Arc::new(service),
        });

        let res = app
            .oneshot(post_json(
                "/api/start-roll",
                serde_json::json!({"room_id": "r1", "user_id": "u1", "token": "tok"}),
            ))
            .await
            .expect("response");
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
        let body: serde_json::Value = read_json(res).await;
        assert_eq!(body["reason"], "unauthorized");
    }

    #[tokio::test]
    async fn submit_without_challenge_reports_missing_nonces() {
        let proof = crate::tests_support::signed_proof_for(&ppor_core::NoncePair {
            session: ppor_core::crypto::b64u_encode(&[1u8; 16]),
            stim: ppor_core::crypto::b64u_encode(&[2u8; 16]),
        });
        let res = test_app()
            .oneshot(post_json(
                "/api/submit-roll",
                serde_json::json!({
                    "room_id": "r1",
                    "user_id": "u1",
                    "token": "tok",
                    "proof": proof,
                }),
            ))
            .await
            .expect("response");
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = read_json(res).await;
        assert_eq!(body["reason"], "nonces_missing_or_expired");
    }
}
