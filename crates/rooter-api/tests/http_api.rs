//! HTTP contract tests, driven through the router without a socket.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use rooter_api::{router, ApiConfig, AppState};
use rooter_core::defaults::{BLOCKHASH_NAMESPACE, BLOCKHASH_VIDEO_NAMESPACE};
use rooter_core::{JobRepository, JobStatus, MatchHit};
use rooter_db::test_fixtures::{hash_with_bits_set, seed_fingerprint};
use rooter_db::Database;
use rooter_jobs::{HasherRegistry, HasherSettings};

const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00];

struct TestApp {
    _dir: tempfile::TempDir,
    db: Database,
    app: Router,
}

fn test_app_with(config: impl FnOnce(ApiConfig) -> ApiConfig) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::in_memory();
    let registry = HasherRegistry::builtin(&HasherSettings::default()).unwrap();
    let config = config(ApiConfig::default().with_scratch_dir(dir.path().join("queue")));
    let app = router(AppState::new(db.clone(), registry, &config));
    TestApp { _dir: dir, db, app }
}

fn test_app() -> TestApp {
    test_app_with(|c| c)
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    send(app, Request::get(uri).body(Body::empty()).unwrap()).await
}

async fn post(app: &Router, uri: &str, body: Vec<u8>) -> (StatusCode, Value) {
    send(app, Request::post(uri).body(Body::from(body)).unwrap()).await
}

// =============================================================================
// SUBMIT / POLL
// =============================================================================

#[tokio::test]
async fn test_submit_returns_handle_then_poll_processing() {
    let t = test_app();
    let (status, body) = post(&t.app, "/v1/jobs?contact=me%40example.org", JPEG.to_vec()).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "pending");
    let handle = body["handle"].as_str().unwrap().to_string();

    let stored = t
        .db
        .jobs
        .get(handle.parse().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.contact.as_deref(), Some("me@example.org"));

    let (status, body) = get(&t.app, &format!("/v1/jobs/{}", handle)).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "processing");
    assert!(body.get("results").is_none());
}

#[tokio::test]
async fn test_submit_empty_body_is_bad_request() {
    let t = test_app();
    let (status, body) = post(&t.app, "/v1/jobs", Vec::new()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
    assert_eq!(t.db.jobs.stats().await.unwrap().total(), 0);
}

#[tokio::test]
async fn test_submit_oversize_body_rejected() {
    let t = test_app_with(|c| c.with_max_upload_bytes(16));
    let (status, _) = post(&t.app, "/v1/jobs", vec![0u8; 17]).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(t.db.jobs.stats().await.unwrap().total(), 0);

    let (status, _) = post(&t.app, "/v1/jobs", vec![0u8; 16]).await;
    assert_eq!(status, StatusCode::ACCEPTED);
}

#[tokio::test]
async fn test_poll_unknown_and_malformed_handles() {
    let t = test_app();
    let (status, body) = get(&t.app, &format!("/v1/jobs/{}", uuid::Uuid::new_v4())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("not found"));

    let (status, _) = get(&t.app, "/v1/jobs/not-a-uuid").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_poll_done_returns_ordered_results() {
    let t = test_app();
    let (far, _, _) = seed_fingerprint(&t.db, "Far", BLOCKHASH_NAMESPACE, &hash_with_bits_set(7))
        .await
        .unwrap();
    let (near, _, _) = seed_fingerprint(&t.db, "Near", BLOCKHASH_NAMESPACE, &hash_with_bits_set(2))
        .await
        .unwrap();

    let (_, body) = post(&t.app, "/v1/jobs", JPEG.to_vec()).await;
    let id: uuid::Uuid = body["handle"].as_str().unwrap().parse().unwrap();

    // Drive the job the way the worker would.
    assert_eq!(t.db.jobs.claim_batch(10).await.unwrap().len(), 1);
    let hits = vec![
        hit(far, 7),
        hit(near, 2),
    ];
    t.db
        .jobs
        .record_results(id, BLOCKHASH_NAMESPACE, &hits)
        .await
        .unwrap();
    t.db.jobs.complete(id).await.unwrap();

    let (status, body) = get(&t.app, &format!("/v1/jobs/{}", id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "done");
    assert!(body["completed_at"].is_string());
    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["distance"], 2);
    assert_eq!(results[0]["work"]["title"], "Near");
    assert_eq!(results[0]["namespace"], BLOCKHASH_NAMESPACE);
    assert_eq!(results[1]["distance"], 7);

    let job = t.db.jobs.get(id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Done);
}

fn hit(work_id: uuid::Uuid, distance: u32) -> MatchHit {
    MatchHit {
        work_id,
        work_title: None,
        manifestation_id: uuid::Uuid::new_v4(),
        fingerprint_id: uuid::Uuid::new_v4(),
        namespace: BLOCKHASH_NAMESPACE.to_string(),
        distance,
    }
}

// =============================================================================
// SEARCH
// =============================================================================

#[tokio::test]
async fn test_search_threshold_is_strict() {
    let t = test_app();
    seed_fingerprint(&t.db, "Nine", BLOCKHASH_NAMESPACE, &hash_with_bits_set(9))
        .await
        .unwrap();
    let zeros = "0".repeat(64);

    let (status, body) = get(&t.app, &format!("/v1/search?hash={}", zeros)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["namespace"], BLOCKHASH_NAMESPACE);
    assert_eq!(body["max_distance"], 10);
    assert_eq!(body["results"].as_array().unwrap().len(), 1);
    assert_eq!(body["results"][0]["distance"], 9);
    assert_eq!(body["results"][0]["work"]["title"], "Nine");

    let (_, body) = get(&t.app, &format!("/v1/search?hash={}&distance=9", zeros)).await;
    assert_eq!(body["max_distance"], 9);
    assert!(body["results"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_search_distance_cannot_exceed_namespace_threshold() {
    let t = test_app();
    seed_fingerprint(&t.db, "Far", BLOCKHASH_NAMESPACE, &hash_with_bits_set(20))
        .await
        .unwrap();
    let (_, body) = get(
        &t.app,
        &format!("/v1/search?hash={}&distance=200", "0".repeat(64)),
    )
    .await;
    assert_eq!(body["max_distance"], 10);
    assert!(body["results"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_search_namespace_selection() {
    let t = test_app();
    seed_fingerprint(&t.db, "Clip", BLOCKHASH_VIDEO_NAMESPACE, &hash_with_bits_set(30))
        .await
        .unwrap();
    let zeros = "0".repeat(64);

    // Default namespace is the still-image one.
    let (_, body) = get(&t.app, &format!("/v1/search?hash={}", zeros)).await;
    assert!(body["results"].as_array().unwrap().is_empty());

    let (_, body) = get(&t.app, &format!("/v1/search?hash={}&type=video/mp4", zeros)).await;
    assert_eq!(body["namespace"], BLOCKHASH_VIDEO_NAMESPACE);
    assert_eq!(body["max_distance"], 40);
    assert_eq!(body["results"][0]["distance"], 30);

    let uri = format!(
        "/v1/search?hash={}&namespace={}",
        zeros, BLOCKHASH_VIDEO_NAMESPACE
    );
    let (_, body) = get(&t.app, &uri).await;
    assert_eq!(body["results"].as_array().unwrap().len(), 1);

    // An empty type is the same as no type.
    let (status, body) = get(&t.app, &format!("/v1/search?hash={}&type=", zeros)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["namespace"], BLOCKHASH_NAMESPACE);
}

#[tokio::test]
async fn test_search_type_without_namespace_is_rejected() {
    let t = test_app();
    seed_fingerprint(&t.db, "StillImage", BLOCKHASH_NAMESPACE, &hash_with_bits_set(2))
        .await
        .unwrap();
    let zeros = "0".repeat(64);

    for media_type in ["audio/ogg", "text/plain"] {
        let uri = format!("/v1/search?hash={}&type={}", zeros, media_type);
        let (status, body) = get(&t.app, &uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", media_type);
        assert!(body.get("results").is_none());
        assert!(body["error"]
            .as_str()
            .unwrap()
            .contains("no namespace accepts"));
    }

    // The same hash without a type still finds the still image.
    let (_, body) = get(&t.app, &format!("/v1/search?hash={}", zeros)).await;
    assert_eq!(body["results"][0]["work"]["title"], "StillImage");
}

#[tokio::test]
async fn test_search_limit_caps_results() {
    let t = test_app();
    for bits in 0..5 {
        seed_fingerprint(&t.db, "w", BLOCKHASH_NAMESPACE, &hash_with_bits_set(bits))
            .await
            .unwrap();
    }
    let (_, body) = get(&t.app, &format!("/v1/search?hash={}&limit=3", "0".repeat(64))).await;
    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(results[0]["distance"], 0);
    assert_eq!(results[2]["distance"], 2);
}

#[tokio::test]
async fn test_search_malformed_input_is_bad_request() {
    let t = test_app();
    let cases = [
        "/v1/search".to_string(),
        "/v1/search?hash=".to_string(),
        "/v1/search?hash=abc".to_string(),
        format!("/v1/search?hash={}", "z".repeat(64)),
        format!("/v1/search?hash={}", "0".repeat(66)),
        format!("/v1/search?hash={}&namespace=urn:nope", "0".repeat(64)),
    ];
    for uri in cases {
        let (status, body) = get(&t.app, &uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
        assert!(body["error"].is_string(), "{}", uri);
    }
}

#[tokio::test]
async fn test_search_unregistered_default_namespace() {
    let t = test_app_with(|c| c.with_default_namespace("urn:missing"));
    let (status, _) = get(&t.app, &format!("/v1/search?hash={}", "0".repeat(64))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// =============================================================================
// HEALTH
// =============================================================================

#[tokio::test]
async fn test_health_reports_namespaces_and_queue() {
    let t = test_app();
    post(&t.app, "/v1/jobs", JPEG.to_vec()).await;

    let (status, body) = get(&t.app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    let namespaces: Vec<&str> = body["namespaces"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap())
        .collect();
    assert_eq!(namespaces, vec![BLOCKHASH_NAMESPACE, BLOCKHASH_VIDEO_NAMESPACE]);
    assert!(body["hashers"][BLOCKHASH_NAMESPACE].is_boolean());
    assert_eq!(body["queue"]["pending"], 1);
}

#[tokio::test]
async fn test_state_shares_registry() {
    let dir = tempfile::tempdir().unwrap();
    let registry = HasherRegistry::builtin(&HasherSettings::default()).unwrap();
    let state = AppState::new(
        Database::in_memory(),
        registry,
        &ApiConfig::default().with_scratch_dir(dir.path()),
    );
    let cloned = state.clone();
    assert!(Arc::ptr_eq(&state.registry, &cloned.registry));
    assert_eq!(state.registry.len(), 2);
}
