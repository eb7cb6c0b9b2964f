//! Wire-level tests for the RPC and admin surfaces: envelope shapes,
//! base64 byte fields, and the status mapping.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use http_body_util::BodyExt;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use tower::ServiceExt;

use dispensa::dispatch::Dispatcher;
use dispensa::infra::http::{AppState, build_router};
use dispensa::service::CacheService;
use dispensa::store::{ContentStore, LookupIndex, StoreConfig};

fn app_with(store: StoreConfig, inline_association: bool) -> Router {
    let service = Arc::new(CacheService::new(
        Arc::new(ContentStore::new(&store)),
        Arc::new(LookupIndex::new()),
        inline_association,
    ));
    let dispatch = Arc::new(Dispatcher::new(service, 64, Duration::from_secs(5)));
    build_router(AppState { dispatch })
}

fn app() -> Router {
    app_with(StoreConfig::default(), false)
}

async fn post_json(app: &Router, path: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(path)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    read_response(response).await
}

async fn get(app: &Router, path: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
        .await
        .unwrap();
    read_response(response).await
}

async fn read_response(response: axum::response::Response) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn save_body(data: &[u8], kind: &str) -> Value {
    json!({
        "cas_id": B64.encode(Sha256::digest(data)),
        "data": B64.encode(data),
        "type": kind,
    })
}

#[tokio::test]
async fn get_value_miss_is_http_200_with_found_false() {
    let app = app();
    let (status, body) = post_json(
        &app,
        "/rpc/v1/get-value",
        json!({ "key": B64.encode(b"never-stored") }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "found": false }));
}

#[tokio::test]
async fn save_then_put_value_then_get_value_round_trips() {
    let app = app();

    let (status, saved) = post_json(&app, "/rpc/v1/save", save_body(b"object bytes", "o")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(saved["success"], json!(true));
    let cas_id = saved["cas_id"].as_str().unwrap().to_string();

    let (status, body) = post_json(
        &app,
        "/rpc/v1/put-value",
        json!({ "key": B64.encode(b"buildkey"), "cas_id": cas_id }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({}));

    let (status, body) = post_json(
        &app,
        "/rpc/v1/get-value",
        json!({ "key": B64.encode(b"buildkey") }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["found"], json!(true));
    assert_eq!(
        B64.decode(body["value"].as_str().unwrap()).unwrap(),
        b"object bytes"
    );
}

#[tokio::test]
async fn save_returns_the_server_computed_digest() {
    let app = app();
    let (status, body) = post_json(&app, "/rpc/v1/save", save_body(b"payload", "pcm")).await;

    assert_eq!(status, StatusCode::OK);
    let expected = B64.encode(Sha256::digest(b"payload"));
    assert_eq!(body["cas_id"].as_str().unwrap(), expected);
}

#[tokio::test]
async fn save_with_mismatched_claim_succeeds_under_computed_digest() {
    let app = app();
    let (status, body) = post_json(
        &app,
        "/rpc/v1/save",
        json!({
            "cas_id": B64.encode(Sha256::digest(b"something else")),
            "data": B64.encode(b"actual payload"),
            "type": "o",
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));
    assert_eq!(
        body["cas_id"].as_str().unwrap(),
        B64.encode(Sha256::digest(b"actual payload"))
    );
    assert!(
        body["message"]
            .as_str()
            .unwrap()
            .contains("did not match the computed digest")
    );
}

#[tokio::test]
async fn oversized_save_maps_to_service_unavailable() {
    let app = app_with(
        StoreConfig {
            max_artifact_bytes: 16,
            ..Default::default()
        },
        false,
    );

    let data = vec![7u8; 64];
    let (status, body) = post_json(&app, "/rpc/v1/save", save_body(&data, "o")).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["success"], json!(false));
    assert!(!body["message"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn load_stub_round_trips_kind_and_metadata() {
    let app = app();
    let data = b"module contents";
    let (_, saved) = post_json(
        &app,
        "/rpc/v1/save",
        json!({
            "cas_id": B64.encode(Sha256::digest(data)),
            "data": B64.encode(data),
            "type": "pcm",
            "metadata": { "target": "arm64-apple-macosx" },
        }),
    )
    .await;

    let (status, body) = post_json(
        &app,
        "/rpc/v1/load",
        json!({ "cas_id": saved["cas_id"] }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["found"], json!(true));
    assert_eq!(body["type"], json!("pcm"));
    assert_eq!(body["metadata"]["target"], json!("arm64-apple-macosx"));
    assert_eq!(
        B64.decode(body["data"].as_str().unwrap()).unwrap(),
        data.to_vec()
    );
}

#[tokio::test]
async fn load_of_unknown_digest_is_found_false() {
    let app = app();
    let (status, body) = post_json(
        &app,
        "/rpc/v1/load",
        json!({ "cas_id": B64.encode(Sha256::digest(b"unknown")) }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "found": false }));
}

#[tokio::test]
async fn put_value_rejects_short_digest() {
    let app = app();
    let (status, body) = post_json(
        &app,
        "/rpc/v1/put-value",
        json!({ "key": B64.encode(b"k"), "cas_id": B64.encode(b"short") }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], json!("bad_request"));
}

#[tokio::test]
async fn healthz_is_no_content() {
    let app = app();
    let (status, _) = get(&app, "/healthz").await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn admin_stats_reflect_traffic() {
    let app = app();
    post_json(&app, "/rpc/v1/save", save_body(b"counted", "o")).await;
    post_json(&app, "/rpc/v1/save", save_body(b"counted", "o")).await;
    post_json(
        &app,
        "/rpc/v1/get-value",
        json!({ "key": B64.encode(b"missing") }),
    )
    .await;

    let (status, body) = get(&app, "/admin/v1/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["artifact_count"], json!(1));
    assert_eq!(body["artifact_bytes"], json!(b"counted".len()));
    assert_eq!(body["dedup_hits"], json!(1));
    assert_eq!(body["lookup_misses"], json!(1));
}

#[tokio::test]
async fn admin_artifact_inspection_omits_payload() {
    let app = app();
    let data = b"inspect me";
    post_json(&app, "/rpc/v1/save", save_body(data, "metadata")).await;

    let hex_id = hex::encode(Sha256::digest(data));
    let (status, body) = get(&app, &format!("/admin/v1/artifacts/{hex_id}")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cas_id"], json!(hex_id));
    assert_eq!(body["type"], json!("metadata"));
    assert_eq!(body["size_bytes"], json!(data.len()));
    assert!(body.get("data").is_none());
}

#[tokio::test]
async fn admin_artifact_inspection_maps_not_found_and_bad_hex() {
    let app = app();

    let missing = hex::encode(Sha256::digest(b"missing"));
    let (status, body) = get(&app, &format!("/admin/v1/artifacts/{missing}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["grpc_code"], json!(5));

    let (status, body) = get(&app, "/admin/v1/artifacts/not-hex").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], json!("bad_request"));
}
