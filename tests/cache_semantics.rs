//! End-to-end cache behavior through the HTTP surface: the write-only
//! client pattern, eviction visibility, the association extension gate,
//! and concurrent store collapse.

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
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn save_body(data: &[u8]) -> Value {
    json!({
        "cas_id": B64.encode(Sha256::digest(data)),
        "data": B64.encode(data),
        "type": "o",
    })
}

async fn lookup(app: &Router, key: &[u8]) -> Value {
    let (status, body) = post_json(
        app,
        "/rpc/v1/get-value",
        json!({ "key": B64.encode(key) }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body
}

/// The reference client's session: look everything up in parallel, miss,
/// compile locally, save everything, never fetch. A second session with
/// out-of-band associations then hits.
#[tokio::test]
async fn write_only_client_sessions_behave_as_documented() {
    let app = app_with(StoreConfig::default(), false);
    let artifacts: Vec<&[u8]> = vec![b"object-a", b"object-b", b"object-c"];

    // First session: all lookups miss.
    for (i, _) in artifacts.iter().enumerate() {
        let body = lookup(&app, format!("key-{i}").as_bytes()).await;
        assert_eq!(body["found"], json!(false));
    }

    // Saves populate only the content store.
    for data in &artifacts {
        let (status, body) = post_json(&app, "/rpc/v1/save", save_body(data)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], json!(true));
    }

    // Without association the same keys still miss.
    for (i, _) in artifacts.iter().enumerate() {
        let body = lookup(&app, format!("key-{i}").as_bytes()).await;
        assert_eq!(body["found"], json!(false));
    }

    // Out-of-band association connects keys to digests; the second
    // session hits with full payloads.
    for (i, data) in artifacts.iter().enumerate() {
        post_json(
            &app,
            "/rpc/v1/put-value",
            json!({
                "key": B64.encode(format!("key-{i}").as_bytes()),
                "cas_id": B64.encode(Sha256::digest(data)),
            }),
        )
        .await;
    }
    for (i, data) in artifacts.iter().enumerate() {
        let body = lookup(&app, format!("key-{i}").as_bytes()).await;
        assert_eq!(body["found"], json!(true));
        assert_eq!(
            B64.decode(body["value"].as_str().unwrap()).unwrap(),
            data.to_vec()
        );
    }
}

#[tokio::test]
async fn evicted_artifact_turns_into_a_clean_miss() {
    let app = app_with(
        StoreConfig {
            capacity_bytes: 8,
            max_artifact_bytes: 1024,
            shard_count: 1,
            eviction_grace: Duration::ZERO,
        },
        false,
    );

    post_json(&app, "/rpc/v1/save", save_body(b"aaaa")).await;
    post_json(
        &app,
        "/rpc/v1/put-value",
        json!({
            "key": B64.encode(b"victim"),
            "cas_id": B64.encode(Sha256::digest(b"aaaa")),
        }),
    )
    .await;

    // Push past the byte budget so the first artifact is evicted.
    post_json(&app, "/rpc/v1/save", save_body(b"bbbb")).await;
    post_json(&app, "/rpc/v1/save", save_body(b"cccc")).await;
    post_json(&app, "/rpc/v1/save", save_body(b"dddd")).await;

    let body = lookup(&app, b"victim").await;
    assert_eq!(body["found"], json!(false));
}

#[tokio::test]
async fn inline_association_gate_controls_save_cache_key() {
    let request = json!({
        "cas_id": B64.encode(Sha256::digest(b"payload")),
        "data": B64.encode(b"payload"),
        "type": "o",
        "cache_key": B64.encode(b"inline-key"),
    });

    // Disabled (the default): the key is ignored with a diagnostic.
    let app = app_with(StoreConfig::default(), false);
    let (_, body) = post_json(&app, "/rpc/v1/save", request.clone()).await;
    assert_eq!(body["success"], json!(true));
    assert!(body["message"].as_str().unwrap().contains("ignored"));
    assert_eq!(lookup(&app, b"inline-key").await["found"], json!(false));

    // Enabled: the save also records the association.
    let app = app_with(StoreConfig::default(), true);
    let (_, body) = post_json(&app, "/rpc/v1/save", request).await;
    assert_eq!(body["success"], json!(true));
    let hit = lookup(&app, b"inline-key").await;
    assert_eq!(hit["found"], json!(true));
    assert_eq!(
        B64.decode(hit["value"].as_str().unwrap()).unwrap(),
        b"payload"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_identical_saves_all_succeed_with_one_physical_write() {
    let app = app_with(StoreConfig::default(), false);
    let expected = B64.encode(Sha256::digest(b"shared artifact"));

    let mut handles = Vec::new();
    for _ in 0..16 {
        let app = app.clone();
        let expected = expected.clone();
        handles.push(tokio::spawn(async move {
            let (status, body) =
                post_json(&app, "/rpc/v1/save", save_body(b"shared artifact")).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["success"], json!(true));
            assert_eq!(body["cas_id"].as_str().unwrap(), expected);
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/admin/v1/stats")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let stats: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(stats["artifact_count"], json!(1));
    assert_eq!(stats["artifact_bytes"], json!(b"shared artifact".len()));
}
