//! Integration tests for the Chamador TV HTTP API
//!
//! Tests the admin/TV surface against an in-memory store:
//! - Health check
//! - Calling, recalling and clearing
//! - Room slots
//! - Sound check
//! - Configuration merge and resolution
//! - Page speech completion

mod helpers;

use axum::http::StatusCode;
use chamador_common::db::{init_in_memory, CallStore};
use chamador_common::feed::EventFeed;
use chamador_tv::api::{create_router, AppContext};
use chamador_tv::settings::OperatingConfig;
use chamador_tv::speech::{PageSpeech, SynthSpeech, Utterance};
use helpers::{Backends, Outcome, TestTv};
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

const OFF: (bool, Outcome) = (false, Outcome::Refuse);

struct TestApi {
    app: axum::Router,
    store: CallStore,
    page_speech: Arc<PageSpeech>,
    tv: TestTv,
}

/// Test helper to create a router over a fresh store
async fn setup_test_server() -> TestApi {
    let tv = TestTv::new(Backends::new(OFF, OFF).speech(), OperatingConfig::default());
    let pool = init_in_memory().await.expect("Failed to open database");
    let store = CallStore::new(pool, tv.clock.clone())
        .await
        .expect("Failed to create store");
    let page_speech = Arc::new(PageSpeech::new(tv.ctx.bus.clone()));

    let app = create_router(AppContext {
        store: store.clone(),
        tv: tv.ctx.clone(),
        page_speech: page_speech.clone(),
    });
    TestApi {
        app,
        store,
        page_speech,
        tv,
    }
}

/// Helper function to make HTTP requests to the test router
async fn make_request(
    app: &axum::Router,
    method: &str,
    path: &str,
    body: Option<Value>,
) -> (StatusCode, Option<Value>) {
    use axum::body::Body;
    use http::{Method, Request};
    use tower::ServiceExt;

    let method = match method {
        "GET" => Method::GET,
        "POST" => Method::POST,
        "PUT" => Method::PUT,
        "DELETE" => Method::DELETE,
        _ => panic!("Unsupported method"),
    };

    let mut request = Request::builder().method(method).uri(path);
    if body.is_some() {
        request = request.header("content-type", "application/json");
    }
    let request = match body {
        Some(json_body) => request.body(Body::from(json_body.to_string())).unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();

    let json_body = if body.is_empty() {
        None
    } else {
        Some(serde_json::from_slice(&body).unwrap())
    };
    (status, json_body)
}

#[tokio::test]
async fn test_health_endpoint() {
    let api = setup_test_server().await;

    let (status, body) = make_request(&api.app, "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    let body = body.unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["module"], "chamador_tv");
}

#[tokio::test]
async fn test_call_now_records_call_slot_and_trigger() {
    let api = setup_test_server().await;

    let (status, body) = make_request(
        &api.app,
        "POST",
        "/api/calls",
        Some(json!({"name": "  João  ", "room": "3"})),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    let body = body.unwrap();
    assert_eq!(body["call"]["name"], "João");
    assert_eq!(body["call"]["room"], "3");
    assert_eq!(body["call"]["isTest"], false);
    assert_eq!(body["trigger"]["name"], "João");
    assert_eq!(body["trigger"]["idle"], false);

    // The store and its feed both see the call
    let calls = api.store.recent_calls(10).await.unwrap();
    assert_eq!(calls.len(), 1);
    let trigger = api.store.current_trigger().await.unwrap().unwrap();
    assert_eq!(json!(trigger.nonce), body["trigger"]["nonce"]);
    assert_eq!(api.store.feed().current_calls().len(), 1);

    let (status, rooms) = make_request(&api.app, "GET", "/api/rooms", None).await;
    assert_eq!(status, StatusCode::OK);
    let rooms = rooms.unwrap();
    assert_eq!(rooms.as_array().unwrap().len(), 1);
    assert_eq!(rooms[0]["room"], "3");
    assert_eq!(rooms[0]["name"], "João");
}

#[tokio::test]
async fn test_call_now_requires_name() {
    let api = setup_test_server().await;

    let (status, body) = make_request(
        &api.app,
        "POST",
        "/api/calls",
        Some(json!({"name": "   ", "room": "3"})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.unwrap()["status"]
        .as_str()
        .unwrap()
        .starts_with("error"));
    assert!(api.store.recent_calls(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_list_calls_newest_first() {
    let api = setup_test_server().await;
    for name in ["Ana", "Bia", "Carla"] {
        make_request(&api.app, "POST", "/api/calls", Some(json!({"name": name, "room": "1"})))
            .await;
    }

    let (status, body) = make_request(&api.app, "GET", "/api/calls?limit=2", None).await;

    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = body
        .as_ref()
        .unwrap()
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Carla", "Bia"]);
}

#[tokio::test]
async fn test_recall_last() {
    let api = setup_test_server().await;

    let (status, _) = make_request(&api.app, "POST", "/api/calls/recall-last", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    make_request(&api.app, "POST", "/api/calls", Some(json!({"name": "Ana", "room": "2"})))
        .await;
    let first_nonce = api.store.current_trigger().await.unwrap().unwrap().nonce;
    let since = api.store.active_slot("2").await.unwrap().unwrap().since;

    api.tv.clock.advance(std::time::Duration::from_secs(30));
    let (status, body) = make_request(&api.app, "POST", "/api/calls/recall-last", None).await;

    assert_eq!(status, StatusCode::OK);
    let body = body.unwrap();
    assert_eq!(body["trigger"]["name"], "Ana");
    assert_eq!(body["trigger"]["room"], "2");
    assert!(body["trigger"]["idle"].is_null());
    assert_ne!(body["trigger"]["nonce"], json!(first_nonce));

    // Recall keeps the slot's original time
    let slot = api.store.active_slot("2").await.unwrap().unwrap();
    assert_eq!(slot.since, since);
    assert!(slot.last_announced_at.is_some());

    // Recall does not add to the history log
    assert_eq!(api.store.recent_calls(10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_clear_all_forces_idle() {
    let api = setup_test_server().await;
    for name in ["Ana", "Bia"] {
        make_request(&api.app, "POST", "/api/calls", Some(json!({"name": name, "room": "1"})))
            .await;
    }

    let (status, body) = make_request(
        &api.app,
        "POST",
        "/api/calls/clear",
        Some(json!({"scope": "all"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.unwrap()["removed"], 2);
    assert!(api.store.recent_calls(10).await.unwrap().is_empty());

    let trigger = api.store.current_trigger().await.unwrap().unwrap();
    assert_eq!(trigger.idle, Some(true));
    assert!(trigger.name.is_empty());
}

#[tokio::test]
async fn test_clear_today_removes_todays_calls() {
    let api = setup_test_server().await;
    make_request(&api.app, "POST", "/api/calls", Some(json!({"name": "Ana", "room": "1"})))
        .await;

    let (status, body) = make_request(
        &api.app,
        "POST",
        "/api/calls/clear",
        Some(json!({"scope": "today"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.unwrap()["removed"], 1);
}

#[tokio::test]
async fn test_room_recall_and_attend() {
    let api = setup_test_server().await;

    let (status, _) = make_request(&api.app, "POST", "/api/rooms/7/recall", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = make_request(&api.app, "DELETE", "/api/rooms/7", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    make_request(&api.app, "POST", "/api/calls", Some(json!({"name": "Bia", "room": "7"})))
        .await;

    let (status, body) = make_request(&api.app, "POST", "/api/rooms/7/recall", None).await;
    assert_eq!(status, StatusCode::OK);
    let body = body.unwrap();
    assert_eq!(body["slot"]["name"], "Bia");
    assert_eq!(body["trigger"]["name"], "Bia");
    assert_eq!(body["trigger"]["room"], "7");

    let (status, body) = make_request(&api.app, "DELETE", "/api/rooms/7", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(body.is_none());
    assert!(api.store.active_slots().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_call_without_room_occupies_nothing() {
    let api = setup_test_server().await;

    let (status, _) =
        make_request(&api.app, "POST", "/api/calls", Some(json!({"name": "Caio"}))).await;

    assert_eq!(status, StatusCode::CREATED);
    assert!(api.store.active_slots().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_announce_test_records_test_call() {
    let api = setup_test_server().await;

    let (status, body) = make_request(&api.app, "POST", "/api/announce/test", None).await;
    assert_eq!(status, StatusCode::CREATED);
    let body = body.unwrap();
    assert_eq!(body["isTest"], true);
    assert_eq!(body["name"], "Teste de som");

    let (status, body) = make_request(
        &api.app,
        "POST",
        "/api/announce/test",
        Some(json!({"name": "Maria", "room": "5"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body.unwrap()["name"], "Maria");

    // Test calls never occupy a room or touch the trigger
    assert!(api.store.active_slots().await.unwrap().is_empty());
    assert!(api.store.current_trigger().await.unwrap().is_none());
}

#[tokio::test]
async fn test_config_merge_and_clamp() {
    let api = setup_test_server().await;

    let (status, body) = make_request(&api.app, "GET", "/api/config", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.unwrap()["idleSeconds"], 120);

    let (status, body) = make_request(
        &api.app,
        "PUT",
        "/api/config",
        Some(json!({"announceMode": "web", "idleSeconds": 10})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let body = body.unwrap();
    assert_eq!(body["announceMode"], "web");
    assert_eq!(body["idleSeconds"], 60);

    // A later patch keeps the earlier fields
    let (status, body) =
        make_request(&api.app, "PUT", "/api/config", Some(json!({"duckVolume": 5}))).await;
    assert_eq!(status, StatusCode::OK);
    let body = body.unwrap();
    assert_eq!(body["announceMode"], "web");
    assert_eq!(body["duckVolume"], 5);

    let (_, body) = make_request(&api.app, "GET", "/api/config", None).await;
    assert_eq!(body.unwrap()["duckVolume"], 5);

    // The feed carries the raw document
    let snapshot = api.store.feed().current_config();
    assert_eq!(snapshot.primary().unwrap()["idleSeconds"], 10);
}

#[tokio::test]
async fn test_config_patch_keeps_fallback_record() {
    let api = setup_test_server().await;
    api.store
        .put_config(
            "clinica",
            json!({"idleSeconds": 200, "voiceTemplate": "Chamando {{nome}}"}),
        )
        .await
        .unwrap();

    let (_, body) = make_request(&api.app, "GET", "/api/config", None).await;
    let body = body.unwrap();
    assert_eq!(body["idleSeconds"], 200);
    assert_eq!(body["voiceTemplate"], "Chamando {{nome}}");

    let (status, body) =
        make_request(&api.app, "PUT", "/api/config", Some(json!({"duckVolume": 30}))).await;
    assert_eq!(status, StatusCode::OK);
    let body = body.unwrap();
    assert_eq!(body["idleSeconds"], 200);
    assert_eq!(body["voiceTemplate"], "Chamando {{nome}}");
    assert_eq!(body["duckVolume"], 30);

    // The record in use was patched; no primary record appeared
    let snapshot = api.store.feed().current_config();
    assert!(snapshot.primary().is_none());
    assert_eq!(snapshot.fallback().unwrap()["duckVolume"], 30);
}

#[tokio::test]
async fn test_config_rejects_non_object() {
    let api = setup_test_server().await;

    let (status, _) = make_request(&api.app, "PUT", "/api/config", Some(json!([1, 2]))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_display_defaults_to_empty_state() {
    let api = setup_test_server().await;

    let (status, body) = make_request(&api.app, "GET", "/api/display", None).await;

    assert_eq!(status, StatusCode::OK);
    let body = body.unwrap();
    assert!(body["currentGroup"].as_array().unwrap().is_empty());
    assert!(body["recentItems"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_speech_done_completes_pending_utterance() {
    let api = setup_test_server().await;

    let (status, _) = make_request(
        &api.app,
        "POST",
        &format!("/api/speech/{}/done", Uuid::new_v4()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // A page is listening
    let _page = api.page_speech.connect();
    let _events = api.tv.events();
    let (done_tx, mut done_rx) = tokio::sync::oneshot::channel();
    let utterance = Utterance {
        text: "Atenção: paciente Ana".to_string(),
        locale: "pt-BR".to_string(),
        rate: 1.0,
        pitch: 1.0,
    };
    assert!(api.page_speech.speak(&utterance, done_tx));
    let id = api.page_speech.pending_utterance().unwrap();

    let path = format!("/api/speech/{}/done", id);
    let (status, _) = make_request(&api.app, "POST", &path, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(done_rx.try_recv().is_ok());

    let (status, _) = make_request(&api.app, "POST", &path, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_feed_follows_store_writes() {
    let api = setup_test_server().await;
    let feed = api.store.feed();

    make_request(&api.app, "POST", "/api/calls", Some(json!({"name": "Ana", "room": "1"})))
        .await;

    use futures::StreamExt;
    let mut slots = feed.subscribe_active_slots();
    let current = slots.next().await.unwrap().unwrap();
    assert_eq!(current.len(), 1);
    assert_eq!(current[0].room, "1");
}
