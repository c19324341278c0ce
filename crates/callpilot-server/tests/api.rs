//! Router-level tests: CRUD round-trips, the assignment invariant, the
//! dialogue flow, auth, and the event log — all over an in-memory database
//! with the vendor clients left unconfigured.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use callpilot_server::middleware::RateLimiter;
use callpilot_server::{app, AppState};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn test_state(api_key: Option<&str>) -> Arc<AppState> {
    let pool = callpilot_db::create_pool(":memory:", callpilot_db::SqliteSettings::default())
        .expect("pool");
    {
        let conn = pool.get().expect("conn");
        callpilot_db::run_migrations(&conn).expect("migrations");
    }

    let dialer = callpilot_dialer::AgentApiClient::new(callpilot_dialer::DialerConfig::default())
        .expect("dialer client");
    let sessions = callpilot_dialer::SessionManager::new(dialer.clone(), pool.clone());
    let (observe_tx, _) = tokio::sync::broadcast::channel(64);

    Arc::new(AppState {
        pool,
        dialer,
        sessions,
        ami: Arc::new(callpilot_ami::AmiClient::new(callpilot_ami::AmiConfig::default())),
        transfer: callpilot_ami::TransferConfig::default(),
        stt: callpilot_voice::SttClient::new(callpilot_voice::SttConfig::default()),
        tts: callpilot_voice::TtsClient::new(callpilot_voice::TtsConfig::default())
            .expect("tts client"),
        engine: callpilot_dialogue::DialogueEngine::default(),
        rate_limiter: RateLimiter::new(),
        rate_limit_per_minute: 1_000,
        api_key: api_key.map(str::to_string),
        default_agent_pass: "hello123".to_string(),
        observe_tx,
    })
}

async fn send(
    app: &axum::Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            builder.body(Body::from(json.to_string())).unwrap()
        }
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

fn sample_bot(bot_id: &str) -> Value {
    json!({
        "bot_id": bot_id,
        "name": "Solar Outreach",
        "script": [
            "Hi, this is a quick call about your energy bill.",
            "Would you like to speak with a specialist?"
        ],
    })
}

#[tokio::test]
async fn health_check_returns_ok() {
    let app = app(test_state(None));
    let (status, body) = send(&app, "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn bot_create_then_fetch_round_trips() {
    let app = app(test_state(None));

    let (status, created) = send(&app, "POST", "/api/bots", Some(sample_bot("solar_1"))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["bot_id"], "solar_1");

    let (status, fetched) = send(&app, "GET", "/api/bots/solar_1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["name"], "Solar Outreach");
    assert_eq!(fetched["script"].as_array().unwrap().len(), 2);
    assert_eq!(fetched["voice"], "en-US-Wavenet-F");
    assert_eq!(fetched["is_active"], true);
}

#[tokio::test]
async fn duplicate_bot_is_conflict_and_empty_script_is_bad_request() {
    let app = app(test_state(None));

    let (status, _) = send(&app, "POST", "/api/bots", Some(sample_bot("dup"))).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = send(&app, "POST", "/api/bots", Some(sample_bot("dup"))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(
        &app,
        "POST",
        "/api/bots",
        Some(json!({"bot_id": "empty", "name": "Empty", "script": ["  "]})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn archived_bots_leave_active_listing_and_reject_assignment() {
    let app = app(test_state(None));

    send(&app, "POST", "/api/bots", Some(sample_bot("a"))).await;
    send(&app, "POST", "/api/bots", Some(sample_bot("b"))).await;

    let (status, _) = send(&app, "DELETE", "/api/bots/b", None).await;
    assert_eq!(status, StatusCode::OK);

    let (_, active) = send(&app, "GET", "/api/bots?active=true", None).await;
    assert_eq!(active.as_array().unwrap().len(), 1);
    assert_eq!(active[0]["bot_id"], "a");

    let (status, _) = send(
        &app,
        "POST",
        "/api/assignments/campaign",
        Some(json!({"bot_id": "b", "campaign_id": "001"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn reassignment_keeps_exactly_one_active_per_agent() {
    let app = app(test_state(None));

    send(&app, "POST", "/api/bots", Some(sample_bot("b1"))).await;
    send(&app, "POST", "/api/bots", Some(sample_bot("b2"))).await;

    let (status, _) = send(
        &app,
        "POST",
        "/api/assignments/agent",
        Some(json!({"bot_id": "b1", "campaign_id": "001", "agent_user": "8024"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = send(
        &app,
        "POST",
        "/api/assignments/agent",
        Some(json!({"bot_id": "b2", "campaign_id": "002", "agent_user": "8024"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, active) = send(
        &app,
        "GET",
        "/api/assignments?agent_user=8024&active=true",
        None,
    )
    .await;
    let active = active.as_array().unwrap();
    assert_eq!(active.len(), 1, "exactly one active assignment per agent");
    assert_eq!(active[0]["bot_id"], "b2");

    let (_, all) = send(&app, "GET", "/api/assignments?agent_user=8024", None).await;
    assert_eq!(all.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn agent_crud_and_authentication() {
    let app = app(test_state(None));

    let (status, created) = send(
        &app,
        "POST",
        "/api/agents",
        Some(json!({
            "agent_user": "8024",
            "password": "hello123",
            "agent_login": "alg",
            "company_name": "Allegient"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["agent_user"], "8024");
    assert!(
        created.get("password").is_none() && created.get("password_hash").is_none(),
        "agent responses must not carry credentials"
    );

    let (status, body) = send(
        &app,
        "POST",
        "/api/agents/authenticate",
        Some(json!({"agent_user": "8024", "password": "hello123"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["agent"]["agent_user"], "8024");

    let (status, _) = send(
        &app,
        "POST",
        "/api/agents/authenticate",
        Some(json!({"agent_user": "8024", "password": "wrong"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (_, companies) = send(&app, "GET", "/api/companies", None).await;
    assert_eq!(companies[0]["name"], "Allegient");
}

#[tokio::test]
async fn dialogue_flow_advances_and_hands_off() {
    let app = app(test_state(None));
    send(&app, "POST", "/api/bots", Some(sample_bot("d1"))).await;

    let (status, started) = send(
        &app,
        "POST",
        "/api/dialogue/sessions",
        Some(json!({"bot_id": "d1"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(
        started["say"],
        "Hi, this is a quick call about your energy bill."
    );
    let key = started["session"]["session_key"].as_str().unwrap().to_string();

    // Yes on line 0 advances to line 1.
    let (status, turn) = send(
        &app,
        "POST",
        &format!("/api/dialogue/sessions/{key}/turn"),
        Some(json!({"transcript": "yes please"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(turn["intent"], "yes");
    assert_eq!(turn["action"], "advance");
    assert_eq!(turn["say"], "Would you like to speak with a specialist?");
    assert_eq!(turn["done"], false);

    // Yes on the last line hands off and closes the session.
    let (_, turn) = send(
        &app,
        "POST",
        &format!("/api/dialogue/sessions/{key}/turn"),
        Some(json!({"transcript": "sure"})),
    )
    .await;
    assert_eq!(turn["action"], "transfer_to_agent");
    assert_eq!(turn["done"], true);

    // A further turn is rejected.
    let (status, _) = send(
        &app,
        "POST",
        &format!("/api/dialogue/sessions/{key}/turn"),
        Some(json!({"transcript": "yes"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, session) = send(&app, "GET", &format!("/api/dialogue/sessions/{key}"), None).await;
    assert_eq!(session["outcome"], "transfer_to_agent");
    assert_eq!(session["responses"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn no_ends_the_call_and_turn_without_input_is_bad_request() {
    let app = app(test_state(None));
    send(&app, "POST", "/api/bots", Some(sample_bot("d2"))).await;

    let (_, started) = send(
        &app,
        "POST",
        "/api/dialogue/sessions",
        Some(json!({"bot_id": "d2"})),
    )
    .await;
    let key = started["session"]["session_key"].as_str().unwrap().to_string();

    let (status, _) = send(
        &app,
        "POST",
        &format!("/api/dialogue/sessions/{key}/turn"),
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, turn) = send(
        &app,
        "POST",
        &format!("/api/dialogue/sessions/{key}/turn"),
        Some(json!({"transcript": "not interested"})),
    )
    .await;
    assert_eq!(turn["intent"], "no");
    assert_eq!(turn["action"], "end_call");
    assert_eq!(turn["done"], true);
}

#[tokio::test]
async fn events_are_recorded_and_queryable() {
    let app = app(test_state(None));
    send(&app, "POST", "/api/bots", Some(sample_bot("e1"))).await;
    send(&app, "DELETE", "/api/bots/e1", None).await;

    let (status, body) = send(&app, "GET", "/api/events?domain=BOT", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 2);
    assert_eq!(body["events"][0]["event_type"], "BOT_CREATED");
    assert_eq!(body["events"][1]["event_type"], "BOT_ARCHIVED");

    let (status, _) = send(&app, "GET", "/api/events?domain=PIZZA", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn api_key_guards_protected_routes_but_not_health() {
    let app = app(test_state(Some("secret-key")));

    let (status, _) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, "POST", "/api/bots", Some(sample_bot("k1"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .method("POST")
        .uri("/api/bots")
        .header("content-type", "application/json")
        .header("X-Api-Key", "secret-key")
        .body(Body::from(sample_bot("k1").to_string()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let request = Request::builder()
        .method("POST")
        .uri("/api/bots")
        .header("content-type", "application/json")
        .header("Authorization", "Bearer secret-key")
        .body(Body::from(sample_bot("k2").to_string()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn unconfigured_vendor_endpoints_return_service_unavailable() {
    let app = app(test_state(None));

    let (status, body) = send(
        &app,
        "POST",
        "/api/calls/8024/dial",
        Some(json!({"phone_number": "9999999999"})),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "dialer_not_configured");

    let (status, body) = send(
        &app,
        "POST",
        "/api/transfers/closer",
        Some(json!({"channel": "SIP/telecast-00013813"})),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "ami_not_configured");

    let (status, _) = send(
        &app,
        "POST",
        "/api/transfers/closer",
        Some(json!({"channel": "  "})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app,
        "POST",
        "/api/calls/originate",
        Some(json!({"bot_extension": "8024", "destination": "1234"})),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "ami_not_configured");
}

#[tokio::test]
async fn session_endpoints_expose_the_cache() {
    let state = test_state(None);
    let app = app(state.clone());

    let (status, _) = send(&app, "GET", "/api/agents/8024/session", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, sessions) = send(&app, "GET", "/api/sessions", None).await;
    assert_eq!(sessions.as_array().unwrap().len(), 0);
}
