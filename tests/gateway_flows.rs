//! End-to-end gateway tests driving the full router directly, the same way
//! the teacher's `api_integration.rs` exercises `dashflow-registry` without
//! a live listener.

#![cfg(feature = "server")]

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use serde_json::{json, Value};
use tower::util::ServiceExt;

use interview_backend::{ApiConfig, ApiServer};

fn test_server() -> ApiServer {
    let mut config = ApiConfig::default();
    config.config.token_signing_secret = b"gateway-flow-test-secret".to_vec();
    ApiServer::new(config)
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn post(uri: &str, bearer: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str, bearer: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

fn create_session_request() -> Value {
    json!({
        "role_category": "Backend",
        "experience": { "years": 4, "months": 6 },
        "modes": ["behavioral", "coding"],
        "question_count": 5,
        "duration_limit_minutes": 30,
        "language": "en-us",
        "difficulty": "medium",
        "include_curated_questions": true,
        "allow_ai_generated": true,
        "allow_mcq": false,
        "allow_fib": false,
        "consent_recording": true,
        "consent_anti_cheat": true,
    })
}

/// Logs in, creates a session, and drives it through precheck + start +
/// the first `/next-question` (which lazily flips `Ready` to `Active`).
/// Returns (router, session_id, user_token, ist_token, aipt_token, first_question_id).
async fn bootstrap_active_session(
    server: &ApiServer,
) -> (axum::Router, String, String, String, String, String) {
    let router = server.router();

    let login = router
        .clone()
        .oneshot(post(
            "/auth/login",
            None,
            json!({ "email": "candidate@example.com" }),
        ))
        .await
        .unwrap();
    assert_eq!(login.status(), StatusCode::OK);
    let login_body = json_body(login).await;
    let user_token = login_body["user_token"].as_str().unwrap().to_string();

    let created = router
        .clone()
        .oneshot(post(
            "/interview/sessions",
            Some(&user_token),
            create_session_request(),
        ))
        .await
        .unwrap();
    assert_eq!(created.status(), StatusCode::OK);
    let created_body = json_body(created).await;
    let session_id = created_body["session"]["id"].as_str().unwrap().to_string();
    let ist_token = created_body["ist_token"].as_str().unwrap().to_string();

    let acet_mint = router
        .clone()
        .oneshot(post(
            &format!("/interview/{session_id}/token/acet"),
            Some(&ist_token),
            Value::Null,
        ))
        .await
        .unwrap();
    assert_eq!(acet_mint.status(), StatusCode::OK);
    let acet_token = json_body(acet_mint).await["token"]
        .as_str()
        .unwrap()
        .to_string();

    let precheck = router
        .clone()
        .oneshot(post(
            &format!("/interview/{session_id}/precheck"),
            Some(&acet_token),
            json!({
                "camera_ok": true,
                "microphone_ok": true,
                "fullscreen_ok": true,
                "network_ok": true,
            }),
        ))
        .await
        .unwrap();
    assert_eq!(precheck.status(), StatusCode::OK);
    let precheck_body = json_body(precheck).await;
    assert_eq!(precheck_body["can_proceed"], true);

    let start = router
        .clone()
        .oneshot(post(
            &format!("/interview/{session_id}/start"),
            Some(&ist_token),
            Value::Null,
        ))
        .await
        .unwrap();
    assert_eq!(start.status(), StatusCode::OK);
    let start_body = json_body(start).await;
    let aipt_token = start_body["aipt_token"].as_str().unwrap().to_string();

    let first_question = router
        .clone()
        .oneshot(post(
            &format!("/interview/{session_id}/next-question"),
            Some(&aipt_token),
            Value::Null,
        ))
        .await
        .unwrap();
    assert_eq!(first_question.status(), StatusCode::OK);
    let question_id = json_body(first_question).await["id"]
        .as_str()
        .unwrap()
        .to_string();

    let state_after_start = router
        .clone()
        .oneshot(get(
            &format!("/interview/{session_id}/state"),
            Some(&user_token),
        ))
        .await
        .unwrap();
    assert_eq!(json_body(state_after_start).await["state"], "active");

    (
        router,
        session_id,
        user_token,
        ist_token,
        aipt_token,
        question_id,
    )
}

#[tokio::test]
async fn happy_path_reaches_a_scored_summary() {
    let server = test_server();
    let (router, session_id, user_token, ist_token, aipt_token, first_question_id) =
        bootstrap_active_session(&server).await;

    let answer = router
        .clone()
        .oneshot(post(
            &format!("/interview/{session_id}/answer"),
            Some(&ist_token),
            json!({
                "question_id": first_question_id,
                "payload": { "kind": "text", "text": "I led a migration across three services." },
                "time_spent_seconds": 42,
            }),
        ))
        .await
        .unwrap();
    assert_eq!(answer.status(), StatusCode::OK);

    // Ask and answer the remaining four questions so `question_count` is
    // fully exhausted before finalize.
    let mut asked = 1;
    while asked < 5 {
        let next = router
            .clone()
            .oneshot(post(
                &format!("/interview/{session_id}/next-question"),
                Some(&aipt_token),
                Value::Null,
            ))
            .await
            .unwrap();
        assert_eq!(next.status(), StatusCode::OK);
        let next_body = json_body(next).await;
        let question_id = next_body["id"].as_str().unwrap().to_string();

        let answer = router
            .clone()
            .oneshot(post(
                &format!("/interview/{session_id}/answer"),
                Some(&ist_token),
                json!({
                    "question_id": question_id,
                    "payload": { "kind": "text", "text": "a reasonably detailed answer" },
                    "time_spent_seconds": 30,
                }),
            ))
            .await
            .unwrap();
        assert_eq!(answer.status(), StatusCode::OK);
        asked += 1;
    }

    let finalize = router
        .clone()
        .oneshot(post(
            &format!("/interview/{session_id}/finalize"),
            Some(&ist_token),
            Value::Null,
        ))
        .await
        .unwrap();
    assert_eq!(finalize.status(), StatusCode::OK);
    let finalize_body = json_body(finalize).await;
    assert_eq!(finalize_body["state"], "completed");

    let summary = router
        .clone()
        .oneshot(get(&format!("/interview/{session_id}/summary"), Some(&user_token)))
        .await
        .unwrap();
    assert_eq!(summary.status(), StatusCode::OK);

    let review = router
        .oneshot(get(&format!("/interview/{session_id}/review"), Some(&user_token)))
        .await
        .unwrap();
    assert_eq!(review.status(), StatusCode::OK);
    let review_body = json_body(review).await;
    assert_eq!(review_body["entries"].as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn anti_cheat_chain_break_is_rejected() {
    let server = test_server();
    let (router, session_id, _user_token, ist_token, _aipt_token, _question_id) =
        bootstrap_active_session(&server).await;

    let acet_mint = router
        .clone()
        .oneshot(post(
            &format!("/interview/{session_id}/token/acet"),
            Some(&ist_token),
            Value::Null,
        ))
        .await
        .unwrap();
    assert_eq!(acet_mint.status(), StatusCode::OK);
    let acet_token = json_body(acet_mint).await["token"]
        .as_str()
        .unwrap()
        .to_string();

    // seq starts at 2, skipping 1: the chain has no prior events so this is
    // a gap from the very first expected seq.
    let response = router
        .oneshot(post(
            &format!("/interview/{session_id}/anti-cheat"),
            Some(&acet_token),
            json!({
                "events": [{
                    "seq": 2,
                    "prev_hash": "",
                    "type": "TAB_SWITCH",
                    "ts": chrono::Utc::now().to_rfc3339(),
                }]
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = json_body(response).await;
    assert_eq!(body["code"], "CHAIN_BROKEN");
}

#[tokio::test]
async fn screenshot_attempt_auto_ends_the_session() {
    let server = test_server();
    let (router, session_id, user_token, ist_token, _aipt_token, first_question_id) =
        bootstrap_active_session(&server).await;

    let acet_mint = router
        .clone()
        .oneshot(post(
            &format!("/interview/{session_id}/token/acet"),
            Some(&ist_token),
            Value::Null,
        ))
        .await
        .unwrap();
    let acet_token = json_body(acet_mint).await["token"]
        .as_str()
        .unwrap()
        .to_string();

    let batch = router
        .clone()
        .oneshot(post(
            &format!("/interview/{session_id}/anti-cheat"),
            Some(&acet_token),
            json!({
                "events": [{
                    "seq": 1,
                    "prev_hash": "",
                    "type": "SCREENSHOT_ATTEMPT",
                    "ts": chrono::Utc::now().to_rfc3339(),
                }]
            }),
        ))
        .await
        .unwrap();
    assert_eq!(batch.status(), StatusCode::OK);

    // The session ended on the very first occurrence; the read-only state
    // view (User-audience, not session-bound) still reflects it.
    let state = router
        .clone()
        .oneshot(get(
            &format!("/interview/{session_id}/state"),
            Some(&user_token),
        ))
        .await
        .unwrap();
    assert_eq!(state.status(), StatusCode::OK);
    assert_eq!(json_body(state).await["state"], "ended");

    // The IST is not generation-fenced (only AIPT/UPT are), so it still
    // verifies; the session's own terminal `Ended` state is what rejects
    // the answer.
    let answer = router
        .oneshot(post(
            &format!("/interview/{session_id}/answer"),
            Some(&ist_token),
            json!({
                "question_id": first_question_id,
                "payload": { "kind": "text", "text": "too late" },
                "time_spent_seconds": 5,
            }),
        ))
        .await
        .unwrap();
    assert_eq!(answer.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn wrong_audience_token_is_rejected() {
    let server = test_server();
    let (router, session_id, _user_token, ist_token, _aipt_token, _question_id) =
        bootstrap_active_session(&server).await;

    // The IST is not an ACET; anti-cheat submission must reject it outright.
    let response = router
        .oneshot(post(
            &format!("/interview/{session_id}/anti-cheat"),
            Some(&ist_token),
            json!({ "events": [] }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(body["code"], "TOKEN_WRONG_AUDIENCE");
}

#[tokio::test]
async fn refresh_returns_empty_object_once_the_session_is_terminal() {
    let server = test_server();
    let (router, session_id, _user_token, ist_token, _aipt_token, _question_id) =
        bootstrap_active_session(&server).await;

    let finalize = router
        .clone()
        .oneshot(post(
            &format!("/interview/{session_id}/finalize"),
            Some(&ist_token),
            Value::Null,
        ))
        .await
        .unwrap();
    assert_eq!(finalize.status(), StatusCode::OK);

    // Finalize bumps the token generation, but IST is not fenced by it
    // (only AIPT/UPT are, per spec.md §4.3), so this IST still passes
    // `verify_session_token` here and the handler's own terminal-state
    // check is what yields the empty object spec.md §8 scenario 6 requires.
    let refresh = router
        .oneshot(post(
            &format!("/interview/{session_id}/token/refresh"),
            Some(&ist_token),
            Value::Null,
        ))
        .await
        .unwrap();
    assert_eq!(refresh.status(), StatusCode::OK);
    let body = json_body(refresh).await;
    assert_eq!(body, json!({}));
}

#[tokio::test]
async fn concurrent_next_question_calls_reject_rather_than_queue() {
    let server = test_server();
    let (router, session_id, _user_token, _ist_token, aipt_token, _question_id) =
        bootstrap_active_session(&server).await;

    let first = router.clone().oneshot(post(
        &format!("/interview/{session_id}/next-question"),
        Some(&aipt_token),
        Value::Null,
    ));
    let second = router.clone().oneshot(post(
        &format!("/interview/{session_id}/next-question"),
        Some(&aipt_token),
        Value::Null,
    ));

    let (first, second) = tokio::join!(first, second);
    let statuses = [first.unwrap().status(), second.unwrap().status()];
    assert!(statuses.contains(&StatusCode::OK));
    assert!(statuses.iter().any(|s| *s != StatusCode::OK));
}

#[tokio::test]
async fn unknown_route_is_not_found() {
    let server = test_server();
    let router = server.router();
    let response = router.oneshot(get("/does-not-exist", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
