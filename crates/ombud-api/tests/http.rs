//! End-to-end HTTP tests: the full mediation scenario driven through the
//! assembled router, plus the error mapping a client actually observes.

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use ombud_api::{routes, AppState};

struct TestActor {
    id: Uuid,
    grant: &'static str,
}

fn client() -> TestActor {
    TestActor {
        id: Uuid::new_v4(),
        grant: "client",
    }
}

fn admin() -> TestActor {
    TestActor {
        id: Uuid::new_v4(),
        grant: "admin",
    }
}

fn app() -> Router {
    routes::router(AppState::in_memory())
}

async fn call(app: &Router, actor: &TestActor, method: &str, uri: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-ombud-actor", actor.id.to_string())
        .header("x-ombud-grant", actor.grant)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn open_dispute(app: &Router, opener: &TestActor) -> (String, u64) {
    let (status, body) = call(
        app,
        opener,
        "POST",
        "/v1/disputes",
        json!({
            "orderId": Uuid::new_v4(),
            "reason": "not_delivered",
            "details": "nothing arrived by the deadline"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    (
        body["disputeId"].as_str().unwrap().to_string(),
        body["version"].as_u64().unwrap(),
    )
}

#[tokio::test(flavor = "multi_thread")]
async fn test_full_mediation_scenario() {
    let app = app();
    let client = client();
    let admin = admin();

    let (dispute_id, _) = open_dispute(&app, &client).await;

    // Admin starts mediation; a room opens.
    let (status, body) = call(
        &app,
        &admin,
        "POST",
        &format!("/v1/disputes/{dispute_id}/start-mediation"),
        Value::Null,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "under_analysis");
    let room_id = body["roomId"].as_str().unwrap().to_string();

    // Client sends a message into the room.
    let (status, body) = call(
        &app,
        &client,
        "POST",
        &format!("/v1/rooms/{room_id}/messages"),
        json!({ "body": "the package never arrived" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["seq"], 1);

    // Read the dispute to get the current version.
    let (status, dispute) = call(
        &app,
        &admin,
        "GET",
        &format!("/v1/disputes/{dispute_id}"),
        Value::Null,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let version = dispute["version"].as_u64().unwrap();

    // A stale resolve loses with 409.
    let (status, body) = call(
        &app,
        &admin,
        "POST",
        &format!("/v1/disputes/{dispute_id}/resolve"),
        json!({
            "action": "refund_client",
            "note": "client evidence is conclusive",
            "expectedVersion": version + 7
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("stale state"));

    // The fresh version wins.
    let (status, body) = call(
        &app,
        &admin,
        "POST",
        &format!("/v1/disputes/{dispute_id}/resolve"),
        json!({
            "action": "refund_client",
            "note": "client evidence is conclusive",
            "expectedVersion": version
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "resolved");
    assert_eq!(body["resolutionType"], "refund_client");

    // Sends into the room are now refused with the reopen hint.
    let (status, body) = call(
        &app,
        &client,
        "POST",
        &format!("/v1/rooms/{room_id}/messages"),
        json!({ "body": "wait, one more thing" }),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("use reopen"));

    // Reopening restores the dispute to open.
    let (status, body) = call(
        &app,
        &admin,
        "POST",
        &format!("/v1/disputes/{dispute_id}/reopen"),
        json!({ "confirmed": true }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "open");
    assert_eq!(body["details"], "nothing arrived by the deadline");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_resolve_requires_mediator_grant() {
    let app = app();
    let client = client();
    let (dispute_id, version) = open_dispute(&app, &client).await;

    let (status, _) = call(
        &app,
        &client,
        "POST",
        &format!("/v1/disputes/{dispute_id}/resolve"),
        json!({
            "action": "dismiss",
            "expectedVersion": version
        }),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_financial_action_requires_note() {
    let app = app();
    let client = client();
    let admin = admin();
    let (dispute_id, version) = open_dispute(&app, &client).await;

    let (status, body) = call(
        &app,
        &admin,
        "POST",
        &format!("/v1/disputes/{dispute_id}/resolve"),
        json!({
            "action": "release_provider",
            "expectedVersion": version
        }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]["message"].as_str().unwrap().contains("note"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_paused_room_returns_locked() {
    let app = app();
    let client = client();
    let admin = admin();
    let (dispute_id, _) = open_dispute(&app, &client).await;

    let (_, body) = call(
        &app,
        &admin,
        "POST",
        &format!("/v1/disputes/{dispute_id}/start-mediation"),
        Value::Null,
    )
    .await;
    let room_id = body["roomId"].as_str().unwrap().to_string();

    let (status, _) = call(
        &app,
        &admin,
        "POST",
        &format!("/v1/rooms/{room_id}/pause"),
        Value::Null,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = call(
        &app,
        &client,
        "POST",
        &format!("/v1/rooms/{room_id}/messages"),
        json!({ "body": "hello?" }),
    )
    .await;
    assert_eq!(status, StatusCode::LOCKED);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_missing_actor_headers_are_unauthorized() {
    let app = app();
    let request = Request::builder()
        .method("POST")
        .uri("/v1/disputes")
        .header("content-type", "application/json")
        .body(Body::from("{}"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unknown_dispute_is_not_found() {
    let app = app();
    let admin = admin();
    let (status, _) = call(
        &app,
        &admin,
        "POST",
        &format!("/v1/disputes/{}/start-mediation", Uuid::new_v4()),
        Value::Null,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_attachment_upload_send_and_download() {
    let app = app();
    let client = client();
    let admin = admin();

    let (dispute_id, _) = open_dispute(&app, &client).await;
    let (_, body) = call(
        &app,
        &admin,
        "POST",
        &format!("/v1/disputes/{dispute_id}/start-mediation"),
        Value::Null,
    )
    .await;
    let room_id = body["roomId"].as_str().unwrap().to_string();

    // Upload the raw file with its metadata headers.
    let attachment_id = Uuid::new_v4();
    let payload = vec![9u8; 2048];
    let request = Request::builder()
        .method("POST")
        .uri("/v1/attachments")
        .header("x-ombud-actor", client.id.to_string())
        .header("x-ombud-grant", client.grant)
        .header("content-type", "application/pdf")
        .header("x-attachment-name", "evidence.pdf")
        .header("x-attachment-id", attachment_id.to_string())
        .body(Body::from(payload.clone()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Poll until compression settles.
    let mut state = String::new();
    for _ in 0..200 {
        let (_, snap) = call(
            &app,
            &client,
            "GET",
            &format!("/v1/attachments/{attachment_id}/progress"),
            Value::Null,
        )
        .await;
        state = snap["state"].as_str().unwrap().to_string();
        if state == "compressed" || state == "failed" {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(state, "compressed");

    // Not downloadable until a message has delivered it.
    let request = Request::builder()
        .method("GET")
        .uri(format!("/v1/attachments/{attachment_id}/download"))
        .header("x-ombud-actor", admin.id.to_string())
        .header("x-ombud-grant", admin.grant)
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // Attach it to a message.
    let (status, msg) = call(
        &app,
        &client,
        "POST",
        &format!("/v1/rooms/{room_id}/messages"),
        json!({ "attachmentIds": [attachment_id] }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(msg["attachments"][0]["name"], "evidence.pdf");

    // The compressed bytes come back from the blob store.
    let request = Request::builder()
        .method("GET")
        .uri(format!("/v1/attachments/{attachment_id}/download"))
        .header("x-ombud-actor", admin.id.to_string())
        .header("x-ombud-grant", admin.grant)
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(bytes.as_ref(), payload.as_slice());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_meeting_date_reopen_scenario() {
    let app = app();
    let client = client();
    let admin = admin();

    // A meeting dispute.
    let (status, body) = call(
        &app,
        &client,
        "POST",
        "/v1/disputes",
        json!({
            "orderId": Uuid::new_v4(),
            "reason": "meeting",
            "details": "provider missed the appointment",
            "meetingDate": "2026-09-01T10:00:00Z"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let dispute_id = body["disputeId"].as_str().unwrap().to_string();
    let version = body["version"].as_u64().unwrap();

    // Dismiss closes it and confirms the meeting.
    let (status, _) = call(
        &app,
        &admin,
        "POST",
        &format!("/v1/disputes/{dispute_id}/resolve"),
        json!({ "action": "dismiss", "expectedVersion": version }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Reopening without a new date is refused.
    let (status, _) = call(
        &app,
        &admin,
        "POST",
        &format!("/v1/disputes/{dispute_id}/reopen"),
        json!({ "confirmed": true }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // With a new date it reopens and the request is re-requested.
    let (status, body) = call(
        &app,
        &admin,
        "POST",
        &format!("/v1/disputes/{dispute_id}/reopen"),
        json!({ "newMeetingDate": "2026-09-08T10:00:00Z" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "open");
    assert_eq!(
        body["meetingRequest"]["requested_date"],
        "2026-09-08T10:00:00Z"
    );
}
