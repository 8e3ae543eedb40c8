//! Drives the REST router in-process with bearer tokens.

use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

use parley_api::{AppStateInner, routes};
use parley_core::{DbIdentity, LogSink, Messaging, MessagingConfig, SystemClock};
use parley_db::Database;
use parley_types::api::Claims;

const SECRET: &str = "route-test-secret";

fn app() -> Router {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let identity = Arc::new(DbIdentity::new(db.clone()));
    let messaging = Messaging::new(
        db,
        identity.clone(),
        Arc::new(LogSink),
        Arc::new(SystemClock),
        MessagingConfig::default(),
    );
    routes(Arc::new(AppStateInner {
        messaging,
        identity,
        jwt_secret: SECRET.to_string(),
    }))
}

fn token(user_id: Uuid, username: &str) -> String {
    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        display_name: Some(username.to_uppercase()),
        avatar_url: None,
        exp: (chrono::Utc::now().timestamp() + 3600) as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
}

async fn call(app: &Router, method: &str, uri: &str, bearer: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(t) = bearer {
        req = req.header(header::AUTHORIZATION, format!("Bearer {}", t));
    }
    let req = match body {
        Some(b) => req
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(b.to_string()))
            .unwrap(),
        None => req.body(Body::empty()).unwrap(),
    };

    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

#[tokio::test]
async fn requests_without_token_are_rejected() {
    let app = app();
    let (status, body) = call(&app, "GET", "/conversations", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");

    let (status, _) = call(&app, "GET", "/conversations", Some("not-a-jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn conversation_message_and_reaction_flow() {
    let app = app();
    let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
    let (ta, tb) = (token(alice, "alice"), token(bob, "bob"));

    // Bob must have been seen once for his profile to be mirrored.
    call(&app, "GET", "/conversations", Some(&tb), None).await;

    let (status, body) = call(&app, "POST", "/conversations", Some(&ta), Some(json!({ "other_user_id": bob }))).await;
    assert_eq!(status, StatusCode::OK);
    let cid = body["conversation_id"].as_str().unwrap().to_string();

    let (_, again) = call(&app, "POST", "/conversations", Some(&tb), Some(json!({ "other_user_id": alice }))).await;
    assert_eq!(again["conversation_id"], cid.as_str());

    let (status, sent) = call(
        &app,
        "POST",
        &format!("/conversations/{}/messages", cid),
        Some(&ta),
        Some(json!({ "content": "hello" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(sent["media_type"], "none");
    let mid = sent["id"].as_str().unwrap().to_string();

    let (status, _) = call(
        &app,
        "POST",
        &format!("/messages/{}/reactions", mid),
        Some(&tb),
        Some(json!({ "emoji": "👍" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, page) = call(&app, "GET", &format!("/conversations/{}/messages", cid), Some(&tb), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page.as_array().unwrap().len(), 1);
    assert_eq!(page[0]["content"], "hello");
    assert_eq!(page[0]["reactions"][0]["emoji"], "👍");
    assert_eq!(page[0]["reactions"][0]["count"], 1);

    let (_, inbox) = call(&app, "GET", "/conversations", Some(&tb), None).await;
    assert_eq!(inbox[0]["other_participant"]["display_name"], "ALICE");
    assert_eq!(inbox[0]["unread_count"], 1);

    let (_, marked) = call(&app, "POST", &format!("/conversations/{}/read", cid), Some(&tb), None).await;
    assert_eq!(marked["marked"], 1);

    // Only the sender may edit.
    let (status, body) = call(
        &app,
        "PATCH",
        &format!("/messages/{}", mid),
        Some(&tb),
        Some(json!({ "content": "hijacked" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "not_owner");

    let (status, edited) = call(
        &app,
        "PATCH",
        &format!("/messages/{}", mid),
        Some(&ta),
        Some(json!({ "content": "hello there" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(edited["is_edited"], true);

    let (status, _) = call(&app, "DELETE", &format!("/messages/{}", mid), Some(&ta), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = call(&app, "GET", &format!("/messages/{}", mid), Some(&ta), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn blocks_refuse_sends_with_forbidden() {
    let app = app();
    let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
    let (ta, tb) = (token(alice, "alice"), token(bob, "bob"));

    let (_, body) = call(&app, "POST", "/conversations", Some(&ta), Some(json!({ "other_user_id": bob }))).await;
    let cid = body["conversation_id"].as_str().unwrap().to_string();

    let (status, _) = call(&app, "PUT", &format!("/blocks/{}", alice), Some(&tb), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, status_body) = call(&app, "GET", &format!("/blocks/{}", bob), Some(&ta), None).await;
    assert_eq!(status_body["blocked_by_me"], false);
    assert_eq!(status_body["blocked_me"], true);

    let (status, body) = call(
        &app,
        "POST",
        &format!("/conversations/{}/messages", cid),
        Some(&ta),
        Some(json!({ "content": "hi?" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "blocked");

    let (_, listed) = call(&app, "GET", "/blocks", Some(&tb), None).await;
    assert_eq!(listed[0]["blocked_id"], alice.to_string());

    let (status, _) = call(&app, "DELETE", &format!("/blocks/{}", alice), Some(&tb), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = call(
        &app,
        "POST",
        &format!("/conversations/{}/messages", cid),
        Some(&ta),
        Some(json!({ "content": "hi again" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn self_conversation_is_a_bad_request() {
    let app = app();
    let alice = Uuid::new_v4();
    let (status, body) = call(
        &app,
        "POST",
        "/conversations",
        Some(&token(alice, "alice")),
        Some(json!({ "other_user_id": alice })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "self_conversation");
}
