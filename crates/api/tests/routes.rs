//! Route tests against in-memory notification collaborators.
//!
//! The pool is connected lazily and never touched by these routes, so no
//! database is needed.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::Utc;
use serde_json::{Value, json};
use sqlx::postgres::PgPoolOptions;
use tower::ServiceExt;

use courier_accounts::encode_jwt;
use courier_api::routes::create_router;
use courier_api::state::AppState;
use courier_common::config::AppConfig;
use courier_common::types::{DeliveryStatus, User};
use courier_notifier::Dispatcher;
use courier_notifier::testing::{
    MemoryNotificationStore, MemoryUserDirectory, ScriptedEmailTransport, ScriptedSmsTransport,
};

const SECRET: &str = "test-jwt-secret-for-route-tests";

fn test_config() -> AppConfig {
    AppConfig {
        database_url: "postgres://unused@localhost/unused".to_string(),
        db_max_connections: 1,
        port: 0,
        jwt_secret: SECRET.to_string(),
        jwt_expiry_hours: 24,
        resend_api_key: None,
        email_api_url: "http://unused".to_string(),
        email_from: "test@example.com".to_string(),
        email_from_name: "Test".to_string(),
        twilio_account_sid: None,
        twilio_auth_token: None,
        twilio_phone_number: None,
        twilio_api_url: "http://unused".to_string(),
        delivery_timeout_secs: 5,
    }
}

struct TestApp {
    router: Router,
    store: Arc<MemoryNotificationStore>,
    email: Arc<ScriptedEmailTransport>,
}

fn build_app(email: ScriptedEmailTransport, sms: ScriptedSmsTransport) -> TestApp {
    let config = test_config();
    let pool = PgPoolOptions::new()
        .connect_lazy(&config.database_url)
        .unwrap();

    let store = Arc::new(MemoryNotificationStore::new());
    let users = Arc::new(
        MemoryUserDirectory::new()
            .with_user(1, Some("alice@example.com"), Some("+15551234567"))
            .with_user(2, Some("bob@example.com"), None),
    );
    let email = Arc::new(email);
    let dispatcher = Dispatcher::new(store.clone(), users, email.clone(), Arc::new(sms));

    let state = AppState::new(pool, config, Arc::new(dispatcher));

    TestApp {
        router: create_router(state),
        store,
        email,
    }
}

fn default_app() -> TestApp {
    build_app(
        ScriptedEmailTransport::succeeding(),
        ScriptedSmsTransport::succeeding(),
    )
}

fn token_for(user_id: i32) -> String {
    let user = User {
        id: user_id,
        username: format!("user{}", user_id),
        email: format!("user{}@example.com", user_id),
        password_hash: String::new(),
        phone: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };
    encode_jwt(&user, SECRET, 24).unwrap()
}

async fn send(
    app: &TestApp,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    let body = match body {
        Some(body) => {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_string(&body).unwrap())
        }
        None => Body::empty(),
    };

    let response = app
        .router
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

#[tokio::test]
async fn test_root_and_health() {
    let app = default_app();

    let (status, json) = send(&app, "GET", "/", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["message"], "Notification API is running");

    let (status, json) = send(&app, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["service"], "courier-api");
}

#[tokio::test]
async fn test_missing_or_bad_token_is_unauthorized() {
    let app = default_app();

    let (status, json) = send(&app, "POST", "/notifications/retry-emails", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["success"], false);
    assert_eq!(json["message"], "No authentication token, access denied");

    let (status, json) = send(
        &app,
        "POST",
        "/notifications/retry-emails",
        Some("garbage"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["message"], "Token is not valid");
}

#[tokio::test]
async fn test_create_in_app_defaults_type() {
    let app = default_app();
    let token = token_for(1);

    let (status, json) = send(
        &app,
        "POST",
        "/notifications",
        Some(&token),
        Some(json!({"userId": 1, "title": "Hi", "message": "Test"})),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["success"], true);
    assert_eq!(json["message"], "Sent ok!");
    assert_eq!(json["data"]["type"], "in-app");
    assert_eq!(json["data"]["status"], "sent");
    assert_eq!(app.store.rows().len(), 1);
}

#[tokio::test]
async fn test_create_validation_errors() {
    let app = default_app();
    let token = token_for(1);

    let (status, json) = send(
        &app,
        "POST",
        "/notifications",
        Some(&token),
        Some(json!({"userId": 1, "title": "Hi"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["success"], false);
    assert_eq!(json["message"], "Missing stuff! Need userId, title & message");

    let (status, json) = send(
        &app,
        "POST",
        "/notifications",
        Some(&token),
        Some(json!({"userId": 1, "title": "Hi", "message": "Test", "type": "push"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["message"].as_str().unwrap().contains("push"));

    let (status, _) = send(
        &app,
        "POST",
        "/notifications",
        Some(&token),
        Some(json!({"userId": 2, "title": "Hi", "message": "Test", "type": "sms"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert!(app.store.rows().is_empty());
}

#[tokio::test]
async fn test_mistyped_bodies_get_json_errors() {
    let app = default_app();
    let token = token_for(1);

    for body in [
        json!({"userId": "1", "title": "Hi", "message": "Test"}),
        json!({"userId": 0, "title": "Hi", "message": "Test"}),
        json!(["not", "an", "object"]),
    ] {
        let (status, json) = send(&app, "POST", "/notifications", Some(&token), Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["success"], false);
        assert_eq!(json["message"], "Missing stuff! Need userId, title & message");
    }

    let (status, json) = send(
        &app,
        "POST",
        "/auth/register",
        None,
        Some(json!({"username": 5, "email": "a@example.com", "password": "x"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["message"], "Missing fields!");

    let (status, json) = send(
        &app,
        "POST",
        "/auth/login",
        None,
        Some(json!({"email": true, "password": "x"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["message"], "Need email and password!");

    assert!(app.store.rows().is_empty());
}

#[tokio::test]
async fn test_non_numeric_ids_get_json_errors() {
    let app = default_app();
    let token = token_for(1);

    let (status, json) = send(&app, "PATCH", "/notifications/read/abc", Some(&token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["success"], false);
    assert_eq!(json["message"], "Notification not found!");

    let (status, json) = send(&app, "GET", "/users/abc/notifications", Some(&token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["message"], "Not your notifications!");
}

#[tokio::test]
async fn test_failed_sms_is_reported_in_body() {
    let app = build_app(
        ScriptedEmailTransport::succeeding(),
        ScriptedSmsTransport::failing("Invalid phone number format"),
    );
    let token = token_for(1);

    let (status, json) = send(
        &app,
        "POST",
        "/users",
        Some(&token),
        Some(json!({
            "userId": 1,
            "title": "Hi",
            "message": "Test",
            "type": "sms",
            "phone": "+15550000000"
        })),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["data"]["type"], "sms");
    assert_eq!(json["data"]["status"], "failed");
    assert_eq!(json["data"]["error"], "Invalid phone number format");

    let rows = app.store.rows();
    assert_eq!(rows[0].status, "failed");
}

#[tokio::test]
async fn test_list_is_owner_only_and_filtered() {
    let app = default_app();
    let token = token_for(1);

    for notification_type in ["in-app", "email", "in-app"] {
        let (status, _) = send(
            &app,
            "POST",
            "/notifications",
            Some(&token),
            Some(json!({
                "userId": 1,
                "title": "Hi",
                "message": "Test",
                "type": notification_type
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, json) = send(&app, "GET", "/users/1/notifications", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["count"], 3);
    let first = &json["data"][0];
    assert_eq!(first["title"], "Hi");
    assert_eq!(first["type"], "in-app");
    assert_eq!(first["status"], "unread");
    assert!(first.get("message").is_none());

    let (_, json) = send(
        &app,
        "GET",
        "/notifications/1/notifications?type=email",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(json["count"], 1);
    assert_eq!(json["data"][0]["type"], "email");

    let (status, _) = send(
        &app,
        "GET",
        "/notifications/1/notifications?type=fax",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, json) = send(&app, "GET", "/users/2/notifications", Some(&token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["message"], "Not your notifications!");
}

#[tokio::test]
async fn test_mark_as_read_routes() {
    let app = default_app();
    let owner = token_for(1);

    let (_, json) = send(
        &app,
        "POST",
        "/notifications",
        Some(&owner),
        Some(json!({"userId": 1, "title": "Hi", "message": "Test"})),
    )
    .await;
    let id = json["data"]["id"].as_i64().unwrap();

    let (status, json) = send(
        &app,
        "PATCH",
        &format!("/notifications/read/{}", id),
        Some(&token_for(2)),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["success"], false);
    assert_eq!(json["data"]["status"], "not_found");
    assert_eq!(app.store.rows()[0].status, "unread");

    let (status, json) = send(
        &app,
        "PATCH",
        &format!("/users/read/{}", id),
        Some(&owner),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["message"], "Marked as read");
    assert_eq!(json["data"], json!({"id": id, "status": "read"}));
    assert_eq!(app.store.rows()[0].status, "read");
}

#[tokio::test]
async fn test_retry_emails_route() {
    let app = default_app();
    app.store.seed_failed_email(1, "one");
    app.store.seed_failed_email(2, "two");
    app.email.push_outcome(Ok(()));
    app.email.push_outcome(Err("bounced"));

    let (status, json) = send(
        &app,
        "POST",
        "/notifications/retry-emails",
        Some(&token_for(1)),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["message"], "Emails retried!");
    assert_eq!(json["data"], json!({"success": 1, "failed": 1}));

    let rows = app.store.rows();
    assert!(rows.iter().all(|n| n.retry_count == 2));
    assert_eq!(rows[0].email_status, Some(DeliveryStatus::Sent));
}

#[tokio::test]
async fn test_store_outage_is_500() {
    let app = default_app();
    app.store.set_unavailable(true);

    let (status, json) = send(
        &app,
        "POST",
        "/notifications",
        Some(&token_for(1)),
        Some(json!({"userId": 1, "title": "Hi", "message": "Test"})),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["success"], false);
    assert_eq!(json["message"], "Something broke! Database unavailable");
}
