//! Integration tests: build the router over in-memory stores and drive it
//! with `oneshot` requests.

use std::collections::BTreeSet;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;
use warden_api::AppState;
use warden_core::{AuthConfig, AuthEngine, Stores};

async fn app() -> (Router, AuthEngine) {
    let config = AuthConfig {
        bcrypt_cost: 4,
        ..AuthConfig::development()
    };
    let engine = AuthEngine::new(config, Stores::in_memory()).expect("engine");
    engine.roles().seed_defaults().await.expect("seed roles");
    (warden_api::router(AppState::new(engine.clone())), engine)
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
    token: Option<&str>,
) -> (StatusCode, Value) {
    let mut req = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::USER_AGENT, "integration-test");
    if let Some(token) = token {
        req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let req = match body {
        Some(body) => req
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string())),
        None => req.body(Body::empty()),
    }
    .unwrap();

    let resp = app.clone().oneshot(req).await.expect("request");
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("read body");
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

async fn register(app: &Router, email: &str) -> Value {
    let (status, json) = send(
        app,
        Method::POST,
        "/auth/register",
        Some(json!({ "email": email, "password": "secret1", "name": "Ann" })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{json}");
    json
}

fn access_token(json: &Value) -> String {
    json["tokens"]["accessToken"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn register_then_login() {
    let (app, _) = app().await;
    let registered = register(&app, "a@x.com").await;
    assert_eq!(registered["message"], "Registration successful");
    assert_eq!(registered["user"]["email"], "a@x.com");
    assert_eq!(registered["user"]["status"], "active");
    assert!(registered["user"].get("passwordHash").is_none());
    assert!(registered["user"].get("password_hash").is_none());
    assert_eq!(registered["tokens"]["tokenType"], "Bearer");

    let (status, json) = send(
        &app,
        Method::POST,
        "/auth/login",
        Some(json!({ "email": "A@X.com", "password": "secret1" })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["message"], "Login successful");
    assert!(json["tokens"]["refreshToken"].is_string());
}

#[tokio::test]
async fn duplicate_registration_is_a_conflict() {
    let (app, _) = app().await;
    register(&app, "a@x.com").await;
    let (status, json) = send(
        &app,
        Method::POST,
        "/auth/register",
        Some(json!({ "email": "a@x.com", "password": "secret1", "name": "Ann" })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["title"], "Conflict");
    assert_eq!(json["code"], 409);
    assert_eq!(json["message"], "Email already registered");
}

#[tokio::test]
async fn invalid_registration_is_a_bad_request() {
    let (app, _) = app().await;
    let (status, json) = send(
        &app,
        Method::POST,
        "/auth/register",
        Some(json!({ "email": "nope", "password": "secret1", "name": "Ann" })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], 400);
}

#[tokio::test]
async fn login_failures_share_one_response() {
    let (app, _) = app().await;
    register(&app, "a@x.com").await;

    let wrong = send(
        &app,
        Method::POST,
        "/auth/login",
        Some(json!({ "email": "a@x.com", "password": "wrong" })),
        None,
    )
    .await;
    let unknown = send(
        &app,
        Method::POST,
        "/auth/login",
        Some(json!({ "email": "b@x.com", "password": "secret1" })),
        None,
    )
    .await;
    assert_eq!(wrong.0, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong, unknown);
    assert_eq!(wrong.1["message"], "Invalid credentials");
}

#[tokio::test]
async fn refresh_issues_a_new_pair() {
    let (app, _) = app().await;
    let registered = register(&app, "a@x.com").await;
    let refresh = registered["tokens"]["refreshToken"].as_str().unwrap();

    let (status, json) = send(
        &app,
        Method::POST,
        "/auth/refresh",
        Some(json!({ "refreshToken": refresh })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(json["accessToken"].is_string());
    assert_ne!(json["refreshToken"], registered["tokens"]["refreshToken"]);

    let (status, json) = send(
        &app,
        Method::POST,
        "/auth/refresh",
        Some(json!({ "refreshToken": "garbage" })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["message"], "Invalid refresh token");
}

#[tokio::test]
async fn logout_always_succeeds() {
    let (app, _) = app().await;
    for body in [
        Some(json!({ "refreshToken": "garbage" })),
        Some(json!({})),
        None,
    ] {
        let (status, json) = send(&app, Method::POST, "/auth/logout", body, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["message"], "Logged out successfully");
    }
}

#[tokio::test]
async fn protected_routes_require_a_bearer_token() {
    let (app, _) = app().await;
    let registered = register(&app, "a@x.com").await;

    let (status, json) = send(&app, Method::GET, "/auth/profile", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["code"], 401);

    // A refresh token is not an access token.
    let refresh = registered["tokens"]["refreshToken"].as_str().unwrap();
    let (status, _) = send(&app, Method::GET, "/auth/profile", None, Some(refresh)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn profile_projects_the_principal() {
    let (app, _) = app().await;
    let registered = register(&app, "a@x.com").await;
    let token = access_token(&registered);

    let (status, json) = send(&app, Method::GET, "/auth/profile", None, Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["authId"], registered["user"]["id"]);
    assert_eq!(json["email"], "a@x.com");
    assert_eq!(json["roleId"], registered["user"]["roleId"]);
    assert_eq!(json["permissions"], json!([]));
}

#[tokio::test]
async fn roles_are_listed_lowest_first() {
    let (app, _) = app().await;
    let token = access_token(&register(&app, "a@x.com").await);

    let (status, json) = send(&app, Method::GET, "/auth/roles", None, Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = json
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, ["user", "moderator", "admin", "super_admin"]);
}

#[tokio::test]
async fn permission_check_reflects_role_and_overrides() {
    let (app, engine) = app().await;
    let registered = register(&app, "a@x.com").await;
    let token = access_token(&registered);
    let id: Uuid = registered["user"]["id"].as_str().unwrap().parse().unwrap();
    engine
        .update_permissions(id, BTreeSet::from(["write:reports".to_string()]))
        .await
        .unwrap();

    for (permission, expected) in [
        ("read:self", true),
        ("write:reports", true),
        ("delete:users", false),
    ] {
        let (status, json) = send(
            &app,
            Method::POST,
            "/auth/permissions/check",
            Some(json!({ "permission": permission })),
            Some(&token),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["hasPermission"], expected, "{permission}");
    }
}

#[tokio::test]
async fn updating_permissions_requires_manage_permissions() {
    let (app, engine) = app().await;
    let admin = register(&app, "admin@x.com").await;
    let target = register(&app, "b@x.com").await;
    let admin_token = access_token(&admin);
    let target_uri = format!(
        "/auth/credentials/{}/permissions",
        target["user"]["id"].as_str().unwrap()
    );
    let body = json!({ "permissions": ["write:reports"] });

    let (status, json) = send(
        &app,
        Method::PUT,
        &target_uri,
        Some(body.clone()),
        Some(&admin_token),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["title"], "Forbidden");

    let admin_id: Uuid = admin["user"]["id"].as_str().unwrap().parse().unwrap();
    engine
        .update_permissions(admin_id, BTreeSet::from(["manage:permissions".to_string()]))
        .await
        .unwrap();

    let (status, json) = send(&app, Method::PUT, &target_uri, Some(body), Some(&admin_token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["permissions"], json!(["write:reports"]));

    let missing = format!("/auth/credentials/{}/permissions", Uuid::now_v7());
    let (status, _) = send(
        &app,
        Method::PUT,
        &missing,
        Some(json!({ "permissions": [] })),
        Some(&admin_token),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
