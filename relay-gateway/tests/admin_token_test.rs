//! Token issuance, bootstrap and revocation over the admin API.

mod common;

use axum::http::StatusCode;
use common::{FaultyStore, TestApp};
use serde_json::json;
use std::sync::Arc;

#[tokio::test]
async fn bootstrap_window_serves_exactly_one_unauthenticated_issue() {
    let app = TestApp::spawn().await;

    let (status, body) = app
        .request("POST", "/admin/token", None, Some(json!({ "name": "first" })))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["bootstrap"], true);
    assert_eq!(body["token"]["name"], "first");
    assert_eq!(body["token"]["scopes"], json!(["proxy:invoke"]));
    assert!(body["jwt"].as_str().is_some_and(|jwt| !jwt.is_empty()));

    let (status, _) = app
        .request("POST", "/admin/token", None, Some(json!({ "name": "second" })))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn bootstrap_token_administers_the_system() {
    let app = TestApp::spawn().await;
    let jwt = app.bootstrap_jwt().await;

    let (status, body) = app.request("GET", "/admin/token", Some(&jwt), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (status, body) = app
        .request(
            "POST",
            "/admin/token",
            Some(&jwt),
            Some(json!({ "name": "ci", "scopes": ["proxy:invoke", "extra"], "ttlHours": 2 })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["bootstrap"], false);
    assert_eq!(body["token"]["scopes"], json!(["proxy:invoke", "extra"]));
    let issued = body["token"]["createdUtc"].clone();
    assert!(!issued.is_null());
}

#[tokio::test]
async fn non_positive_ttl_falls_back_to_default() {
    let app = TestApp::spawn().await;
    let jwt = app.admin_jwt().await;

    let (status, body) = app
        .request("POST", "/admin/token", Some(&jwt), Some(json!({ "ttlHours": -3 })))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["token"]["name"], "token");

    let token = &body["token"];
    let lifetime = token["expiresAt"].as_i64().unwrap() - chrono::Utc::now().timestamp();
    assert!(lifetime > 23 * 3600 && lifetime <= 24 * 3600);
}

#[tokio::test]
async fn revoke_is_idempotent_and_kills_the_artifact() {
    let app = TestApp::spawn().await;
    let admin = app.admin_jwt().await;

    let (_, body) = app
        .request("POST", "/admin/token", Some(&admin), Some(json!({ "name": "victim" })))
        .await;
    let victim_jwt = body["jwt"].as_str().unwrap().to_string();
    let victim_id = body["token"]["id"].as_str().unwrap().to_string();

    let (status, _) = app
        .request("GET", "/admin/config", Some(&victim_jwt), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let uri = format!("/admin/token/{}", victim_id);
    let (status, body) = app.request("DELETE", &uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["revoked"], true);

    let (status, body) = app.request("DELETE", &uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["revoked"], true);

    let (status, _) = app
        .request("GET", "/admin/config", Some(&victim_jwt), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn revocation_cannot_be_undone_by_patch() {
    let app = TestApp::spawn().await;
    let admin = app.admin_jwt().await;

    let (_, body) = app
        .request("POST", "/admin/token", Some(&admin), Some(json!({})))
        .await;
    let uri = format!("/admin/token/{}", body["token"]["id"].as_str().unwrap());

    let (status, body) = app
        .request(
            "PATCH",
            &uri,
            Some(&admin),
            Some(json!({ "name": "renamed", "scopes": [], "revoked": true })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "renamed");
    assert_eq!(body["scopes"], json!(["proxy:invoke"]));
    assert_eq!(body["revoked"], true);

    let (status, _) = app
        .request("PATCH", &uri, Some(&admin), Some(json!({ "revoked": false })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_token_is_not_found() {
    let app = TestApp::spawn().await;
    let admin = app.admin_jwt().await;

    let (status, _) = app
        .request("GET", "/admin/token/tok_missing", Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .request("DELETE", "/admin/token/tok_missing", Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn garbage_bearer_is_unauthorized() {
    let app = TestApp::spawn().await;
    app.bootstrap_jwt().await;

    let (status, body) = app
        .request("GET", "/admin/token", Some("not-a-jwt"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());

    let (status, _) = app.request("GET", "/admin/token", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn persistence_failure_after_signing_is_reported_as_partial() {
    let app = TestApp::spawn_with(
        common::test_config("http://127.0.0.1:9"),
        Arc::new(FaultyStore::failing_token_writes()),
    )
    .await;

    let (status, body) = app
        .request("POST", "/admin/token", None, Some(json!({ "name": "doomed" })))
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["partial"], true);
    assert_eq!(body["issued"]["token"]["name"], "doomed");
    assert!(body["issued"]["jwt"].is_string());

    // Nothing was stored, so the artifact does not validate.
    let jwt = body["issued"]["jwt"].as_str().unwrap();
    let (status, _) = app.request("GET", "/admin/token", Some(jwt), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
