mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use base_agent::constants::{BASE_CHAIN_ID, USDC_BASE_ADDRESS};
use base_agent::permissions::{
    active_permission, check_permission, store_permission, CheckPermissionRequest,
    StorePermissionRequest,
};
use chrono::{Duration, Utc};
use common::*;
use serde_json::json;
use tower::util::ServiceExt;

const USER: &str = "0xAbCdEf0000000000000000000000000000000001";
const SPENDER: &str = "0x1111111111111111111111111111111111111111";

fn store_request(allowance: f64) -> StorePermissionRequest {
    StorePermissionRequest {
        user_address: Some(USER.to_string()),
        spender_address: Some(SPENDER.to_string()),
        token_address: Some(USDC_BASE_ADDRESS.to_string()),
        allowance_usdc: Some(allowance),
        period_days: None,
        permission_data: Some(json!({ "signature": "0xdead" })),
    }
}

fn check_request(user: &str) -> CheckPermissionRequest {
    CheckPermissionRequest {
        user_address: Some(user.to_string()),
    }
}

fn post(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_store_replaces_active_permission() {
    let (state, _dir) = test_state("http://127.0.0.1:1/unused", credentials(true)).await;
    let now = Utc::now();

    let first = store_permission(&state.db, &store_request(5.0), now).await.unwrap();
    let second = store_permission(&state.db, &store_request(10.0), now + Duration::seconds(1))
        .await
        .unwrap();

    assert_eq!(second.user_address, USER.to_lowercase());
    assert_eq!(second.token_address, USDC_BASE_ADDRESS.to_lowercase());
    assert_eq!(second.chain_id, BASE_CHAIN_ID);
    assert_eq!(second.period_days, 1);
    assert_eq!(second.permission_data.as_deref(), Some(r#"{"signature":"0xdead"}"#));

    let active: Vec<(String,)> =
        sqlx::query_as("SELECT id FROM spend_permissions WHERE is_active = 1")
            .fetch_all(&state.db)
            .await
            .unwrap();
    assert_eq!(active, vec![(second.id.clone(),)]);
    assert_ne!(first.id, second.id);

    // Lookup is case-insensitive on the address.
    let found = active_permission(&state.db, USER).await.unwrap().unwrap();
    assert_eq!(found, second);
}

#[tokio::test]
async fn test_check_reports_active_permission() {
    let (state, _dir) = test_state("http://127.0.0.1:1/unused", credentials(true)).await;
    let now = Utc::now();
    store_permission(&state.db, &store_request(2.5), now).await.unwrap();

    let status = check_permission(&state.db, &check_request(USER), now + Duration::hours(1))
        .await
        .unwrap();
    assert!(status.has_permission);
    assert_eq!(status.message, "Active: $2.5 USDC daily limit");
    assert_eq!(status.permission.map(|p| p.allowance_usdc), Some(2.5));
}

#[tokio::test]
async fn test_expired_permission_is_deactivated() {
    let (state, _dir) = test_state("http://127.0.0.1:1/unused", credentials(true)).await;
    let granted_at = Utc::now() - Duration::days(3);
    let stored = store_permission(&state.db, &store_request(1.0), granted_at)
        .await
        .unwrap();

    let status = check_permission(&state.db, &check_request(USER), Utc::now())
        .await
        .unwrap();
    assert!(!status.has_permission);
    assert!(status.permission.is_none());
    assert_eq!(status.message, "Spend permission has expired");

    let (is_active,): (bool,) = sqlx::query_as("SELECT is_active FROM spend_permissions WHERE id = ?")
        .bind(&stored.id)
        .fetch_one(&state.db)
        .await
        .unwrap();
    assert!(!is_active);

    let again = check_permission(&state.db, &check_request(USER), Utc::now())
        .await
        .unwrap();
    assert_eq!(again.message, "No active spend permission");
}

#[tokio::test]
async fn test_store_validation() {
    let (state, _dir) = test_state("http://127.0.0.1:1/unused", credentials(true)).await;

    let mut missing = store_request(1.0);
    missing.spender_address = None;
    let err = store_permission(&state.db, &missing, Utc::now()).await.unwrap_err();
    assert_eq!(err.inner.status(), StatusCode::BAD_REQUEST);
    assert_eq!(err.inner.to_string(), "Missing required fields");

    let err = store_permission(&state.db, &store_request(0.0), Utc::now())
        .await
        .unwrap_err();
    assert_eq!(err.inner.status(), StatusCode::BAD_REQUEST);

    let err = check_permission(&state.db, &CheckPermissionRequest::default(), Utc::now())
        .await
        .unwrap_err();
    assert_eq!(err.inner.to_string(), "Missing user address");
}

#[tokio::test]
async fn test_permission_routes() {
    let (state, _dir) = test_state("http://127.0.0.1:1/unused", credentials(true)).await;
    let app = base_agent::server::router(state);

    let response = app
        .clone()
        .oneshot(post(
            "/store-spend-permission",
            json!({
                "userAddress": USER,
                "spenderAddress": SPENDER,
                "tokenAddress": USDC_BASE_ADDRESS,
                "allowanceUsdc": 10,
                "periodDays": 7
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["message"], "Spend permission granted: $10 USDC daily limit");
    assert_eq!(json["permission"]["period_days"], 7);

    let response = app
        .clone()
        .oneshot(post("/check-spend-permission", json!({ "userAddress": USER })))
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json["hasPermission"], true);
    assert_eq!(json["message"], "Active: $10 USDC daily limit");

    let response = app
        .clone()
        .oneshot(post("/check-spend-permission", json!({ "userAddress": "0xnobody" })))
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json["hasPermission"], false);
    assert!(json["permission"].is_null());

    let response = app
        .oneshot(post("/store-spend-permission", json!({ "userAddress": USER })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "Missing required fields");
}

#[tokio::test]
async fn test_permission_routes_reject_malformed_bodies_as_json() {
    let (state, _dir) = test_state("http://127.0.0.1:1/unused", credentials(true)).await;
    let app = base_agent::server::router(state);

    let wrong_field_type = post(
        "/store-spend-permission",
        json!({
            "userAddress": USER,
            "spenderAddress": SPENDER,
            "tokenAddress": USDC_BASE_ADDRESS,
            "allowanceUsdc": "10"
        }),
    );
    let not_json = Request::builder()
        .method("POST")
        .uri("/check-spend-permission")
        .header("content-type", "application/json")
        .body(Body::from("{userAddress"))
        .unwrap();
    let no_content_type = Request::builder()
        .method("POST")
        .uri("/check-spend-permission")
        .body(Body::from(json!({ "userAddress": USER }).to_string()))
        .unwrap();

    for request in [wrong_field_type, not_json, no_content_type] {
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["code"], "INVALID_INGRESS");
    }
}
