//! Integration tests for the auth gateway adapter

mod support;

use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use terralab_core::ports::{AuthGateway, GatewayError, ProfileUpdate, Registration, TokenStore};
use terralab_http::gateway::HttpAuthGateway;

use support::build_client;

fn grant_response() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "success": true,
        "data": {
            "accessToken": "access-1",
            "refreshToken": "refresh-1",
            "expiresIn": 900,
            "user": {
                "id": "u-1",
                "email": "tech@terralab.example",
                "name": "Lab Tech",
                "role": "technician"
            }
        },
        "message": "Login successful"
    }))
}

#[tokio::test]
async fn test_login_parses_grant() {
    let server = MockServer::start().await;
    let ctx = build_client(&server.uri(), true);
    let gateway = HttpAuthGateway::new(ctx.client.clone());

    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .and(body_json(json!({
            "email": "tech@terralab.example",
            "password": "hunter2"
        })))
        .respond_with(grant_response())
        .expect(1)
        .mount(&server)
        .await;

    let grant = gateway
        .login("tech@terralab.example", "hunter2")
        .await
        .unwrap();

    assert_eq!(grant.access_token, "access-1");
    assert_eq!(grant.refresh_token.as_deref(), Some("refresh-1"));
    assert_eq!(grant.expires_in_secs, Some(900));
    assert_eq!(grant.profile.unwrap().name, "Lab Tech");
}

#[tokio::test]
async fn test_login_rejection_carries_rate_limit_hints() {
    let server = MockServer::start().await;
    let ctx = build_client(&server.uri(), true);
    let gateway = HttpAuthGateway::new(ctx.client.clone());

    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "success": false,
            "message": "Too many attempts",
            "waitMinutes": 15,
            "remainingAttempts": 0
        })))
        .mount(&server)
        .await;

    let err = gateway.login("tech@terralab.example", "wrong").await.unwrap_err();
    assert_eq!(
        err,
        GatewayError::Rejected {
            status: 429,
            message: "Too many attempts".to_string(),
            wait_minutes: Some(15),
            remaining_attempts: Some(0),
        }
    );
}

#[tokio::test]
async fn test_login_401_is_unauthorized_not_a_refresh_trigger() {
    let server = MockServer::start().await;
    let ctx = build_client(&server.uri(), true);
    let gateway = HttpAuthGateway::new(ctx.client.clone());

    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "success": false,
            "message": "Invalid credentials"
        })))
        .expect(1)
        .mount(&server)
        .await;

    // No refresh mock is mounted: a refresh attempt would 404 and the
    // expect(1) above would catch a second login hit.
    let err = gateway.login("tech@terralab.example", "wrong").await.unwrap_err();
    assert_eq!(
        err,
        GatewayError::Unauthorized {
            message: "Invalid credentials".to_string()
        }
    );
}

#[tokio::test]
async fn test_register_parses_grant() {
    let server = MockServer::start().await;
    let ctx = build_client(&server.uri(), true);
    let gateway = HttpAuthGateway::new(ctx.client.clone());

    Mock::given(method("POST"))
        .and(path("/auth/register"))
        .and(body_json(json!({
            "email": "new@terralab.example",
            "password": "hunter2",
            "name": "New Tech"
        })))
        .respond_with(grant_response())
        .mount(&server)
        .await;

    let registration = Registration {
        email: "new@terralab.example".to_string(),
        password: "hunter2".to_string(),
        name: "New Tech".to_string(),
    };
    let grant = gateway.register(&registration).await.unwrap();
    assert_eq!(grant.access_token, "access-1");
}

#[tokio::test]
async fn test_refresh_uses_refresh_token_as_bearer() {
    let server = MockServer::start().await;
    let ctx = build_client(&server.uri(), true);
    ctx.tokens
        .set_tokens("stale", Some("refresh-1"), None)
        .await
        .unwrap();
    let gateway = HttpAuthGateway::new(ctx.client.clone());

    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .and(header("Authorization", "Bearer refresh-1"))
        .respond_with(grant_response())
        .expect(1)
        .mount(&server)
        .await;

    let grant = gateway.refresh().await.unwrap();
    assert_eq!(grant.access_token, "access-1");
    assert_eq!(grant.expires_in_secs, Some(900));

    // The client persisted the grant before returning.
    assert_eq!(
        ctx.tokens.access_token().await.unwrap().unwrap(),
        "access-1"
    );
}

#[tokio::test]
async fn test_fetch_profile() {
    let server = MockServer::start().await;
    let ctx = build_client(&server.uri(), true);
    let gateway = HttpAuthGateway::new(ctx.client.clone());

    Mock::given(method("GET"))
        .and(path("/auth/profile"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": {
                "id": "u-1",
                "email": "tech@terralab.example",
                "name": "Lab Tech",
                "role": "technician"
            }
        })))
        .mount(&server)
        .await;

    let profile = gateway.fetch_profile().await.unwrap();
    assert_eq!(profile.role, "technician");
}

#[tokio::test]
async fn test_update_profile_sends_only_changed_fields() {
    let server = MockServer::start().await;
    let ctx = build_client(&server.uri(), true);
    let gateway = HttpAuthGateway::new(ctx.client.clone());

    Mock::given(method("PATCH"))
        .and(path("/auth/profile"))
        .and(body_json(json!({"name": "Renamed Tech"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": {
                "id": "u-1",
                "email": "tech@terralab.example",
                "name": "Renamed Tech",
                "role": "technician"
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let update = ProfileUpdate {
        name: Some("Renamed Tech".to_string()),
        email: None,
    };
    let profile = gateway.update_profile(&update).await.unwrap();
    assert_eq!(profile.name, "Renamed Tech");
}

#[tokio::test]
async fn test_logout_maps_server_errors() {
    let server = MockServer::start().await;
    let ctx = build_client(&server.uri(), true);
    let gateway = HttpAuthGateway::new(ctx.client.clone());

    Mock::given(method("POST"))
        .and(path("/auth/logout"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "success": false,
            "message": "boom"
        })))
        .mount(&server)
        .await;

    let err = gateway.logout().await.unwrap_err();
    assert!(matches!(err, GatewayError::Server { status: 500, .. }));
}
