//! Public endpoint and Origin validation integration tests.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use gateway_test_utils::*;
use serde_json::{json, Value};
use std::collections::HashMap;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const JWKS_PATH: &str = "/.well-known/jwks.json";

async fn jwks_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(JWKS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(jwks_json(&[KEY_ONE])))
        .mount(&server)
        .await;
    server
}

fn vars_for(jwks: &MockServer, extra: &[(&str, &str)]) -> HashMap<String, String> {
    let mut vars = test_vars(&format!("{}{}", jwks.uri(), JWKS_PATH));
    for (k, v) in extra {
        vars.insert(k.to_string(), v.to_string());
    }
    vars
}

#[tokio::test]
async fn test_health_endpoint_is_public() -> Result<(), anyhow::Error> {
    let jwks = MockServer::start().await;
    let server = TestGatewayServer::spawn(vars_for(&jwks, &[])).await?;

    let response = reqwest::get(format!("{}/health", server.url())).await?;

    assert_eq!(response.status(), 200);
    let body: Value = response.json().await?;
    assert_eq!(body, json!({"status": "healthy", "service": "mcp-gateway"}));

    Ok(())
}

#[tokio::test]
async fn test_ready_reflects_key_cache() -> Result<(), anyhow::Error> {
    let jwks = jwks_server().await;
    let server = TestGatewayServer::spawn(vars_for(&jwks, &[])).await?;

    let response = reqwest::get(format!("{}/ready", server.url())).await?;
    assert_eq!(response.status(), 503);
    let body: Value = response.json().await?;
    assert_eq!(body["status"], "not_ready");
    assert!(body.get("keys_fetched_at").is_none());

    let before = chrono::Utc::now();
    server.state().key_cache.as_ref().unwrap().refresh().await?;

    let response = reqwest::get(format!("{}/ready", server.url())).await?;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await?;
    assert_eq!(body["status"], "ready");
    assert_eq!(body["signing_keys"], 1);
    let fetched_at = body["keys_fetched_at"].as_str().unwrap();
    let fetched_at = chrono::DateTime::parse_from_rfc3339(fetched_at)?;
    assert!(fetched_at >= before);

    Ok(())
}

#[tokio::test]
async fn test_ready_in_shared_secret_mode() -> Result<(), anyhow::Error> {
    let jwks = MockServer::start().await;
    let server = TestGatewayServer::spawn(vars_for(
        &jwks,
        &[
            ("AUTH_ALGORITHM", "HS256"),
            ("SECRET_KEY", "integration-test-shared-secret-0123456789"),
        ],
    ))
    .await?;

    let response = reqwest::get(format!("{}/ready", server.url())).await?;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await?;
    assert_eq!(body, json!({"status": "ready"}));

    Ok(())
}

#[tokio::test]
async fn test_metrics_endpoint_is_public() -> Result<(), anyhow::Error> {
    let jwks = MockServer::start().await;
    let server = TestGatewayServer::spawn(vars_for(&jwks, &[])).await?;

    // Generate at least one recorded request
    reqwest::get(format!("{}/health", server.url())).await?;

    let response = reqwest::get(format!("{}/metrics", server.url())).await?;
    assert_eq!(response.status(), 200);
    let body = response.text().await?;
    assert!(body.contains("gateway_http_requests_total"));

    Ok(())
}

#[tokio::test]
async fn test_protected_resource_metadata() -> Result<(), anyhow::Error> {
    let jwks = MockServer::start().await;
    let server = TestGatewayServer::spawn(vars_for(
        &jwks,
        &[("RESOURCE_URL", "https://gw.test")],
    ))
    .await?;

    let response = reqwest::get(format!(
        "{}/.well-known/oauth-protected-resource",
        server.url()
    ))
    .await?;

    assert_eq!(response.status(), 200);
    let body: Value = response.json().await?;
    assert_eq!(
        body,
        json!({
            "resource": "https://gw.test",
            "authorization_servers": [TEST_ISSUER],
            "bearer_methods_supported": ["header"]
        })
    );

    Ok(())
}

#[tokio::test]
async fn test_metadata_absent_without_resource_url() -> Result<(), anyhow::Error> {
    let jwks = MockServer::start().await;
    let server = TestGatewayServer::spawn(vars_for(&jwks, &[])).await?;

    let response = reqwest::get(format!(
        "{}/.well-known/oauth-protected-resource",
        server.url()
    ))
    .await?;
    assert_eq!(response.status(), 404);

    Ok(())
}

#[tokio::test]
async fn test_disallowed_origin_is_403_before_auth() -> Result<(), anyhow::Error> {
    let jwks = jwks_server().await;
    let server = TestGatewayServer::spawn_primed(vars_for(
        &jwks,
        &[("ALLOWED_ORIGINS", "https://app.example.com")],
    ))
    .await?;
    let client = reqwest::Client::new();
    let token = TestTokenBuilder::new().sign_rs256(&KEY_ONE);
    let rpc = initialize_request(1);

    let response = client
        .post(format!("{}/weather/mcp", server.url()))
        .header("origin", "https://evil.example.com")
        .json(&rpc)
        .send()
        .await?;
    assert_eq!(response.status(), 403);
    let body: Value = response.json().await?;
    assert_eq!(body["error"]["code"], "FORBIDDEN");

    let response = client
        .post(format!("{}/weather/mcp", server.url()))
        .header("origin", "https://app.example.com")
        .header("authorization", bearer(&token))
        .header("accept", MCP_ACCEPT)
        .json(&rpc)
        .send()
        .await?;
    assert_eq!(response.status(), 200);
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .unwrap(),
        "https://app.example.com"
    );

    Ok(())
}

#[tokio::test]
async fn test_missing_origin_policy() -> Result<(), anyhow::Error> {
    let jwks = jwks_server().await;
    let server = TestGatewayServer::spawn_primed(vars_for(&jwks, &[("ALLOW_NO_ORIGIN", "false")]))
        .await?;
    let token = TestTokenBuilder::new().sign_rs256(&KEY_ONE);

    let response = reqwest::Client::new()
        .post(format!("{}/weather/mcp", server.url()))
        .header("authorization", bearer(&token))
        .header("accept", MCP_ACCEPT)
        .json(&initialize_request(1))
        .send()
        .await?;
    assert_eq!(response.status(), 403);

    Ok(())
}

#[tokio::test]
async fn test_cors_preflight_is_answered() -> Result<(), anyhow::Error> {
    let jwks = MockServer::start().await;
    let server = TestGatewayServer::spawn(vars_for(
        &jwks,
        &[("ALLOWED_ORIGINS", "https://app.example.com")],
    ))
    .await?;

    let response = reqwest::Client::new()
        .request(
            reqwest::Method::OPTIONS,
            format!("{}/weather/mcp", server.url()),
        )
        .header("origin", "https://app.example.com")
        .header("access-control-request-method", "POST")
        .header("access-control-request-headers", "authorization, content-type")
        .send()
        .await?;

    assert!(response.status().is_success());
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .unwrap(),
        "https://app.example.com"
    );

    Ok(())
}
