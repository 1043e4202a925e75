//! Integration tests for `AccountClient` using wiremock.
#![allow(clippy::unwrap_used)]

use std::time::Duration;

use secrecy::SecretString;
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use meshgate_api::{AccountClient, Error};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, AccountClient) {
    let server = MockServer::start().await;
    let client = AccountClient::new(
        &server.uri(),
        &SecretString::from("test-key".to_owned()),
        Duration::from_secs(5),
    )
    .unwrap();
    (server, client)
}

// ── Happy paths ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_account_sends_bearer_and_decodes() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/v1/account"))
        .and(header("authorization", "Bearer test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "mqttEndpoint": "mqtt.nrfcloud.com",
            "mqttTopicPrefix": "prod/tenant-1/",
            "team": { "name": "ignored" }
        })))
        .mount(&server)
        .await;

    let info = client.account().await.unwrap();
    assert_eq!(info.mqtt_endpoint, "mqtt.nrfcloud.com");
    assert_eq!(info.client_id().as_deref(), Some("account-tenant-1"));
}

#[tokio::test]
async fn test_gateways_lists_devices() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/v1/devices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                {
                    "id": "nrf-352656100000000",
                    "name": "Lab gateway",
                    "type": "Gateway",
                    "$meta": { "createdAt": "2020-05-01T10:00:00Z", "version": "3" }
                },
                { "id": "nrf-352656100000001", "type": "Generic" }
            ],
            "total": 2
        })))
        .mount(&server)
        .await;

    let devices = client.gateways().await.unwrap();
    assert_eq!(devices.len(), 2);
    assert!(devices[0].is_gateway());
    assert_eq!(devices[0].meta.version.as_deref(), Some("3"));
    assert!(!devices[1].is_gateway());
    assert_eq!(devices[1].name, "");
}

// ── Error paths ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_unauthorized_maps_to_invalid_key() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/v1/account"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = client.account().await.unwrap_err();
    assert!(matches!(err, Error::InvalidApiKey));
    assert!(err.is_auth_failure());
}

#[tokio::test]
async fn test_server_error_carries_message() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/v1/devices"))
        .respond_with(
            ResponseTemplate::new(503).set_body_json(json!({ "message": "maintenance window" })),
        )
        .mount(&server)
        .await;

    match client.gateways().await.unwrap_err() {
        Error::Account { status, message } => {
            assert_eq!(status, 503);
            assert_eq!(message, "maintenance window");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_bad_body_is_deserialization_error() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/v1/account"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    match client.account().await.unwrap_err() {
        Error::Deserialization { body, .. } => assert_eq!(body, "<html>oops</html>"),
        other => panic!("unexpected error: {other:?}"),
    }
}
