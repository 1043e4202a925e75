// nRF Cloud REST client: just enough to find the MQTT broker and the
// account's gateways.
//
// Base path: /v1/
// Auth: Bearer token (API key)

use std::time::Duration;

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::Error;

pub const DEFAULT_API_URL: &str = "https://api.nrfcloud.com";

// ── Response shapes ──────────────────────────────────────────────────

/// MQTT connection details for the account.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountInfo {
    pub mqtt_endpoint: String,
    pub mqtt_topic_prefix: String,
}

impl AccountInfo {
    /// MQTT client id the broker expects for account-level connections:
    /// `account-<tenant>`, where the tenant is the second segment of the
    /// topic prefix (`prod/<tenant>/`).
    pub fn client_id(&self) -> Option<String> {
        self.mqtt_topic_prefix
            .split('/')
            .nth(1)
            .filter(|tenant| !tenant.is_empty())
            .map(|tenant| format!("account-{tenant}"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSummary {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub device_type: String,
    #[serde(rename = "$meta", default)]
    pub meta: DeviceMeta,
}

impl DeviceSummary {
    pub fn is_gateway(&self) -> bool {
        self.device_type.eq_ignore_ascii_case("gateway")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeviceMeta {
    pub created_at: Option<String>,
    pub version: Option<String>,
}

#[derive(Deserialize)]
struct DeviceList {
    #[serde(default)]
    items: Vec<DeviceSummary>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    message: Option<String>,
}

// ── Client ───────────────────────────────────────────────────────────

pub struct AccountClient {
    http: reqwest::Client,
    base_url: Url,
}

impl AccountClient {
    pub fn new(base_url: &str, api_key: &SecretString, timeout: Duration) -> Result<Self, Error> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", api_key.expose_secret()))
            .map_err(|_| Error::InvalidApiKey)?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("meshgate/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()?;

        Self::from_reqwest(base_url, http)
    }

    /// Wrap an existing `reqwest::Client` (caller manages auth headers).
    pub fn from_reqwest(base_url: &str, http: reqwest::Client) -> Result<Self, Error> {
        let mut base_url = Url::parse(base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self { http, base_url })
    }

    pub async fn account(&self) -> Result<AccountInfo, Error> {
        self.get("v1/account").await
    }

    pub async fn gateways(&self) -> Result<Vec<DeviceSummary>, Error> {
        let list: DeviceList = self.get("v1/devices").await?;
        Ok(list.items)
    }

    // ── HTTP ─────────────────────────────────────────────────────────

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, Error> {
        let url = self.base_url.join(path)?;
        debug!("GET {url}");

        let resp = self.http.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(parse_error(status, resp).await);
        }

        let body = resp.text().await?;
        serde_json::from_str(&body).map_err(|e| {
            let preview = body.chars().take(200).collect::<String>();
            Error::Deserialization {
                message: format!("{e} (body preview: {preview:?})"),
                body,
            }
        })
    }
}

async fn parse_error(status: reqwest::StatusCode, resp: reqwest::Response) -> Error {
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Error::InvalidApiKey;
    }

    let raw = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorResponse>(&raw)
        .ok()
        .and_then(|e| e.message)
        .unwrap_or_else(|| if raw.is_empty() { status.to_string() } else { raw });

    Error::Account {
        status: status.as_u16(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_id_uses_tenant_segment() {
        let info = AccountInfo {
            mqtt_endpoint: "mqtt.nrfcloud.com".into(),
            mqtt_topic_prefix: "prod/0b8b2cd4-a6e3-4b1c-9d2a-1f1e0c6d2e11/".into(),
        };
        assert_eq!(
            info.client_id().as_deref(),
            Some("account-0b8b2cd4-a6e3-4b1c-9d2a-1f1e0c6d2e11")
        );
    }

    #[test]
    fn client_id_absent_for_flat_prefix() {
        let info = AccountInfo {
            mqtt_endpoint: "localhost".into(),
            mqtt_topic_prefix: "prod".into(),
        };
        assert!(info.client_id().is_none());
    }
}
