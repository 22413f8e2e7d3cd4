//! Client for the guard gateway HTTP API.

use std::collections::BTreeMap;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum SdkError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("gateway returned status {status}: {body}")]
    Status { status: u16, body: String },
}

/// Body of `POST /api/v1/orchestrate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrateRequest {
    pub service_type: String,
    pub payload: Value,
    pub tenant_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl OrchestrateRequest {
    pub fn new(service_type: impl Into<String>, payload: Value, tenant_id: impl Into<String>) -> Self {
        Self {
            service_type: service_type.into(),
            payload,
            tenant_id: tenant_id.into(),
            session_id: None,
            request_id: None,
            timeout_ms: None,
        }
    }
}

/// The uniform orchestration response, as returned on every status code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrateResponse {
    pub request_id: String,
    pub success: bool,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub service_used: Option<String>,
    pub processing_time_ms: u64,
}

/// Cached health of one guard service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceHealth {
    pub service_name: String,
    pub status: String,
    #[serde(default)]
    pub last_response_time_ms: Option<u64>,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub consecutive_failures: u32,
}

pub struct GatewayClient {
    client: Client,
    base_url: String,
}

impl GatewayClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Run one orchestration. Failures the gateway classified come back as
    /// `Ok` with `success == false`; only transport problems are `Err`.
    pub async fn orchestrate(&self, req: &OrchestrateRequest) -> Result<(u16, OrchestrateResponse), SdkError> {
        let resp = self
            .client
            .post(format!("{}/api/v1/orchestrate", self.base_url))
            .json(req)
            .send()
            .await?;
        let status = resp.status().as_u16();
        Ok((status, resp.json().await?))
    }

    pub async fn services_health(&self) -> Result<BTreeMap<String, ServiceHealth>, SdkError> {
        let resp = self
            .client
            .get(format!("{}/api/v1/services/health", self.base_url))
            .send()
            .await?;
        Self::expect_success(resp).await
    }

    pub async fn healthz(&self) -> Result<bool, SdkError> {
        let resp = self.client.get(format!("{}/healthz", self.base_url)).send().await?;
        Ok(resp.status().is_success())
    }

    /// GET an admin route with the given API key.
    pub async fn admin_get(&self, path: &str, api_key: &str) -> Result<Value, SdkError> {
        let resp = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(api_key)
            .send()
            .await?;
        Self::expect_success(resp).await
    }

    async fn expect_success<T: serde::de::DeserializeOwned>(resp: reqwest::Response) -> Result<T, SdkError> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SdkError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp.json().await?)
    }
}
