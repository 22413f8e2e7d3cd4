//! HTTP surface exercised through the Rust SDK.

use std::sync::Arc;

use gateway_sdk::{GatewayClient, OrchestrateRequest, SdkError};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use guard_gateway::config::GatewayConfig;
use guard_gateway::{HttpServer, Orchestrator, ServiceType};

mod common;
use common::{gateway_config, MockService, Mode};

const ADMIN_KEY: &str = "test-admin-key";

struct Gateway {
    url: String,
    client: GatewayClient,
    orchestrator: Arc<Orchestrator>,
    stop: Option<oneshot::Sender<()>>,
    server: tokio::task::JoinHandle<()>,
}

impl Gateway {
    async fn start(mut config: GatewayConfig) -> Self {
        config.admin.enabled = true;
        config.admin.api_key = ADMIN_KEY.to_string();

        let orchestrator = Arc::new(Orchestrator::new(config).unwrap());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop, stopped) = oneshot::channel::<()>();

        let server = HttpServer::new(orchestrator.clone());
        let server = tokio::spawn(async move {
            server
                .run(listener, async move {
                    let _ = stopped.await;
                })
                .await
                .unwrap();
        });

        let url = format!("http://{addr}");
        Self {
            client: GatewayClient::new(&url),
            url,
            orchestrator,
            stop: Some(stop),
            server,
        }
    }

    async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        self.server.await.unwrap();
        self.orchestrator.shutdown().await;
    }
}

#[tokio::test]
async fn test_orchestrate_over_http() {
    let mock = MockService::start().await;
    let gateway = Gateway::start(gateway_config(vec![mock.service("tox", ServiceType::Toxicity)])).await;

    let mut request = OrchestrateRequest::new("toxicity", json!({"text": "hi"}), "tenant-a");
    request.request_id = Some("req-http-1".into());
    let (status, response) = gateway.client.orchestrate(&request).await.unwrap();

    assert_eq!(status, 200);
    assert!(response.success);
    assert_eq!(response.request_id, "req-http-1");
    assert_eq!(response.service_used.as_deref(), Some("tox"));
    assert_eq!(mock.last_headers().unwrap()["x-tenant-id"], "tenant-a");

    gateway.stop().await;
}

#[tokio::test]
async fn test_failures_map_to_status_codes() {
    let mock = MockService::start().await;
    mock.set_mode(Mode::Status(401));
    let mut config = gateway_config(vec![mock.service("tox", ServiceType::Toxicity)]);
    config.dispatch.max_payload_bytes = 512;
    let gateway = Gateway::start(config).await;

    let request = OrchestrateRequest::new("secrets_scan", json!({"content": "x"}), "t1");
    let (status, response) = gateway.client.orchestrate(&request).await.unwrap();
    assert_eq!(status, 400);
    assert_eq!(response.error.as_deref(), Some("configuration_error"));

    let request = OrchestrateRequest::new("toxicity", json!({"body": "wrong field"}), "t1");
    let (status, response) = gateway.client.orchestrate(&request).await.unwrap();
    assert_eq!(status, 400);
    assert_eq!(response.error.as_deref(), Some("invalid_payload"));

    let request = OrchestrateRequest::new("toxicity", json!({"text": "x".repeat(1024)}), "t1");
    let (status, response) = gateway.client.orchestrate(&request).await.unwrap();
    assert_eq!(status, 413);
    assert_eq!(response.error.as_deref(), Some("payload_too_large"));

    let request = OrchestrateRequest::new("toxicity", json!({"text": "x"}), "t1");
    let (status, response) = gateway.client.orchestrate(&request).await.unwrap();
    assert_eq!(status, 502);
    assert_eq!(response.error.as_deref(), Some("auth_error"));
    assert!(!response.success);

    gateway.stop().await;
}

#[tokio::test]
async fn test_quota_exceeded_is_429() {
    let mock = MockService::start().await;
    let mut config = gateway_config(vec![mock.service("tox", ServiceType::Toxicity)]);
    config.quota.tiers.get_mut("free").unwrap().limit = Some(2);
    let gateway = Gateway::start(config).await;

    let request = OrchestrateRequest::new("toxicity", json!({"text": "x"}), "tenant-small");
    for _ in 0..2 {
        let (status, _) = gateway.client.orchestrate(&request).await.unwrap();
        assert_eq!(status, 200);
    }
    let (status, response) = gateway.client.orchestrate(&request).await.unwrap();

    assert_eq!(status, 429);
    assert_eq!(response.error.as_deref(), Some("quota_exceeded"));
    assert_eq!(mock.dispatches(), 2);

    gateway.stop().await;
}

#[tokio::test]
async fn test_health_endpoints() {
    let mock = MockService::start().await;
    let gateway = Gateway::start(gateway_config(vec![mock.service("tox", ServiceType::Toxicity)])).await;

    assert!(gateway.client.healthz().await.unwrap());

    let raw = reqwest::get(format!("{}/healthz", gateway.url)).await.unwrap();
    assert_eq!(raw.headers()["x-content-type-options"], "nosniff");
    assert!(raw.headers().contains_key("x-request-id"));

    gateway.orchestrator.probe_health().await.unwrap();
    let health = gateway.client.services_health().await.unwrap();
    assert_eq!(health["tox"].status, "healthy");
    assert_eq!(health["tox"].consecutive_failures, 0);

    gateway.stop().await;
}

#[tokio::test]
async fn test_admin_routes_require_bearer_key() {
    let mock = MockService::start().await;
    let gateway = Gateway::start(gateway_config(vec![mock.service("tox", ServiceType::Toxicity)])).await;

    let err = gateway.client.admin_get("/admin/status", "wrong").await.unwrap_err();
    assert!(matches!(err, SdkError::Status { status: 401, .. }));

    let status = gateway.client.admin_get("/admin/status", ADMIN_KEY).await.unwrap();
    assert_eq!(status["status"], "operational");
    assert_eq!(status["services"], 1);

    let services = gateway.client.admin_get("/admin/services", ADMIN_KEY).await.unwrap();
    assert_eq!(services[0]["name"], "tox");
    assert_eq!(services[0]["circuit"]["state"], "closed");

    let request = OrchestrateRequest::new("toxicity", json!({"text": "x"}), "tenant-a");
    gateway.client.orchestrate(&request).await.unwrap();
    let usage = gateway.client.admin_get("/admin/usage/tenant-a", ADMIN_KEY).await.unwrap();
    assert_eq!(usage["call_count"], 1);
    assert_eq!(usage["tier_name"], "free");

    let err = gateway
        .client
        .admin_get("/admin/services/missing/history", ADMIN_KEY)
        .await
        .unwrap_err();
    assert!(matches!(err, SdkError::Status { status: 404, .. }));

    let events = gateway.client.admin_get("/admin/events", ADMIN_KEY).await.unwrap();
    assert!(events["published"].as_u64().unwrap() >= 1);

    gateway.stop().await;
}
