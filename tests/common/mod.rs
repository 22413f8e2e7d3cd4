//! Mock guard services and gateway fixtures for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use guard_gateway::config::{GatewayConfig, ServiceConfig};
use guard_gateway::ServiceType;

/// How the mock answers dispatches.
#[derive(Debug, Clone, PartialEq)]
pub enum Mode {
    Ok,
    Delay(Duration),
    Status(u16),
    BadJson,
}

#[derive(Debug)]
pub struct MockState {
    mode: Mutex<Mode>,
    health_status: AtomicU16,
    dispatches: AtomicU64,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    last_headers: Mutex<Option<HeaderMap>>,
    last_body: Mutex<Option<Value>>,
}

/// A running mock guard service.
#[derive(Debug, Clone)]
pub struct MockService {
    pub addr: SocketAddr,
    state: Arc<MockState>,
}

impl MockService {
    pub async fn start() -> Self {
        let state = Arc::new(MockState {
            mode: Mutex::new(Mode::Ok),
            health_status: AtomicU16::new(200),
            dispatches: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
            last_headers: Mutex::new(None),
            last_body: Mutex::new(None),
        });

        let app = Router::new()
            .route("/health", get(health))
            .route("/{*path}", post(dispatch))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn set_mode(&self, mode: Mode) {
        *self.state.mode.lock().unwrap() = mode;
    }

    pub fn set_health_status(&self, status: u16) {
        self.state.health_status.store(status, Ordering::SeqCst);
    }

    pub fn dispatches(&self) -> u64 {
        self.state.dispatches.load(Ordering::SeqCst)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.state.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn last_headers(&self) -> Option<HeaderMap> {
        self.state.last_headers.lock().unwrap().clone()
    }

    pub fn last_body(&self) -> Option<Value> {
        self.state.last_body.lock().unwrap().clone()
    }

    /// A registry entry pointing at this mock.
    pub fn service(&self, name: &str, service_type: ServiceType) -> ServiceConfig {
        ServiceConfig::new(name, service_type, self.url())
    }
}

async fn health(State(state): State<Arc<MockState>>) -> StatusCode {
    let code = state.health_status.load(Ordering::SeqCst);
    StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

async fn dispatch(State(state): State<Arc<MockState>>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    state.dispatches.fetch_add(1, Ordering::SeqCst);
    let current = state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    state.peak_in_flight.fetch_max(current, Ordering::SeqCst);
    *state.last_headers.lock().unwrap() = Some(headers);
    *state.last_body.lock().unwrap() = Some(body);

    let mode = state.mode.lock().unwrap().clone();
    let response = match mode {
        Mode::Ok => Json(json!({"flagged": false, "score": 0.02})).into_response(),
        Mode::Delay(delay) => {
            tokio::time::sleep(delay).await;
            Json(json!({"flagged": false, "score": 0.02})).into_response()
        }
        Mode::Status(code) => {
            let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, Json(json!({"error": "mock failure"}))).into_response()
        }
        Mode::BadJson => (StatusCode::OK, "definitely not json").into_response(),
    };

    state.in_flight.fetch_sub(1, Ordering::SeqCst);
    response
}

/// Gateway config with background health checks off and metrics disabled.
pub fn gateway_config(services: Vec<ServiceConfig>) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.health_check.enabled = false;
    config.health_check.timeout_secs = 1;
    config.observability.metrics_enabled = false;
    config.services = services;
    config
}

/// An address nothing listens on.
pub async fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}
