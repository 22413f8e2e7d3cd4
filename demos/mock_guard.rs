//! A pretend guard service for trying the gateway locally.
//!
//! `cargo run --example mock_guard` then point a `toxicity` service at
//! http://127.0.0.1:8081.

use std::net::SocketAddr;

use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

#[tokio::main]
async fn main() {
    let app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .route(
            "/v1/toxicity/analyze",
            post(|Json(body): Json<Value>| async move {
                let content = body["content"].as_str().unwrap_or_default();
                let flagged = content.to_lowercase().contains("idiot");
                Json(json!({
                    "flagged": flagged,
                    "score": if flagged { 0.93 } else { 0.04 },
                    "request_id": body["request_id"],
                }))
            }),
        );

    let addr = SocketAddr::from(([127, 0, 0, 1], 8081));
    println!("Mock guard service listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
