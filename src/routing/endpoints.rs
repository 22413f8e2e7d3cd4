//! Dispatch path resolution.
//!
//! # Design Decisions
//! - Static table from service type to path; no lookups at request time
//! - A service's `dispatch_path` overrides the table
//! - Unknown (custom) types fall back to [`DEFAULT_DISPATCH_PATH`]

use crate::config::ServiceConfig;
use crate::orchestrator::OrchestrationRequest;
use crate::routing::ServiceType;

/// Path used for service types without a table entry.
pub const DEFAULT_DISPATCH_PATH: &str = "/v1/analyze";

/// The table path for a service type.
pub fn table_path(service_type: &ServiceType) -> &'static str {
    match service_type {
        ServiceType::Toxicity => "/v1/toxicity/analyze",
        ServiceType::PiiDetection => "/v1/pii/detect",
        ServiceType::PromptInjection => "/v1/injection/detect",
        ServiceType::Hallucination => "/v1/hallucination/check",
        ServiceType::SecretsScan => "/v1/secrets/scan",
        ServiceType::Custom(_) => DEFAULT_DISPATCH_PATH,
    }
}

/// Resolve the path a request is posted to on the chosen service.
pub fn determine_endpoint<'a>(request: &OrchestrationRequest, service: &'a ServiceConfig) -> &'a str {
    match &service.dispatch_path {
        Some(path) => path.as_str(),
        None => table_path(&request.service_type),
    }
}

/// Join a base URL and an absolute path without doubling slashes.
pub fn join_url(base_url: &str, path: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), path)
}
