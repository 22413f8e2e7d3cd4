//! Request identification and correlation headers.
//!
//! # Responsibilities
//! - Name the correlation headers shared by the gateway and guard services
//! - Assign a request ID to every inbound HTTP request that lacks one
//! - Echo the request ID on the response
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - A caller-supplied `x-request-id` is kept as-is

use axum::http::{HeaderName, HeaderValue, Request};
use tower_http::request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer};
use uuid::Uuid;

pub const X_REQUEST_ID: &str = "x-request-id";
pub const X_TENANT_ID: &str = "x-tenant-id";
pub const X_SESSION_ID: &str = "x-session-id";

/// Generates UUID v4 request IDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeRequestUuid;

impl MakeRequestId for MakeRequestUuid {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

pub fn set_request_id_layer() -> SetRequestIdLayer<MakeRequestUuid> {
    SetRequestIdLayer::new(HeaderName::from_static(X_REQUEST_ID), MakeRequestUuid)
}

pub fn propagate_request_id_layer() -> PropagateRequestIdLayer {
    PropagateRequestIdLayer::new(HeaderName::from_static(X_REQUEST_ID))
}

/// Read a header as a non-empty string.
pub fn header_str<'a>(headers: &'a axum::http::HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderMap;

    #[test]
    fn test_generated_ids_are_unique() {
        let request = Request::new(());
        let mut maker = MakeRequestUuid;
        let a = maker.make_request_id(&request).unwrap();
        let b = maker.make_request_id(&request).unwrap();
        assert_ne!(a.header_value(), b.header_value());
    }

    #[test]
    fn test_header_str_skips_blank_values() {
        let mut headers = HeaderMap::new();
        headers.insert(X_TENANT_ID, HeaderValue::from_static("  "));
        headers.insert(X_SESSION_ID, HeaderValue::from_static("s-1"));
        assert_eq!(header_str(&headers, X_TENANT_ID), None);
        assert_eq!(header_str(&headers, X_SESSION_ID), Some("s-1"));
        assert_eq!(header_str(&headers, X_REQUEST_ID), None);
    }
}
