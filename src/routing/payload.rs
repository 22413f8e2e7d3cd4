//! Payload mapping from the generic envelope to each guard service schema.
//!
//! # Responsibilities
//! - Parse the inbound payload into the variant for its service type
//! - Apply defaults for missing optional fields
//! - Inject request/tenant/session identifiers
//!
//! # Design Decisions
//! - One explicit struct per service type; unknown fields are rejected
//! - Aliases are the only tolerated renames: `content`/`text`,
//!   `output`/`response`, `sources`/`context`
//! - Custom service types receive the caller's object unchanged plus ids

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::GatewayError;
use crate::orchestrator::OrchestrationRequest;
use crate::routing::ServiceType;

const DEFAULT_TOXICITY_THRESHOLD: f64 = 0.5;
const DEFAULT_LANGUAGE: &str = "en";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToxicityInput {
    #[serde(alias = "content")]
    pub text: String,
    #[serde(default)]
    pub threshold: Option<f64>,
    #[serde(default)]
    pub categories: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PiiInput {
    #[serde(alias = "content")]
    pub text: String,
    /// Entity types to detect; empty means every type the service knows.
    #[serde(default)]
    pub entity_types: Vec<String>,
    #[serde(default)]
    pub redact: bool,
    #[serde(default)]
    pub language: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PromptInjectionInput {
    #[serde(alias = "text")]
    pub prompt: String,
    #[serde(default)]
    pub system_prompt: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HallucinationInput {
    #[serde(alias = "output")]
    pub response: String,
    #[serde(default, alias = "sources")]
    pub context: Vec<String>,
    #[serde(default)]
    pub question: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SecretsScanInput {
    #[serde(alias = "text")]
    pub content: String,
    #[serde(default)]
    pub filename: Option<String>,
}

/// A validated payload, tagged by the service type it targets.
#[derive(Debug, Clone, PartialEq)]
pub enum GuardPayload {
    Toxicity(ToxicityInput),
    PiiDetection(PiiInput),
    PromptInjection(PromptInjectionInput),
    Hallucination(HallucinationInput),
    SecretsScan(SecretsScanInput),
    Custom(Map<String, Value>),
}

impl GuardPayload {
    /// Parse a generic payload for the given service type.
    pub fn parse(service_type: &ServiceType, payload: &Value) -> Result<Self, GatewayError> {
        let invalid = |e: serde_json::Error| GatewayError::InvalidPayload {
            service_type: service_type.to_string(),
            reason: e.to_string(),
        };

        let parsed = match service_type {
            ServiceType::Toxicity => {
                GuardPayload::Toxicity(ToxicityInput::deserialize(payload).map_err(invalid)?)
            }
            ServiceType::PiiDetection => {
                GuardPayload::PiiDetection(PiiInput::deserialize(payload).map_err(invalid)?)
            }
            ServiceType::PromptInjection => GuardPayload::PromptInjection(
                PromptInjectionInput::deserialize(payload).map_err(invalid)?,
            ),
            ServiceType::Hallucination => GuardPayload::Hallucination(
                HallucinationInput::deserialize(payload).map_err(invalid)?,
            ),
            ServiceType::SecretsScan => {
                GuardPayload::SecretsScan(SecretsScanInput::deserialize(payload).map_err(invalid)?)
            }
            ServiceType::Custom(_) => match payload {
                Value::Object(map) => GuardPayload::Custom(map.clone()),
                other => {
                    return Err(GatewayError::InvalidPayload {
                        service_type: service_type.to_string(),
                        reason: format!("expected a JSON object, got {}", json_type(other)),
                    })
                }
            },
        };
        Ok(parsed)
    }

    /// The service-native body, without identifiers.
    fn into_body(self) -> Map<String, Value> {
        let value = match self {
            GuardPayload::Toxicity(input) => serde_json::json!({
                "content": input.text,
                "threshold": input.threshold.unwrap_or(DEFAULT_TOXICITY_THRESHOLD),
                "categories": input.categories,
            }),
            GuardPayload::PiiDetection(input) => serde_json::json!({
                "text": input.text,
                "entities": input.entity_types,
                "redact": input.redact,
                "language": input.language.unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
            }),
            GuardPayload::PromptInjection(input) => serde_json::json!({
                "prompt": input.prompt,
                "context": input.system_prompt.unwrap_or_default(),
            }),
            GuardPayload::Hallucination(input) => serde_json::json!({
                "response": input.response,
                "context": input.context,
                "question": input.question,
            }),
            GuardPayload::SecretsScan(input) => serde_json::json!({
                "content": input.content,
                "filename": input.filename,
            }),
            GuardPayload::Custom(map) => return map,
        };

        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }
}

/// The JSON document sent to a guard service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackendPayload {
    pub request_id: String,
    pub tenant_id: String,
    pub session_id: String,
    #[serde(flatten)]
    pub body: Map<String, Value>,
}

impl BackendPayload {
    pub fn to_bytes(&self) -> Result<Vec<u8>, GatewayError> {
        serde_json::to_vec(self)
            .map_err(|e| GatewayError::Internal(format!("failed to encode payload: {e}")))
    }
}

/// Map a request's generic payload to the target service's schema.
pub fn transform_payload(request: &OrchestrationRequest) -> Result<BackendPayload, GatewayError> {
    let mut body = GuardPayload::parse(&request.service_type, &request.payload)?.into_body();

    // Identifiers always come from the envelope, never from the caller's body.
    for key in ["request_id", "tenant_id", "session_id"] {
        body.remove(key);
    }

    Ok(BackendPayload {
        request_id: request.request_id.clone(),
        tenant_id: request.tenant_id.clone(),
        session_id: request.session_id.clone(),
        body,
    })
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
