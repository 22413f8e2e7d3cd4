//! Guard service types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The analysis function a guard service performs.
///
/// Known types have an explicit dispatch path and payload mapping. Any other
/// name is carried as [`ServiceType::Custom`] and uses the documented default
/// path with a passthrough payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ServiceType {
    Toxicity,
    PiiDetection,
    PromptInjection,
    Hallucination,
    SecretsScan,
    Custom(String),
}

impl ServiceType {
    pub fn as_str(&self) -> &str {
        match self {
            ServiceType::Toxicity => "toxicity",
            ServiceType::PiiDetection => "pii_detection",
            ServiceType::PromptInjection => "prompt_injection",
            ServiceType::Hallucination => "hallucination",
            ServiceType::SecretsScan => "secrets_scan",
            ServiceType::Custom(name) => name,
        }
    }
}

impl From<String> for ServiceType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "toxicity" => ServiceType::Toxicity,
            "pii_detection" => ServiceType::PiiDetection,
            "prompt_injection" => ServiceType::PromptInjection,
            "hallucination" => ServiceType::Hallucination,
            "secrets_scan" => ServiceType::SecretsScan,
            _ => ServiceType::Custom(value),
        }
    }
}

impl From<&str> for ServiceType {
    fn from(value: &str) -> Self {
        ServiceType::from(value.to_string())
    }
}

impl From<ServiceType> for String {
    fn from(value: ServiceType) -> Self {
        match value {
            ServiceType::Custom(name) => name,
            other => other.as_str().to_string(),
        }
    }
}

impl FromStr for ServiceType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(ServiceType::from(s))
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_and_custom_names() {
        assert_eq!(ServiceType::from("toxicity"), ServiceType::Toxicity);
        assert_eq!(ServiceType::from("secrets_scan"), ServiceType::SecretsScan);
        assert_eq!(
            ServiceType::from("sentiment"),
            ServiceType::Custom("sentiment".into())
        );
        assert_eq!(ServiceType::Custom("sentiment".into()).to_string(), "sentiment");
    }

    #[test]
    fn test_serde_as_plain_string() {
        let json = serde_json::to_string(&ServiceType::PromptInjection).unwrap();
        assert_eq!(json, "\"prompt_injection\"");

        let parsed: ServiceType = serde_json::from_str("\"hallucination\"").unwrap();
        assert_eq!(parsed, ServiceType::Hallucination);
    }
}
