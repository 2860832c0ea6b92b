use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A term as it travels in a batch request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyedTerm {
    #[serde(rename = "id")]
    pub key: String,
    pub text: String,
}

/// A translated term as it comes back from a batch request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyedTranslation {
    #[serde(rename = "id")]
    pub key: String,
    pub text: String,
}

#[derive(Debug, Error)]
pub enum CapabilityError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("call timed out after {0:?}")]
    Timeout(Duration),
    #[error("capability returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("empty response")]
    Empty,
}

impl CapabilityError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Malformed(_) | Self::Empty => false,
        }
    }
}

impl From<reqwest::Error> for CapabilityError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Malformed(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

/// The external text-normalization service.
///
/// Implementations must be stateless across calls; the pipeline issues
/// several calls concurrently against one shared instance.
#[async_trait::async_trait]
pub trait TranslationCapability: Send + Sync {
    /// Single-record mode: one raw description in, one English sentence out.
    async fn translate_one(&self, text: &str) -> Result<String, CapabilityError>;

    /// Batch mode: every returned item carries the key of the term it
    /// translates. Missing or extra keys are resolved by the aligner.
    async fn translate_batch(
        &self,
        terms: &[KeyedTerm],
    ) -> Result<Vec<KeyedTranslation>, CapabilityError>;

    /// Startup probe; an error here aborts the run before any write.
    async fn health_check(&self) -> Result<(), CapabilityError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(CapabilityError::Transport("reset".into()).is_transient());
        assert!(CapabilityError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(CapabilityError::Status { status: 429, body: String::new() }.is_transient());
        assert!(CapabilityError::Status { status: 503, body: String::new() }.is_transient());
        assert!(!CapabilityError::Status { status: 401, body: String::new() }.is_transient());
        assert!(!CapabilityError::Malformed("not json".into()).is_transient());
        assert!(!CapabilityError::Empty.is_transient());
    }

    #[test]
    fn keyed_terms_use_id_on_the_wire() {
        let term = KeyedTerm { key: "3".into(), text: "溶胶凝胶法".into() };
        let v = serde_json::to_value(&term).unwrap();
        assert_eq!(v, serde_json::json!({"id": "3", "text": "溶胶凝胶法"}));
    }
}
