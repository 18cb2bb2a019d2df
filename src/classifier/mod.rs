mod http;
mod mock;
#[cfg(test)]
mod tests;

pub use http::HttpClassifier;
pub use mock::{ScriptedClassifier, ScriptedResponse};

use crate::error::ClassifierError;
use async_trait::async_trait;

/// Verdict label returned by the remote classifier
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub label: String,
    /// Full response body, kept for debugging
    pub raw: serde_json::Value,
}

/// Remote service that turns an encoded sample into a verdict label
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, jpeg: &[u8]) -> Result<Prediction, ClassifierError>;
}
