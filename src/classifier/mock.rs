use super::{Classifier, Prediction};
use crate::error::ClassifierError;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

/// One canned classifier reply
#[derive(Debug, Clone)]
pub struct ScriptedResponse {
    pub delay: Duration,
    pub outcome: Result<String, ClassifierError>,
}

impl ScriptedResponse {
    pub fn label(label: &str) -> Self {
        Self {
            delay: Duration::ZERO,
            outcome: Ok(label.to_string()),
        }
    }

    pub fn error(error: ClassifierError) -> Self {
        Self {
            delay: Duration::ZERO,
            outcome: Err(error),
        }
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// Classifier replaying a fixed script, for tests and offline runs.
///
/// Once the script is exhausted every call gets the fallback reply.
pub struct ScriptedClassifier {
    script: Mutex<VecDeque<ScriptedResponse>>,
    fallback: ScriptedResponse,
    calls: AtomicUsize,
    payloads: Mutex<Vec<Vec<u8>>>,
}

impl ScriptedClassifier {
    pub fn new(script: Vec<ScriptedResponse>, fallback: ScriptedResponse) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
            calls: AtomicUsize::new(0),
            payloads: Mutex::new(Vec::new()),
        }
    }

    /// Always answer with `label`
    pub fn always(label: &str) -> Self {
        Self::new(Vec::new(), ScriptedResponse::label(label))
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every payload received so far, in call order
    pub async fn payloads(&self) -> Vec<Vec<u8>> {
        self.payloads.lock().await.clone()
    }
}

#[async_trait]
impl Classifier for ScriptedClassifier {
    async fn classify(&self, jpeg: &[u8]) -> Result<Prediction, ClassifierError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.payloads.lock().await.push(jpeg.to_vec());

        let response = self
            .script
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        debug!("Scripted classifier call {} -> {:?}", call, response.outcome);

        if !response.delay.is_zero() {
            tokio::time::sleep(response.delay).await;
        }

        response.outcome.map(|label| Prediction {
            raw: serde_json::json!({ "prediction": label }),
            label,
        })
    }
}
