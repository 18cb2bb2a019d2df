use super::{Classifier, Prediction};
use crate::config::ClassifierConfig;
use crate::error::{ClassifierError, EvalcamError, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde_json::Value;
use tracing::{debug, warn};

/// Longest body excerpt carried inside an error
const MAX_ERROR_BODY: usize = 512;

/// Classifier reached over HTTP: `POST {"image": <base64 jpeg>}` and read
/// `prediction` from the JSON reply.
#[derive(Clone)]
pub struct HttpClassifier {
    client: reqwest::Client,
    endpoint: reqwest::Url,
    timeout_seconds: u64,
}

impl HttpClassifier {
    pub fn new(config: &ClassifierConfig) -> Result<Self> {
        let endpoint = reqwest::Url::parse(&config.endpoint).map_err(|e| {
            EvalcamError::component(
                "classifier".to_string(),
                format!("Invalid endpoint '{}': {}", config.endpoint, e),
            )
        })?;

        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ClassifierError::Request {
                details: e.to_string(),
            })?;

        Ok(Self {
            client,
            endpoint,
            timeout_seconds: config.timeout_seconds,
        })
    }

    pub fn endpoint(&self) -> &reqwest::Url {
        &self.endpoint
    }

    fn map_transport_error(&self, e: reqwest::Error) -> ClassifierError {
        if e.is_timeout() {
            ClassifierError::Timeout {
                seconds: self.timeout_seconds,
            }
        } else if e.is_builder() {
            ClassifierError::Request {
                details: e.to_string(),
            }
        } else {
            ClassifierError::Transport {
                details: e.to_string(),
            }
        }
    }
}

#[async_trait]
impl Classifier for HttpClassifier {
    async fn classify(&self, jpeg: &[u8]) -> std::result::Result<Prediction, ClassifierError> {
        let payload = serde_json::json!({ "image": BASE64.encode(jpeg) });

        debug!(
            "Sending {} byte sample to classifier at {}",
            jpeg.len(),
            self.endpoint
        );

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&payload)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        // The body is parsed before the status is checked so that error
        // replies can still carry a `detail` field.
        let data: Value = serde_json::from_str(&body).map_err(|_| ClassifierError::NonJson {
            raw: truncate_body(&body),
        })?;

        if !status.is_success() {
            let detail = match data.get("detail") {
                Some(Value::String(detail)) => detail.clone(),
                Some(other) => other.to_string(),
                None => truncate_body(&data.to_string()),
            };
            warn!("Classifier returned HTTP {}: {}", status.as_u16(), detail);
            return Err(ClassifierError::Http {
                status: status.as_u16(),
                detail,
            });
        }

        let label = match data.get("prediction") {
            None | Some(Value::Null) => {
                return Err(ClassifierError::MissingPrediction {
                    body: truncate_body(&data.to_string()),
                })
            }
            Some(Value::String(label)) => label.clone(),
            Some(other) => other.to_string(),
        };

        debug!("Classifier prediction: {}", label);

        Ok(Prediction { label, raw: data })
    }
}

fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}
