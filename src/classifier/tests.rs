use super::*;
use crate::config::ClassifierConfig;
use crate::error::ClassifierError;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use std::time::Duration;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer, timeout_seconds: u64) -> ClassifierConfig {
    ClassifierConfig {
        endpoint: format!("{}/predictOne", server.uri()),
        timeout_seconds,
        accepted_label: "correcta".to_string(),
        jpeg_quality: 90,
    }
}

const SAMPLE: &[u8] = &[0xFF, 0xD8, 0x10, 0x20, 0xFF, 0xD9];

#[tokio::test]
async fn test_posts_base64_image_and_reads_prediction() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/predictOne"))
        .and(body_json(serde_json::json!({ "image": BASE64.encode(SAMPLE) })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "prediction": "correcta", "confidence": 0.93 })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let classifier = HttpClassifier::new(&config_for(&server, 5)).unwrap();
    let prediction = classifier.classify(SAMPLE).await.unwrap();

    assert_eq!(prediction.label, "correcta");
    assert_eq!(prediction.raw["confidence"], 0.93);
}

#[tokio::test]
async fn test_non_json_body_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let classifier = HttpClassifier::new(&config_for(&server, 5)).unwrap();
    let err = classifier.classify(SAMPLE).await.unwrap_err();

    assert_eq!(
        err,
        ClassifierError::NonJson {
            raw: "<html>oops</html>".to_string()
        }
    );
}

#[tokio::test]
async fn test_http_error_carries_detail() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(422).set_body_json(serde_json::json!({ "detail": "bad image" })),
        )
        .mount(&server)
        .await;

    let classifier = HttpClassifier::new(&config_for(&server, 5)).unwrap();
    let err = classifier.classify(SAMPLE).await.unwrap_err();

    assert_eq!(
        err,
        ClassifierError::Http {
            status: 422,
            detail: "bad image".to_string()
        }
    );
}

#[tokio::test]
async fn test_http_error_without_detail_carries_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_json(serde_json::json!({ "msg": "down" })))
        .mount(&server)
        .await;

    let classifier = HttpClassifier::new(&config_for(&server, 5)).unwrap();
    match classifier.classify(SAMPLE).await.unwrap_err() {
        ClassifierError::Http { status, detail } => {
            assert_eq!(status, 500);
            assert!(detail.contains("down"));
        }
        other => panic!("Expected HTTP error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_missing_prediction_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "label": "x" })))
        .mount(&server)
        .await;

    let classifier = HttpClassifier::new(&config_for(&server, 5)).unwrap();
    let err = classifier.classify(SAMPLE).await.unwrap_err();

    assert!(matches!(err, ClassifierError::MissingPrediction { .. }));
}

#[tokio::test]
async fn test_null_prediction_counts_as_missing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "prediction": null })),
        )
        .mount(&server)
        .await;

    let classifier = HttpClassifier::new(&config_for(&server, 5)).unwrap();
    let err = classifier.classify(SAMPLE).await.unwrap_err();

    assert!(matches!(err, ClassifierError::MissingPrediction { .. }));
}

#[tokio::test]
async fn test_slow_server_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "prediction": "correcta" }))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let classifier = HttpClassifier::new(&config_for(&server, 1)).unwrap();
    let err = classifier.classify(SAMPLE).await.unwrap_err();

    assert_eq!(err, ClassifierError::Timeout { seconds: 1 });
}

#[tokio::test]
async fn test_unreachable_endpoint_is_transport_error() {
    let config = ClassifierConfig {
        // Port 9 (discard) on localhost is not expected to accept HTTP
        endpoint: "http://127.0.0.1:9/predictOne".to_string(),
        timeout_seconds: 5,
        accepted_label: "correcta".to_string(),
        jpeg_quality: 90,
    };

    let classifier = HttpClassifier::new(&config).unwrap();
    let err = classifier.classify(SAMPLE).await.unwrap_err();

    assert!(matches!(err, ClassifierError::Transport { .. }));
}

#[tokio::test]
async fn test_scripted_classifier_replays_then_falls_back() {
    let classifier = ScriptedClassifier::new(
        vec![
            ScriptedResponse::label("incorrecta"),
            ScriptedResponse::error(ClassifierError::Timeout { seconds: 120 }),
        ],
        ScriptedResponse::label("correcta"),
    );

    assert_eq!(classifier.classify(b"a").await.unwrap().label, "incorrecta");
    assert!(classifier.classify(b"b").await.is_err());
    assert_eq!(classifier.classify(b"c").await.unwrap().label, "correcta");
    assert_eq!(classifier.classify(b"d").await.unwrap().label, "correcta");

    assert_eq!(classifier.call_count(), 4);
    assert_eq!(classifier.payloads().await[1], b"b".to_vec());
}
