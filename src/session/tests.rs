use super::*;
use crate::classifier::{ScriptedClassifier, ScriptedResponse};
use crate::error::ClassifierError;
use crate::presentation::testing::RecordingSink;
use crate::source::{FrameSource, MockFrameSource};
use crate::storage::{SampleStore, SummaryFile};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::broadcast;

fn settings(duration_ms: u64, cadence_ms: u64) -> ControllerSettings {
    ControllerSettings {
        duration: (duration_ms > 0).then(|| Duration::from_millis(duration_ms)),
        cadence: Duration::from_millis(cadence_ms),
        preview_interval: None,
        release_source_on_finish: true,
        accepted_label: "correcta".to_string(),
        jpeg_quality: 90,
        save_summary: false,
    }
}

struct Harness {
    handle: SessionHandle,
    source: Arc<MockFrameSource>,
    classifier: Arc<ScriptedClassifier>,
    sink: Arc<RecordingSink>,
    summaries: broadcast::Receiver<SessionSummary>,
}

fn spawn_with(
    settings: ControllerSettings,
    classifier: ScriptedClassifier,
    source: MockFrameSource,
    store: Option<SampleStore>,
) -> Harness {
    let source = Arc::new(source);
    let classifier = Arc::new(classifier);
    let sink = Arc::new(RecordingSink::default());
    let handle = SessionController::spawn(
        settings,
        source.clone(),
        classifier.clone(),
        store,
        sink.clone(),
    );
    let summaries = handle.subscribe_summaries();
    Harness {
        handle,
        source,
        classifier,
        sink,
        summaries,
    }
}

fn spawn(settings: ControllerSettings, classifier: ScriptedClassifier) -> Harness {
    spawn_with(settings, classifier, MockFrameSource::mjpeg(), None)
}

fn timeout_error() -> ClassifierError {
    ClassifierError::Timeout { seconds: 120 }
}

#[tokio::test(start_paused = true)]
async fn test_tallies_score_and_representative() {
    let classifier = ScriptedClassifier::new(
        vec![
            ScriptedResponse::label("incorrecta"),
            ScriptedResponse::label("correcta"),
            ScriptedResponse::error(timeout_error()),
            ScriptedResponse::label("correcta"),
        ],
        ScriptedResponse::label("incorrecta"),
    );
    let mut h = spawn(settings(3500, 1000), classifier);

    let StartOutcome::Started(id) = h.handle.start_session().await.unwrap() else {
        panic!("session should start");
    };

    let summary = h.summaries.recv().await.unwrap();
    assert_eq!(summary.session_id, id);
    assert_eq!(summary.sample_count, 4);
    assert_eq!(summary.total_attempts, 3);
    assert_eq!(summary.accepted_count, 2);
    assert_eq!(summary.errored_count, 1);
    assert_eq!(summary.score, Score::Computed(10.0 * 2.0 / 3.0));

    let representative = summary.representative.clone().unwrap();
    assert_eq!(representative.sequence, 4);
    assert!(matches!(representative.handle, SampleHandle::InMemory(_)));

    assert_eq!(
        h.sink.verdicts(),
        vec![
            (1, VerdictIndicator::Rejected),
            (2, VerdictIndicator::Accepted),
            (4, VerdictIndicator::Accepted),
        ]
    );
    assert_eq!(h.sink.summaries().len(), 1);

    let snapshot = h.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.state, SessionState::Idle);
    assert!(!snapshot.cadence_armed);
    assert!(!snapshot.deadline_armed);
    assert_eq!(h.handle.last_summary().await.unwrap(), Some(summary));
}

#[tokio::test(start_paused = true)]
async fn test_all_errored_session_has_no_representative() {
    let classifier = ScriptedClassifier::new(Vec::new(), ScriptedResponse::error(timeout_error()));
    let mut h = spawn(settings(2500, 1000), classifier);

    h.handle.start_session().await.unwrap();
    let summary = h.summaries.recv().await.unwrap();

    assert_eq!(summary.sample_count, 3);
    assert_eq!(summary.errored_count, 3);
    assert_eq!(summary.total_attempts, 0);
    assert!(summary.representative.is_none());
    assert_eq!(summary.score, Score::NoAttempts);
    assert_eq!(summary.score.value(), 0.0);
    assert!(h.sink.verdicts().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_start_while_active_changes_nothing() {
    let mut h = spawn(settings(10_000, 1000), ScriptedClassifier::always("correcta"));

    let first = h.handle.start_session().await.unwrap();
    let StartOutcome::Started(id) = first else {
        panic!("session should start");
    };
    tokio::time::sleep(Duration::from_millis(500)).await;

    let before = h.handle.snapshot().await.unwrap();
    assert_eq!(before.state, SessionState::Active);
    assert_eq!(before.total_attempts, 1);
    assert!(before.cadence_armed);
    assert!(before.deadline_armed);

    assert_eq!(
        h.handle.start_session().await.unwrap(),
        StartOutcome::AlreadyActive(id)
    );
    assert_eq!(h.handle.snapshot().await.unwrap(), before);
    assert_eq!(h.classifier.call_count(), 1);

    let summary = h.summaries.recv().await.unwrap();
    assert_eq!(summary.sample_count, 10);
}

#[tokio::test(start_paused = true)]
async fn test_cycle_due_at_deadline_never_runs() {
    let mut h = spawn(settings(3000, 1000), ScriptedClassifier::always("correcta"));

    h.handle.start_session().await.unwrap();
    let summary = h.summaries.recv().await.unwrap();

    // t=0, 1s and 2s; the 3s tick coincides with the deadline
    assert_eq!(summary.sample_count, 3);
    assert_eq!(summary.total_attempts, 3);
    assert_eq!(h.classifier.call_count(), 3);

    let session = h.handle.last_session().await.unwrap().unwrap();
    let sequences: Vec<u64> = session.samples().iter().map(|r| r.sequence).collect();
    assert_eq!(sequences, vec![1, 2, 3]);
}

#[tokio::test(start_paused = true)]
async fn test_late_responses_are_dropped() {
    let classifier = ScriptedClassifier::new(
        Vec::new(),
        ScriptedResponse::label("correcta").after(Duration::from_secs(5)),
    );
    let mut h = spawn(settings(2500, 1000), classifier);

    h.handle.start_session().await.unwrap();
    let summary = h.summaries.recv().await.unwrap();

    assert_eq!(h.classifier.call_count(), 3);
    // Still pending at the deadline: kept, but outside the denominator
    assert_eq!(summary.sample_count, 3);
    assert_eq!(summary.errored_count, 3);
    assert_eq!(summary.total_attempts, 0);
    assert_eq!(summary.score, Score::NoAttempts);

    tokio::time::sleep(Duration::from_secs(10)).await;

    assert!(h.sink.verdicts().is_empty());
    let session = h.handle.last_session().await.unwrap().unwrap();
    let sequences: Vec<u64> = session.samples().iter().map(|r| r.sequence).collect();
    assert_eq!(sequences, vec![1, 2, 3]);
    assert!(session
        .samples()
        .iter()
        .all(|r| r.verdict == Verdict::Errored("dropped at deadline".to_string())));
    assert_eq!(session.total_attempts(), 0);
    assert_eq!(h.handle.snapshot().await.unwrap().in_flight, 0);
}

#[tokio::test(start_paused = true)]
async fn test_restart_discards_session_without_summary() {
    let h = spawn(settings(10_000, 1000), ScriptedClassifier::always("correcta"));

    let StartOutcome::Started(id) = h.handle.start_session().await.unwrap() else {
        panic!("session should start");
    };
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(h.handle.snapshot().await.unwrap().total_attempts, 2);

    assert_eq!(
        h.handle.restart_session().await.unwrap(),
        CancelOutcome::Cancelled(id.clone())
    );

    let snapshot = h.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.state, SessionState::Idle);
    assert_eq!(snapshot.session_id, None);
    assert_eq!(snapshot.total_attempts, 0);
    assert_eq!(snapshot.accepted_count, 0);
    assert!(!snapshot.cadence_armed);
    assert!(!snapshot.deadline_armed);

    tokio::time::sleep(Duration::from_secs(20)).await;
    assert!(h.sink.summaries().is_empty());
    assert_eq!(h.sink.cancelled(), vec![id.clone()]);
    assert_eq!(*h.sink.resets.lock().unwrap(), 1);
    assert!(h.handle.last_summary().await.unwrap().is_none());

    // Released and reacquired
    assert_eq!(h.source.release_count(), 1);
    assert_eq!(h.source.acquire_count(), 2);
    assert!(h.source.is_acquired());

    assert_eq!(h.handle.cancel().await.unwrap(), CancelOutcome::NotActive);

    let StartOutcome::Started(next) = h.handle.start_session().await.unwrap() else {
        panic!("controller should be reusable");
    };
    assert_ne!(next, id);
}

#[tokio::test(start_paused = true)]
async fn test_zero_duration_runs_until_cancelled() {
    let h = spawn(settings(0, 1000), ScriptedClassifier::always("incorrecta"));

    h.handle.start_session().await.unwrap();
    tokio::time::sleep(Duration::from_millis(10_500)).await;

    let snapshot = h.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.state, SessionState::Active);
    assert!(!snapshot.deadline_armed);
    assert_eq!(snapshot.total_attempts, 11);
    assert_eq!(snapshot.accepted_count, 0);

    assert!(matches!(
        h.handle.cancel().await.unwrap(),
        CancelOutcome::Cancelled(_)
    ));
    assert!(h.sink.summaries().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_always_on_session_holds_bounded_payloads() {
    let h = spawn(settings(0, 10), ScriptedClassifier::always("correcta"));

    h.handle.start_session().await.unwrap();
    tokio::time::sleep(Duration::from_millis(10 * 1000 + 5)).await;

    let snapshot = h.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.sample_count, 1001);
    assert_eq!(snapshot.accepted_count, 1001);
    // Only the representative keeps its bytes
    assert_eq!(
        snapshot.retained_bytes,
        MockFrameSource::mjpeg_payload(0).len()
    );

    h.handle.cancel().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_source_released_on_finish_and_reacquired_on_start() {
    let mut h = spawn(settings(1500, 1000), ScriptedClassifier::always("correcta"));

    h.handle.start_session().await.unwrap();
    assert!(h.source.is_acquired());
    h.summaries.recv().await.unwrap();

    assert!(!h.source.is_acquired());
    assert_eq!(h.source.release_count(), 1);

    h.handle.start_session().await.unwrap();
    assert_eq!(h.source.acquire_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_missing_frames_skip_cycles() {
    let source = MockFrameSource::mjpeg();
    source.set_starved(true);
    let mut h = spawn_with(
        settings(2500, 1000),
        ScriptedClassifier::always("correcta"),
        source,
        None,
    );

    h.handle.start_session().await.unwrap();
    let summary = h.summaries.recv().await.unwrap();

    assert_eq!(summary.sample_count, 0);
    assert_eq!(h.classifier.call_count(), 0);
    assert_eq!(summary.score, Score::NoAttempts);
}

#[tokio::test(start_paused = true)]
async fn test_acquire_failure_is_not_fatal() {
    let source = MockFrameSource::mjpeg();
    source.set_fail_acquire(true);
    let mut h = spawn_with(
        settings(1500, 1000),
        ScriptedClassifier::always("correcta"),
        source,
        None,
    );

    assert!(matches!(
        h.handle.start_session().await.unwrap(),
        StartOutcome::Started(_)
    ));
    let summary = h.summaries.recv().await.unwrap();
    assert_eq!(summary.sample_count, 0);
}

#[tokio::test(start_paused = true)]
async fn test_preview_renders_live_frames() {
    let mut config = settings(500, 1000);
    config.preview_interval = Some(Duration::from_millis(30));
    let h = spawn(config, ScriptedClassifier::always("correcta"));

    h.handle.start_session().await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let frames = h.sink.frames.lock().unwrap().clone();
    assert!(frames.len() >= 5);
    assert!(frames.windows(2).all(|w| w[0] < w[1]));
}

#[cfg(feature = "jpeg")]
#[tokio::test(start_paused = true)]
async fn test_raw_frames_are_jpeg_encoded_before_classification() {
    let mut h = spawn_with(
        settings(500, 1000),
        ScriptedClassifier::always("correcta"),
        MockFrameSource::rgb(8, 8),
        None,
    );

    h.handle.start_session().await.unwrap();
    h.summaries.recv().await.unwrap();

    let payloads = h.classifier.payloads().await;
    assert_eq!(payloads.len(), 1);
    assert_eq!(&payloads[0][..2], &[0xFF, 0xD8]);
}

#[cfg(all(feature = "jpeg", not(feature = "camera")))]
#[tokio::test(start_paused = true)]
async fn test_camera_source_captures_at_session_start() {
    use crate::config::EvalcamConfig;
    use crate::source::CameraSource;

    let mut camera = EvalcamConfig::default().camera;
    camera.resolution = (32, 24);
    let source = Arc::new(CameraSource::new(camera));
    let handle = SessionController::spawn(
        settings(1500, 1000),
        source.clone(),
        Arc::new(ScriptedClassifier::always("correcta")),
        None,
        Arc::new(RecordingSink::default()),
    );
    let mut summaries = handle.subscribe_summaries();

    // The second round starts from a released, emptied camera
    for _ in 0..2 {
        handle.start_session().await.unwrap();
        let summary = summaries.recv().await.unwrap();
        // t=0 and t=1s
        assert_eq!(summary.sample_count, 2);
        assert_eq!(summary.total_attempts, 2);
        assert!(!source.is_acquired());
    }
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_controller() {
    let h = spawn(settings(10_000, 1000), ScriptedClassifier::always("correcta"));
    h.handle.start_session().await.unwrap();

    h.handle.shutdown().await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(h.handle.start_session().await.is_err());
    assert!(!h.source.is_acquired());
}

// The store tests run on the real clock: file IO goes through the blocking
// pool and the timings here leave plenty of margin.

#[tokio::test]
async fn test_samples_are_persisted_and_errors_logged() {
    let temp_dir = TempDir::new().unwrap();
    let store = SampleStore::with_root(temp_dir.path(), chrono_tz::UTC);
    let classifier = ScriptedClassifier::new(
        vec![
            ScriptedResponse::error(ClassifierError::Http {
                status: 500,
                detail: "boom".to_string(),
            }),
            ScriptedResponse::label("correcta"),
        ],
        ScriptedResponse::error(timeout_error()),
    );
    let mut h = spawn_with(
        settings(250, 100),
        classifier,
        MockFrameSource::mjpeg(),
        Some(store),
    );

    let StartOutcome::Started(id) = h.handle.start_session().await.unwrap() else {
        panic!("session should start");
    };
    let summary = h.summaries.recv().await.unwrap();

    let representative = summary.representative.clone().unwrap();
    assert_eq!(representative.sequence, 2);
    assert_eq!(summary.total_attempts, 1);
    assert_eq!(summary.score, Score::Computed(10.0));

    let session = h.handle.last_session().await.unwrap().unwrap();
    let record = &session.samples()[1];
    let path = representative.handle.path().unwrap().to_path_buf();
    assert!(path.starts_with(temp_dir.path().join(id.as_str())));
    let name = path.file_name().unwrap().to_str().unwrap().to_string();
    assert!(name.starts_with("frame_002_"));
    assert!(name.ends_with(".jpg"));

    // Reloaded bytes match what was submitted
    let stored = representative.handle.load().await.unwrap();
    assert_eq!(stored, MockFrameSource::mjpeg_payload(record.frame_id));
    assert_eq!(stored, h.classifier.payloads().await[1]);

    let log = tokio::fs::read_to_string(temp_dir.path().join(id.as_str()).join("errors.log"))
        .await
        .unwrap();
    let lines: Vec<&str> = log.lines().collect();
    assert_eq!(lines.len() as u32, summary.errored_count);
    assert!(lines[0].ends_with(": HTTP error 500: boom"));
    for line in lines {
        let (epoch, _) = line.split_once(": ").unwrap();
        assert!(epoch.parse::<u64>().is_ok());
    }
}

#[tokio::test]
async fn test_persistence_failure_does_not_stop_session() {
    let temp_dir = TempDir::new().unwrap();
    let blocker = temp_dir.path().join("blocker");
    std::fs::write(&blocker, b"not a directory").unwrap();
    let store = SampleStore::with_root(blocker.join("captures"), chrono_tz::UTC);

    let mut h = spawn_with(
        settings(250, 100),
        ScriptedClassifier::always("correcta"),
        MockFrameSource::mjpeg(),
        Some(store),
    );

    h.handle.start_session().await.unwrap();
    let summary = h.summaries.recv().await.unwrap();

    assert!(summary.total_attempts >= 2);
    assert_eq!(summary.accepted_count, summary.total_attempts);
    // Nothing could be stored, so nothing can be shown
    assert!(summary.representative.is_none());
    assert_eq!(summary.score, Score::Computed(10.0));
}

#[tokio::test]
async fn test_summary_json_is_written_when_enabled() {
    let temp_dir = TempDir::new().unwrap();
    let store = SampleStore::with_root(temp_dir.path(), chrono_tz::UTC);
    let mut config = settings(250, 100);
    config.save_summary = true;

    let mut h = spawn_with(
        config,
        ScriptedClassifier::always("incorrecta"),
        MockFrameSource::mjpeg(),
        Some(store.clone()),
    );

    h.handle.start_session().await.unwrap();
    let summary = h.summaries.recv().await.unwrap();

    let stored = store
        .find_session(summary.session_id.as_str())
        .await
        .unwrap()
        .unwrap();
    assert!(stored.has_summary);
    assert_eq!(stored.sample_count as usize, summary.sample_count);

    let file = SummaryFile::load(&stored.path.join("summary.json"))
        .await
        .unwrap();
    assert_eq!(file.session_id, summary.session_id.to_string());
    assert_eq!(file.score, Some(0.0));
    assert_eq!(file.representative, None);
    assert_eq!(file.records.len(), summary.sample_count);
}
