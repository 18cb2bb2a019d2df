use super::*;
use crate::config::CameraConfig;
use std::time::Duration;

fn small_camera() -> CameraConfig {
    CameraConfig {
        index: 0,
        resolution: (16, 12),
        fps: 50,
        format: "MJPG".to_string(),
    }
}

#[tokio::test]
async fn test_mock_source_yields_frames_only_while_acquired() {
    let source = MockFrameSource::mjpeg();
    assert!(source.latest_frame().await.is_none());

    source.acquire().await.unwrap();
    source.acquire().await.unwrap();
    assert_eq!(source.acquire_count(), 1);

    let first = source.latest_frame().await.unwrap();
    let second = source.latest_frame().await.unwrap();
    assert_ne!(first.id, second.id);
    assert_eq!(
        first.data.as_ref(),
        &MockFrameSource::mjpeg_payload(first.id)
    );

    source.release().await.unwrap();
    assert_eq!(source.release_count(), 1);
    assert!(!source.is_acquired());
    assert!(source.latest_frame().await.is_none());
}

#[tokio::test]
async fn test_mock_source_starvation_and_acquire_failure() {
    let source = MockFrameSource::rgb(2, 2);
    source.set_fail_acquire(true);
    assert!(source.acquire().await.is_err());

    source.set_fail_acquire(false);
    source.acquire().await.unwrap();
    source.set_starved(true);
    assert!(source.latest_frame().await.is_none());
    assert!(!source.wait_ready(Duration::from_millis(10)).await);

    source.set_starved(false);
    let frame = source.latest_frame().await.unwrap();
    assert_eq!(frame.data.len(), 12);
    assert!(frame.validate_size());
}

#[cfg(not(feature = "camera"))]
#[tokio::test]
async fn test_camera_pattern_fills_buffer_and_clears_on_release() {
    let camera = CameraSource::new(small_camera());
    assert!(camera.latest_frame().await.is_none());

    camera.acquire().await.unwrap();
    assert!(camera.is_acquired());

    let mut frame = None;
    for _ in 0..50 {
        frame = camera.latest_frame().await;
        if frame.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let frame = frame.expect("test pattern should produce a frame");
    assert_eq!((frame.width, frame.height), (16, 12));
    assert!(frame.validate_size());

    camera.release().await.unwrap();
    assert!(!camera.is_acquired());
    assert!(camera.latest_frame().await.is_none());
    assert!(camera.frame_count() >= 1);
}

#[cfg(not(feature = "camera"))]
#[tokio::test]
async fn test_camera_is_ready_soon_after_acquire() {
    let camera = CameraSource::new(small_camera());
    assert!(!camera.wait_ready(Duration::from_millis(50)).await);

    for _ in 0..2 {
        camera.acquire().await.unwrap();
        assert!(camera.wait_ready(Duration::from_secs(2)).await);
        assert!(camera.latest_frame().await.is_some());

        camera.release().await.unwrap();
        assert!(!camera.wait_ready(Duration::from_millis(50)).await);
    }
}

#[tokio::test]
async fn test_camera_release_without_acquire_is_noop() {
    let camera = CameraSource::new(small_camera());
    camera.release().await.unwrap();
    assert!(!camera.is_acquired());
}
