use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct EvalcamConfig {
    pub camera: CameraConfig,
    pub session: SessionConfig,
    pub classifier: ClassifierConfig,
    pub storage: StorageConfig,
    pub system: SystemConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CameraConfig {
    /// Camera device index (e.g., 0 for /dev/video0)
    #[serde(default = "default_camera_index")]
    pub index: u32,

    /// Camera resolution (width, height)
    #[serde(default = "default_camera_resolution")]
    pub resolution: (u32, u32),

    /// Frames per second
    #[serde(default = "default_camera_fps")]
    pub fps: u32,

    /// Video format (MJPG, YUYV, etc.)
    #[serde(default = "default_camera_format")]
    pub format: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SessionConfig {
    /// Total session runtime in milliseconds (0 = run until cancelled)
    #[serde(default = "default_session_duration_ms")]
    pub duration_ms: u64,

    /// Interval between capture cycles in milliseconds
    #[serde(default = "default_cadence_ms")]
    pub cadence_ms: u64,

    /// Interval between preview frame notifications (0 disables)
    #[serde(default = "default_preview_interval_ms")]
    pub preview_interval_ms: u64,

    /// Release the frame source when a session finishes
    #[serde(default = "default_release_source_on_finish")]
    pub release_source_on_finish: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ClassifierConfig {
    /// Prediction endpoint URL
    #[serde(default = "default_classifier_endpoint")]
    pub endpoint: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_classifier_timeout")]
    pub timeout_seconds: u64,

    /// Verdict label that counts as an accepted sample
    #[serde(default = "default_accepted_label")]
    pub accepted_label: String,

    /// JPEG quality used when encoding samples (1-100)
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct StorageConfig {
    /// Persist samples and error logs to disk
    #[serde(default = "default_storage_enabled")]
    pub enabled: bool,

    /// Base path for session directories
    #[serde(default = "default_storage_path")]
    pub path: String,

    /// Timezone used for the timestamp part of sample file names
    #[serde(default = "default_timestamp_timezone")]
    pub timestamp_timezone: String,

    /// Write a summary.json into each finished session directory
    #[serde(default = "default_save_summary")]
    pub save_summary: bool,

    /// Remove old session directories at startup
    #[serde(default = "default_trim_old")]
    pub trim_old: bool,

    /// Retention period in days
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SystemConfig {
    /// Event bus capacity
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,
}

impl SessionConfig {
    /// Session length, or `None` when sessions run until cancelled
    pub fn duration(&self) -> Option<Duration> {
        if self.duration_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.duration_ms))
        }
    }

    pub fn cadence(&self) -> Duration {
        Duration::from_millis(self.cadence_ms)
    }

    pub fn preview_interval(&self) -> Option<Duration> {
        if self.preview_interval_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.preview_interval_ms))
        }
    }
}

impl ClassifierConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl EvalcamConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("evalcam.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("camera.index", default_camera_index())?
            .set_default(
                "camera.resolution",
                vec![default_camera_resolution().0, default_camera_resolution().1],
            )?
            .set_default("camera.fps", default_camera_fps())?
            .set_default("camera.format", default_camera_format())?
            .set_default("session.duration_ms", default_session_duration_ms())?
            .set_default("session.cadence_ms", default_cadence_ms())?
            .set_default("session.preview_interval_ms", default_preview_interval_ms())?
            .set_default(
                "session.release_source_on_finish",
                default_release_source_on_finish(),
            )?
            .set_default("classifier.endpoint", default_classifier_endpoint())?
            .set_default("classifier.timeout_seconds", default_classifier_timeout())?
            .set_default("classifier.accepted_label", default_accepted_label())?
            .set_default("classifier.jpeg_quality", default_jpeg_quality() as u64)?
            .set_default("storage.enabled", default_storage_enabled())?
            .set_default("storage.path", default_storage_path())?
            .set_default("storage.timestamp_timezone", default_timestamp_timezone())?
            .set_default("storage.save_summary", default_save_summary())?
            .set_default("storage.trim_old", default_trim_old())?
            .set_default("storage.retention_days", default_retention_days())?
            .set_default(
                "system.event_bus_capacity",
                default_event_bus_capacity() as i64,
            )?
            .add_source(File::with_name(&path_str).required(false))
            // EVALCAM_SESSION__CADENCE_MS=500 overrides session.cadence_ms
            .add_source(
                Environment::with_prefix("EVALCAM")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let config: EvalcamConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.camera.resolution.0 == 0 || self.camera.resolution.1 == 0 {
            return Err(ConfigError::Message(
                "Camera resolution must be greater than 0".to_string(),
            ));
        }

        if self.camera.fps == 0 {
            return Err(ConfigError::Message(
                "Camera fps must be greater than 0".to_string(),
            ));
        }

        if self.session.cadence_ms == 0 {
            return Err(ConfigError::Message(
                "Session cadence_ms must be greater than 0".to_string(),
            ));
        }

        if self.classifier.timeout_seconds == 0 {
            return Err(ConfigError::Message(
                "Classifier timeout_seconds must be greater than 0".to_string(),
            ));
        }

        if !(1..=100).contains(&self.classifier.jpeg_quality) {
            return Err(ConfigError::Message(format!(
                "Classifier jpeg_quality must be between 1 and 100, got {}",
                self.classifier.jpeg_quality
            )));
        }

        if self.classifier.accepted_label.trim().is_empty() {
            return Err(ConfigError::Message(
                "Classifier accepted_label must not be empty".to_string(),
            ));
        }

        if let Err(e) = reqwest::Url::parse(&self.classifier.endpoint) {
            return Err(ConfigError::Message(format!(
                "Classifier endpoint '{}' is not a valid URL: {}",
                self.classifier.endpoint, e
            )));
        }

        if self.system.event_bus_capacity == 0 {
            return Err(ConfigError::Message(
                "Event bus capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Render the configuration as TOML
    pub fn to_toml(&self) -> crate::error::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

impl Default for EvalcamConfig {
    fn default() -> Self {
        Self {
            camera: CameraConfig {
                index: default_camera_index(),
                resolution: default_camera_resolution(),
                fps: default_camera_fps(),
                format: default_camera_format(),
            },
            session: SessionConfig {
                duration_ms: default_session_duration_ms(),
                cadence_ms: default_cadence_ms(),
                preview_interval_ms: default_preview_interval_ms(),
                release_source_on_finish: default_release_source_on_finish(),
            },
            classifier: ClassifierConfig {
                endpoint: default_classifier_endpoint(),
                timeout_seconds: default_classifier_timeout(),
                accepted_label: default_accepted_label(),
                jpeg_quality: default_jpeg_quality(),
            },
            storage: StorageConfig::default(),
            system: SystemConfig {
                event_bus_capacity: default_event_bus_capacity(),
            },
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            enabled: default_storage_enabled(),
            path: default_storage_path(),
            timestamp_timezone: default_timestamp_timezone(),
            save_summary: default_save_summary(),
            trim_old: default_trim_old(),
            retention_days: default_retention_days(),
        }
    }
}

// Default value functions
fn default_camera_index() -> u32 {
    0
}
fn default_camera_resolution() -> (u32, u32) {
    (640, 480)
}
fn default_camera_fps() -> u32 {
    30
}
fn default_camera_format() -> String {
    "MJPG".to_string()
}

fn default_session_duration_ms() -> u64 {
    12_000
}
fn default_cadence_ms() -> u64 {
    1_000
}
fn default_preview_interval_ms() -> u64 {
    30
}
fn default_release_source_on_finish() -> bool {
    true
}

fn default_classifier_endpoint() -> String {
    "http://127.0.0.1:8000/predictOne".to_string()
}
fn default_classifier_timeout() -> u64 {
    120
}
fn default_accepted_label() -> String {
    "correcta".to_string()
}
fn default_jpeg_quality() -> u8 {
    90
}

fn default_storage_enabled() -> bool {
    true
}
fn default_storage_path() -> String {
    "./captures".to_string()
}
fn default_timestamp_timezone() -> String {
    "UTC".to_string()
}
fn default_save_summary() -> bool {
    false
}
fn default_trim_old() -> bool {
    false
}
fn default_retention_days() -> u32 {
    7
}

fn default_event_bus_capacity() -> usize {
    100
}
