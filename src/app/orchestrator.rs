use super::keyboard_input::KeyboardInputHandler;
use super::types::ShutdownReason;
use crate::classifier::{Classifier, HttpClassifier};
use crate::config::EvalcamConfig;
use crate::error::Result;
use crate::events::EventBus;
use crate::presentation::EventBusSink;
use crate::session::{ControllerSettings, SessionController, SessionHandle};
use crate::source::{CameraSource, FrameSource};
use crate::storage::SampleStore;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Main application coordinator that wires the session controller to its
/// collaborators
pub struct EvalcamApp {
    pub(super) config: EvalcamConfig,
    pub(super) event_bus: Arc<EventBus>,
    pub(super) source: Arc<dyn FrameSource>,
    pub(super) store: Option<SampleStore>,
    pub(super) sessions: SessionHandle,

    pub(super) keyboard_handler: Option<KeyboardInputHandler>,
    pub(super) background_tasks: Vec<JoinHandle<()>>,

    // Lifecycle management
    pub(super) shutdown_sender: mpsc::Sender<ShutdownReason>,
    pub(super) shutdown_receiver: Option<mpsc::Receiver<ShutdownReason>>,
    pub(super) cancellation_token: CancellationToken,
}

impl EvalcamApp {
    /// Build the application around the configured camera and HTTP classifier
    pub fn new(config: EvalcamConfig) -> Result<Self> {
        let source: Arc<dyn FrameSource> = Arc::new(CameraSource::new(config.camera.clone()));
        let classifier: Arc<dyn Classifier> = Arc::new(HttpClassifier::new(&config.classifier)?);
        info!("Classifier endpoint: {}", config.classifier.endpoint);
        Ok(Self::with_components(config, source, classifier))
    }

    /// Build the application around caller-supplied source and classifier
    pub fn with_components(
        config: EvalcamConfig,
        source: Arc<dyn FrameSource>,
        classifier: Arc<dyn Classifier>,
    ) -> Self {
        let event_bus = Arc::new(EventBus::new(config.system.event_bus_capacity));

        let store = if config.storage.enabled {
            info!("Samples will be stored under {}", config.storage.path);
            Some(SampleStore::new(&config.storage))
        } else {
            info!("Sample persistence disabled; samples stay in memory");
            None
        };

        let sink = Arc::new(EventBusSink::new(Arc::clone(&event_bus)));
        let sessions = SessionController::spawn(
            ControllerSettings::from_config(&config),
            Arc::clone(&source),
            classifier,
            store.clone(),
            sink,
        );

        let (shutdown_sender, shutdown_receiver) = mpsc::channel(4);

        Self {
            config,
            event_bus,
            source,
            store,
            sessions,
            keyboard_handler: None,
            background_tasks: Vec::new(),
            shutdown_sender,
            shutdown_receiver: Some(shutdown_receiver),
            cancellation_token: CancellationToken::new(),
        }
    }

    pub fn sessions(&self) -> &SessionHandle {
        &self.sessions
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.event_bus)
    }

    pub fn config(&self) -> &EvalcamConfig {
        &self.config
    }
}
