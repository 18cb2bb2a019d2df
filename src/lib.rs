pub mod app;
pub mod classifier;
pub mod config;
pub mod error;
pub mod events;
pub mod frame;
pub mod presentation;
pub mod ring_buffer;
pub mod session;
pub mod source;
pub mod storage;

pub use app::{EvalcamApp, RunMode, ShutdownReason};
pub use classifier::{Classifier, HttpClassifier, Prediction, ScriptedClassifier, ScriptedResponse};
pub use config::EvalcamConfig;
pub use error::{EvalcamError, Result};
pub use events::{EvalcamEvent, EventBus, EventFilter, EventReceiver};
pub use frame::{FrameData, FrameFormat, FrameProcessor};
pub use presentation::{EventBusSink, PresentationSink};
pub use ring_buffer::RingBuffer;
pub use session::{
    CancelOutcome, ControllerSettings, ControllerSnapshot, Score, SessionController,
    SessionHandle, SessionId, SessionState, SessionSummary, StartOutcome, Verdict,
    VerdictIndicator,
};
pub use source::{CameraSource, FrameSource, MockFrameSource};
pub use storage::{SampleStore, SessionDir, SummaryFile};
