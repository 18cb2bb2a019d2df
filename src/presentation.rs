use crate::events::{EvalcamEvent, EventBus};
use crate::frame::FrameData;
use crate::session::{SessionId, SessionSummary, VerdictIndicator};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::trace;

/// Receiver of everything the session controller wants shown to the user.
///
/// Calls are made from the controller task and must not block.
pub trait PresentationSink: Send + Sync {
    /// A new live frame is available
    fn render_frame(&self, frame: &FrameData);

    /// A sample was classified
    fn render_verdict(&self, session_id: &SessionId, sequence: u64, indicator: VerdictIndicator);

    /// A session finished and was scored
    fn render_summary(&self, summary: &SessionSummary);

    fn session_started(&self, _session_id: &SessionId) {}

    fn session_cancelled(&self, _session_id: &SessionId) {}

    /// Clear whatever is on screen (restart)
    fn reset(&self) {}
}

/// Sink that republishes everything on the event bus
#[derive(Clone)]
pub struct EventBusSink {
    event_bus: Arc<EventBus>,
}

impl EventBusSink {
    pub fn new(event_bus: Arc<EventBus>) -> Self {
        Self { event_bus }
    }

    fn publish(&self, event: EvalcamEvent) {
        // Nobody listening is normal for headless runs
        if let Err(e) = self.event_bus.publish(event) {
            trace!("Presentation event dropped: {}", e);
        }
    }
}

impl PresentationSink for EventBusSink {
    fn render_frame(&self, frame: &FrameData) {
        self.publish(EvalcamEvent::FrameUpdated {
            frame_id: frame.id,
            width: frame.width,
            height: frame.height,
            timestamp: frame.timestamp,
        });
    }

    fn render_verdict(&self, session_id: &SessionId, sequence: u64, indicator: VerdictIndicator) {
        self.publish(EvalcamEvent::VerdictIndicated {
            session_id: session_id.clone(),
            sequence,
            indicator,
        });
    }

    fn render_summary(&self, summary: &SessionSummary) {
        self.publish(EvalcamEvent::SessionSummary(summary.clone()));
    }

    fn session_started(&self, session_id: &SessionId) {
        self.publish(EvalcamEvent::SessionStarted {
            session_id: session_id.clone(),
            timestamp: SystemTime::now(),
        });
    }

    fn session_cancelled(&self, session_id: &SessionId) {
        self.publish(EvalcamEvent::SessionCancelled {
            session_id: session_id.clone(),
        });
    }

    fn reset(&self) {
        self.publish(EvalcamEvent::PresentationReset {
            timestamp: SystemTime::now(),
        });
    }
}
