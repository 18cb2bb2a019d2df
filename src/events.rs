use crate::error::EventBusError;
use crate::session::{SessionId, SessionSummary, VerdictIndicator};
use std::time::SystemTime;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Events that can occur in the evalcam system
#[derive(Debug, Clone)]
pub enum EvalcamEvent {
    /// A new live frame is available for preview
    FrameUpdated {
        frame_id: u64,
        width: u32,
        height: u32,
        timestamp: SystemTime,
    },
    /// A session moved from Idle to Active
    SessionStarted {
        session_id: SessionId,
        timestamp: SystemTime,
    },
    /// A sample was classified successfully
    VerdictIndicated {
        session_id: SessionId,
        sequence: u64,
        indicator: VerdictIndicator,
    },
    /// A session reached its deadline and was scored
    SessionSummary(SessionSummary),
    /// A session was aborted without scoring
    SessionCancelled { session_id: SessionId },
    /// Presentation state should be cleared (restart)
    PresentationReset { timestamp: SystemTime },
    /// A system error occurred in a component
    SystemError { component: String, error: String },
    /// System shutdown requested
    ShutdownRequested {
        timestamp: SystemTime,
        reason: String,
    },
}

impl EvalcamEvent {
    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            EvalcamEvent::FrameUpdated {
                frame_id,
                width,
                height,
                ..
            } => format!("Frame {} updated ({}x{})", frame_id, width, height),
            EvalcamEvent::SessionStarted { session_id, .. } => {
                format!("Session {} started", session_id)
            }
            EvalcamEvent::VerdictIndicated {
                session_id,
                sequence,
                indicator,
            } => format!(
                "Session {} sample {} classified as {:?}",
                session_id, sequence, indicator
            ),
            EvalcamEvent::SessionSummary(summary) => format!(
                "Session {} finished with score {} ({}/{} accepted, {} errored)",
                summary.session_id,
                summary.score,
                summary.accepted_count,
                summary.total_attempts,
                summary.errored_count
            ),
            EvalcamEvent::SessionCancelled { session_id } => {
                format!("Session {} cancelled", session_id)
            }
            EvalcamEvent::PresentationReset { .. } => "Presentation reset".to_string(),
            EvalcamEvent::SystemError { component, error } => {
                format!("Error in {}: {}", component, error)
            }
            EvalcamEvent::ShutdownRequested { reason, .. } => {
                format!("Shutdown requested: {}", reason)
            }
        }
    }

    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            EvalcamEvent::FrameUpdated { .. } => "frame_updated",
            EvalcamEvent::SessionStarted { .. } => "session_started",
            EvalcamEvent::VerdictIndicated { .. } => "verdict_indicated",
            EvalcamEvent::SessionSummary(_) => "session_summary",
            EvalcamEvent::SessionCancelled { .. } => "session_cancelled",
            EvalcamEvent::PresentationReset { .. } => "presentation_reset",
            EvalcamEvent::SystemError { .. } => "system_error",
            EvalcamEvent::ShutdownRequested { .. } => "shutdown_requested",
        }
    }
}

/// Async event bus for component coordination using broadcast channels
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EvalcamEvent>,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to events and get a receiver
    pub fn subscribe(&self) -> broadcast::Receiver<EvalcamEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: EvalcamEvent) -> Result<usize, EventBusError> {
        match &event {
            EvalcamEvent::SessionStarted { session_id, .. } => {
                info!("Session {} started", session_id);
            }
            EvalcamEvent::SessionSummary(summary) => {
                info!("{}", event.description());
                if summary.representative.is_none() {
                    info!("Session {} has no accepted sample", summary.session_id);
                }
            }
            EvalcamEvent::SessionCancelled { session_id } => {
                info!("Session {} cancelled", session_id);
            }
            EvalcamEvent::SystemError { component, error } => {
                error!("System error in {}: {}", component, error);
            }
            EvalcamEvent::ShutdownRequested { reason, .. } => {
                info!("Shutdown requested: {}", reason);
            }
            _ => debug!("Event: {}", event.description()),
        }

        self.sender
            .send(event)
            .map_err(|e| EventBusError::PublishFailed {
                details: e.to_string(),
            })
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Check if there are any active subscribers
    pub fn has_subscribers(&self) -> bool {
        self.sender.receiver_count() > 0
    }
}

/// Event filter for selective event handling
#[derive(Debug, Clone)]
pub enum EventFilter {
    /// Accept all events
    All,
    /// Accept only specific event types
    EventTypes(Vec<&'static str>),
    /// Accept events belonging to one session
    Session(SessionId),
    /// Custom filter function
    Custom(fn(&EvalcamEvent) -> bool),
}

impl EventFilter {
    /// Check if an event passes this filter
    pub fn matches(&self, event: &EvalcamEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::EventTypes(types) => types.contains(&event.event_type()),
            EventFilter::Session(wanted) => match event {
                EvalcamEvent::SessionStarted { session_id, .. }
                | EvalcamEvent::VerdictIndicated { session_id, .. }
                | EvalcamEvent::SessionCancelled { session_id } => session_id == wanted,
                EvalcamEvent::SessionSummary(summary) => &summary.session_id == wanted,
                _ => false,
            },
            EventFilter::Custom(filter_fn) => filter_fn(event),
        }
    }
}

/// Event receiver with filtering
pub struct EventReceiver {
    receiver: broadcast::Receiver<EvalcamEvent>,
    filter: EventFilter,
    name: String,
}

impl EventReceiver {
    /// Create a new event receiver with a filter
    pub fn new(
        receiver: broadcast::Receiver<EvalcamEvent>,
        filter: EventFilter,
        name: String,
    ) -> Self {
        Self {
            receiver,
            filter,
            name,
        }
    }

    /// Receive the next filtered event
    pub async fn recv(&mut self) -> Result<EvalcamEvent, EventBusError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        debug!(
                            "Receiver '{}' received event: {}",
                            self.name,
                            event.description()
                        );
                        return Ok(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                    return Err(EventBusError::Lagged { count: n });
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed for receiver '{}'", self.name);
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Result<Option<EvalcamEvent>, EventBusError> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        return Ok(Some(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => {
                    return Ok(None);
                }
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                    return Err(EventBusError::Lagged { count: n });
                }
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Score;
    use tokio::time::{timeout, Duration};

    fn session_id() -> SessionId {
        SessionId::from_start(SystemTime::UNIX_EPOCH + Duration::from_secs(42))
    }

    #[tokio::test]
    async fn test_event_bus_basic_operations() {
        let event_bus = EventBus::new(10);
        let mut receiver = event_bus.subscribe();
        assert_eq!(event_bus.subscriber_count(), 1);

        event_bus
            .publish(EvalcamEvent::SessionStarted {
                session_id: session_id(),
                timestamp: SystemTime::now(),
            })
            .unwrap();

        let received = timeout(Duration::from_millis(100), receiver.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received.event_type(), "session_started");
    }

    #[test]
    fn test_publish_without_subscribers_fails() {
        let event_bus = EventBus::new(4);
        assert!(!event_bus.has_subscribers());
        let result = event_bus.publish(EvalcamEvent::PresentationReset {
            timestamp: SystemTime::now(),
        });
        assert!(matches!(result, Err(EventBusError::PublishFailed { .. })));
    }

    #[test]
    fn test_event_filter() {
        let verdict = EvalcamEvent::VerdictIndicated {
            session_id: session_id(),
            sequence: 1,
            indicator: VerdictIndicator::Accepted,
        };
        let frame = EvalcamEvent::FrameUpdated {
            frame_id: 1,
            width: 640,
            height: 480,
            timestamp: SystemTime::now(),
        };

        assert!(EventFilter::All.matches(&frame));
        let types = EventFilter::EventTypes(vec!["verdict_indicated"]);
        assert!(types.matches(&verdict));
        assert!(!types.matches(&frame));

        let by_session = EventFilter::Session(session_id());
        assert!(by_session.matches(&verdict));
        assert!(!by_session.matches(&frame));
        assert!(!EventFilter::Session(session_id().with_suffix(1)).matches(&verdict));
    }

    #[tokio::test]
    async fn test_filtered_receiver() {
        let event_bus = EventBus::new(10);
        let mut receiver = EventReceiver::new(
            event_bus.subscribe(),
            EventFilter::EventTypes(vec!["session_summary"]),
            "test".to_string(),
        );

        event_bus
            .publish(EvalcamEvent::FrameUpdated {
                frame_id: 1,
                width: 1,
                height: 1,
                timestamp: SystemTime::now(),
            })
            .unwrap();
        event_bus
            .publish(EvalcamEvent::SessionSummary(SessionSummary {
                session_id: session_id(),
                started_at: SystemTime::now(),
                representative: None,
                score: Score::NoAttempts,
                total_attempts: 0,
                accepted_count: 0,
                errored_count: 0,
                sample_count: 0,
            }))
            .unwrap();

        let received = timeout(Duration::from_millis(100), receiver.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received.event_type(), "session_summary");
        assert!(receiver.try_recv().unwrap().is_none());
    }
}
