use crate::error::Result;
use crate::events::{EvalcamEvent, EventBus};
use crate::session::{CancelOutcome, SessionHandle, StartOutcome};
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::runtime::Handle;
use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// What a key press asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Start,
    Restart,
    Quit,
}

impl KeyAction {
    pub fn from_key(code: KeyCode) -> Option<Self> {
        match code {
            KeyCode::Char('s') | KeyCode::Char('S') => Some(KeyAction::Start),
            KeyCode::Char('r') | KeyCode::Char('R') => Some(KeyAction::Restart),
            KeyCode::Char('q') | KeyCode::Esc => Some(KeyAction::Quit),
            _ => None,
        }
    }
}

/// Terminal keyboard control of the session controller
pub struct KeyboardInputHandler {
    event_bus: Arc<EventBus>,
    sessions: SessionHandle,
    cancellation_token: CancellationToken,
}

impl KeyboardInputHandler {
    pub fn new(event_bus: Arc<EventBus>, sessions: SessionHandle) -> Self {
        Self {
            event_bus,
            sessions,
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Start listening for keyboard input
    pub async fn start(&self) -> Result<()> {
        info!("Keyboard control active: 's' start, 'r' restart, 'q' quit");

        let event_bus = Arc::clone(&self.event_bus);
        let sessions = self.sessions.clone();
        let cancellation_token = self.cancellation_token.clone();
        let runtime_handle = Handle::current();

        task::spawn_blocking(move || {
            if let Err(e) = enable_raw_mode() {
                error!("Failed to enable raw mode for keyboard input: {}", e);
                return;
            }

            while !cancellation_token.is_cancelled() {
                match event::poll(Duration::from_millis(100)) {
                    Ok(true) => {
                        let Ok(Event::Key(key_event)) = event::read() else {
                            continue;
                        };
                        if key_event.kind != KeyEventKind::Press {
                            continue;
                        }

                        match KeyAction::from_key(key_event.code) {
                            Some(action) => {
                                dispatch(action, &sessions, &event_bus, &runtime_handle);
                                if action == KeyAction::Quit {
                                    break;
                                }
                            }
                            None => debug!("Unbound key: {:?}", key_event.code),
                        }
                    }
                    Ok(false) => {}
                    Err(e) => {
                        warn!("Error polling for keyboard events: {}", e);
                    }
                }
            }

            if let Err(e) = disable_raw_mode() {
                error!("Failed to disable raw mode: {}", e);
            }
            debug!("Keyboard input handler task exited");
        });

        Ok(())
    }

    /// Stop the keyboard input handler
    pub async fn stop(&self) -> Result<()> {
        info!("Stopping keyboard input handler");
        self.cancellation_token.cancel();

        // Give the blocking task a poll period to leave raw mode
        tokio::time::sleep(Duration::from_millis(200)).await;
        let _ = disable_raw_mode();

        Ok(())
    }
}

fn dispatch(action: KeyAction, sessions: &SessionHandle, event_bus: &EventBus, runtime: &Handle) {
    let sessions = sessions.clone();
    match action {
        KeyAction::Start => {
            runtime.spawn(async move {
                match sessions.start_session().await {
                    Ok(StartOutcome::Started(id)) => info!("Session {} started from keyboard", id),
                    Ok(StartOutcome::AlreadyActive(id)) => info!("Session {} is already running", id),
                    Err(e) => warn!("Failed to start session: {}", e),
                }
            });
        }
        KeyAction::Restart => {
            runtime.spawn(async move {
                match sessions.restart_session().await {
                    Ok(CancelOutcome::Cancelled(id)) => info!("Session {} discarded", id),
                    Ok(CancelOutcome::NotActive) => debug!("Nothing to restart"),
                    Err(e) => warn!("Failed to restart session: {}", e),
                }
            });
        }
        KeyAction::Quit => {
            info!("Quit key pressed, requesting shutdown");
            let event = EvalcamEvent::ShutdownRequested {
                timestamp: SystemTime::now(),
                reason: "quit key".to_string(),
            };
            if let Err(e) = event_bus.publish(event) {
                warn!("Failed to publish shutdown event: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_mapping() {
        assert_eq!(KeyAction::from_key(KeyCode::Char('s')), Some(KeyAction::Start));
        assert_eq!(KeyAction::from_key(KeyCode::Char('R')), Some(KeyAction::Restart));
        assert_eq!(KeyAction::from_key(KeyCode::Esc), Some(KeyAction::Quit));
        assert_eq!(KeyAction::from_key(KeyCode::Char('q')), Some(KeyAction::Quit));
        assert_eq!(KeyAction::from_key(KeyCode::Char(' ')), None);
    }
}
