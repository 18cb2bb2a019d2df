use super::types::ShutdownReason;
use super::EvalcamApp;
use crate::error::{EventBusError, Result};
use crate::events::{EvalcamEvent, EventFilter, EventReceiver};
use crate::session::SessionSummary;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

impl EvalcamApp {
    /// Housekeeping and background tasks that must run before any session
    pub async fn prepare(&mut self) -> Result<()> {
        info!("Preparing evalcam components");

        if let Some(store) = &self.store {
            if self.config.storage.trim_old {
                let retention_days = self.config.storage.retention_days;
                match store.prune_sessions(retention_days).await {
                    Ok(result) => info!(
                        "Pruned {} sessions older than {} days",
                        result.sessions_deleted, retention_days
                    ),
                    Err(e) => warn!("Skipping old session cleanup: {}", e),
                }
            }
        }

        let logger = self.spawn_event_logger();
        self.background_tasks.push(logger);

        info!("All components prepared");
        Ok(())
    }

    /// Log bus traffic, print summaries and turn shutdown requests into a
    /// shutdown of the app
    fn spawn_event_logger(&self) -> JoinHandle<()> {
        let mut receiver = EventReceiver::new(
            self.event_bus.subscribe(),
            EventFilter::Custom(is_loggable),
            "event_logger".to_string(),
        );
        let token = self.cancellation_token.clone();
        let shutdown_sender = self.shutdown_sender.clone();

        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = token.cancelled() => break,
                    event = receiver.recv() => event,
                };

                match event {
                    Ok(EvalcamEvent::SessionSummary(summary)) => {
                        println!("{}", render_summary_text(&summary));
                    }
                    Ok(EvalcamEvent::ShutdownRequested { reason, .. }) => {
                        info!("Shutdown requested: {}", reason);
                        let _ = shutdown_sender.send(ShutdownReason::UserRequest).await;
                    }
                    Ok(EvalcamEvent::SystemError { component, error }) => {
                        warn!("Error reported by {}: {}", component, error);
                    }
                    Ok(event) => debug!("{}", event.description()),
                    Err(EventBusError::Lagged { .. }) => continue,
                    Err(_) => break,
                }
            }
            debug!("Event logger stopped");
        })
    }
}

fn is_loggable(event: &EvalcamEvent) -> bool {
    !matches!(event, EvalcamEvent::FrameUpdated { .. })
}

/// Human-readable session result, as printed at the end of each session
pub fn render_summary_text(summary: &SessionSummary) -> String {
    let representative = match &summary.representative {
        Some(representative) => format!(
            "sample {} ({})",
            representative.sequence, representative.handle
        ),
        None => "no accepted sample".to_string(),
    };
    format!(
        "{}: score {} ({}/{} accepted, {} errored), representative: {}",
        summary.session_id,
        summary.score,
        summary.accepted_count,
        summary.total_attempts,
        summary.errored_count,
        representative
    )
}
