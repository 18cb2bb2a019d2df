use super::EvalcamApp;
use crate::error::Result;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{error, info, warn};

const STOP_TIMEOUT: Duration = Duration::from_secs(10);

impl EvalcamApp {
    /// Perform graceful shutdown of all components
    pub async fn shutdown(&mut self) -> Result<i32> {
        info!("Beginning graceful shutdown");

        let mut exit_code = 0;

        if let Some(keyboard) = self.keyboard_handler.take() {
            if let Err(e) = keyboard.stop().await {
                error!("Error stopping keyboard input: {}", e);
                exit_code = 1;
            }
        }

        // Discards any running session and releases the source
        match timeout(STOP_TIMEOUT, self.sessions.shutdown()).await {
            Ok(Ok(())) => info!("Session controller stopped"),
            Ok(Err(e)) => warn!("Session controller was already stopped: {}", e),
            Err(_) => {
                error!("Session controller stop timeout");
                exit_code = 1;
            }
        }

        if self.source.is_acquired() {
            if let Err(e) = self.source.release().await {
                error!("Error releasing frame source: {}", e);
                exit_code = 1;
            }
        }

        self.cancellation_token.cancel();
        for task in self.background_tasks.drain(..) {
            if timeout(Duration::from_secs(2), task).await.is_err() {
                warn!("Background task did not stop within timeout");
            }
        }

        info!("Graceful shutdown completed with exit code: {}", exit_code);
        Ok(exit_code)
    }
}
