use super::keyboard_input::KeyboardInputHandler;
use super::types::{RunMode, ShutdownReason};
use super::EvalcamApp;
use crate::error::{EvalcamError, Result};
use crate::session::StartOutcome;
use tokio::signal;
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};

impl EvalcamApp {
    /// Run the main application loop with signal handling
    pub async fn run(&mut self, mode: RunMode) -> Result<i32> {
        info!("Evalcam is running ({:?})", mode);

        let mut shutdown_receiver = self
            .shutdown_receiver
            .take()
            .ok_or_else(|| EvalcamError::system("Shutdown receiver already taken"))?;

        self.setup_signal_handlers();

        let reason = match mode {
            RunMode::Sessions(count) => {
                tokio::select! {
                    result = self.run_sessions(count) => match result {
                        Ok(()) => ShutdownReason::SessionsCompleted,
                        Err(e) => {
                            error!("Session run failed: {}", e);
                            ShutdownReason::Error(e.to_string())
                        }
                    },
                    reason = shutdown_receiver.recv() => Self::received(reason),
                }
            }
            RunMode::Interactive => {
                let keyboard = KeyboardInputHandler::new(self.event_bus(), self.sessions.clone());
                keyboard.start().await?;
                self.keyboard_handler = Some(keyboard);
                Self::received(shutdown_receiver.recv().await)
            }
            RunMode::Continuous => {
                self.start_logged().await?;
                Self::received(shutdown_receiver.recv().await)
            }
        };

        info!("Shutdown initiated: {:?}", reason);

        let mut exit_code = self.shutdown().await?;
        if matches!(reason, ShutdownReason::Error(_)) {
            exit_code = 1;
        }

        info!("Evalcam shutdown complete");
        Ok(exit_code)
    }

    fn received(reason: Option<ShutdownReason>) -> ShutdownReason {
        reason.unwrap_or_else(|| ShutdownReason::Error("Shutdown channel closed".to_string()))
    }

    async fn start_logged(&self) -> Result<()> {
        match self.sessions.start_session().await? {
            StartOutcome::Started(id) => info!("Session {} running", id),
            StartOutcome::AlreadyActive(id) => warn!("Session {} already running", id),
        }
        Ok(())
    }

    /// Run `count` sessions back to back, waiting for each summary
    async fn run_sessions(&self, count: u32) -> Result<()> {
        if self.config.session.duration().is_none() {
            return Err(EvalcamError::system(
                "Running a fixed number of sessions needs session.duration_ms > 0",
            ));
        }

        let mut summaries = self.sessions.subscribe_summaries();

        for n in 1..=count {
            info!("Starting session {}/{}", n, count);
            self.start_logged().await?;

            loop {
                match summaries.recv().await {
                    Ok(_) => break,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Missed {} session summaries", skipped);
                        break;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        return Err(EvalcamError::system("Session controller stopped"));
                    }
                }
            }
        }

        info!("Completed {} sessions", count);
        Ok(())
    }

    /// Set up signal handlers for graceful shutdown
    fn setup_signal_handlers(&self) {
        // Handle SIGTERM (systemd stop) - Unix only
        #[cfg(unix)]
        {
            let sender = self.shutdown_sender.clone();
            tokio::spawn(async move {
                match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(mut sigterm) => {
                        if sigterm.recv().await.is_some() {
                            info!("Received SIGTERM signal");
                            Self::notify(&sender, ShutdownReason::Signal("SIGTERM".to_string()))
                                .await;
                        }
                    }
                    Err(e) => error!("Failed to register SIGTERM handler: {}", e),
                }
            });
        }

        // Handle SIGINT (Ctrl+C) - Cross-platform
        let sender = self.shutdown_sender.clone();
        tokio::spawn(async move {
            if let Ok(()) = signal::ctrl_c().await {
                info!("Received SIGINT signal (Ctrl+C)");
                Self::notify(&sender, ShutdownReason::Signal("SIGINT".to_string())).await;
            }
        });
    }

    async fn notify(sender: &mpsc::Sender<ShutdownReason>, reason: ShutdownReason) {
        if sender.send(reason).await.is_err() {
            warn!("Shutdown already in progress");
        }
    }
}
