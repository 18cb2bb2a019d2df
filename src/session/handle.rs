use super::model::{Session, SessionId, SessionState, SessionSummary};
use crate::error::{EvalcamError, Result};
use tokio::sync::{broadcast, mpsc, oneshot};

/// Reply to `StartSession`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    Started(SessionId),
    /// A session was already running; nothing changed
    AlreadyActive(SessionId),
}

/// Reply to `RestartSession` / `Cancel`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelOutcome {
    Cancelled(SessionId),
    NotActive,
}

/// Point-in-time view of the controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerSnapshot {
    pub state: SessionState,
    pub session_id: Option<SessionId>,
    pub total_attempts: u32,
    pub accepted_count: u32,
    pub sample_count: usize,
    /// Encoded sample bytes held in memory by the active session
    pub retained_bytes: usize,
    pub cadence_armed: bool,
    pub deadline_armed: bool,
    pub in_flight: usize,
}

pub(super) enum Command {
    Start(oneshot::Sender<StartOutcome>),
    Cancel(oneshot::Sender<CancelOutcome>),
    Snapshot(oneshot::Sender<ControllerSnapshot>),
    LastSummary(oneshot::Sender<Option<SessionSummary>>),
    LastSession(oneshot::Sender<Option<Session>>),
    Shutdown(oneshot::Sender<()>),
}

/// Cloneable front end of a running [`SessionController`](super::SessionController)
#[derive(Clone)]
pub struct SessionHandle {
    pub(super) commands: mpsc::Sender<Command>,
    pub(super) summaries: broadcast::Sender<SessionSummary>,
}

impl SessionHandle {
    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(make(reply_tx))
            .await
            .map_err(|_| EvalcamError::system("Session controller is not running"))?;
        reply_rx
            .await
            .map_err(|_| EvalcamError::system("Session controller dropped the request"))
    }

    /// Start a session unless one is already active
    pub async fn start_session(&self) -> Result<StartOutcome> {
        self.request(Command::Start).await
    }

    /// Abort the running session without scoring it
    pub async fn restart_session(&self) -> Result<CancelOutcome> {
        self.request(Command::Cancel).await
    }

    pub async fn cancel(&self) -> Result<CancelOutcome> {
        self.request(Command::Cancel).await
    }

    pub async fn snapshot(&self) -> Result<ControllerSnapshot> {
        self.request(Command::Snapshot).await
    }

    /// Summary of the most recently finished session
    pub async fn last_summary(&self) -> Result<Option<SessionSummary>> {
        self.request(Command::LastSummary).await
    }

    /// The most recently finished session, kept read-only for reporting
    pub async fn last_session(&self) -> Result<Option<Session>> {
        self.request(Command::LastSession).await
    }

    /// Receive every summary emitted from now on
    pub fn subscribe_summaries(&self) -> broadcast::Receiver<SessionSummary> {
        self.summaries.subscribe()
    }

    /// Stop the controller task, discarding any running session
    pub async fn shutdown(&self) -> Result<()> {
        self.request(Command::Shutdown).await
    }
}
