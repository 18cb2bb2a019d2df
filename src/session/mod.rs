//! Timed evaluation sessions: the data model and the controller task that
//! drives capture cadence, classification and scoring.

mod controller;
mod handle;
mod model;
#[cfg(test)]
mod tests;

pub use controller::{ControllerSettings, SessionController};
pub use handle::{CancelOutcome, ControllerSnapshot, SessionHandle, StartOutcome};
pub use model::{
    CaptureRecord, Representative, SampleHandle, Score, Session, SessionId, SessionState,
    SessionSummary, Verdict, VerdictIndicator,
};
