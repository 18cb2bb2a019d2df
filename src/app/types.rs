/// System shutdown reason
#[derive(Debug, Clone, PartialEq)]
pub enum ShutdownReason {
    Signal(String),
    UserRequest,
    SessionsCompleted,
    Error(String),
}

/// How the application drives the session controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Start one session at startup, then wait for a signal
    Continuous,
    /// Run this many sessions back to back, then exit
    Sessions(u32),
    /// Keyboard control: `s` start, `r` restart, `q`/Esc quit
    Interactive,
}
