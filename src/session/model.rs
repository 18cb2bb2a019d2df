use crate::error::{Result, StorageError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::warn;

/// Opaque session identifier derived from the session start time
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    /// `session_<unix-epoch-seconds>` for the given start instant
    pub fn from_start(started_at: SystemTime) -> Self {
        let secs = started_at
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        Self(format!("session_{}", secs))
    }

    /// Same base id with a collision suffix, e.g. `session_1700000000_2`
    pub fn with_suffix(&self, n: u32) -> Self {
        Self(format!("{}_{}", self.0, n))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Session controller lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Idle,
    Active,
    Finishing,
}

/// Outcome of classifying one sample
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Accepted,
    Rejected,
    Errored(String),
}

impl Verdict {
    /// Map a classifier label onto a verdict
    pub fn from_label(label: &str, accepted_label: &str) -> Self {
        if label == accepted_label {
            Verdict::Accepted
        } else {
            Verdict::Rejected
        }
    }

    pub fn indicator(&self) -> Option<VerdictIndicator> {
        match self {
            Verdict::Accepted => Some(VerdictIndicator::Accepted),
            Verdict::Rejected => Some(VerdictIndicator::Rejected),
            Verdict::Errored(_) => None,
        }
    }
}

/// What the presentation layer shows after a successful classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerdictIndicator {
    Accepted,
    Rejected,
}

/// Where an encoded sample lives
#[derive(Debug, Clone, PartialEq)]
pub enum SampleHandle {
    /// Written to the sample store
    Stored(PathBuf),
    /// Kept in memory because persistence is disabled
    InMemory(Arc<Vec<u8>>),
}

impl SampleHandle {
    pub fn path(&self) -> Option<&Path> {
        match self {
            SampleHandle::Stored(path) => Some(path),
            SampleHandle::InMemory(_) => None,
        }
    }

    /// Load the encoded bytes behind this handle
    pub async fn load(&self) -> Result<Vec<u8>> {
        match self {
            SampleHandle::Stored(path) => tokio::fs::read(path).await.map_err(|e| {
                StorageError::Read {
                    path: path.display().to_string(),
                    source: e,
                }
                .into()
            }),
            SampleHandle::InMemory(bytes) => Ok(bytes.as_ref().clone()),
        }
    }
}

impl fmt::Display for SampleHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleHandle::Stored(path) => write!(f, "{}", path.display()),
            SampleHandle::InMemory(bytes) => write!(f, "<in-memory {} bytes>", bytes.len()),
        }
    }
}

/// One captured sample and its classification outcome
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureRecord {
    /// 1-based capture order within the session
    pub sequence: u64,
    pub frame_id: u64,
    pub captured_at: SystemTime,
    pub handle: Option<SampleHandle>,
    pub verdict: Verdict,
}

/// Final session score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Score {
    /// `10 * accepted / attempts`
    Computed(f64),
    /// No sample was successfully classified
    NoAttempts,
}

impl Score {
    pub fn compute(accepted_count: u32, total_attempts: u32) -> Self {
        if total_attempts == 0 {
            Score::NoAttempts
        } else {
            Score::Computed(10.0 * accepted_count as f64 / total_attempts as f64)
        }
    }

    /// Numeric value, zero when nothing was classified
    pub fn value(&self) -> f64 {
        match self {
            Score::Computed(value) => *value,
            Score::NoAttempts => 0.0,
        }
    }

    pub fn is_defined(&self) -> bool {
        matches!(self, Score::Computed(_))
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Score::Computed(value) => write!(f, "{:.2}", value),
            Score::NoAttempts => f.write_str("n/a"),
        }
    }
}

/// The sample shown to the user at the end of a session
#[derive(Debug, Clone, PartialEq)]
pub struct Representative {
    pub sequence: u64,
    pub handle: SampleHandle,
}

/// Result of finalizing a session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub session_id: SessionId,
    pub started_at: SystemTime,
    pub representative: Option<Representative>,
    pub score: Score,
    pub total_attempts: u32,
    pub accepted_count: u32,
    pub errored_count: u32,
    pub sample_count: usize,
}

/// A single timed evaluation run.
///
/// Tallies only move through [`Session::record`] and are consumed by
/// [`Session::finalize`]. A session without a deadline keeps only its newest
/// [`Session::RETAINED_WITHOUT_DEADLINE`] records and drops in-memory
/// payloads that can no longer be the representative.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub started_at: SystemTime,
    /// `None` when the session runs until cancelled
    pub duration: Option<Duration>,
    samples: Vec<CaptureRecord>,
    total_attempts: u32,
    accepted_count: u32,
    errored_count: u32,
    recorded: usize,
    next_sequence: u64,
    /// Newest accepted sample that already left the record window
    evicted_representative: Option<Representative>,
}

impl Session {
    pub fn new(id: SessionId, started_at: SystemTime, duration: Option<Duration>) -> Self {
        Self {
            id,
            started_at,
            duration,
            samples: Vec::new(),
            total_attempts: 0,
            accepted_count: 0,
            errored_count: 0,
            recorded: 0,
            next_sequence: 1,
            evicted_representative: None,
        }
    }

    pub const RETAINED_WITHOUT_DEADLINE: usize = 256;

    /// Reserve the sequence number for a freshly pulled sample
    pub fn next_sequence(&mut self) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        sequence
    }

    /// Store a classified sample, keeping `samples` in capture order even
    /// when classifications complete out of order.
    ///
    /// Returns the indicator to show for successful classifications.
    pub fn record(&mut self, record: CaptureRecord) -> Option<VerdictIndicator> {
        match record.verdict {
            Verdict::Accepted => {
                self.total_attempts += 1;
                self.accepted_count += 1;
            }
            Verdict::Rejected => {
                self.total_attempts += 1;
            }
            Verdict::Errored(_) => {
                self.errored_count += 1;
            }
        }
        self.recorded += 1;

        let indicator = record.verdict.indicator();
        let position = self
            .samples
            .partition_point(|existing| existing.sequence < record.sequence);
        self.samples.insert(position, record);

        if self.duration.is_none() {
            self.compact();
        }
        indicator
    }

    fn compact(&mut self) {
        let excess = self
            .samples
            .len()
            .saturating_sub(Self::RETAINED_WITHOUT_DEADLINE);
        for evicted in self.samples.drain(..excess) {
            let newer = self
                .evicted_representative
                .as_ref()
                .map_or(true, |current| evicted.sequence > current.sequence);
            if evicted.verdict == Verdict::Accepted && newer {
                if let Some(handle) = evicted.handle {
                    self.evicted_representative = Some(Representative {
                        sequence: evicted.sequence,
                        handle,
                    });
                }
            }
        }

        let keep = self.windowed_representative().map(|r| r.sequence);
        if keep.is_some() {
            self.evicted_representative = None;
        }
        for record in &mut self.samples {
            let in_memory = matches!(record.handle, Some(SampleHandle::InMemory(_)));
            if in_memory && Some(record.sequence) != keep {
                record.handle = None;
            }
        }
    }

    /// Records still held, in capture order
    pub fn samples(&self) -> &[CaptureRecord] {
        &self.samples
    }

    /// Every sample recorded so far, including ones no longer held
    pub fn sample_count(&self) -> usize {
        self.recorded
    }

    /// Bytes of encoded samples kept in memory by this session
    pub fn retained_payload_bytes(&self) -> usize {
        self.samples
            .iter()
            .filter_map(|r| r.handle.as_ref())
            .chain(self.evicted_representative.as_ref().map(|r| &r.handle))
            .map(|handle| match handle {
                SampleHandle::InMemory(bytes) => bytes.len(),
                SampleHandle::Stored(_) => 0,
            })
            .sum()
    }

    pub fn total_attempts(&self) -> u32 {
        self.total_attempts
    }

    pub fn accepted_count(&self) -> u32 {
        self.accepted_count
    }

    pub fn errored_count(&self) -> u32 {
        self.errored_count
    }

    /// Latest accepted sample that can still be shown
    pub fn representative(&self) -> Option<Representative> {
        self.windowed_representative()
            .or_else(|| self.evicted_representative.clone())
    }

    fn windowed_representative(&self) -> Option<Representative> {
        self.samples
            .iter()
            .rev()
            .filter(|r| r.verdict == Verdict::Accepted)
            .find_map(|r| {
                r.handle.as_ref().map(|handle| Representative {
                    sequence: r.sequence,
                    handle: handle.clone(),
                })
            })
    }

    pub fn score(&self) -> Score {
        Score::compute(self.accepted_count, self.total_attempts)
    }

    /// Compute the summary and reset the tallies
    pub fn finalize(&mut self) -> SessionSummary {
        let representative = self.representative();
        let score = self.score();

        if !score.is_defined() {
            warn!(
                "Session {} finished with no classified samples; score is undefined",
                self.id
            );
        }

        let summary = SessionSummary {
            session_id: self.id.clone(),
            started_at: self.started_at,
            representative,
            score,
            total_attempts: self.total_attempts,
            accepted_count: self.accepted_count,
            errored_count: self.errored_count,
            sample_count: self.recorded,
        };

        self.total_attempts = 0;
        self.accepted_count = 0;

        summary
    }
}
