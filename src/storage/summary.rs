use crate::error::{Result, StorageError};
use crate::session::{Session, SessionSummary, Verdict};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::UNIX_EPOCH;

/// On-disk form of a finished session, written as `summary.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryFile {
    pub session_id: String,
    pub started_at_epoch: u64,
    pub duration_ms: Option<u64>,
    /// Absent when no sample was classified
    pub score: Option<f64>,
    pub total_attempts: u32,
    pub accepted_count: u32,
    pub errored_count: u32,
    pub representative: Option<String>,
    pub records: Vec<RecordEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordEntry {
    pub sequence: u64,
    pub frame_id: u64,
    pub file: Option<String>,
    pub verdict: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

impl SummaryFile {
    pub fn from_session(session: &Session, summary: &SessionSummary) -> Self {
        let records = session
            .samples()
            .iter()
            .map(|record| {
                let (verdict, error) = match &record.verdict {
                    Verdict::Accepted => ("accepted", None),
                    Verdict::Rejected => ("rejected", None),
                    Verdict::Errored(message) => ("errored", Some(message.clone())),
                };
                RecordEntry {
                    sequence: record.sequence,
                    frame_id: record.frame_id,
                    file: record.handle.as_ref().map(|h| h.to_string()),
                    verdict: verdict.to_string(),
                    error,
                }
            })
            .collect();

        Self {
            session_id: summary.session_id.to_string(),
            started_at_epoch: summary
                .started_at
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
            duration_ms: session.duration.map(|d| d.as_millis() as u64),
            score: summary
                .score
                .is_defined()
                .then(|| summary.score.value()),
            total_attempts: summary.total_attempts,
            accepted_count: summary.accepted_count,
            errored_count: summary.errored_count,
            representative: summary
                .representative
                .as_ref()
                .map(|r| r.handle.to_string()),
            records,
        }
    }

    /// Read a `summary.json` back
    pub async fn load(path: &Path) -> Result<Self> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| StorageError::Read {
                path: path.display().to_string(),
                source: e,
            })?;
        serde_json::from_str(&contents).map_err(|e| {
            StorageError::Read {
                path: path.display().to_string(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
            }
            .into()
        })
    }
}
