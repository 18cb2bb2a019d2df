use super::summary::SummaryFile;
use crate::config::StorageConfig;
use crate::error::{EvalcamError, Result, StorageError};
use crate::session::SessionId;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

const ERROR_LOG: &str = "errors.log";
const SUMMARY_FILE: &str = "summary.json";
const SAMPLE_EXTENSION: &str = "jpg";

/// Resolve configured timezone, falling back to UTC on parse errors
pub fn resolve_timestamp_timezone(tz_name: &str) -> Tz {
    match tz_name.parse::<Tz>() {
        Ok(tz) => tz,
        Err(_) => {
            warn!(
                "Invalid timestamp timezone '{}', falling back to UTC",
                tz_name
            );
            chrono_tz::UTC
        }
    }
}

/// Durable storage for session samples, one directory per session
#[derive(Debug, Clone)]
pub struct SampleStore {
    root: PathBuf,
    timezone: Tz,
}

/// A session directory found on disk
#[derive(Debug, Clone)]
pub struct StoredSession {
    pub id: String,
    pub path: PathBuf,
    pub started_at: SystemTime,
    pub sample_count: u32,
    pub error_count: u32,
    pub total_size_bytes: u64,
    pub has_summary: bool,
}

/// Cleanup operation result
#[derive(Debug, Clone, Default)]
pub struct CleanupResult {
    pub sessions_deleted: usize,
    pub bytes_freed: u64,
    pub errors: Vec<String>,
    pub duration: Duration,
}

impl SampleStore {
    pub fn new(config: &StorageConfig) -> Self {
        Self::with_root(
            &config.path,
            resolve_timestamp_timezone(&config.timestamp_timezone),
        )
    }

    pub fn with_root<P: AsRef<Path>>(root: P, timezone: Tz) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            timezone,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create (or reuse) the directory for a session
    pub async fn create_session(&self, id: &SessionId) -> Result<SessionDir> {
        let path = self.root.join(id.as_str());
        fs::create_dir_all(&path)
            .await
            .map_err(|e| StorageError::DirectoryCreation {
                path: path.display().to_string(),
                source: e,
            })?;

        info!("Session directory ready: {}", path.display());

        Ok(SessionDir {
            path,
            timezone: self.timezone,
        })
    }

    /// Check if a directory name looks like `session_<epoch>[_<n>]`
    pub fn is_valid_session_dir_name(name: &str) -> bool {
        Self::parse_session_epoch(name).is_some()
    }

    fn parse_session_epoch(name: &str) -> Option<u64> {
        let rest = name.strip_prefix("session_")?;
        let mut parts = rest.splitn(2, '_');
        let epoch = parts.next()?;
        if epoch.is_empty() || !epoch.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        if let Some(suffix) = parts.next() {
            if suffix.is_empty() || !suffix.chars().all(|c| c.is_ascii_digit()) {
                return None;
            }
        }
        epoch.parse().ok()
    }

    /// All session directories under the root, oldest first
    pub async fn list_sessions(&self) -> Result<Vec<StoredSession>> {
        let mut sessions = Vec::new();

        if !self.root.exists() {
            debug!("Sample store root {} does not exist yet", self.root.display());
            return Ok(sessions);
        }

        let mut entries = fs::read_dir(&self.root)
            .await
            .map_err(|e| StorageError::Read {
                path: self.root.display().to_string(),
                source: e,
            })?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
                continue;
            };
            let Some(epoch) = Self::parse_session_epoch(&name) else {
                continue;
            };

            match Self::inspect_session(&path).await {
                Ok((sample_count, error_count, total_size_bytes, has_summary)) => {
                    sessions.push(StoredSession {
                        id: name,
                        path,
                        started_at: UNIX_EPOCH + Duration::from_secs(epoch),
                        sample_count,
                        error_count,
                        total_size_bytes,
                        has_summary,
                    });
                }
                Err(e) => warn!("Failed to inspect session {}: {}", name, e),
            }
        }

        sessions.sort_by(|a, b| a.started_at.cmp(&b.started_at).then(a.id.cmp(&b.id)));
        Ok(sessions)
    }

    /// Find a session directory by id
    pub async fn find_session(&self, id: &str) -> Result<Option<StoredSession>> {
        if !Self::is_valid_session_dir_name(id) {
            return Err(StorageError::InvalidSessionName {
                name: id.to_string(),
            }
            .into());
        }
        Ok(self
            .list_sessions()
            .await?
            .into_iter()
            .find(|session| session.id == id))
    }

    async fn inspect_session(path: &Path) -> Result<(u32, u32, u64, bool)> {
        let mut sample_count = 0;
        let mut total_size = 0;
        let mut has_summary = false;

        let mut entries = fs::read_dir(path).await?;
        while let Some(entry) = entries.next_entry().await? {
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            total_size += metadata.len();

            let file_path = entry.path();
            let name = file_path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if name == SUMMARY_FILE {
                has_summary = true;
            } else if file_path.extension().and_then(|e| e.to_str()) == Some(SAMPLE_EXTENSION) {
                sample_count += 1;
            }
        }

        let error_count = match fs::read_to_string(path.join(ERROR_LOG)).await {
            Ok(contents) => contents.lines().filter(|l| !l.trim().is_empty()).count() as u32,
            Err(_) => 0,
        };

        Ok((sample_count, error_count, total_size, has_summary))
    }

    /// Delete sessions older than the retention period
    pub async fn prune_sessions(&self, retention_days: u32) -> Result<CleanupResult> {
        let retention = Duration::from_secs(retention_days as u64 * 24 * 60 * 60);
        let cutoff = SystemTime::now()
            .checked_sub(retention)
            .unwrap_or(UNIX_EPOCH);
        self.prune_older_than(cutoff).await
    }

    /// Delete sessions that started before `cutoff`
    pub async fn prune_older_than(&self, cutoff: SystemTime) -> Result<CleanupResult> {
        let started = Instant::now();
        let mut result = CleanupResult::default();

        for session in self.list_sessions().await? {
            if session.started_at >= cutoff {
                continue;
            }
            match fs::remove_dir_all(&session.path).await {
                Ok(()) => {
                    debug!("Deleted old session {}", session.id);
                    result.sessions_deleted += 1;
                    result.bytes_freed += session.total_size_bytes;
                }
                Err(e) => {
                    warn!("Failed to delete session {}: {}", session.id, e);
                    result.errors.push(format!("{}: {}", session.id, e));
                }
            }
        }

        result.duration = started.elapsed();
        info!(
            "Session cleanup removed {} sessions ({} bytes) with {} errors",
            result.sessions_deleted,
            result.bytes_freed,
            result.errors.len()
        );
        Ok(result)
    }
}

/// Directory of one session: samples, `errors.log` and optional `summary.json`
#[derive(Debug, Clone)]
pub struct SessionDir {
    path: PathBuf,
    timezone: Tz,
}

impl SessionDir {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `frame_<seq:03>_<YYYYmmdd-HHMMSS>.jpg`
    pub fn sample_file_name(&self, sequence: u64, captured_at: SystemTime) -> String {
        let timestamp = DateTime::<Utc>::from(captured_at).with_timezone(&self.timezone);
        format!(
            "frame_{:03}_{}.{}",
            sequence,
            timestamp.format("%Y%m%d-%H%M%S"),
            SAMPLE_EXTENSION
        )
    }

    /// Write an encoded sample and return its path
    pub async fn write_sample(
        &self,
        sequence: u64,
        captured_at: SystemTime,
        bytes: &[u8],
    ) -> Result<PathBuf> {
        let path = self.path.join(self.sample_file_name(sequence, captured_at));
        fs::write(&path, bytes).await.map_err(|e| StorageError::Write {
            path: path.display().to_string(),
            source: e,
        })?;
        debug!("Saved sample {} ({} bytes)", path.display(), bytes.len());
        Ok(path)
    }

    /// Append `<unix-epoch>: <message>` to the session error log
    pub async fn append_error(&self, message: &str) -> Result<()> {
        self.append_error_at(SystemTime::now(), message).await
    }

    pub async fn append_error_at(&self, at: SystemTime, message: &str) -> Result<()> {
        let path = self.path.join(ERROR_LOG);
        let epoch = at.duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
        // One line per error, even for multi-line messages
        let line = format!("{}: {}\n", epoch, message.replace('\n', " "));

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| StorageError::Write {
                path: path.display().to_string(),
                source: e,
            })?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| StorageError::Write {
                path: path.display().to_string(),
                source: e,
            })?;
        file.flush().await?;
        Ok(())
    }

    pub fn error_log_path(&self) -> PathBuf {
        self.path.join(ERROR_LOG)
    }

    pub fn summary_path(&self) -> PathBuf {
        self.path.join(SUMMARY_FILE)
    }

    /// Write `summary.json`
    pub async fn save_summary(&self, summary: &SummaryFile) -> Result<()> {
        let json = serde_json::to_string_pretty(summary).map_err(|e| {
            EvalcamError::component(
                "sample_store".to_string(),
                format!("Failed to serialize summary: {}", e),
            )
        })?;
        let path = self.summary_path();
        fs::write(&path, json).await.map_err(|e| StorageError::Write {
            path: path.display().to_string(),
            source: e,
        })?;
        debug!("Saved summary to {}", path.display());
        Ok(())
    }
}
