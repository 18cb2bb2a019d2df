mod store;
mod summary;

pub use store::{resolve_timestamp_timezone, CleanupResult, SampleStore, SessionDir, StoredSession};
pub use summary::{RecordEntry, SummaryFile};
