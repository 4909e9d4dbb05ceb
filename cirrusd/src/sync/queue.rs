use cirrus_remote::RemoteError;
use thiserror::Error;

/// Retries allowed for bounded categories before a job goes BLOCKED.
pub const MAX_RETRIES: u32 = 11;

/// Network failures stop growing their delay at this schedule index (256 s).
pub const NETWORK_DELAY_INDEX_CAP: usize = 4;

/// Stored retry counter ceiling for network failures; they retry forever, so
/// the counter only needs to witness that the delay cap has been reached.
pub const NETWORK_RETRY_CEILING: u32 = 6;

/// From this retry count on, a reupload-needed failure is healed with
/// delete+create instead of another revision upload.
pub const REUPLOAD_HEAL_AFTER: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Create,
    Update,
    Delete,
    Rename,
    Move,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Create => "CREATE",
            EventType::Update => "UPDATE",
            EventType::Delete => "DELETE",
            EventType::Rename => "RENAME",
            EventType::Move => "MOVE",
        }
    }

    pub fn parse(value: &str) -> Result<Self, QueueError> {
        match value {
            "CREATE" => Ok(EventType::Create),
            "UPDATE" => Ok(EventType::Update),
            "DELETE" => Ok(EventType::Delete),
            "RENAME" => Ok(EventType::Rename),
            "MOVE" => Ok(EventType::Move),
            other => Err(QueueError::InvalidEventType(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Processing,
    Synced,
    Blocked,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Processing => "PROCESSING",
            JobStatus::Synced => "SYNCED",
            JobStatus::Blocked => "BLOCKED",
        }
    }

    pub fn parse(value: &str) -> Result<Self, QueueError> {
        match value {
            "PENDING" => Ok(JobStatus::Pending),
            "PROCESSING" => Ok(JobStatus::Processing),
            "SYNCED" => Ok(JobStatus::Synced),
            "BLOCKED" => Ok(JobStatus::Blocked),
            other => Err(QueueError::InvalidStatus(other.to_string())),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Synced | JobStatus::Blocked)
    }
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("invalid event type: {0}")]
    InvalidEventType(String),
    #[error("invalid job status: {0}")]
    InvalidStatus(String),
}

/// A persisted sync job. One row per live `(local_path, remote_path)` key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncJob {
    pub id: i64,
    pub event_type: EventType,
    pub local_path: String,
    pub remote_path: String,
    pub status: JobStatus,
    pub retry_at: i64,
    pub n_retries: u32,
    pub last_error: Option<String>,
    pub content_hash: Option<String>,
    pub old_local_path: Option<String>,
    pub old_remote_path: Option<String>,
    pub created_at: i64,
}

/// Enqueue parameters. `old_*` are set only for RENAME/MOVE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewJob {
    pub event_type: EventType,
    pub local_path: String,
    pub remote_path: String,
    pub content_hash: Option<String>,
    pub old_local_path: Option<String>,
    pub old_remote_path: Option<String>,
}

impl NewJob {
    pub fn new(event_type: EventType, local_path: String, remote_path: String) -> Self {
        Self {
            event_type,
            local_path,
            remote_path,
            content_hash: None,
            old_local_path: None,
            old_remote_path: None,
        }
    }

    pub fn with_hash(mut self, hash: Option<String>) -> Self {
        self.content_hash = hash;
        self
    }

    pub fn with_old_paths(mut self, old_local: String, old_remote: String) -> Self {
        self.old_local_path = Some(old_local);
        self.old_remote_path = Some(old_remote);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Network,
    ReuploadNeeded,
    Other,
}

impl ErrorCategory {
    /// `None` means retry forever.
    pub fn max_retries(&self) -> Option<u32> {
        match self {
            ErrorCategory::Network => None,
            ErrorCategory::ReuploadNeeded | ErrorCategory::Other => Some(MAX_RETRIES),
        }
    }
}

const NETWORK_MARKERS: &[&str] = &[
    "econnrefused",
    "econnreset",
    "etimedout",
    "enotfound",
    "eai_again",
    "enetunreach",
    "ehostunreach",
    "socket hang up",
    "network",
    "timeout",
    "connection",
];

const REUPLOAD_MARKERS: &[&str] = &["stale node reference", "corrupt node", "unknown revision"];

/// Fallback classifier over a rendered error message.
pub fn classify_message(message: &str) -> ErrorCategory {
    let lowered = message.to_lowercase();
    if REUPLOAD_MARKERS.iter().any(|m| lowered.contains(m)) {
        return ErrorCategory::ReuploadNeeded;
    }
    if NETWORK_MARKERS.iter().any(|m| lowered.contains(m)) {
        return ErrorCategory::Network;
    }
    ErrorCategory::Other
}

/// Classify a remote failure. Tagged variants take precedence; the substring
/// scan only catches errors the remote client wrapped as plain messages.
pub fn classify_remote_error(err: &RemoteError) -> ErrorCategory {
    if err.is_stale_node() {
        return ErrorCategory::ReuploadNeeded;
    }
    if err.is_network() {
        return ErrorCategory::Network;
    }
    classify_message(&err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_network_markers_case_insensitively() {
        for message in [
            "read ECONNRESET",
            "connect ETIMEDOUT 10.0.0.1:443",
            "Socket hang up",
            "request Timeout after 30s",
            "Connection closed by peer",
        ] {
            assert_eq!(classify_message(message), ErrorCategory::Network, "{message}");
        }
    }

    #[test]
    fn classifies_stale_node_as_reupload() {
        assert_eq!(
            classify_message("stale node reference: node-42"),
            ErrorCategory::ReuploadNeeded
        );
    }

    #[test]
    fn everything_else_is_other() {
        assert_eq!(
            classify_message("remote rejected: quota exceeded"),
            ErrorCategory::Other
        );
    }

    #[test]
    fn tagged_remote_errors_win_over_substrings() {
        // The rendered message contains no network marker, the tag decides.
        let err = RemoteError::StaleNode("node-7".into());
        assert_eq!(classify_remote_error(&err), ErrorCategory::ReuploadNeeded);

        let err = RemoteError::Network("backend unavailable".into());
        assert_eq!(classify_remote_error(&err), ErrorCategory::Network);
    }

    #[test]
    fn network_errors_retry_forever() {
        assert_eq!(ErrorCategory::Network.max_retries(), None);
        assert_eq!(ErrorCategory::Other.max_retries(), Some(11));
        assert_eq!(ErrorCategory::ReuploadNeeded.max_retries(), Some(11));
    }

    #[test]
    fn event_type_round_trips() {
        for event_type in [
            EventType::Create,
            EventType::Update,
            EventType::Delete,
            EventType::Rename,
            EventType::Move,
        ] {
            assert_eq!(EventType::parse(event_type.as_str()).unwrap(), event_type);
        }
        assert!(EventType::parse("COPY").is_err());
    }

    #[test]
    fn status_round_trips_and_knows_terminal_states() {
        for status in [
            JobStatus::Pending,
            JobStatus::Processing,
            JobStatus::Synced,
            JobStatus::Blocked,
        ] {
            assert_eq!(JobStatus::parse(status.as_str()).unwrap(), status);
        }
        assert!(JobStatus::Synced.is_terminal());
        assert!(JobStatus::Blocked.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
    }
}
