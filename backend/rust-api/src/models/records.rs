use std::{fmt, str::FromStr};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// Sync status tag carried by every offline record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Synced,
    Pending,
    /// Legacy tag; replayed exactly like `Pending`.
    Offline,
    /// Retry ceiling reached; parked until manually requeued.
    Failed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Synced => "synced",
            SyncStatus::Pending => "pending",
            SyncStatus::Offline => "offline",
            SyncStatus::Failed => "failed",
        }
    }

    /// Statuses picked up by a drain cycle.
    pub fn is_replayable(&self) -> bool {
        matches!(self, SyncStatus::Pending | SyncStatus::Offline)
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "synced" => Ok(SyncStatus::Synced),
            "pending" => Ok(SyncStatus::Pending),
            "offline" => Ok(SyncStatus::Offline),
            "failed" => Ok(SyncStatus::Failed),
            other => Err(format!("Unknown sync status: {}", other)),
        }
    }
}

/// Record collections known to both the local store and the sync endpoints.
///
/// `ALL` is also the drain order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    QuizAttempts,
    Submissions,
}

impl Collection {
    pub const ALL: [Collection; 2] = [Collection::QuizAttempts, Collection::Submissions];

    /// Wire name, used in `/api/sync/{collection}`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::QuizAttempts => "quizAttempts",
            Collection::Submissions => "submissions",
        }
    }

    /// Table name in the local SQLite store.
    pub fn table(&self) -> &'static str {
        match self {
            Collection::QuizAttempts => "quiz_attempts",
            Collection::Submissions => "submissions",
        }
    }

    /// Collection name in the hosted document database.
    pub fn remote_collection(&self) -> &'static str {
        match self {
            Collection::QuizAttempts => "quiz_attempts",
            Collection::Submissions => "submissions",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Collection {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "quizAttempts" => Ok(Collection::QuizAttempts),
            "submissions" => Ok(Collection::Submissions),
            other => Err(format!("Unknown collection: {}", other)),
        }
    }
}

/// A user-generated record subject to offline synchronization.
pub trait SyncRecord:
    Serialize + DeserializeOwned + Validate + Clone + Send + Sync + 'static
{
    const COLLECTION: Collection;

    fn id(&self) -> &str;
    fn student_id(&self) -> &str;
    fn sync_status(&self) -> SyncStatus;
    fn set_sync_status(&mut self, status: SyncStatus);
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct QuizAttemptRecord {
    #[validate(length(min = 1, message = "id is required"))]
    pub id: String,
    #[validate(length(min = 1, message = "quizId is required"))]
    pub quiz_id: String,
    #[validate(length(min = 1, message = "studentId is required"))]
    pub student_id: String,
    #[serde(default)]
    pub answers: Vec<serde_json::Value>,
    #[validate(custom(function = "validate_score"))]
    pub score: f64,
    #[validate(length(min = 1, message = "completedAt is required"))]
    pub completed_at: String,
    pub sync_status: SyncStatus,
}

// JSON has no encoding for NaN or infinity.
fn validate_score(score: f64) -> Result<(), ValidationError> {
    if score.is_finite() {
        Ok(())
    } else {
        Err(ValidationError::new("score").with_message("score must be a finite number".into()))
    }
}

impl QuizAttemptRecord {
    /// New attempt with a client-generated id, tagged `pending`.
    pub fn new(
        quiz_id: impl Into<String>,
        student_id: impl Into<String>,
        answers: Vec<serde_json::Value>,
        score: f64,
        completed_at: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            quiz_id: quiz_id.into(),
            student_id: student_id.into(),
            answers,
            score,
            completed_at: completed_at.into(),
            sync_status: SyncStatus::Pending,
        }
    }
}

impl SyncRecord for QuizAttemptRecord {
    const COLLECTION: Collection = Collection::QuizAttempts;

    fn id(&self) -> &str {
        &self.id
    }

    fn student_id(&self) -> &str {
        &self.student_id
    }

    fn sync_status(&self) -> SyncStatus {
        self.sync_status
    }

    fn set_sync_status(&mut self, status: SyncStatus) {
        self.sync_status = status;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionRecord {
    #[validate(length(min = 1, message = "id is required"))]
    pub id: String,
    #[validate(length(min = 1, message = "assignmentId is required"))]
    pub assignment_id: String,
    #[validate(length(min = 1, message = "studentId is required"))]
    pub student_id: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(url(message = "fileUrl must be a valid URL"))]
    pub file_url: Option<String>,
    #[validate(length(min = 1, message = "submittedAt is required"))]
    pub submitted_at: String,
    pub sync_status: SyncStatus,
}

impl SubmissionRecord {
    pub fn new(
        assignment_id: impl Into<String>,
        student_id: impl Into<String>,
        content: impl Into<String>,
        file_url: Option<String>,
        submitted_at: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            assignment_id: assignment_id.into(),
            student_id: student_id.into(),
            content: content.into(),
            file_url,
            submitted_at: submitted_at.into(),
            sync_status: SyncStatus::Pending,
        }
    }
}

impl SyncRecord for SubmissionRecord {
    const COLLECTION: Collection = Collection::Submissions;

    fn id(&self) -> &str {
        &self.id
    }

    fn student_id(&self) -> &str {
        &self.student_id
    }

    fn sync_status(&self) -> SyncStatus {
        self.sync_status
    }

    fn set_sync_status(&mut self, status: SyncStatus) {
        self.sync_status = status;
    }
}

/// Acknowledgement returned by `POST /api/sync/{collection}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncAck {
    pub id: String,
    pub sync_status: SyncStatus,
    pub created: bool,
}
