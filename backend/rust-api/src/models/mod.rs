pub mod ai;
pub mod records;

pub use records::{Collection, QuizAttemptRecord, SubmissionRecord, SyncAck, SyncRecord, SyncStatus};
