use thiserror::Error;

use crate::models::records::Collection;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The local database cannot be opened or used for this session.
    #[error("Local storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Local storage quota exceeded")]
    StorageQuotaExceeded,

    #[error("Invalid {collection} record: {reason}")]
    InvalidRecord {
        collection: Collection,
        reason: String,
    },

    #[error("Corrupted {collection} record {id}: {reason}")]
    Corrupted {
        collection: Collection,
        id: String,
        reason: String,
    },

    #[error("Failed to encode record: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(rusqlite::ErrorCode::DiskFull) => StoreError::StorageQuotaExceeded,
            _ => StoreError::StorageUnavailable(err.to_string()),
        }
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    /// The server answered with a non-2xx status.
    #[error("Sync request for {collection} rejected with HTTP {status}: {body}")]
    SyncRequestFailed {
        collection: Collection,
        status: u16,
        body: String,
    },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid sync endpoint: {0}")]
    InvalidEndpoint(#[from] url::ParseError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disk_full_maps_to_quota_exceeded() {
        let err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_FULL),
            None,
        );
        assert!(matches!(
            StoreError::from(err),
            StoreError::StorageQuotaExceeded
        ));
    }

    #[test]
    fn cannot_open_maps_to_unavailable() {
        let err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CANTOPEN),
            None,
        );
        assert!(matches!(
            StoreError::from(err),
            StoreError::StorageUnavailable(_)
        ));
    }
}
