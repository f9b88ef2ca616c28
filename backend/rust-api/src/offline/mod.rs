//! Offline-first client layer: a durable local queue of records and the
//! coordinator that replays it to `/api/sync/{collection}` when the client
//! is back online.

pub mod connectivity;
pub mod coordinator;
pub mod error;
pub mod store;
pub mod transport;

pub use connectivity::{spawn_health_probe, Connectivity, ListenerHandle};
pub use coordinator::{
    spawn_auto_sync, DrainOutcome, SubmitOutcome, SyncCoordinator, SyncEvent, SyncReport,
};
pub use error::{StoreError, SyncError};
pub use store::{LocalStore, StatusCounts};
pub use transport::{HttpSyncTransport, SyncTransport};
