//! Offline-first persistence for a Mandarin tutor.
//!
//! [`SyncCoordinator`] is the entry point: it writes study data to a cloud
//! document store when it can and to an on-device SQLite database when it
//! cannot, and reads back whichever copy is usable.

pub mod ai;
pub mod audio_cache;
pub mod auth;
pub mod clock;
pub mod config;
pub mod coordinator;
pub mod local;
pub mod logging;
pub mod merge;
pub mod models;
pub mod remote;

pub use auth::{AuthHandle, AuthProvider, UserId};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::SyncConfig;
pub use coordinator::{RemoteFailure, RemoteStatus, SyncCoordinator, SyncError, SyncResult};
pub use local::{LocalStore, LocalStoreError};
pub use remote::{FirestoreRestStore, MemoryRemoteStore, RemoteError, RemoteStore};
