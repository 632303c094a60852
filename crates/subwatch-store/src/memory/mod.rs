//! In-memory store implementations
//!
//! Used by tests and single-process deployments. Each store guards its rows
//! with per-key maps or short critical sections; none holds a lock across an
//! `.await`.

mod directory;
mod events;
mod health;
mod retry;
mod snapshots;

pub use directory::InMemorySubmissionDirectory;
pub use events::InMemoryEventStore;
pub use health::InMemoryHealthStore;
pub use retry::InMemoryRetryTaskStore;
pub use snapshots::InMemorySnapshotStore;
