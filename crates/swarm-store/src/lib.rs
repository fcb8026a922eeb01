pub mod admin;
pub mod error;
pub mod memory;

pub use admin::{ClearOutcome, TaskExport, TaskSummary};
pub use error::StoreError;
pub use memory::{MemoryEntry, MemoryQuery, MemoryStats, MemoryUpdate, NewEntry, SharedMemory};
