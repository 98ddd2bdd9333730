pub mod memory_mapped;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod traits;

pub use memory_mapped::MemoryMapped;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteBackend;
pub use traits::{Collection, ScanOptions, StorageBackend};
