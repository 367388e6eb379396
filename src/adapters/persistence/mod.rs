//! Store adapters: SQLite (libsql) for production, in-memory for tests.

pub mod memory_store;
pub mod sqlite_store;

pub use memory_store::MemoryStore;
pub use sqlite_store::SqliteStore;
