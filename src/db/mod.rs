//! Persistent key-value storage for plugin data.
//!
//! Layout:
//! - `store.rs`: the `KvStore` seam and the typed `PluginData` view
//! - `schema.rs`: SQL DDL for initializing the database (SQLite-first)
//! - `sqlite.rs`: sqlx-backed store
//! - `memory.rs`: in-process store for tests and one-shot runs

pub mod memory;
pub mod schema;
pub mod sqlite;
pub mod store;

pub use memory::MemoryKvStore;
pub use schema::SQLITE_INIT;
pub use sqlite::{SqliteKvStore, SqlitePool};
pub use store::{KvStore, PluginData};
