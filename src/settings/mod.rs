//! Persisted client settings: token, tenant, conversation id and display flags.
//!
//! - `keys`: storage keys
//! - `store`: key-value backends (`SQLite`, in-memory)
//! - `cache`: typed accessors used by the chat coordinator

pub mod cache;
pub mod keys;
pub mod store;

pub use cache::{CachedContext, SettingsCache};
pub use store::{MemorySettingsStore, SettingsStore, SqliteSettingsStore, StoreFuture};
