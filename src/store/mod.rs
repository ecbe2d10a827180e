//! Table/row/cell key-value store and its persisters.
//!
//! The store keeps everything in memory and notifies cell listeners
//! synchronously; a [`Persister`] loads and flushes whole snapshots.
//!
//! ## Example
//!
//! ```rust
//! use reap_mini::store::{CellValue, MemoryPersister, MemoryStore, Persister};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), reap_mini::ReapError> {
//! let store = MemoryStore::new("click-stats");
//! let persister = MemoryPersister::new();
//!
//! store.set_cell("stats", "clicks", "count", 1u32);
//! persister.save(&store).await?;
//!
//! let reloaded = MemoryStore::new("click-stats");
//! persister.load(&reloaded).await?;
//! assert_eq!(reloaded.get_cell("stats", "clicks", "count"), Some(CellValue::Integer(1)));
//! # Ok(())
//! # }
//! ```

mod memory;
mod persister;
mod value;

pub use memory::{ListenerId, MemoryStore};
pub use persister::{JsonFilePersister, MemoryPersister, Persister};
pub use value::{CellValue, Row, Table, Tables};
