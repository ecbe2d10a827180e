//! Durable backing for [`MemoryStore`] snapshots.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::ReapError;

use super::memory::MemoryStore;
use super::value::Tables;

/// Explicit load/flush/teardown of a store's durable copy.
pub trait Persister: Send + Sync {
    /// Load the durable copy into the store.
    ///
    /// A backing store that has never been written leaves the store untouched.
    fn load(&self, store: &MemoryStore) -> impl Future<Output = Result<(), ReapError>> + Send;

    /// Flush the store's current content to the durable copy.
    fn save(&self, store: &MemoryStore) -> impl Future<Output = Result<(), ReapError>> + Send;

    /// Release the persister. Later saves fail with `StorageUnavailable`.
    fn destroy(&self) -> impl Future<Output = ()> + Send;
}

impl<P: Persister> Persister for Arc<P> {
    fn load(&self, store: &MemoryStore) -> impl Future<Output = Result<(), ReapError>> + Send {
        (**self).load(store)
    }

    fn save(&self, store: &MemoryStore) -> impl Future<Output = Result<(), ReapError>> + Send {
        (**self).save(store)
    }

    fn destroy(&self) -> impl Future<Output = ()> + Send {
        (**self).destroy()
    }
}

/// Persists a store as one JSON document on disk.
#[derive(Debug)]
pub struct JsonFilePersister {
    path: PathBuf,
    destroyed: AtomicBool,
}

impl JsonFilePersister {
    /// Create a persister writing to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            destroyed: AtomicBool::new(false),
        }
    }

    /// Create a persister for `<dir>/<name>.json`.
    pub fn in_dir(dir: impl AsRef<Path>, name: &str) -> Self {
        Self::new(dir.as_ref().join(format!("{name}.json")))
    }

    /// The file this persister writes.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Persister for JsonFilePersister {
    async fn load(&self, store: &MemoryStore) -> Result<(), ReapError> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No persisted copy of {} at {}", store.name(), self.path.display());
                return Ok(());
            }
            Err(e) => return Err(ReapError::storage(store.name(), e)),
        };

        let tables: Tables =
            serde_json::from_str(&text).map_err(|e| ReapError::storage(store.name(), e))?;
        store.replace(tables);
        Ok(())
    }

    async fn save(&self, store: &MemoryStore) -> Result<(), ReapError> {
        if self.destroyed.load(Ordering::SeqCst) {
            return Err(ReapError::storage(store.name(), "persister destroyed"));
        }

        let body = serde_json::to_vec_pretty(&store.snapshot())?;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Write then rename so a crash never leaves a truncated file behind.
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    async fn destroy(&self) {
        self.destroyed.store(true, Ordering::SeqCst);
    }
}

/// Keeps the last saved snapshot in memory.
///
/// Can be switched into a failing mode to simulate an unavailable backing store.
#[derive(Debug, Default)]
pub struct MemoryPersister {
    saved: Mutex<Option<Tables>>,
    failing: AtomicBool,
    destroyed: AtomicBool,
    saves: AtomicUsize,
}

impl MemoryPersister {
    /// Create an empty persister.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a persister that already holds a snapshot.
    pub fn with_snapshot(tables: Tables) -> Self {
        let persister = Self::default();
        *persister.saved.lock().unwrap_or_else(PoisonError::into_inner) = Some(tables);
        persister
    }

    /// Make every following load and save fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of successful saves.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// The last saved snapshot.
    pub fn snapshot(&self) -> Option<Tables> {
        self.saved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether [`Persister::destroy`] was called.
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }
}

impl Persister for MemoryPersister {
    async fn load(&self, store: &MemoryStore) -> Result<(), ReapError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ReapError::storage(store.name(), "backing store unavailable"));
        }
        if let Some(tables) = self.snapshot() {
            store.replace(tables);
        }
        Ok(())
    }

    async fn save(&self, store: &MemoryStore) -> Result<(), ReapError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ReapError::storage(store.name(), "backing store unavailable"));
        }
        if self.is_destroyed() {
            return Err(ReapError::storage(store.name(), "persister destroyed"));
        }
        *self.saved.lock().unwrap_or_else(PoisonError::into_inner) = Some(store.snapshot());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn destroy(&self) {
        self.destroyed.store(true, Ordering::SeqCst);
    }
}
