//! In-memory table/row/cell store with cell listeners.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::value::{CellValue, Row, Table, Tables};

/// Identifier returned by [`MemoryStore::add_cell_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type CellCallback = Arc<dyn Fn(&CellValue) + Send + Sync>;

struct CellListener {
    id: ListenerId,
    table: String,
    row: String,
    cell: String,
    callback: CellCallback,
}

#[derive(Default)]
struct StoreInner {
    tables: Tables,
    listeners: Vec<CellListener>,
    next_listener: u64,
}

/// A key/value store addressed by `(table, row, cell)`.
///
/// Writes are synchronous and in-memory; durability is the job of a
/// [`Persister`](super::Persister), which loads and saves whole snapshots.
/// Cell listeners fire after every [`set_cell`](Self::set_cell), including
/// writes that do not change the value.
pub struct MemoryStore {
    name: String,
    inner: Mutex<StoreInner>,
}

impl MemoryStore {
    /// Create an empty store. The name is used in log messages only.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inner: Mutex::new(StoreInner::default()),
        }
    }

    /// The store's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get the last written value of a cell.
    pub fn get_cell(&self, table: &str, row: &str, cell: &str) -> Option<CellValue> {
        self.lock()
            .tables
            .get(table)
            .and_then(|t| t.get(row))
            .and_then(|r| r.get(cell))
            .cloned()
    }

    /// Upsert a cell and notify its listeners.
    pub fn set_cell(&self, table: &str, row: &str, cell: &str, value: impl Into<CellValue>) {
        let value = value.into();
        let callbacks: Vec<CellCallback> = {
            let mut inner = self.lock();
            inner
                .tables
                .entry(table.to_string())
                .or_default()
                .entry(row.to_string())
                .or_default()
                .insert(cell.to_string(), value.clone());
            inner
                .listeners
                .iter()
                .filter(|l| l.table == table && l.row == row && l.cell == cell)
                .map(|l| Arc::clone(&l.callback))
                .collect()
        };

        // Called outside the lock so a listener may read the store.
        for callback in callbacks {
            callback(&value);
        }
    }

    /// Replace a full row and notify listeners of each of its cells.
    pub fn set_row(&self, table: &str, row: &str, cells: Row) {
        let notifications: Vec<(CellCallback, CellValue)> = {
            let mut inner = self.lock();
            inner
                .tables
                .entry(table.to_string())
                .or_default()
                .insert(row.to_string(), cells.clone());
            inner
                .listeners
                .iter()
                .filter(|l| l.table == table && l.row == row)
                .filter_map(|l| {
                    cells
                        .get(&l.cell)
                        .map(|value| (Arc::clone(&l.callback), value.clone()))
                })
                .collect()
        };

        for (callback, value) in notifications {
            callback(&value);
        }
    }

    /// Get a full row.
    pub fn get_row(&self, table: &str, row: &str) -> Option<Row> {
        self.lock().tables.get(table).and_then(|t| t.get(row)).cloned()
    }

    /// Get a full table, rows in key order.
    pub fn get_table(&self, table: &str) -> Option<Table> {
        self.lock().tables.get(table).cloned()
    }

    /// Check whether a row exists.
    pub fn has_row(&self, table: &str, row: &str) -> bool {
        self.lock()
            .tables
            .get(table)
            .is_some_and(|t| t.contains_key(row))
    }

    /// Delete a row. Listeners are not notified.
    pub fn del_row(&self, table: &str, row: &str) {
        let mut inner = self.lock();
        if let Some(t) = inner.tables.get_mut(table) {
            t.remove(row);
            if t.is_empty() {
                inner.tables.remove(table);
            }
        }
    }

    /// Register a callback fired with the new value on every write to a cell.
    pub fn add_cell_listener<F>(&self, table: &str, row: &str, cell: &str, callback: F) -> ListenerId
    where
        F: Fn(&CellValue) + Send + Sync + 'static,
    {
        let mut inner = self.lock();
        let id = ListenerId(inner.next_listener);
        inner.next_listener += 1;
        inner.listeners.push(CellListener {
            id,
            table: table.to_string(),
            row: row.to_string(),
            cell: cell.to_string(),
            callback: Arc::new(callback),
        });
        id
    }

    /// Remove a listener. Returns `false` if it was not registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut inner = self.lock();
        let before = inner.listeners.len();
        inner.listeners.retain(|l| l.id != id);
        inner.listeners.len() != before
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.lock().listeners.len()
    }

    /// Clone the full content of the store.
    pub fn snapshot(&self) -> Tables {
        self.lock().tables.clone()
    }

    /// Replace the full content of the store, as done by a persister on load.
    ///
    /// Listeners are not notified.
    pub fn replace(&self, tables: Tables) {
        self.lock().tables = tables;
    }

    /// Check whether the store holds no tables.
    pub fn is_empty(&self) -> bool {
        self.lock().tables.is_empty()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("MemoryStore")
            .field("name", &self.name)
            .field("tables", &inner.tables.len())
            .field("listeners", &inner.listeners.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_set_and_get_cell() {
        let store = MemoryStore::new("stats");
        assert!(store.get_cell("stats", "clicks", "count").is_none());

        store.set_cell("stats", "clicks", "count", 3u32);
        assert_eq!(
            store.get_cell("stats", "clicks", "count"),
            Some(CellValue::Integer(3))
        );
        assert!(store.has_row("stats", "clicks"));
        assert!(!store.has_row("stats", "shares"));
    }

    #[test]
    fn test_get_table() {
        let store = MemoryStore::new("kindred-deals");
        assert!(store.get_table("deals").is_none());

        store.set_cell("deals", "b", "merchantName", "Booking");
        store.set_cell("deals", "a", "merchantName", "Agoda");
        let table = store.get_table("deals").unwrap();
        assert_eq!(table.keys().collect::<Vec<_>>(), ["a", "b"]);
    }

    #[test]
    fn test_listener_fires_on_every_write() {
        let store = MemoryStore::new("stats");
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = Arc::clone(&hits);

        let id = store.add_cell_listener("stats", "clicks", "count", move |value| {
            assert_eq!(value.as_u32(), Some(5));
            hits_clone.fetch_add(1, Ordering::SeqCst);
        });

        store.set_cell("stats", "clicks", "count", 5u32);
        // Same value again still notifies.
        store.set_cell("stats", "clicks", "count", 5u32);
        // Other cells do not.
        store.set_cell("stats", "shares", "count", 1u32);
        assert_eq!(hits.load(Ordering::SeqCst), 2);

        assert!(store.remove_listener(id));
        assert!(!store.remove_listener(id));
        store.set_cell("stats", "clicks", "count", 5u32);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_listener_may_read_store() {
        let store = Arc::new(MemoryStore::new("balance"));
        let seen = Arc::new(Mutex::new(None));
        let (store_clone, seen_clone) = (Arc::clone(&store), Arc::clone(&seen));

        store.add_cell_listener("balance", "april", "value", move |_| {
            let display = store_clone.get_cell("balance", "april", "displayValue");
            *seen_clone.lock().unwrap() = display;
        });

        store.set_cell("balance", "april", "displayValue", "1.5");
        store.set_cell("balance", "april", "value", "1.5");
        assert_eq!(
            *seen.lock().unwrap(),
            Some(CellValue::Text("1.5".to_string()))
        );
    }

    #[test]
    fn test_set_row_replaces_and_notifies() {
        let store = MemoryStore::new("balance");
        store.set_cell("balance", "april", "stale", "1");
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = Arc::clone(&hits);
        store.add_cell_listener("balance", "april", "value", move |_| {
            hits_clone.fetch_add(1, Ordering::SeqCst);
        });

        let mut row = Row::new();
        row.insert("value".to_string(), CellValue::from("2.5"));
        store.set_row("balance", "april", row);

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(store.get_cell("balance", "april", "stale").is_none());
        assert_eq!(
            store.get_cell("balance", "april", "value"),
            Some(CellValue::Text("2.5".to_string()))
        );
    }

    #[test]
    fn test_del_row_and_replace() {
        let store = MemoryStore::new("peer");
        store.set_cell("peerDID", "current", "did", "did:peer:0abc");
        let snapshot = store.snapshot();

        store.del_row("peerDID", "current");
        assert!(store.is_empty());

        store.replace(snapshot);
        assert_eq!(
            store.get_row("peerDID", "current").unwrap()["did"].as_str(),
            Some("did:peer:0abc")
        );
    }
}
