//! The guarded item store
//!
//! An ordered list plus a monotonic id counter behind one exclusive lock.
//! Items are created on add and never updated or removed, so ids are never
//! reused. Nothing blocks while the lock is held.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Default)]
struct Items {
    entries: Vec<Item>,
    last_id: u64,
}

/// Shared through application state as `Arc<ItemStore>`.
#[derive(Debug, Default)]
pub struct ItemStore {
    inner: Mutex<Items>,
}

impl ItemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all items in insertion order.
    pub fn list(&self) -> Vec<Item> {
        self.inner.lock().entries.clone()
    }

    /// Append an item under the next id (starting at 1) and return it.
    pub fn add(&self, name: impl Into<String>) -> Item {
        let mut items = self.inner.lock();
        items.last_id += 1;

        let item = Item {
            id: items.last_id,
            name: name.into(),
        };
        items.entries.push(item.clone());
        item
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
