use super::{Store, StoreRead, StoreWrite};
use crate::core::error::BlockchainError;
use std::{
    collections::BTreeMap,
    sync::{Arc, RwLock},
};

type Map = BTreeMap<Vec<u8>, Vec<u8>>;

/// In-memory backend used by tests and the simulator. Snapshots are
/// free: the whole map lives behind an `Arc` that commit replaces,
/// so readers keep their version and never block the writer.
#[derive(Default)]
pub struct MemoryStore {
    data: RwLock<Arc<Map>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn snapshot(&self) -> Arc<Map> {
        self.data
            .read()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

struct MemoryRead {
    snapshot: Arc<Map>,
}

impl StoreRead for MemoryRead {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, BlockchainError> {
        Ok(self.snapshot.get(key).cloned())
    }
}

struct MemoryWrite<'a> {
    store: &'a MemoryStore,
    snapshot: Arc<Map>,
    changes: Vec<(Vec<u8>, Option<Vec<u8>>)>,
}

impl StoreRead for MemoryWrite<'_> {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, BlockchainError> {
        for (k, v) in self.changes.iter().rev() {
            if k == key {
                return Ok(v.clone());
            }
        }
        Ok(self.snapshot.get(key).cloned())
    }
}

impl StoreWrite for MemoryWrite<'_> {
    fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.changes.push((key, Some(value)));
    }

    fn delete(&mut self, key: Vec<u8>) {
        self.changes.push((key, None));
    }

    fn commit(self: Box<Self>) -> Result<(), BlockchainError> {
        let mut guard = self
            .store
            .data
            .write()
            .map_err(|_| BlockchainError::StoreError("poisoned lock".to_owned()))?;

        let mut next = (**guard).clone();
        for (key, value) in self.changes {
            match value {
                Some(value) => {
                    next.insert(key, value);
                }
                None => {
                    next.remove(&key);
                }
            }
        }

        *guard = Arc::new(next);
        Ok(())
    }
}

impl Store for MemoryStore {
    fn begin_read(&self) -> Result<Box<dyn StoreRead + '_>, BlockchainError> {
        Ok(Box::new(MemoryRead {
            snapshot: self.snapshot(),
        }))
    }

    fn begin_write(&self) -> Result<Box<dyn StoreWrite + '_>, BlockchainError> {
        Ok(Box::new(MemoryWrite {
            store: self,
            snapshot: self.snapshot(),
            changes: Vec::new(),
        }))
    }
}
