use crate::core::{error::BlockchainError, storage::StoreRead};
use indexmap::IndexMap;
use veil_common::serializer::Serializer;

/// Uncommitted write buffer over the store: a base set of committed
/// writes plus a stack of speculative layers. `commit_layer` folds
/// the top layer into the one below and `rollback_layer` discards it,
/// so reverting a candidate transaction is a structural property
/// instead of a discipline.
pub struct OverlayMap<V> {
    prefix: &'static [u8],
    committed: IndexMap<Vec<u8>, Option<V>>,
    layers: Vec<IndexMap<Vec<u8>, Option<V>>>,
}

impl<V: Serializer + Clone> OverlayMap<V> {
    pub fn new(prefix: &'static [u8]) -> Self {
        Self {
            prefix,
            committed: IndexMap::new(),
            layers: Vec::new(),
        }
    }

    fn storage_key(&self, key: &[u8]) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.prefix.len() + key.len());
        bytes.extend_from_slice(self.prefix);
        bytes.extend_from_slice(key);
        bytes
    }

    pub fn get(&self, reader: &dyn StoreRead, key: &[u8]) -> Result<Option<V>, BlockchainError> {
        for layer in self.layers.iter().rev() {
            if let Some(entry) = layer.get(key) {
                return Ok(entry.clone());
            }
        }
        if let Some(entry) = self.committed.get(key) {
            return Ok(entry.clone());
        }

        match reader.get(&self.storage_key(key))? {
            Some(bytes) => Ok(Some(
                V::from_bytes(&bytes).map_err(BlockchainError::MalformedInput)?,
            )),
            None => Ok(None),
        }
    }

    pub fn exists(&self, reader: &dyn StoreRead, key: &[u8]) -> Result<bool, BlockchainError> {
        Ok(self.get(reader, key)?.is_some())
    }

    fn top(&mut self) -> &mut IndexMap<Vec<u8>, Option<V>> {
        match self.layers.last_mut() {
            Some(layer) => layer,
            None => &mut self.committed,
        }
    }

    pub fn update(&mut self, key: Vec<u8>, value: V) {
        self.top().insert(key, Some(value));
    }

    pub fn delete(&mut self, key: Vec<u8>) {
        self.top().insert(key, None);
    }

    pub fn push_layer(&mut self) {
        self.layers.push(IndexMap::new());
    }

    pub fn commit_layer(&mut self) {
        if let Some(layer) = self.layers.pop() {
            let below = self.top();
            for (key, value) in layer {
                below.insert(key, value);
            }
        }
    }

    pub fn rollback_layer(&mut self) {
        self.layers.pop();
    }

    // Depth of the speculative stack
    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Committed writes as raw store operations. Speculative layers
    /// are not included; fold or discard them first.
    pub fn into_store_writes(mut self) -> Vec<(Vec<u8>, Option<Vec<u8>>)> {
        while !self.layers.is_empty() {
            self.commit_layer();
        }

        self.committed
            .iter()
            .map(|(key, value)| {
                (
                    self.storage_key(key),
                    value.as_ref().map(|v| v.to_bytes()),
                )
            })
            .collect()
    }

    pub fn committed_entries(&self) -> impl Iterator<Item = (&Vec<u8>, &Option<V>)> {
        self.committed.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::storage::{MemoryStore, Store, StoreWrite};

    #[test]
    fn test_layer_commit_and_rollback() {
        let store = MemoryStore::new();
        let reader = store.begin_read().unwrap();
        let mut map: OverlayMap<u64> = OverlayMap::new(b"t:");

        map.update(b"a".to_vec(), 1);

        map.push_layer();
        map.update(b"a".to_vec(), 2);
        assert_eq!(map.get(&*reader, b"a").unwrap(), Some(2));

        map.rollback_layer();
        assert_eq!(map.get(&*reader, b"a").unwrap(), Some(1));

        map.push_layer();
        map.update(b"a".to_vec(), 3);
        map.commit_layer();
        assert_eq!(map.get(&*reader, b"a").unwrap(), Some(3));
        assert_eq!(map.layer_count(), 0);
    }

    #[test]
    fn test_nested_layers() {
        let store = MemoryStore::new();
        let reader = store.begin_read().unwrap();
        let mut map: OverlayMap<u64> = OverlayMap::new(b"t:");

        map.push_layer();
        map.update(b"x".to_vec(), 1);
        map.push_layer();
        map.delete(b"x".to_vec());
        assert_eq!(map.get(&*reader, b"x").unwrap(), None);

        map.rollback_layer();
        assert_eq!(map.get(&*reader, b"x").unwrap(), Some(1));
    }

    #[test]
    fn test_reads_fall_through_to_store() {
        let store = MemoryStore::new();
        let mut write = store.begin_write().unwrap();
        write.put(b"t:k".to_vec(), 42u64.to_bytes());
        write.commit().unwrap();

        let reader = store.begin_read().unwrap();
        let mut map: OverlayMap<u64> = OverlayMap::new(b"t:");
        assert_eq!(map.get(&*reader, b"k").unwrap(), Some(42));

        // a delete shadows the stored value
        map.delete(b"k".to_vec());
        assert_eq!(map.get(&*reader, b"k").unwrap(), None);
    }

    #[test]
    fn test_into_store_writes_folds_layers() {
        let mut map: OverlayMap<u64> = OverlayMap::new(b"t:");
        map.update(b"a".to_vec(), 1);
        map.push_layer();
        map.update(b"b".to_vec(), 2);
        map.delete(b"a".to_vec());

        let mut writes = map.into_store_writes();
        writes.sort();
        assert_eq!(
            writes,
            vec![
                (b"t:a".to_vec(), None),
                (b"t:b".to_vec(), Some(2u64.to_bytes())),
            ]
        );
    }
}
