use super::{Store, StoreRead, StoreWrite};
use crate::core::error::BlockchainError;
use std::path::Path;

/// Durable backend over a sled tree. The coordinator is the only
/// writer and the mempool is suspended across commits, so plain tree
/// reads are a consistent view for every consumer that matters.
pub struct SledStore {
    db: sled::Db,
}

impl SledStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, BlockchainError> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }
}

struct SledRead<'a> {
    db: &'a sled::Db,
}

impl StoreRead for SledRead<'_> {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, BlockchainError> {
        Ok(self.db.get(key)?.map(|value| value.to_vec()))
    }
}

struct SledWrite<'a> {
    db: &'a sled::Db,
    batch: sled::Batch,
    changes: Vec<(Vec<u8>, Option<Vec<u8>>)>,
}

impl StoreRead for SledWrite<'_> {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, BlockchainError> {
        for (k, v) in self.changes.iter().rev() {
            if k == key {
                return Ok(v.clone());
            }
        }
        Ok(self.db.get(key)?.map(|value| value.to_vec()))
    }
}

impl StoreWrite for SledWrite<'_> {
    fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.batch.insert(key.clone(), value.clone());
        self.changes.push((key, Some(value)));
    }

    fn delete(&mut self, key: Vec<u8>) {
        self.batch.remove(key.clone());
        self.changes.push((key, None));
    }

    fn commit(self: Box<Self>) -> Result<(), BlockchainError> {
        self.db.apply_batch(self.batch)?;
        self.db.flush()?;
        Ok(())
    }
}

impl Store for SledStore {
    fn begin_read(&self) -> Result<Box<dyn StoreRead + '_>, BlockchainError> {
        Ok(Box::new(SledRead { db: &self.db }))
    }

    fn begin_write(&self) -> Result<Box<dyn StoreWrite + '_>, BlockchainError> {
        Ok(Box::new(SledWrite {
            db: &self.db,
            batch: sled::Batch::default(),
            changes: Vec::new(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn test_sled_round_trip() {
        let dir = TempDir::new("veil-sled-test").unwrap();
        let store = SledStore::open(dir.path()).unwrap();

        let mut write = store.begin_write().unwrap();
        write.put(b"key".to_vec(), b"value".to_vec());
        assert_eq!(write.get(b"key").unwrap(), Some(b"value".to_vec()));
        write.commit().unwrap();

        let read = store.begin_read().unwrap();
        assert_eq!(read.get(b"key").unwrap(), Some(b"value".to_vec()));
    }
}
