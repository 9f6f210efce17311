use super::overlay::OverlayMap;
use crate::core::{error::BlockchainError, storage::StoreRead};
use veil_common::{account::Account, crypto::PublicKeyHash};

const PREFIX: &[u8] = b"accounts:";

/// Transparent accounts keyed by public key hash
pub struct Accounts<'a> {
    reader: &'a dyn StoreRead,
    map: OverlayMap<Account>,
}

impl<'a> Accounts<'a> {
    pub fn new(reader: &'a dyn StoreRead) -> Self {
        Self {
            reader,
            map: OverlayMap::new(PREFIX),
        }
    }

    pub fn get(&self, key: &PublicKeyHash) -> Result<Option<Account>, BlockchainError> {
        self.map.get(self.reader, key.as_bytes())
    }

    pub fn exists(&self, key: &PublicKeyHash) -> Result<bool, BlockchainError> {
        self.map.exists(self.reader, key.as_bytes())
    }

    pub fn update(&mut self, key: &PublicKeyHash, account: Account) {
        self.map.update(key.as_bytes().to_vec(), account);
    }

    pub fn delete(&mut self, key: &PublicKeyHash) {
        self.map.delete(key.as_bytes().to_vec());
    }

    pub fn push_layer(&mut self) {
        self.map.push_layer();
    }

    pub fn commit(&mut self) {
        self.map.commit_layer();
    }

    pub fn rollback(&mut self) {
        self.map.rollback_layer();
    }

    pub fn into_store_writes(self) -> Vec<(Vec<u8>, Option<Vec<u8>>)> {
        self.map.into_store_writes()
    }
}
