use super::overlay::OverlayMap;
use crate::core::{error::BlockchainError, storage::StoreRead};
use veil_common::{account::RingMember, crypto::CompressedPublicKey};

const PREFIX: &[u8] = b"rings:";

/// Registered ring public keys and their encrypted balances
pub struct Registrations<'a> {
    reader: &'a dyn StoreRead,
    map: OverlayMap<RingMember>,
}

impl<'a> Registrations<'a> {
    pub fn new(reader: &'a dyn StoreRead) -> Self {
        Self {
            reader,
            map: OverlayMap::new(PREFIX),
        }
    }

    pub fn get(&self, key: &CompressedPublicKey) -> Result<Option<RingMember>, BlockchainError> {
        self.map.get(self.reader, key.as_bytes())
    }

    pub fn is_registered(&self, key: &CompressedPublicKey) -> Result<bool, BlockchainError> {
        self.map.exists(self.reader, key.as_bytes())
    }

    pub fn update(&mut self, key: &CompressedPublicKey, member: RingMember) {
        self.map.update(key.as_bytes().to_vec(), member);
    }

    pub fn delete(&mut self, key: &CompressedPublicKey) {
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
