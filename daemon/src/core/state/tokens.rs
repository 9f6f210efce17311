use super::overlay::OverlayMap;
use crate::core::{
    error::BlockchainError,
    storage::{StoreRead, StoreWrite},
};
use serde::{Deserialize, Serialize};
use veil_common::{
    config::NATIVE_TOKEN,
    token::{Token, TokenHash},
};

const PREFIX: &[u8] = b"tokens:";
const INFO_PREFIX: &[u8] = b"tokenInfo_ByHash:";

/// Wallet-seeding secondary index payload
#[derive(Serialize, Deserialize)]
pub struct TokenInfo {
    pub hash: TokenHash,
    pub name: String,
    pub ticker: String,
    pub decimal_separator: u8,
    pub description: String,
}

/// Token metadata keyed by token hash. The empty key aliases the
/// native token throughout the API.
pub struct Tokens<'a> {
    reader: &'a dyn StoreRead,
    map: OverlayMap<Token>,
}

// The empty key aliases the native token
pub fn normalize_token_key(key: &[u8]) -> Option<TokenHash> {
    if key.is_empty() {
        return Some(NATIVE_TOKEN);
    }
    let bytes: [u8; 20] = key.try_into().ok()?;
    Some(TokenHash::new(bytes))
}

impl<'a> Tokens<'a> {
    pub fn new(reader: &'a dyn StoreRead) -> Self {
        Self {
            reader,
            map: OverlayMap::new(PREFIX),
        }
    }

    pub fn get(&self, hash: &TokenHash) -> Result<Option<Token>, BlockchainError> {
        self.map.get(self.reader, hash.as_bytes())
    }

    pub fn exists(&self, hash: &TokenHash) -> Result<bool, BlockchainError> {
        self.map.exists(self.reader, hash.as_bytes())
    }

    /// Fails with `AlreadyExists` when the key is present
    pub fn create(&mut self, hash: &TokenHash, token: Token) -> Result<(), BlockchainError> {
        token
            .validate()
            .map_err(|e| BlockchainError::InvalidBlock(e.to_string()))?;
        if self.exists(hash)? {
            return Err(BlockchainError::AlreadyExists);
        }
        self.update(hash, token);
        Ok(())
    }

    // Unconditional
    pub fn update(&mut self, hash: &TokenHash, token: Token) {
        self.map.update(hash.as_bytes().to_vec(), token);
    }

    pub fn delete(&mut self, hash: &TokenHash) {
        self.map.delete(hash.as_bytes().to_vec());
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

    /// Raw store writes for the committed set. With `seed_wallet_info`
    /// the `tokenInfo_ByHash` secondary index is appended after the
    /// primary writes; index writes are idempotent.
    pub fn into_store_writes(
        mut self,
        seed_wallet_info: bool,
    ) -> Result<Vec<(Vec<u8>, Option<Vec<u8>>)>, BlockchainError> {
        while self.map.layer_count() > 0 {
            self.map.commit_layer();
        }

        let mut index_writes = Vec::new();
        if seed_wallet_info {
            for (key, value) in self.map.committed_entries() {
                let mut index_key = Vec::with_capacity(INFO_PREFIX.len() + key.len());
                index_key.extend_from_slice(INFO_PREFIX);
                index_key.extend_from_slice(key);

                match value {
                    Some(token) => {
                        let bytes: [u8; 20] = key
                            .as_slice()
                            .try_into()
                            .map_err(|_| BlockchainError::NotFound)?;
                        let info = TokenInfo {
                            hash: TokenHash::new(bytes),
                            name: token.name.clone(),
                            ticker: token.ticker.clone(),
                            decimal_separator: token.decimal_separator,
                            description: token.description.clone(),
                        };
                        let data = serde_json::to_vec(&info)
                            .map_err(|e| BlockchainError::StoreError(e.to_string()))?;
                        index_writes.push((index_key, Some(data)));
                    }
                    None => index_writes.push((index_key, None)),
                }
            }
        }

        let mut writes = self.map.into_store_writes();
        writes.extend(index_writes);
        Ok(writes)
    }

    // Apply the committed writes straight into a write transaction
    pub fn write_to_store(
        self,
        tx: &mut dyn StoreWrite,
        seed_wallet_info: bool,
    ) -> Result<(), BlockchainError> {
        for (key, value) in self.into_store_writes(seed_wallet_info)? {
            match value {
                Some(value) => tx.put(key, value),
                None => tx.delete(key),
            }
        }
        Ok(())
    }
}
