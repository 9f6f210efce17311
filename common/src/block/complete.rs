use super::{header::BlockHeader, merkle::merkle_root};
use crate::{
    config::BLOCK_MAX_SIZE,
    crypto::{zether::ZetherVerifier, Hash, Hashable},
    serializer::{uvarint_size, Reader, ReaderError, Serializer, Writer},
    token::TokenHash,
    transaction::{ChainState, Transaction, TransactionError},
    utils::{checked_map_add, CancelToken},
};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    sync::{Arc, OnceLock},
};

/// Derived data cached after a whole-block verification
#[derive(Clone, Debug)]
pub struct BlockBloom {
    pub hash: Hash,
    pub size: usize,
    pub serialized: Vec<u8>,
}

/// A header together with its transactions: the unit the mempool
/// feeds, the forging engine emits and the coordinator applies.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BlockComplete {
    pub header: BlockHeader,
    pub txs: Vec<Arc<Transaction>>,
    #[serde(skip)]
    bloom: OnceLock<BlockBloom>,
}

impl BlockComplete {
    pub fn new(header: BlockHeader, txs: Vec<Arc<Transaction>>) -> Self {
        Self {
            header,
            txs,
            bloom: OnceLock::new(),
        }
    }

    pub fn get_height(&self) -> u64 {
        self.header.height
    }

    // Block identity is the header hash
    pub fn get_hash(&self) -> Hash {
        match self.bloom.get() {
            Some(bloom) => bloom.hash.clone(),
            None => self.header.hash(),
        }
    }

    pub fn get_bloom(&self) -> Option<&BlockBloom> {
        self.bloom.get()
    }

    pub fn get_size(&self) -> usize {
        match self.bloom.get() {
            Some(bloom) => bloom.size,
            None => self.size(),
        }
    }

    /// Merkle root over the transaction hashes; `SHA3("")` when empty
    pub fn compute_merkle_hash(&self) -> Hash {
        let hashes: Vec<Hash> = self.txs.iter().map(|tx| tx.get_hash()).collect();
        merkle_root(&hashes)
    }

    pub fn validate(&self) -> Result<(), TransactionError> {
        self.header.validate()?;

        if self.header.merkle_hash != self.compute_merkle_hash() {
            return Err(TransactionError::InvalidExtra);
        }

        for tx in &self.txs {
            tx.validate()?;
        }
        Ok(())
    }

    /// Verify every transaction and cache the block bloom
    pub fn bloom_all(
        &self,
        verifier: &dyn ZetherVerifier,
        cancel: &CancelToken,
    ) -> Result<&BlockBloom, TransactionError> {
        if let Some(bloom) = self.bloom.get() {
            return Ok(bloom);
        }

        self.validate()?;
        for tx in &self.txs {
            tx.verify(verifier, cancel)?;
        }

        let serialized = self.to_bytes();
        if serialized.len() > BLOCK_MAX_SIZE {
            return Err(TransactionError::Malformed(ReaderError::ExceedsMaxSize));
        }

        let bloom = BlockBloom {
            hash: self.header.hash(),
            size: serialized.len(),
            serialized,
        };
        Ok(self.bloom.get_or_init(|| bloom))
    }

    /// Total declared fees across the block, per token
    pub fn compute_fees(&self) -> Result<HashMap<TokenHash, u64>, TransactionError> {
        let mut fees = HashMap::new();
        for tx in &self.txs {
            for (token, fee) in tx.compute_fees()? {
                checked_map_add(&mut fees, token, fee).ok_or(TransactionError::Overflow)?;
            }
        }
        Ok(fees)
    }

    /// Apply the whole block: credit the declared fees to the forger
    /// account, then include every transaction in order.
    pub fn include<S: ChainState>(&self, state: &mut S) -> Result<(), TransactionError> {
        let height = self.header.height;
        let forger = self.header.forger_public_key.to_public_key_hash();

        let mut fees: Vec<(TokenHash, u64)> = self.compute_fees()?.into_iter().collect();
        fees.sort_by(|a, b| a.0.cmp(&b.0));

        let mut account = state.get_account_or_create(&forger)?;
        account.refresh_delegated_stake(height);
        for (token, fee) in &fees {
            account.add_balance(token, *fee)?;
        }
        state.update_account(&forger, account)?;

        for tx in &self.txs {
            tx.include(height, state)?;
        }
        Ok(())
    }

    /// Exact inverse of `include`
    pub fn remove<S: ChainState>(&self, state: &mut S) -> Result<(), TransactionError> {
        let height = self.header.height;
        let forger = self.header.forger_public_key.to_public_key_hash();

        for tx in self.txs.iter().rev() {
            tx.remove(height, state)?;
        }

        let mut fees: Vec<(TokenHash, u64)> = self.compute_fees()?.into_iter().collect();
        fees.sort_by(|a, b| a.0.cmp(&b.0));

        let mut account = state.get_account_or_create(&forger)?;
        for (token, fee) in fees.iter().rev() {
            account.sub_balance(token, *fee)?;
        }
        state.update_account(&forger, account)?;
        Ok(())
    }
}

// The bloom cache is excluded from equality
impl PartialEq for BlockComplete {
    fn eq(&self, other: &Self) -> bool {
        self.header == other.header && self.txs == other.txs
    }
}

impl Eq for BlockComplete {}

impl Serializer for BlockComplete {
    fn write(&self, writer: &mut Writer) {
        self.header.write(writer);
        writer.write_uvarint(self.txs.len() as u64);
        for tx in &self.txs {
            tx.write(writer);
        }
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        // hard cap before any parsing cost is spent
        if reader.total_size() > BLOCK_MAX_SIZE {
            return Err(ReaderError::ExceedsMaxSize);
        }

        let header = BlockHeader::read(reader)?;
        let count = reader.read_uvarint()?;
        if count > reader.size() as u64 {
            return Err(ReaderError::InvalidSize);
        }

        let mut txs = Vec::with_capacity(count as usize);
        for _ in 0..count {
            txs.push(Arc::new(Transaction::read(reader)?));
        }

        Ok(Self {
            header,
            txs,
            bloom: OnceLock::new(),
        })
    }

    fn size(&self) -> usize {
        self.header.size()
            + uvarint_size(self.txs.len() as u64)
            + self.txs.iter().map(|tx| tx.size()).sum::<usize>()
    }
}
