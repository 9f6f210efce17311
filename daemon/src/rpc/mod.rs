pub mod delegator;

use crate::core::{blockchain::Blockchain, error::BlockchainError, mempool::Mempool};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use veil_common::{
    block::{BlockComplete, BlockHeader},
    config::VERSION,
    crypto::Hash,
    transaction::Transaction,
};

/// Typed request/reply surface the transports mount. Handlers read
/// from immutable snapshots and never mutate core state; submission
/// goes through the mempool's admission contract.
pub struct RpcHandler {
    blockchain: Arc<Blockchain>,
    mempool: Arc<Mempool>,
}

#[derive(Serialize, Deserialize)]
pub struct NodeInfoResponse {
    pub name: String,
    pub version: String,
    pub height: u64,
}

#[derive(Serialize, Deserialize)]
pub struct ChainResponse {
    pub height: u64,
    pub hash: Hash,
    pub kernel_hash: Hash,
}

/// Lookup by height or hash; height wins when both are present
#[derive(Serialize, Deserialize, Default)]
pub struct BlockQuery {
    pub height: Option<u64>,
    pub hash: Option<Hash>,
}

impl RpcHandler {
    pub fn new(blockchain: Arc<Blockchain>, mempool: Arc<Mempool>) -> Self {
        Self {
            blockchain,
            mempool,
        }
    }

    pub fn ping(&self) -> &'static str {
        "pong"
    }

    pub fn node_info(&self) -> NodeInfoResponse {
        NodeInfoResponse {
            name: "veil".to_owned(),
            version: VERSION.to_owned(),
            height: self.blockchain.get_head().height,
        }
    }

    pub fn chain(&self) -> ChainResponse {
        let head = self.blockchain.get_head();
        ChainResponse {
            height: head.height,
            hash: head.hash.clone(),
            kernel_hash: head.kernel_hash.clone(),
        }
    }

    fn lookup_block(&self, query: &BlockQuery) -> Result<Option<BlockComplete>, BlockchainError> {
        match (query.height, &query.hash) {
            (Some(height), _) => self.blockchain.get_block_by_height(height),
            (None, Some(hash)) => self.blockchain.get_block_by_hash(hash),
            (None, None) => Err(BlockchainError::NotFound),
        }
    }

    pub fn block(&self, query: &BlockQuery) -> Result<BlockHeader, BlockchainError> {
        self.lookup_block(query)?
            .map(|block| block.header)
            .ok_or(BlockchainError::NotFound)
    }

    pub fn block_complete(&self, query: &BlockQuery) -> Result<BlockComplete, BlockchainError> {
        self.lookup_block(query)?.ok_or(BlockchainError::NotFound)
    }

    /// Mempool first, then the chain index
    pub fn tx(&self, hash: &Hash) -> Result<Arc<Transaction>, BlockchainError> {
        self.blockchain.get_tx(hash)?.ok_or(BlockchainError::NotFound)
    }

    /// Admission through the mempool contract
    pub async fn submit_transaction(&self, tx: Transaction) -> Result<bool, BlockchainError> {
        self.mempool.add(tx).await
    }
}
