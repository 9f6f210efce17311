mod worker;

pub use worker::MempoolProcessor;

use crate::core::{error::BlockchainError, storage::Store};
use std::{
    cmp::Ordering,
    collections::HashMap,
    sync::{Arc, RwLock},
};
use tokio::sync::{broadcast, mpsc, oneshot};
use veil_common::{
    crypto::{zether::ZetherVerifier, Hash},
    transaction::Transaction,
    utils::CancelToken,
};

/// A held transaction with its bloomed identity and ordering inputs
pub struct MempoolTx {
    pub tx: Arc<Transaction>,
    pub hash: Hash,
    pub size: usize,
    pub fee: u64,
}

/// Ready-to-forge batch for one chain tip
pub struct MempoolResult {
    pub chain_height: u64,
    pub chain_hash: Hash,
    pub txs: Vec<Arc<MempoolTx>>,
    pub total_size: usize,
}

impl MempoolResult {
    fn empty() -> Self {
        Self {
            chain_height: 0,
            chain_hash: Hash::zero(),
            txs: Vec::new(),
            total_size: 0,
        }
    }
}

/// A continue signal: replay the holdings against this tip
#[derive(Clone, Debug)]
pub struct MempoolWork {
    pub chain_height: u64,
    pub chain_hash: Hash,
}

pub(crate) struct AddRequest {
    pub entry: Arc<MempoolTx>,
    pub reply: oneshot::Sender<bool>,
}

pub(crate) struct SuspendRequest {
    pub ack: oneshot::Sender<()>,
}

pub(crate) struct MempoolShared {
    pub txs: RwLock<HashMap<Hash, Arc<MempoolTx>>>,
    pub result: RwLock<MempoolResult>,
}

/// Priority: fee-per-byte descending, deterministic tie-break by
/// transaction hash ascending. Exact rational compare, no division.
pub fn compare_priority(a: &MempoolTx, b: &MempoolTx) -> Ordering {
    let left = a.fee as u128 * b.size as u128;
    let right = b.fee as u128 * a.size as u128;
    right
        .cmp(&left)
        .then_with(|| a.hash.cmp(&b.hash))
}

// Poisoning only happens on a panicking writer; keep the data
pub(crate) fn lock_read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

pub(crate) fn lock_write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

/// Admits, orders, evicts and re-executes pending transactions
/// against the chain tip, producing the batch the forger includes.
/// One processor task owns the speculative overlay; everything else
/// talks to it over channels.
pub struct Mempool {
    shared: Arc<MempoolShared>,
    verifier: Arc<dyn ZetherVerifier>,
    suspend_tx: mpsc::Sender<SuspendRequest>,
    continue_tx: mpsc::Sender<MempoolWork>,
    add_tx: mpsc::Sender<AddRequest>,
    added_to_list: broadcast::Sender<Arc<MempoolTx>>,
    removed_from_list: broadcast::Sender<Arc<MempoolTx>>,
}

impl Mempool {
    /// Spawn the processor task and return the handle everyone
    /// shares. Must be called inside a tokio runtime.
    pub fn start(storage: Arc<dyn Store>, verifier: Arc<dyn ZetherVerifier>) -> Arc<Self> {
        let shared = Arc::new(MempoolShared {
            txs: RwLock::new(HashMap::new()),
            result: RwLock::new(MempoolResult::empty()),
        });

        let (suspend_tx, suspend_rx) = mpsc::channel(1);
        let (continue_tx, continue_rx) = mpsc::channel(1);
        let (add_tx, add_rx) = mpsc::channel(128);
        let (added_to_list, _) = broadcast::channel(256);
        let (removed_from_list, _) = broadcast::channel(256);

        let processor = MempoolProcessor {
            storage,
            shared: shared.clone(),
            suspend_rx,
            continue_rx,
            add_rx,
            added_to_list: added_to_list.clone(),
            removed_from_list: removed_from_list.clone(),
        };
        tokio::spawn(processor.run());

        Arc::new(Self {
            shared,
            verifier,
            suspend_tx,
            continue_tx,
            add_tx,
            added_to_list,
            removed_from_list,
        })
    }

    /// Admission: true iff the transaction individually validates,
    /// verifies and applies to the current speculative state. A
    /// duplicate is rejected idempotently, not an error.
    pub async fn add(&self, tx: Transaction) -> Result<bool, BlockchainError> {
        tx.validate()
            .map_err(BlockchainError::InvalidTransaction)?;

        let cancel = CancelToken::new();
        let bloom = tx.verify(self.verifier.as_ref(), &cancel)?;
        let hash = bloom.hash.clone();
        let size = bloom.size;

        if lock_read(&self.shared.txs).contains_key(&hash) {
            return Ok(false);
        }

        let fee = tx.native_fee();
        let entry = Arc::new(MempoolTx {
            tx: Arc::new(tx),
            hash,
            size,
            fee,
        });

        let (reply_tx, reply_rx) = oneshot::channel();
        let request = AddRequest {
            entry,
            reply: reply_tx,
        };
        if self.add_tx.send(request).await.is_err() {
            return Err(BlockchainError::Canceled);
        }

        Ok(reply_rx.await.unwrap_or(false))
    }

    /// Ask the processor to relinquish its snapshot and wait; resolves
    /// once it has. Called by the coordinator before any state change.
    pub async fn suspend(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self
            .suspend_tx
            .send(SuspendRequest { ack: ack_tx })
            .await
            .is_ok()
        {
            let _ = ack_rx.await;
        }
    }

    /// Hand the processor a new tip to rebuild against
    pub async fn continue_with(&self, work: MempoolWork) {
        let _ = self.continue_tx.send(work).await;
    }

    /// Current work list for the given tip, a prefix of the holdings
    /// fitting under the block size cap. Empty when the tip moved.
    pub fn get_next_transactions_to_include(&self, chain_hash: &Hash) -> Vec<Arc<Transaction>> {
        let result = lock_read(&self.shared.result);
        if result.chain_hash != *chain_hash {
            return Vec::new();
        }
        result.txs.iter().map(|entry| entry.tx.clone()).collect()
    }

    pub fn get_tx(&self, hash: &Hash) -> Option<Arc<Transaction>> {
        lock_read(&self.shared.txs).get(hash).map(|e| e.tx.clone())
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        lock_read(&self.shared.txs).contains_key(hash)
    }

    pub fn len(&self) -> usize {
        lock_read(&self.shared.txs).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn subscribe_added_to_list(&self) -> broadcast::Receiver<Arc<MempoolTx>> {
        self.added_to_list.subscribe()
    }

    pub fn subscribe_removed_from_list(&self) -> broadcast::Receiver<Arc<MempoolTx>> {
        self.removed_from_list.subscribe()
    }
}
