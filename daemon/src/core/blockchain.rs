use crate::core::{
    error::BlockchainError,
    forging::{ForgingWork, StakingAccount},
    mempool::{Mempool, MempoolWork},
    state::ApplyState,
    storage::Store,
};
use log::{debug, info, warn};
use primitive_types::U256;
use std::{
    sync::{Arc, RwLock},
    time::{SystemTime, UNIX_EPOCH},
};
use tokio::sync::{broadcast, mpsc};
use veil_common::{
    account::DelegatedStake,
    block::{BlockComplete, BlockHeader},
    config::NATIVE_TOKEN,
    crypto::{zether::ZetherVerifier, CompressedPublicKey, Hash, PublicKeyHash},
    serializer::{Reader, ReaderError, Serializer, Writer},
    token::native_token,
    transaction::{ChainState, Transaction},
    utils::CancelToken,
};

const HEAD_KEY: &[u8] = b"chain:head";
const BLOCK_PREFIX: &[u8] = b"blocks:";
const BLOCK_HASH_PREFIX: &[u8] = b"blockHash:";
const TX_HASH_PREFIX: &[u8] = b"txHash:";

/// Immutable view of the chain tip, swapped whole behind a lock so
/// readers never block the writer for longer than the pointer swap.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChainHead {
    pub height: u64,
    pub hash: Hash,
    pub kernel_hash: Hash,
}

impl Serializer for ChainHead {
    fn write(&self, writer: &mut Writer) {
        writer.write_uvarint(self.height);
        writer.write_hash(&self.hash);
        writer.write_hash(&self.kernel_hash);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(Self {
            height: reader.read_uvarint()?,
            hash: reader.read_hash()?,
            kernel_hash: reader.read_hash()?,
        })
    }
}

#[derive(Clone, Debug)]
pub struct NewTip {
    pub height: u64,
    pub hash: Hash,
}

#[derive(Clone)]
pub struct ChainConfig {
    /// Constant difficulty: target is `U256::MAX / difficulty`
    pub difficulty: u64,
    pub seed_wallet_info: bool,
    /// Stakers this node forges for
    pub forger_keys: Vec<CompressedPublicKey>,
    pub genesis_timestamp: u64,
    /// Genesis allocations credited to the native balance
    pub premine: Vec<(PublicKeyHash, u64)>,
    /// Genesis stakers: delegated stake available from block 1
    pub premine_stake: Vec<(CompressedPublicKey, u64)>,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            difficulty: 1,
            seed_wallet_info: false,
            forger_keys: Vec::new(),
            genesis_timestamp: 0,
            premine: Vec::new(),
            premine_stake: Vec::new(),
        }
    }
}

/// Single writer over the durable store. Accepts forged blocks and
/// peer blocks on one intake channel, applies them atomically, then
/// publishes the new tip and re-arms the mempool and the forgers.
pub struct Blockchain {
    storage: Arc<dyn Store>,
    mempool: Arc<Mempool>,
    verifier: Arc<dyn ZetherVerifier>,
    config: ChainConfig,
    head: RwLock<Arc<ChainHead>>,
    new_tip: broadcast::Sender<NewTip>,
    block_tx: mpsc::Sender<BlockComplete>,
}

fn block_key(height: u64) -> Vec<u8> {
    let mut key = BLOCK_PREFIX.to_vec();
    key.extend_from_slice(&height.to_be_bytes());
    key
}

fn block_hash_key(hash: &Hash) -> Vec<u8> {
    let mut key = BLOCK_HASH_PREFIX.to_vec();
    key.extend_from_slice(hash.as_bytes());
    key
}

fn tx_hash_key(hash: &Hash) -> Vec<u8> {
    let mut key = TX_HASH_PREFIX.to_vec();
    key.extend_from_slice(hash.as_bytes());
    key
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl Blockchain {
    /// Open (or bootstrap) the chain and return the coordinator with
    /// the block intake receiver to feed into [`Blockchain::run`].
    pub fn new(
        storage: Arc<dyn Store>,
        mempool: Arc<Mempool>,
        verifier: Arc<dyn ZetherVerifier>,
        config: ChainConfig,
    ) -> Result<(Arc<Self>, mpsc::Receiver<BlockComplete>), BlockchainError> {
        let head = {
            let reader = storage.begin_read()?;
            match reader.get(HEAD_KEY)? {
                Some(bytes) => ChainHead::from_bytes(&bytes)?,
                None => Self::bootstrap_genesis(&*storage, &config)?,
            }
        };
        info!("chain tip is {} at height {}", head.hash, head.height);

        let (new_tip, _) = broadcast::channel(64);
        let (block_tx, block_rx) = mpsc::channel(16);

        let chain = Arc::new(Self {
            storage,
            mempool,
            verifier,
            config,
            head: RwLock::new(Arc::new(head)),
            new_tip,
            block_tx,
        });
        Ok((chain, block_rx))
    }

    // Create and persist the genesis block with its allocations
    fn bootstrap_genesis(
        storage: &dyn Store,
        config: &ChainConfig,
    ) -> Result<ChainHead, BlockchainError> {
        let header = BlockHeader::genesis(config.genesis_timestamp, CompressedPublicKey::zero());
        let block = BlockComplete::new(header, Vec::new());
        let hash = block.get_hash();
        let kernel_hash = block.header.kernel_hash();

        let reader = storage.begin_read()?;
        let mut state = ApplyState::new(&*reader);

        let mut token = native_token();
        for (key, amount) in &config.premine {
            let mut account = state.get_account_or_create(key)?;
            account
                .add_balance(&NATIVE_TOKEN, *amount)
                .map_err(|e| BlockchainError::InvalidBlock(e.to_string()))?;
            state
                .update_account(key, account)
                .map_err(BlockchainError::from)?;
            token
                .add_supply(*amount)
                .map_err(|e| BlockchainError::InvalidBlock(e.to_string()))?;
        }
        for (key, amount) in &config.premine_stake {
            let pkh = key.to_public_key_hash();
            let mut account = state.get_account_or_create(&pkh)?;
            if account.get_delegated_stake().is_none() {
                account.set_delegated_stake(DelegatedStake::new(key.clone(), 0));
            }
            let stake = account
                .get_delegated_stake_mut()
                .map_err(|e| BlockchainError::InvalidBlock(e.to_string()))?;
            stake
                .add_stake_available(*amount)
                .map_err(|e| BlockchainError::InvalidBlock(e.to_string()))?;
            state
                .update_account(&pkh, account)
                .map_err(BlockchainError::from)?;
            token
                .add_supply(*amount)
                .map_err(|e| BlockchainError::InvalidBlock(e.to_string()))?;
        }

        state.tokens.update(&NATIVE_TOKEN, token);

        let head = ChainHead {
            height: 0,
            hash: hash.clone(),
            kernel_hash,
        };

        let mut tx = storage.begin_write()?;
        state.write_to_store(&mut *tx, config.seed_wallet_info)?;
        tx.put(block_key(0), block.to_bytes());
        tx.put(block_hash_key(&hash), 0u64.to_be_bytes().to_vec());
        tx.put(HEAD_KEY.to_vec(), head.to_bytes());
        tx.commit()?;

        info!("genesis block {} bootstrapped", hash);
        Ok(head)
    }

    pub fn get_head(&self) -> Arc<ChainHead> {
        self.head
            .read()
            .map(|guard| guard.clone())
            .unwrap_or_else(|e| e.into_inner().clone())
    }

    pub fn get_target(&self) -> U256 {
        U256::MAX / U256::from(self.config.difficulty.max(1))
    }

    pub fn subscribe_new_tip(&self) -> broadcast::Receiver<NewTip> {
        self.new_tip.subscribe()
    }

    /// Queue a block (forged locally or received from a peer) for
    /// serialized application.
    pub async fn submit_block(&self, block: BlockComplete) -> Result<(), BlockchainError> {
        self.block_tx
            .send(block)
            .await
            .map_err(|_| BlockchainError::Canceled)
    }

    pub fn solution_sender(&self) -> mpsc::Sender<BlockComplete> {
        self.block_tx.clone()
    }

    /// The single-writer loop. Consumes the intake channel and
    /// applies one block at a time; errors drop the block, never the
    /// node.
    pub async fn run(self: Arc<Self>, mut block_rx: mpsc::Receiver<BlockComplete>) {
        while let Some(block) = block_rx.recv().await {
            let hash = block.get_hash();
            match self.add_complete_block(block).await {
                Ok(head) => {
                    info!("new tip {} at height {}", head.hash, head.height);
                }
                Err(e) => {
                    warn!("rejected block {}: {}", hash, e);
                }
            }
        }
    }

    /// Validate, verify and apply one block on top of the current
    /// tip, atomically. On success the head is swapped, the new tip
    /// broadcast, and the mempool re-armed with fresh work.
    pub async fn add_complete_block(
        &self,
        block: BlockComplete,
    ) -> Result<Arc<ChainHead>, BlockchainError> {
        let head = self.get_head();

        if block.header.prev_hash != head.hash {
            return Err(BlockchainError::InvalidBlock(
                "block doesn't extend the current tip".to_owned(),
            ));
        }
        if block.header.height != head.height + 1 {
            return Err(BlockchainError::InvalidBlock(
                "block height doesn't follow the tip".to_owned(),
            ));
        }
        if block.header.prev_kernel_hash != head.kernel_hash {
            return Err(BlockchainError::InvalidBlock(
                "kernel chain mismatch".to_owned(),
            ));
        }
        if !block.header.verify_kernel(&self.get_target()) {
            return Err(BlockchainError::InvalidBlock(
                "kernel hash doesn't meet the target".to_owned(),
            ));
        }

        let cancel = CancelToken::new();
        block.bloom_all(self.verifier.as_ref(), &cancel)?;

        // the mempool relinquishes its snapshot before the store moves
        self.mempool.suspend().await;

        let result = self.apply_block(&block, &head);

        let new_head = match result {
            Ok(new_head) => new_head,
            Err(e) => {
                // tip unchanged, resume the mempool on the old tip
                self.mempool
                    .continue_with(MempoolWork {
                        chain_height: head.height,
                        chain_hash: head.hash.clone(),
                    })
                    .await;
                return Err(e);
            }
        };

        {
            let mut guard = self
                .head
                .write()
                .unwrap_or_else(|e| e.into_inner());
            *guard = new_head.clone();
        }

        let _ = self.new_tip.send(NewTip {
            height: new_head.height,
            hash: new_head.hash.clone(),
        });

        self.mempool
            .continue_with(MempoolWork {
                chain_height: new_head.height,
                chain_hash: new_head.hash.clone(),
            })
            .await;

        Ok(new_head)
    }

    // One store write transaction per block; any failure leaves the
    // durable tip untouched
    fn apply_block(
        &self,
        block: &BlockComplete,
        head: &ChainHead,
    ) -> Result<Arc<ChainHead>, BlockchainError> {
        let reader = self.storage.begin_read()?;
        let mut state = ApplyState::new(&*reader);
        block.include(&mut state)?;

        let hash = block.get_hash();
        let new_head = Arc::new(ChainHead {
            height: block.header.height,
            hash: hash.clone(),
            kernel_hash: block.header.kernel_hash(),
        });

        let mut tx = self.storage.begin_write()?;
        state.write_to_store(&mut *tx, self.config.seed_wallet_info)?;

        let serialized = match block.get_bloom() {
            Some(bloom) => bloom.serialized.clone(),
            None => block.to_bytes(),
        };
        tx.put(block_key(block.header.height), serialized);
        tx.put(
            block_hash_key(&hash),
            block.header.height.to_be_bytes().to_vec(),
        );
        for block_tx in &block.txs {
            tx.put(
                tx_hash_key(&block_tx.get_hash()),
                block.header.height.to_be_bytes().to_vec(),
            );
        }
        tx.put(HEAD_KEY.to_vec(), new_head.to_bytes());
        tx.commit()?;

        debug!(
            "applied block {} with {} txs at height {}",
            hash,
            block.txs.len(),
            block.header.height
        );
        Ok(new_head)
    }

    /// Work unit for the forging pool on top of the current tip:
    /// template for the next height plus the stake weights of the
    /// configured forger keys, read from the tip snapshot.
    pub fn create_forging_work(&self) -> Result<ForgingWork, BlockchainError> {
        let head = self.get_head();
        let next_height = head.height + 1;

        let reader = self.storage.begin_read()?;
        let mut state = ApplyState::new(&*reader);

        let mut accounts = Vec::new();
        for key in &self.config.forger_keys {
            let pkh = key.to_public_key_hash();
            if let Some(mut account) = state.get_account(&pkh)? {
                account.refresh_delegated_stake(next_height);
                let staking_amount = account.get_staking_amount();
                if staking_amount > 0 {
                    accounts.push(StakingAccount {
                        public_key: key.clone(),
                        staking_amount,
                    });
                }
            }
        }

        let forger_placeholder = accounts
            .first()
            .map(|account| account.public_key.clone())
            .unwrap_or_else(CompressedPublicKey::zero);

        let header = BlockHeader {
            version: veil_common::block::BLOCK_VERSION,
            height: next_height,
            prev_hash: head.hash.clone(),
            prev_kernel_hash: head.kernel_hash.clone(),
            timestamp: unix_now(),
            merkle_hash: veil_common::crypto::hash(b""),
            staking_nonce: 0,
            staking_amount: 0,
            forger_public_key: forger_placeholder,
        };

        Ok(ForgingWork {
            template: BlockComplete::new(header, Vec::new()),
            target: self.get_target(),
            accounts,
        })
    }

    /// Kick the mempool for the current tip, used at startup
    pub async fn arm_mempool(&self) {
        let head = self.get_head();
        self.mempool
            .continue_with(MempoolWork {
                chain_height: head.height,
                chain_hash: head.hash.clone(),
            })
            .await;
    }

    // Read-side lookups for the API surface

    pub fn get_block_by_height(
        &self,
        height: u64,
    ) -> Result<Option<BlockComplete>, BlockchainError> {
        let reader = self.storage.begin_read()?;
        match reader.get(&block_key(height))? {
            Some(bytes) => Ok(Some(BlockComplete::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn get_block_by_hash(
        &self,
        hash: &Hash,
    ) -> Result<Option<BlockComplete>, BlockchainError> {
        let reader = self.storage.begin_read()?;
        let Some(height_bytes) = reader.get(&block_hash_key(hash))? else {
            return Ok(None);
        };
        let height = u64::from_be_bytes(
            height_bytes
                .as_slice()
                .try_into()
                .map_err(|_| BlockchainError::StoreError("corrupt height index".to_owned()))?,
        );
        match reader.get(&block_key(height))? {
            Some(bytes) => Ok(Some(BlockComplete::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Transaction lookup: mempool first, then the chain index
    pub fn get_tx(&self, hash: &Hash) -> Result<Option<Arc<Transaction>>, BlockchainError> {
        if let Some(tx) = self.mempool.get_tx(hash) {
            return Ok(Some(tx));
        }

        let reader = self.storage.begin_read()?;
        let Some(height_bytes) = reader.get(&tx_hash_key(hash))? else {
            return Ok(None);
        };
        let height = u64::from_be_bytes(
            height_bytes
                .as_slice()
                .try_into()
                .map_err(|_| BlockchainError::StoreError("corrupt height index".to_owned()))?,
        );

        let Some(block) = self.get_block_by_height(height)? else {
            return Ok(None);
        };
        Ok(block
            .txs
            .iter()
            .find(|tx| tx.get_hash() == *hash)
            .cloned())
    }
}
