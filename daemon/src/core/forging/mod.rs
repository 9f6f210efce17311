mod worker;

pub use worker::{ForgingSolution, ForgingWork, StakingAccount, HASH_BATCH};

use crate::core::{error::BlockchainError, mempool::Mempool};
use log::{debug, error};
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        mpsc as std_mpsc, Arc,
    },
    thread,
    time::{Duration, SystemTime, UNIX_EPOCH},
};
use tokio::sync::mpsc;
use veil_common::{
    block::BlockComplete,
    crypto::zether::ZetherVerifier,
    serializer::Serializer,
    transaction::Transaction,
    utils::CancelToken,
};
use worker::ForgingWorker;

/// Synthesizes the staking-reward transaction appended to a forged
/// block. Supplied by the node wiring; `None` forges without one.
pub type CreateForgingTransactions = dyn Fn(&BlockComplete, &StakingAccount, &[Arc<Transaction>]) -> Option<Transaction>
    + Send
    + Sync;

#[derive(Clone)]
pub struct ForgingConfig {
    pub threads: usize,
    /// A solution whose timestamp lags wall clock by more than this
    /// is delayed before publication, to avoid racing the network
    pub stale_timestamp_window: Duration,
    pub stale_solution_delay: Duration,
}

impl Default for ForgingConfig {
    fn default() -> Self {
        Self {
            threads: num_cpus::get(),
            stale_timestamp_window: Duration::from_secs(10 * 60),
            stale_solution_delay: Duration::from_secs(5),
        }
    }
}

/// Pool of forging workers plus the publication pipeline. Workers are
/// std threads (pure CPU); distribution, stats and solution handling
/// are tokio tasks.
pub struct Forging {
    work_tx: Option<mpsc::Sender<Arc<ForgingWork>>>,
    hashes: Vec<Arc<AtomicU64>>,
}

impl Forging {
    pub fn start(
        config: ForgingConfig,
        mempool: Arc<Mempool>,
        verifier: Arc<dyn ZetherVerifier>,
        create_forging_transactions: Arc<CreateForgingTransactions>,
        solution_out: mpsc::Sender<BlockComplete>,
    ) -> Self {
        let threads = config.threads.max(1);
        let (work_tx, mut work_rx) = mpsc::channel::<Arc<ForgingWork>>(1);
        let (solution_tx, mut solution_rx) = mpsc::unbounded_channel();

        let mut worker_senders = Vec::with_capacity(threads);
        let mut hashes = Vec::with_capacity(threads);

        for id in 0..threads {
            let (tx, rx) = std_mpsc::channel();
            let counter = Arc::new(AtomicU64::new(0));
            let worker = ForgingWorker {
                id,
                threads,
                work_rx: rx,
                solution_tx: solution_tx.clone(),
                hashes: counter.clone(),
            };

            thread::Builder::new()
                .name(format!("forging-worker-{}", id))
                .spawn(move || worker.run())
                .expect("spawning forging worker");

            worker_senders.push(tx);
            hashes.push(counter);
        }
        drop(solution_tx);

        // fan new work out to every worker; ending this task closes
        // the worker channels and stops the pool
        tokio::spawn(async move {
            while let Some(work) = work_rx.recv().await {
                for sender in &worker_senders {
                    if sender.send(work.clone()).is_err() {
                        return;
                    }
                }
                debug!("forging work for height {}", work.template.header.height);
            }
        });

        // per-worker hashrate, exported once a second
        let stat_counters = hashes.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            loop {
                interval.tick().await;
                let report: Vec<String> = stat_counters
                    .iter()
                    .map(|counter| counter.swap(0, Ordering::Relaxed).to_string())
                    .collect();
                debug!("Hashes/s: {}", report.join(" "));
            }
        });

        // solution publication pipeline
        tokio::spawn(async move {
            while let Some(solution) = solution_rx.recv().await {
                if let Err(e) = publish_solution(
                    solution,
                    &config,
                    &mempool,
                    verifier.as_ref(),
                    create_forging_transactions.as_ref(),
                    &solution_out,
                )
                .await
                {
                    // discarded without penalty, next work arrives promptly
                    error!("error publishing forging solution: {}", e);
                }
            }
        });

        Self {
            work_tx: Some(work_tx),
            hashes,
        }
    }

    /// Replace every worker's current unit with this one
    pub async fn new_work(&self, work: ForgingWork) {
        if let Some(tx) = &self.work_tx {
            let _ = tx.send(Arc::new(work)).await;
        }
    }

    /// Close the work channels; workers exit at the next boundary
    pub fn stop_forging(&mut self) {
        self.work_tx = None;
    }

    // Aggregate hashes since the last stats tick
    pub fn hashes_per_second(&self) -> u64 {
        self.hashes
            .iter()
            .map(|counter| counter.load(Ordering::Relaxed))
            .sum()
    }
}

async fn publish_solution(
    solution: ForgingSolution,
    config: &ForgingConfig,
    mempool: &Mempool,
    verifier: &dyn ZetherVerifier,
    create_forging_transactions: &CreateForgingTransactions,
    solution_out: &mpsc::Sender<BlockComplete>,
) -> Result<(), BlockchainError> {
    // deep clone of the template through the codec
    let mut block = BlockComplete::from_bytes(&solution.work.template.to_bytes())?;
    block.header.staking_nonce = solution.staking_nonce;
    block.header.timestamp = solution.timestamp;
    block.header.staking_amount = solution.account.staking_amount;
    block.header.forger_public_key = solution.account.public_key.clone();

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    if block.header.timestamp + config.stale_timestamp_window.as_secs() < now {
        tokio::time::sleep(config.stale_solution_delay).await;
    }

    let mut txs = mempool.get_next_transactions_to_include(&block.header.prev_hash);
    if let Some(reward) =
        create_forging_transactions(&block, &solution.account, &txs)
    {
        txs.push(Arc::new(reward));
    }

    block.txs = txs;
    block.header.merkle_hash = block.compute_merkle_hash();

    let cancel = CancelToken::new();
    block.bloom_all(verifier, &cancel)?;

    solution_out
        .send(block)
        .await
        .map_err(|_| BlockchainError::Canceled)?;
    Ok(())
}
