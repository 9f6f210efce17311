use std::sync::{
    atomic::{AtomicU64, Ordering},
    mpsc::{Receiver, TryRecvError},
    Arc,
};
use tokio::sync::mpsc::UnboundedSender;
use veil_common::{
    block::{compute_kernel_hash, kernel_meets_target, BlockComplete},
    crypto::CompressedPublicKey,
};
use primitive_types::U256;

/// Nonces hashed between two cancellation checks
pub const HASH_BATCH: u64 = 4096;

/// Staker eligible for this work unit, with the stake weight read at
/// the tip the template builds on
#[derive(Clone, Debug)]
pub struct StakingAccount {
    pub public_key: CompressedPublicKey,
    pub staking_amount: u64,
}

/// One attempt description: template for the next block, the target
/// and the stakers to try
pub struct ForgingWork {
    pub template: BlockComplete,
    pub target: U256,
    pub accounts: Vec<StakingAccount>,
}

/// A staking nonce satisfying the target, found by one worker
pub struct ForgingSolution {
    pub work: Arc<ForgingWork>,
    pub staking_nonce: u64,
    pub timestamp: u64,
    pub account: StakingAccount,
}

/// CPU-bound worker scanning a disjoint slice of the nonce space:
/// worker `i` of `n` owns the nonces congruent to `i` mod `n`. New
/// work replaces the current unit at the next batch boundary; a
/// closed channel ends the thread.
pub(crate) struct ForgingWorker {
    pub id: usize,
    pub threads: usize,
    pub work_rx: Receiver<Arc<ForgingWork>>,
    pub solution_tx: UnboundedSender<ForgingSolution>,
    pub hashes: Arc<AtomicU64>,
}

impl ForgingWorker {
    pub fn run(self) {
        let Ok(mut work) = self.work_rx.recv() else {
            return;
        };
        let mut nonce = self.id as u64;

        loop {
            // replace-last: only the newest pending unit matters
            loop {
                match self.work_rx.try_recv() {
                    Ok(new_work) => {
                        work = new_work;
                        nonce = self.id as u64;
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => return,
                }
            }

            if let Some(solution) = self.scan_batch(&work, &mut nonce) {
                if self.solution_tx.send(solution).is_err() {
                    return;
                }

                // stop work on the solved unit, block for the next
                match self.work_rx.recv() {
                    Ok(new_work) => {
                        work = new_work;
                        nonce = self.id as u64;
                    }
                    Err(_) => return,
                }
            }
        }
    }

    // One batch of nonces over every staking account
    fn scan_batch(&self, work: &Arc<ForgingWork>, nonce: &mut u64) -> Option<ForgingSolution> {
        let header = &work.template.header;
        let mut hashed = 0u64;
        let mut solution = None;

        'batch: for _ in 0..HASH_BATCH {
            for account in &work.accounts {
                let kernel = compute_kernel_hash(
                    &header.prev_kernel_hash,
                    header.timestamp,
                    &account.public_key,
                    *nonce,
                );
                hashed += 1;

                if kernel_meets_target(&kernel, account.staking_amount, &work.target) {
                    solution = Some(ForgingSolution {
                        work: work.clone(),
                        staking_nonce: *nonce,
                        timestamp: header.timestamp,
                        account: account.clone(),
                    });
                    break 'batch;
                }
            }
            *nonce = nonce.wrapping_add(self.threads as u64);
        }

        // stats only, relaxed is enough
        self.hashes.fetch_add(hashed, Ordering::Relaxed);
        solution
    }
}
