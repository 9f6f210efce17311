use super::{
    compare_priority, lock_write, AddRequest, MempoolResult, MempoolShared, MempoolTx,
    MempoolWork, SuspendRequest,
};
use crate::core::{state::ApplyState, storage::Store};
use log::{debug, warn};
use std::{
    collections::HashSet,
    sync::Arc,
};
use tokio::sync::{broadcast, mpsc, oneshot};
use veil_common::{config::BLOCK_MAX_SIZE, crypto::Hash};

enum Item {
    // next element of the sorted holdings
    Listed(Arc<MempoolTx>),
    // interleaved admission request
    Added(Arc<MempoolTx>, oneshot::Sender<bool>),
}

/// The single task that owns the speculative overlay. It replays the
/// holdings on every continue signal, evicts what no longer applies,
/// and folds interleaved admission requests into the same state.
pub struct MempoolProcessor {
    pub(crate) storage: Arc<dyn Store>,
    pub(crate) shared: Arc<MempoolShared>,
    pub(crate) suspend_rx: mpsc::Receiver<SuspendRequest>,
    pub(crate) continue_rx: mpsc::Receiver<MempoolWork>,
    pub(crate) add_rx: mpsc::Receiver<AddRequest>,
    pub(crate) added_to_list: broadcast::Sender<Arc<MempoolTx>>,
    pub(crate) removed_from_list: broadcast::Sender<Arc<MempoolTx>>,
}

impl MempoolProcessor {
    pub async fn run(mut self) {
        // holdings, re-sorted at the start of every run
        let mut tx_list: Vec<Arc<MempoolTx>> = Vec::new();

        'outer: loop {
            let work = tokio::select! {
                request = self.suspend_rx.recv() => {
                    match request {
                        // nothing held, acknowledge right away
                        Some(request) => {
                            let _ = request.ack.send(());
                            continue 'outer;
                        }
                        None => return,
                    }
                },
                work = self.continue_rx.recv() => match work {
                    Some(work) => work,
                    None => return,
                },
            };

            tx_list.sort_by(|a, b| compare_priority(a, b));

            // all speculative state is discarded before replay
            {
                let mut result = lock_write(&self.shared.result);
                *result = MempoolResult {
                    chain_height: work.chain_height,
                    chain_hash: work.chain_hash.clone(),
                    txs: Vec::new(),
                    total_size: 0,
                };
            }

            let reader = match self.storage.begin_read() {
                Ok(reader) => reader,
                Err(e) => {
                    warn!("mempool could not open a read snapshot: {}", e);
                    continue 'outer;
                }
            };
            let mut state = ApplyState::new(&*reader);
            let mut seen: HashSet<Hash> = HashSet::new();
            let mut list_index = 0;
            let mut pending_ack: Option<oneshot::Sender<()>> = None;

            // transactions apply at the height the next block will have
            let block_height = work.chain_height + 1;

            'run: loop {
                let item = if list_index < tx_list.len() {
                    // a pending suspension takes priority over replay
                    if let Ok(request) = self.suspend_rx.try_recv() {
                        pending_ack = Some(request.ack);
                        break 'run;
                    }
                    let entry = tx_list[list_index].clone();
                    list_index += 1;
                    Item::Listed(entry)
                } else {
                    tokio::select! {
                        request = self.suspend_rx.recv() => match request {
                            Some(request) => {
                                pending_ack = Some(request.ack);
                                break 'run;
                            }
                            None => return,
                        },
                        request = self.add_rx.recv() => match request {
                            Some(request) => Item::Added(request.entry, request.reply),
                            None => return,
                        },
                    }
                };

                let (entry, reply) = match item {
                    Item::Listed(entry) => (entry, None),
                    Item::Added(entry, reply) => (entry, Some(reply)),
                };

                if !seen.insert(entry.hash.clone()) {
                    if let Some(reply) = reply {
                        let _ = reply.send(false);
                    }
                    continue 'run;
                }

                state.push_layer();
                match entry.tx.include(block_height, &mut state) {
                    Ok(()) => {
                        state.commit();

                        {
                            let mut result = lock_write(&self.shared.result);
                            // transactions past the size cap stay held and
                            // are reconsidered on the next cycle
                            if result.total_size + entry.size < BLOCK_MAX_SIZE {
                                result.total_size += entry.size;
                                result.txs.push(entry.clone());
                            }
                        }

                        if let Some(reply) = reply {
                            tx_list.push(entry.clone());
                            lock_write(&self.shared.txs).insert(entry.hash.clone(), entry.clone());
                            let _ = reply.send(true);
                            let _ = self.added_to_list.send(entry);
                        }
                    }
                    Err(e) => {
                        state.rollback();

                        match reply {
                            Some(reply) => {
                                let _ = reply.send(false);
                            }
                            None => {
                                // no longer applies at this tip: evict
                                debug!("evicting tx {} from mempool: {}", entry.hash, e);
                                tx_list.remove(list_index - 1);
                                list_index -= 1;
                                seen.remove(&entry.hash);
                                lock_write(&self.shared.txs).remove(&entry.hash);
                                let _ = self.removed_from_list.send(entry);
                            }
                        }
                    }
                }
            }

            // relinquish the snapshot before acknowledging suspension
            drop(state);
            drop(reader);
            if let Some(ack) = pending_ack {
                let _ = ack.send(());
            }
        }
    }
}
