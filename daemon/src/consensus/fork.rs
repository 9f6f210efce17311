use primitive_types::U256;
use rand::Rng;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, MutexGuard,
};
use veil_common::{block::BlockComplete, crypto::Hash};

/// A peer connection a fork was advertised on. The tracker only needs
/// liveness; transport details stay outside the core.
pub trait Connection: Send + Sync {
    fn is_closed(&self) -> bool;
}

struct ForkInner<C: Connection> {
    hashes: Vec<Hash>,
    end: u64,
    // next height to download
    current: u64,
    total_difficulty: U256,
    conns: Vec<Arc<C>>,
    blocks: Vec<Arc<BlockComplete>>,
    errors: u32,
}

/// A candidate chain observed from peers: the advertised hashes, the
/// cumulative difficulty, and the connections that can serve it. This
/// drives download scheduling; it never applies blocks itself.
pub struct Fork<C: Connection> {
    pub index: u32,
    pub prev_hash: Hash,
    pub start: u64,
    ready_for_downloading: AtomicBool,
    inner: Mutex<ForkInner<C>>,
}

fn lock<C: Connection>(fork: &Fork<C>) -> MutexGuard<'_, ForkInner<C>> {
    fork.inner.lock().unwrap_or_else(|e| e.into_inner())
}

impl<C: Connection> Fork<C> {
    pub fn new(
        index: u32,
        prev_hash: Hash,
        start: u64,
        end: u64,
        hashes: Vec<Hash>,
        total_difficulty: U256,
        conn: Arc<C>,
    ) -> Self {
        Self {
            index,
            prev_hash,
            start,
            ready_for_downloading: AtomicBool::new(false),
            inner: Mutex::new(ForkInner {
                hashes,
                end,
                current: start,
                total_difficulty,
                conns: vec![conn],
                blocks: Vec::new(),
                errors: 0,
            }),
        }
    }

    pub fn is_ready_for_downloading(&self) -> bool {
        self.ready_for_downloading.load(Ordering::Acquire)
    }

    pub fn set_ready_for_downloading(&self) {
        self.ready_for_downloading.store(true, Ordering::Release);
    }

    pub fn get_end(&self) -> u64 {
        lock(self).end
    }

    pub fn get_current(&self) -> u64 {
        lock(self).current
    }

    // Advance the download cursor, returns the height just taken
    pub fn next_height(&self) -> Option<u64> {
        let mut inner = lock(self);
        if inner.current > inner.end {
            return None;
        }
        let height = inner.current;
        inner.current += 1;
        Some(height)
    }

    pub fn get_total_difficulty(&self) -> U256 {
        lock(self).total_difficulty
    }

    pub fn get_hashes(&self) -> Vec<Hash> {
        lock(self).hashes.clone()
    }

    pub fn add_error(&self) -> u32 {
        let mut inner = lock(self);
        inner.errors += 1;
        inner.errors
    }

    pub fn push_block(&self, block: Arc<BlockComplete>) {
        lock(self).blocks.push(block);
    }

    pub fn take_blocks(&self) -> Vec<Arc<BlockComplete>> {
        std::mem::take(&mut lock(self).blocks)
    }

    /// Absorb another fork that advertises a continuation of this
    /// one. Refused once the other fork started downloading. The
    /// caller is expected to hold the other fork exclusively; this
    /// fork's lock is taken here.
    pub fn merge_fork(&self, other: &Fork<C>) -> bool {
        if other.is_ready_for_downloading() {
            return false;
        }

        let other_inner = lock(other);
        let mut inner = lock(self);

        inner.hashes.extend(other_inner.hashes.iter().cloned());
        inner.end = other_inner.end;
        inner.total_difficulty = other_inner.total_difficulty;

        for conn in &other_inner.conns {
            if !inner.conns.iter().any(|c| Arc::ptr_eq(c, conn)) {
                inner.conns.push(conn.clone());
            }
        }
        true
    }

    pub fn add_conn(&self, conn: Arc<C>) {
        let mut inner = lock(self);
        if !inner.conns.iter().any(|c| Arc::ptr_eq(c, &conn)) {
            inner.conns.push(conn);
        }
    }

    pub fn conn_count(&self) -> usize {
        lock(self).conns.len()
    }

    /// A live connection to download from; closed connections are
    /// evicted lazily as they are drawn.
    pub fn pick_random_connection(&self) -> Option<Arc<C>> {
        let mut inner = lock(self);
        let mut rng = rand::thread_rng();

        while !inner.conns.is_empty() {
            let index = rng.gen_range(0..inner.conns.len());
            if inner.conns[index].is_closed() {
                inner.conns.swap_remove(index);
            } else {
                return Some(inner.conns[index].clone());
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestConn {
        closed: AtomicBool,
    }

    impl TestConn {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                closed: AtomicBool::new(false),
            })
        }

        fn close(&self) {
            self.closed.store(true, Ordering::Release);
        }
    }

    impl Connection for TestConn {
        fn is_closed(&self) -> bool {
            self.closed.load(Ordering::Acquire)
        }
    }

    fn fork(index: u32, start: u64, end: u64, conn: Arc<TestConn>) -> Fork<TestConn> {
        let hashes = (start..=end).map(|i| Hash::new([i as u8; 32])).collect();
        Fork::new(
            index,
            Hash::zero(),
            start,
            end,
            hashes,
            U256::from(end),
            conn,
        )
    }

    #[test]
    fn test_merge_concatenates_and_unions() {
        let conn_a = TestConn::new();
        let conn_b = TestConn::new();

        let a = fork(0, 1, 3, conn_a.clone());
        let b = fork(1, 4, 6, conn_b);
        b.add_conn(conn_a); // shared connection must not duplicate

        assert!(a.merge_fork(&b));
        assert_eq!(a.get_end(), 6);
        assert_eq!(a.get_hashes().len(), 6);
        assert_eq!(a.get_total_difficulty(), U256::from(6));
        assert_eq!(a.conn_count(), 2);
    }

    #[test]
    fn test_merge_refused_when_downloading() {
        let a = fork(0, 1, 3, TestConn::new());
        let b = fork(1, 4, 6, TestConn::new());
        b.set_ready_for_downloading();
        assert!(!a.merge_fork(&b));
    }

    #[test]
    fn test_download_cursor() {
        let f = fork(0, 5, 7, TestConn::new());
        assert_eq!(f.get_current(), 5);
        assert_eq!(f.next_height(), Some(5));
        assert_eq!(f.next_height(), Some(6));
        assert_eq!(f.next_height(), Some(7));
        assert_eq!(f.next_height(), None);
    }

    #[test]
    fn test_pick_random_connection_evicts_closed() {
        let live = TestConn::new();
        let dead = TestConn::new();
        dead.close();

        let f = fork(0, 1, 2, dead);
        f.add_conn(live.clone());

        for _ in 0..8 {
            let picked = f.pick_random_connection().unwrap();
            assert!(!picked.is_closed());
        }
        assert_eq!(f.conn_count(), 1);

        live.close();
        assert!(f.pick_random_connection().is_none());
        assert_eq!(f.conn_count(), 0);
    }
}
