//! Reusable per-connection scratch buffers

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

/// Buffers larger than this are shrunk before going back to the pool
const MAX_RETAINED_CAPACITY: usize = 64 * 1024;
const DEFAULT_MAX_IDLE: usize = 64;

/// Read and encode buffers owned by one connection at a time
#[derive(Debug, Default)]
pub struct Scratch {
    pub rx: Vec<u8>,
    pub tx: Vec<u8>,
}

impl Scratch {
    fn reset(&mut self) {
        self.rx.clear();
        self.tx.clear();
        self.rx.shrink_to(MAX_RETAINED_CAPACITY);
        self.tx.shrink_to(MAX_RETAINED_CAPACITY);
    }
}

#[derive(Debug)]
pub struct ScratchPool {
    idle: Mutex<Vec<Scratch>>,
    max_idle: usize,
    allocated: AtomicUsize,
}

impl ScratchPool {
    pub fn new(max_idle: usize) -> Self {
        Self {
            idle: Mutex::new(Vec::new()),
            max_idle,
            allocated: AtomicUsize::new(0),
        }
    }

    /// Take a scratch set out of the pool, allocating one if none is idle.
    /// It is handed back when the guard drops.
    pub fn acquire(&self) -> PooledScratch<'_> {
        let reused = self
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();

        let scratch = reused.unwrap_or_else(|| {
            self.allocated.fetch_add(1, Ordering::Relaxed);
            Scratch::default()
        });

        PooledScratch {
            pool: self,
            scratch,
        }
    }

    /// Number of scratch sets currently parked in the pool
    pub fn idle(&self) -> usize {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Number of scratch sets ever allocated by this pool
    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::Relaxed)
    }

    fn release(&self, mut scratch: Scratch) {
        scratch.reset();
        let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
        if idle.len() < self.max_idle {
            idle.push(scratch);
        }
    }
}

impl Default for ScratchPool {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_IDLE)
    }
}

/// Guard that returns its scratch set to the pool when dropped
pub struct PooledScratch<'a> {
    pool: &'a ScratchPool,
    scratch: Scratch,
}

impl Deref for PooledScratch<'_> {
    type Target = Scratch;

    fn deref(&self) -> &Scratch {
        &self.scratch
    }
}

impl DerefMut for PooledScratch<'_> {
    fn deref_mut(&mut self) -> &mut Scratch {
        &mut self.scratch
    }
}

impl Drop for PooledScratch<'_> {
    fn drop(&mut self) {
        self.pool.release(std::mem::take(&mut self.scratch));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scratch_is_recycled() {
        let pool = ScratchPool::default();

        {
            let mut scratch = pool.acquire();
            scratch.rx.extend_from_slice(b"request");
            scratch.tx.extend_from_slice(b"response");
            assert_eq!(pool.idle(), 0);
        }
        assert_eq!(pool.idle(), 1);

        let scratch = pool.acquire();
        assert!(scratch.rx.is_empty());
        assert!(scratch.tx.is_empty());
        assert_eq!(pool.allocated(), 1);
    }

    #[test]
    fn test_concurrent_holders_get_distinct_sets() {
        let pool = ScratchPool::default();

        let first = pool.acquire();
        let second = pool.acquire();
        assert_eq!(pool.allocated(), 2);

        drop(first);
        drop(second);
        assert_eq!(pool.idle(), 2);
    }

    #[test]
    fn test_max_idle_bounds_pool() {
        let pool = ScratchPool::new(1);

        let a = pool.acquire();
        let b = pool.acquire();
        drop(a);
        drop(b);

        assert_eq!(pool.idle(), 1);
    }

    #[test]
    fn test_oversized_buffers_are_shrunk() {
        let pool = ScratchPool::default();

        {
            let mut scratch = pool.acquire();
            scratch.rx.resize(4 * MAX_RETAINED_CAPACITY, 0);
        }

        let scratch = pool.acquire();
        assert!(scratch.rx.capacity() <= MAX_RETAINED_CAPACITY);
    }

    #[test]
    fn test_released_on_panic() {
        let pool = ScratchPool::default();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _scratch = pool.acquire();
            panic!("handler blew up");
        }));

        assert!(result.is_err());
        assert_eq!(pool.idle(), 1);
    }
}
