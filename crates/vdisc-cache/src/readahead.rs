use std::sync::{Arc, Mutex};
use std::thread;

use tokio::sync::Semaphore;
use tracing::{debug, trace};
use vdisc_storage::ObjectRef;

use crate::slicer::Slicer;

struct State {
    expected_next: u64,
    run_len: u64,
    next_block: u64,
}

/// Sequential-access detector for one object.
///
/// Each real read reports `(off, n)`. While reads stay contiguous the run
/// grows, and up to `ceil(run / bsize)` blocks beyond the current one (never
/// more than `window`) are prefetched in the background. Every prefetch holds
/// a token of the shared semaphore; when none is free the prefetch is simply
/// not issued.
pub struct ReadAhead {
    slicer: Arc<dyn Slicer>,
    obj: ObjectRef,
    tokens: Arc<Semaphore>,
    window: u64,
    state: Mutex<State>,
}

impl ReadAhead {
    pub fn new(slicer: Arc<dyn Slicer>, obj: ObjectRef, tokens: Arc<Semaphore>, window: u64) -> Self {
        Self {
            slicer,
            obj,
            tokens,
            window,
            state: Mutex::new(State {
                expected_next: u64::MAX,
                run_len: 0,
                next_block: 0,
            }),
        }
    }

    /// Next block that would be prefetched.
    pub fn next_block(&self) -> u64 {
        self.state.lock().expect("lock poisoned").next_block
    }

    /// Record a completed read and issue prefetches. Returns how many were
    /// issued.
    pub fn update(&self, off: u64, n: usize) -> usize {
        let bsize = self.slicer.bsize();
        if bsize == 0 || n == 0 {
            return 0;
        }
        let size = self.obj.size();
        let n = n as u64;
        let current = (off + n - 1) / bsize;

        let mut state = self.state.lock().expect("lock poisoned");
        if off == state.expected_next {
            state.run_len += n;
        } else {
            state.run_len = n;
            state.next_block = off / bsize + 1;
        }
        state.expected_next = off + n;
        state.next_block = state.next_block.max(current + 1);

        let limit = state.run_len.div_ceil(bsize).min(self.window);
        let mut issued = 0;
        while state.next_block <= current + limit && state.next_block * bsize < size {
            let Ok(permit) = Arc::clone(&self.tokens).try_acquire_owned() else {
                trace!(block = state.next_block, "no read-ahead token free");
                break;
            };
            let block_off = state.next_block * bsize;
            let slice = self.slicer.slice(&self.obj, block_off);
            let spawned = thread::Builder::new()
                .name("vdisc-readahead".into())
                .spawn(move || {
                    if let Err(e) = slice.read_ahead() {
                        debug!(off = block_off, error = %e, "read-ahead failed");
                    }
                    drop(permit);
                });
            if spawned.is_err() {
                break;
            }
            state.next_block += 1;
            issued += 1;
        }
        issued
    }
}

impl std::fmt::Debug for ReadAhead {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadAhead")
            .field("url", &self.obj.url())
            .field("window", &self.window)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryCache;
    use std::time::{Duration, Instant};
    use vdisc_storage::ZeroObject;

    fn wait_for_tokens(tokens: &Semaphore, want: usize) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while tokens.available_permits() != want {
            assert!(Instant::now() < deadline, "read-ahead tokens never returned");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn sequential_reads_grow_the_window() {
        let bsize = 4096u64;
        let obj: ObjectRef = Arc::new(ZeroObject::new(1024 * bsize));
        let slicer: Arc<dyn Slicer> = Arc::new(MemoryCache::new(bsize, 128));
        let tokens = Arc::new(Semaphore::new(64));
        let ra = ReadAhead::new(slicer, obj, Arc::clone(&tokens), 32);

        for i in 0..100u64 {
            ra.update(i * bsize, bsize as usize);
            let ahead = ra.next_block() - (i + 1);
            assert!(ahead <= (i + 1).min(32), "block {i}: {ahead} blocks ahead");
        }
        wait_for_tokens(&tokens, 64);
    }

    #[test]
    fn random_access_prefetches_one_block() {
        let bsize = 100u64;
        let obj: ObjectRef = Arc::new(ZeroObject::new(100 * bsize));
        let slicer: Arc<dyn Slicer> = Arc::new(MemoryCache::new(bsize, 16));
        let tokens = Arc::new(Semaphore::new(8));
        let ra = ReadAhead::new(slicer, obj, Arc::clone(&tokens), 32);

        assert_eq!(ra.update(5_000, 10), 1);
        assert_eq!(ra.next_block(), 52);
        assert_eq!(ra.update(200, 10), 1);
        assert_eq!(ra.next_block(), 4);
        wait_for_tokens(&tokens, 8);
    }

    #[test]
    fn no_tokens_no_prefetch() {
        let bsize = 10u64;
        let obj: ObjectRef = Arc::new(ZeroObject::new(1000));
        let slicer: Arc<dyn Slicer> = Arc::new(MemoryCache::new(bsize, 4));
        let tokens = Arc::new(Semaphore::new(2));
        let held = Arc::clone(&tokens).try_acquire_many_owned(2).unwrap();
        let ra = ReadAhead::new(slicer, obj, Arc::clone(&tokens), 8);

        assert_eq!(ra.update(0, 10), 0);
        assert_eq!(ra.next_block(), 1);
        drop(held);
        assert_eq!(ra.update(10, 10), 2);
        wait_for_tokens(&tokens, 2);
    }

    #[test]
    fn never_past_end() {
        let bsize = 10u64;
        let obj: ObjectRef = Arc::new(ZeroObject::new(30));
        let slicer: Arc<dyn Slicer> = Arc::new(MemoryCache::new(bsize, 4));
        let tokens = Arc::new(Semaphore::new(16));
        let ra = ReadAhead::new(slicer, obj, Arc::clone(&tokens), 8);

        let mut total = 0;
        for off in [0, 10, 20] {
            total += ra.update(off, 10);
        }
        assert_eq!(total, 2);
        wait_for_tokens(&tokens, 16);
    }
}
