use std::sync::Mutex;

/// Recycles block-sized buffers between disk-cache fills.
#[derive(Debug)]
pub struct BufferPool {
    bsize: usize,
    max_idle: usize,
    idle: Mutex<Vec<Vec<u8>>>,
}

impl BufferPool {
    pub fn new(bsize: usize, max_idle: usize) -> Self {
        Self {
            bsize,
            max_idle,
            idle: Mutex::new(Vec::new()),
        }
    }

    /// A zeroed buffer of exactly `bsize` bytes.
    pub fn get(&self) -> Vec<u8> {
        let recycled = self.idle.lock().expect("lock poisoned").pop();
        match recycled {
            Some(mut buf) => {
                buf.fill(0);
                buf
            }
            None => vec![0u8; self.bsize],
        }
    }

    /// Return a buffer. Buffers of the wrong size, or beyond the idle limit,
    /// are dropped.
    pub fn put(&self, buf: Vec<u8>) {
        if buf.len() != self.bsize {
            return;
        }
        let mut idle = self.idle.lock().expect("lock poisoned");
        if idle.len() < self.max_idle {
            idle.push(buf);
        }
    }

    pub fn idle_count(&self) -> usize {
        self.idle.lock().expect("lock poisoned").len()
    }
}
