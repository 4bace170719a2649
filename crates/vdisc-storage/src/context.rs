use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{StorageError, StorageResult};

/// Cancellation and deadline carried through driver calls.
///
/// Clones share the cancel flag, so canceling any clone cancels them all.
/// Drivers call [`Context::check`] before each I/O; there is no preemption.
#[derive(Clone, Debug, Default)]
pub struct Context {
    deadline: Option<Instant>,
    canceled: Arc<AtomicBool>,
}

impl Context {
    /// A context that never expires and is only canceled explicitly.
    pub fn background() -> Self {
        Self::default()
    }

    /// A context that expires at `deadline`.
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            canceled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A context that expires `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// Derive a child sharing this context's cancel flag, with the earlier
    /// of the two deadlines.
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(d) if d < candidate => d,
            _ => candidate,
        };
        Self {
            deadline: Some(deadline),
            canceled: Arc::clone(&self.canceled),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Cancel this context and every clone of it.
    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }

    /// Fail with `Canceled` or `DeadlineExceeded` if the context is done.
    pub fn check(&self) -> StorageResult<()> {
        if self.is_canceled() {
            return Err(StorageError::Canceled);
        }
        match self.deadline {
            Some(d) if Instant::now() >= d => Err(StorageError::DeadlineExceeded),
            _ => Ok(()),
        }
    }
}
