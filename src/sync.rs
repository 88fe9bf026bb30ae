//! Synchronization primitives shared by the background workers.
//!
//! - [`Semaphore`] caps how many git subprocesses run at once.
//! - [`CancellationToken`] lets a superseded request tell its in-flight work
//!   that the result is no longer wanted.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

/// Counting semaphore with RAII permits.
///
/// Acquisition is all-or-nothing: a caller either holds exactly one permit or
/// is blocked waiting for one. The permit is returned when the guard drops,
/// including when the holder panics.
#[derive(Debug)]
pub struct Semaphore {
    permits: Mutex<usize>,
    available: Condvar,
    capacity: usize,
}

impl Semaphore {
    pub fn new(permits: usize) -> Self {
        Self {
            permits: Mutex::new(permits),
            available: Condvar::new(),
            capacity: permits,
        }
    }

    /// Block until a permit is free, then take it.
    pub fn acquire(&self) -> SemaphorePermit<'_> {
        let mut permits = self.lock();
        while *permits == 0 {
            permits = self
                .available
                .wait(permits)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *permits -= 1;
        SemaphorePermit { semaphore: self }
    }

    /// Take a permit if one is free right now.
    pub fn try_acquire(&self) -> Option<SemaphorePermit<'_>> {
        let mut permits = self.lock();
        if *permits == 0 {
            return None;
        }
        *permits -= 1;
        Some(SemaphorePermit { semaphore: self })
    }

    /// Number of permits currently free.
    pub fn available(&self) -> usize {
        *self.lock()
    }

    /// Total number of permits this semaphore was created with.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn release(&self) {
        let mut permits = self.lock();
        *permits += 1;
        drop(permits);
        self.available.notify_one();
    }

    fn lock(&self) -> MutexGuard<'_, usize> {
        self.permits.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A held semaphore permit; released on drop.
#[must_use = "the permit is released as soon as it is dropped"]
#[derive(Debug)]
pub struct SemaphorePermit<'a> {
    semaphore: &'a Semaphore,
}

impl Drop for SemaphorePermit<'_> {
    fn drop(&mut self) {
        self.semaphore.release();
    }
}

/// Cooperative cancellation flag shared between a requester and its worker.
///
/// Cancelling never interrupts running work. Workers check
/// [`is_cancelled`](Self::is_cancelled) before starting and again before
/// publishing a result.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
