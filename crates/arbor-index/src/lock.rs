//! Reentrant per-shard write locks.
//!
//! A thread that already holds a shard lock may acquire it again; the lock
//! is released when the outermost guard drops. Combined with acquiring in
//! ascending [`ShardId`](crate::ShardId) order this lets maintenance code
//! nest `with_all_write_locks` inside a commit on the same thread without
//! deadlocking against itself or other committers.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

use crate::error::{IndexError, IndexResult};

#[derive(Debug, Default)]
pub(crate) struct ShardLock {
    owner: Mutex<Option<(ThreadId, usize)>>,
    released: Condvar,
}

impl ShardLock {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Block until the calling thread holds the lock.
    pub(crate) fn acquire(&self) -> IndexResult<ShardLockGuard<'_>> {
        let me = thread::current().id();
        let mut owner = self.owner.lock().map_err(poisoned)?;
        loop {
            match owner.as_mut() {
                None => {
                    *owner = Some((me, 1));
                    break;
                }
                Some((holder, depth)) if *holder == me => {
                    *depth += 1;
                    break;
                }
                Some(_) => {
                    owner = self.released.wait(owner).map_err(poisoned)?;
                }
            }
        }
        Ok(ShardLockGuard { lock: self })
    }

    /// `true` if the calling thread currently holds the lock.
    pub(crate) fn held_by_current_thread(&self) -> bool {
        let me = thread::current().id();
        matches!(*self.state(), Some((holder, _)) if holder == me)
    }

    fn state(&self) -> MutexGuard<'_, Option<(ThreadId, usize)>> {
        // Release must never fail, so a poisoned state is taken over as is.
        self.owner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release(&self) {
        let mut owner = self.state();
        if let Some((_, depth)) = owner.as_mut() {
            *depth -= 1;
            if *depth == 0 {
                *owner = None;
                self.released.notify_all();
            }
        }
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> IndexError {
    IndexError::LockPoisoned(e.to_string())
}

/// Releases one level of a [`ShardLock`] on drop, including during unwinding.
#[derive(Debug)]
pub(crate) struct ShardLockGuard<'a> {
    lock: &'a ShardLock,
}

impl Drop for ShardLockGuard<'_> {
    fn drop(&mut self) {
        self.lock.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn reentrant_on_same_thread() {
        let lock = ShardLock::new();
        let outer = lock.acquire().unwrap();
        let inner = lock.acquire().unwrap();
        assert!(lock.held_by_current_thread());
        drop(inner);
        assert!(lock.held_by_current_thread());
        drop(outer);
        assert!(!lock.held_by_current_thread());
    }

    #[test]
    fn excludes_other_threads() {
        let lock = Arc::new(ShardLock::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let lock = lock.clone();
                let inside = inside.clone();
                let max_seen = max_seen.clone();
                std::thread::spawn(move || {
                    for _ in 0..20 {
                        let _g = lock.acquire().unwrap();
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_seen.fetch_max(now, Ordering::SeqCst);
                        std::thread::sleep(Duration::from_micros(50));
                        inside.fetch_sub(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn released_when_holder_panics() {
        let lock = Arc::new(ShardLock::new());
        let l2 = lock.clone();
        let result = std::thread::spawn(move || {
            let _g = l2.acquire().unwrap();
            panic!("boom");
        })
        .join();
        assert!(result.is_err());
        let _g = lock.acquire().unwrap();
        assert!(lock.held_by_current_thread());
    }
}
