//! The one critical section shared by the UI and audio threads
//!
//! Everything the replayer and the UI mutate on the engine (voices, tempo,
//! playback state) goes through [`CriticalSection::with_lock`]. The audio
//! callback takes the same lock once per device buffer.
//!
//! # Held-time budget
//!
//! The audio thread blocks while another thread holds the lock, so a closure
//! passed to `with_lock` must be constant-time field updates: no I/O, no
//! allocation, no drawing, no waiting on other locks. Anything longer can
//! push the callback past its deadline and is a correctness bug, not a
//! performance one. Snapshot data for display is read from the sync queues
//! instead, which need no lock at all.

use std::sync::{Arc, Mutex, MutexGuard};

/// Shared, mutex-protected state with closure-scoped access.
pub struct CriticalSection<T> {
    inner: Arc<Mutex<T>>,
}

impl<T> CriticalSection<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(Mutex::new(value)),
        }
    }

    /// Run `f` with exclusive access.
    ///
    /// A panic on another thread while holding the lock does not wedge the
    /// audio path; the state is used as the panicking thread left it.
    pub fn with_lock<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.lock();
        f(&mut guard)
    }

    /// Like [`with_lock`](Self::with_lock), but gives up instead of waiting.
    ///
    /// Returns `None` when the lock is held elsewhere.
    pub fn try_with_lock<R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let mut guard = match self.inner.try_lock() {
            Ok(guard) => guard,
            Err(std::sync::TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(std::sync::TryLockError::WouldBlock) => return None,
        };
        Some(f(&mut guard))
    }

    fn lock(&self) -> MutexGuard<'_, T> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<T> Clone for CriticalSection<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Default> Default for CriticalSection<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_lock_returns_value() {
        let section = CriticalSection::new(vec![1, 2, 3]);
        let sum: i32 = section.with_lock(|v| {
            v.push(4);
            v.iter().sum()
        });
        assert_eq!(sum, 10);
        assert_eq!(section.with_lock(|v| v.len()), 4);
    }

    #[test]
    fn test_clones_share_state() {
        let section = CriticalSection::new(0u32);
        let other = section.clone();
        other.with_lock(|n| *n = 7);
        assert_eq!(section.with_lock(|n| *n), 7);
    }

    #[test]
    fn test_try_with_lock_while_held() {
        let section = CriticalSection::new(1);
        let other = section.clone();
        let inner = section.with_lock(|_| other.try_with_lock(|n| *n));
        assert_eq!(inner, None);
        assert_eq!(other.try_with_lock(|n| *n), Some(1));
    }

    #[test]
    fn test_survives_poisoning() {
        let section = CriticalSection::new(5);
        let other = section.clone();
        let result = std::thread::spawn(move || {
            other.with_lock(|n| {
                *n = 6;
                panic!("poison the lock");
            })
        })
        .join();
        assert!(result.is_err());
        assert_eq!(section.with_lock(|n| *n), 6);
    }

    #[test]
    fn test_concurrent_increments() {
        let section = CriticalSection::new(0u64);
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let section = section.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        section.with_lock(|n| *n += 1);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(section.with_lock(|n| *n), 4000);
    }
}
