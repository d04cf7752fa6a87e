//! Resource Lock Coordinator: per-PID mutual exclusion for multi-step operations.
//!
//! The graph store has no transactions spanning partitions, so every
//! lifecycle and link operation holds an exclusive lock on each PID URI it
//! touches from its first decision-making read until its last write.
//!
//! - Acquisition never blocks: a held lock fails fast with [`LockError::Locked`].
//! - Multi-PID acquisition goes in lexicographic PID order.
//! - Locks are released when the [`LockSet`] drops, on every exit path.

use std::collections::BTreeSet;
use std::time::Instant;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::error::{LockError, LockResult};
use crate::pid::PidUri;

#[derive(Debug, Clone)]
struct Holder {
    operation: &'static str,
    since: Instant,
}

/// Registry of currently locked PID URIs.
#[derive(Debug, Default)]
pub struct LockCoordinator {
    held: DashMap<PidUri, Holder>,
}

impl LockCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock every PID in `pids` for `operation`, or none of them.
    pub fn acquire<'a, I>(&self, operation: &'static str, pids: I) -> LockResult<LockSet<'_>>
    where
        I: IntoIterator<Item = &'a PidUri>,
    {
        let mut set = LockSet {
            coordinator: self,
            operation,
            held: Vec::new(),
        };
        set.extend(pids)?;
        Ok(set)
    }

    pub fn is_locked(&self, pid_uri: &PidUri) -> bool {
        self.held.contains_key(pid_uri)
    }

    /// Number of PIDs currently locked.
    pub fn len(&self) -> usize {
        self.held.len()
    }

    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }

    fn try_lock(&self, pid_uri: &PidUri, operation: &'static str) -> LockResult<()> {
        match self.held.entry(pid_uri.clone()) {
            Entry::Occupied(entry) => {
                let holder = entry.get();
                tracing::warn!(
                    pid = %pid_uri,
                    requested_by = operation,
                    held_by = holder.operation,
                    held_ms = holder.since.elapsed().as_millis() as u64,
                    "resource locked"
                );
                Err(LockError::Locked {
                    pid_uri: pid_uri.to_string(),
                    held_by: holder.operation.to_string(),
                })
            }
            Entry::Vacant(entry) => {
                entry.insert(Holder {
                    operation,
                    since: Instant::now(),
                });
                Ok(())
            }
        }
    }

    fn release(&self, pid_uri: &PidUri) {
        self.held.remove(pid_uri);
    }
}

/// Locks held by one operation; released on drop.
#[derive(Debug)]
pub struct LockSet<'a> {
    coordinator: &'a LockCoordinator,
    operation: &'static str,
    held: Vec<PidUri>,
}

impl LockSet<'_> {
    /// Lock additional PIDs, skipping those this set already holds.
    ///
    /// On failure the PIDs acquired by this call are released again; locks
    /// held before the call stay held.
    pub fn extend<'p, I>(&mut self, pids: I) -> LockResult<()>
    where
        I: IntoIterator<Item = &'p PidUri>,
    {
        let wanted: BTreeSet<&PidUri> = pids
            .into_iter()
            .filter(|pid| !self.held.contains(*pid))
            .collect();

        let mut acquired = Vec::with_capacity(wanted.len());
        for pid in wanted {
            if let Err(e) = self.coordinator.try_lock(pid, self.operation) {
                for pid in &acquired {
                    self.coordinator.release(pid);
                }
                return Err(e);
            }
            acquired.push(pid.clone());
        }
        self.held.extend(acquired);
        Ok(())
    }

    pub fn holds(&self, pid_uri: &PidUri) -> bool {
        self.held.contains(pid_uri)
    }

    pub fn pids(&self) -> &[PidUri] {
        &self.held
    }
}

impl Drop for LockSet<'_> {
    fn drop(&mut self) {
        for pid in &self.held {
            self.coordinator.release(pid);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(s: &str) -> PidUri {
        PidUri::parse(s).unwrap()
    }

    #[test]
    fn second_acquire_fails_fast() {
        let locks = LockCoordinator::new();
        let a = pid("pid:42");
        let _held = locks.acquire("publish", [&a]).unwrap();
        let err = locks.acquire("mark-deleted", [&a]).unwrap_err();
        assert!(matches!(err, LockError::Locked { ref held_by, .. } if held_by == "publish"));
    }

    #[test]
    fn drop_releases() {
        let locks = LockCoordinator::new();
        let a = pid("pid:1");
        {
            let _held = locks.acquire("edit", [&a]).unwrap();
            assert!(locks.is_locked(&a));
        }
        assert!(!locks.is_locked(&a));
        assert!(locks.is_empty());
    }

    #[test]
    fn multi_acquire_is_sorted_and_all_or_nothing() {
        let locks = LockCoordinator::new();
        let (a, b, c) = (pid("pid:a"), pid("pid:b"), pid("pid:c"));

        let set = locks.acquire("link", [&c, &a]).unwrap();
        assert_eq!(set.pids(), &[a.clone(), c.clone()]);

        let err = locks.acquire("link", [&b, &c]);
        assert!(err.is_err());
        // b was taken before c failed and must be released again.
        assert!(!locks.is_locked(&b));
        drop(set);
        assert!(locks.is_empty());
    }

    #[test]
    fn extend_skips_held_and_keeps_existing_on_failure() {
        let locks = LockCoordinator::new();
        let (a, b, c) = (pid("pid:a"), pid("pid:b"), pid("pid:c"));
        let _other = locks.acquire("publish", [&c]).unwrap();

        let mut set = locks.acquire("chain", [&a]).unwrap();
        set.extend([&a, &b]).unwrap();
        assert!(set.holds(&b));

        assert!(set.extend([&c]).is_err());
        assert!(set.holds(&a) && set.holds(&b));
        assert_eq!(locks.len(), 3);
    }

    #[test]
    fn concurrent_acquirers_exclude_each_other() {
        use std::sync::Arc;
        use std::sync::atomic::{AtomicUsize, Ordering};

        const THREADS: usize = 8;
        let locks = Arc::new(LockCoordinator::new());
        let wins = Arc::new(AtomicUsize::new(0));
        let attempts = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(std::sync::Barrier::new(THREADS));
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let locks = Arc::clone(&locks);
                let wins = Arc::clone(&wins);
                let attempts = Arc::clone(&attempts);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    let target = pid("pid:shared");
                    barrier.wait();
                    let result = locks.acquire("race", [&target]);
                    attempts.fetch_add(1, Ordering::SeqCst);
                    if let Ok(set) = result {
                        wins.fetch_add(1, Ordering::SeqCst);
                        // Hold until every thread has tried.
                        while attempts.load(Ordering::SeqCst) < THREADS {
                            std::thread::yield_now();
                        }
                        drop(set);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(wins.load(Ordering::SeqCst), 1);
        assert!(locks.is_empty());
    }
}
