//! Single-flight registry: at most one job per fingerprint at a time.
//!
//! The guard is taken at admission, travels with the job through the queue,
//! and is released when the job is dropped after cleanup (or when enqueue
//! fails). Two jobs for the same triple therefore never touch the same local
//! paths concurrently and never upload twice.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::domain::Fingerprint;

#[derive(Debug, Clone, Default)]
pub struct InFlight {
    active: Arc<Mutex<HashSet<Fingerprint>>>,
}

fn lock(set: &Mutex<HashSet<Fingerprint>>) -> MutexGuard<'_, HashSet<Fingerprint>> {
    // the set stays consistent even if a holder panicked
    set.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `fingerprint`. `None` if another job already holds it.
    pub fn try_acquire(&self, fingerprint: &Fingerprint) -> Option<FlightGuard> {
        let inserted = lock(&self.active).insert(fingerprint.clone());
        inserted.then(|| FlightGuard {
            active: Arc::clone(&self.active),
            fingerprint: fingerprint.clone(),
        })
    }

    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        lock(&self.active).contains(fingerprint)
    }

    pub fn len(&self) -> usize {
        lock(&self.active).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.active).is_empty()
    }
}

/// Releases its fingerprint on drop.
#[derive(Debug)]
pub struct FlightGuard {
    active: Arc<Mutex<HashSet<Fingerprint>>>,
    fingerprint: Fingerprint,
}

impl FlightGuard {
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        lock(&self.active).remove(&self.fingerprint);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp(url: &str) -> Fingerprint {
        Fingerprint::derive(url, 100, 80)
    }

    #[test]
    fn second_acquire_fails_until_guard_dropped() {
        let inflight = InFlight::new();
        let a = fp("http://host/cat.jpg");

        let guard = inflight.try_acquire(&a).unwrap();
        assert!(inflight.try_acquire(&a).is_none());
        assert!(inflight.contains(&a));

        drop(guard);
        assert!(!inflight.contains(&a));
        assert!(inflight.try_acquire(&a).is_some());
    }

    #[test]
    fn different_fingerprints_do_not_block_each_other() {
        let inflight = InFlight::new();
        let _a = inflight.try_acquire(&fp("http://host/a.jpg")).unwrap();
        let _b = inflight.try_acquire(&fp("http://host/b.jpg")).unwrap();
        assert_eq!(inflight.len(), 2);
    }

    #[test]
    fn concurrent_acquires_have_one_winner() {
        let inflight = InFlight::new();
        let a = fp("http://host/cat.jpg");

        let guards: Vec<_> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| s.spawn(|| inflight.try_acquire(&a)))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(guards.iter().filter(|g| g.is_some()).count(), 1);
    }
}
