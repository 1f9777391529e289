//! Concurrent memoized factory keyed by string.
//!
//! `SingletonMap` guarantees exactly-once construction per key across
//! concurrent callers: the first caller for a key runs the builder, later
//! callers for the same key block until construction completes and receive
//! the same result. A builder failure is cached for the key for the
//! remainder of the scan; subsequent lookups re-surface the same failure
//! without retrying.
//!
//! # Contract
//!
//! - The builder runs outside the map lock, so builders may re-enter the map
//!   under a *different* key (the canonical-path retry does exactly this).
//! - Re-entering under the same key from its own builder deadlocks; the
//!   path resolver's idempotence rules that out for this crate's keys.

use std::sync::{Arc, Condvar, Mutex};

use ahash::AHashMap;

use crate::errors::OpenError;
use crate::log::ScanLog;

#[derive(Debug)]
enum SlotState<V> {
    Building,
    Done(Result<V, Arc<OpenError>>),
}

#[derive(Debug)]
struct Slot<V> {
    state: Mutex<SlotState<V>>,
    ready: Condvar,
}

/// Concurrent map from key to a once-constructed value.
///
/// `V` is expected to be cheap to clone (the scan stores element ids and
/// `Arc` handles in these maps).
#[derive(Debug)]
pub struct SingletonMap<V> {
    slots: Mutex<AHashMap<String, Arc<Slot<V>>>>,
}

impl<V: Clone> SingletonMap<V> {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(AHashMap::new()),
        }
    }

    /// Returns the value for `key`, running `build` exactly once per key.
    ///
    /// Concurrent callers for the same key block until the first caller's
    /// build completes. Both success and failure are cached.
    pub fn get<F>(&self, key: &str, log: &ScanLog, build: F) -> Result<V, Arc<OpenError>>
    where
        F: FnOnce(&str, &ScanLog) -> Result<V, OpenError>,
    {
        let (slot, is_builder) = {
            let mut slots = self.slots.lock().expect("singleton map poisoned");
            match slots.get(key) {
                Some(slot) => (Arc::clone(slot), false),
                None => {
                    let slot = Arc::new(Slot {
                        state: Mutex::new(SlotState::Building),
                        ready: Condvar::new(),
                    });
                    slots.insert(key.to_string(), Arc::clone(&slot));
                    (slot, true)
                }
            }
        };

        if is_builder {
            // A panicking builder must still complete the slot, or waiters
            // would block forever on the condvar.
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                build(key, log).map_err(Arc::new)
            }));
            let result = match outcome {
                Ok(result) => result,
                Err(payload) => {
                    let err: Result<V, Arc<OpenError>> = Err(Arc::new(OpenError::Io(
                        std::io::Error::other("builder panicked"),
                    )));
                    let mut state = slot.state.lock().expect("singleton slot poisoned");
                    *state = SlotState::Done(err);
                    slot.ready.notify_all();
                    std::panic::resume_unwind(payload);
                }
            };
            let mut state = slot.state.lock().expect("singleton slot poisoned");
            *state = SlotState::Done(result.clone());
            slot.ready.notify_all();
            return result;
        }

        let mut state = slot.state.lock().expect("singleton slot poisoned");
        loop {
            match &*state {
                SlotState::Done(result) => return result.clone(),
                SlotState::Building => {
                    state = slot
                        .ready
                        .wait(state)
                        .expect("singleton slot poisoned");
                }
            }
        }
    }

    /// Returns the cached value for `key` without constructing, if present
    /// and complete.
    pub fn peek(&self, key: &str) -> Option<Result<V, Arc<OpenError>>> {
        let slot = {
            let slots = self.slots.lock().expect("singleton map poisoned");
            slots.get(key).map(Arc::clone)?
        };
        let state = slot.state.lock().expect("singleton slot poisoned");
        match &*state {
            SlotState::Done(result) => Some(result.clone()),
            SlotState::Building => None,
        }
    }

    /// Number of keys ever requested (built, building, or failed).
    pub fn len(&self) -> usize {
        self.slots.lock().expect("singleton map poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<V: Clone> Default for SingletonMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn builds_once_per_key_under_contention() {
        let map = SingletonMap::new();
        let builds = AtomicUsize::new(0);
        thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    let value = map
                        .get("key", &ScanLog::disabled(), |_, _| {
                            builds.fetch_add(1, Ordering::SeqCst);
                            Ok(42u32)
                        })
                        .expect("build succeeds");
                    assert_eq!(value, 42);
                });
            }
        });
        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn failure_is_cached_and_not_retried() {
        let map: SingletonMap<u32> = SingletonMap::new();
        let builds = AtomicUsize::new(0);
        let build = |_: &str, _: &ScanLog| {
            builds.fetch_add(1, Ordering::SeqCst);
            Err(OpenError::NotFound {
                path: "/missing".to_string(),
            })
        };
        let first = map.get("k", &ScanLog::disabled(), build);
        let second = map.get("k", &ScanLog::disabled(), build);
        assert!(first.is_err());
        assert!(second.is_err());
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn builder_may_reenter_under_different_key() {
        let map = SingletonMap::new();
        let value = map
            .get("alias", &ScanLog::disabled(), |_, log| {
                map.get("canonical", log, |_, _| Ok(7u32))
                    .map_err(|_| OpenError::NotFound {
                        path: "canonical".to_string(),
                    })
            })
            .expect("nested build succeeds");
        assert_eq!(value, 7);
        assert_eq!(map.len(), 2);
    }
}
