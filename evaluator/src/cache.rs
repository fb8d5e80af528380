// cache.rs — Fingerprint-keyed cache of compiled units
//
// Shared by every caller of one evaluator. Each access carries the type
// system's current generation checksum; when it moves past the last observed
// generation the whole cache is dropped before the access proceeds.
//
// Preconditions: generations passed in come from one monotonic counter.
// Postconditions: no entry stored under generation G is ever returned to an
//                 access made under a different generation.
// Failure modes: none; a poisoned lock is recovered since entries are
//                immutable `Arc`s and the state is always consistent.
// Side effects: clears all entries on generation change (logged).

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};

use tracing::{debug, info};

use crate::fingerprint::Fingerprint;

struct CacheState<T> {
    observed: Option<u64>,
    entries: HashMap<Fingerprint, Arc<T>>,
}

/// Whether an access may use the cache contents as they stand.
enum Freshness {
    Current,
    /// The caller read its generation before a newer one was observed.
    Stale,
}

impl<T> CacheState<T> {
    /// Adopt `generation`, clearing everything if it is newer.
    fn sync(&mut self, generation: u64) -> Freshness {
        match self.observed.map(|seen| generation.cmp(&seen)) {
            Some(Ordering::Equal) => Freshness::Current,
            Some(Ordering::Less) => Freshness::Stale,
            Some(Ordering::Greater) | None => {
                if !self.entries.is_empty() {
                    info!(
                        entries = self.entries.len(),
                        from = ?self.observed,
                        to = generation,
                        "type system generation changed; dropping compiled units"
                    );
                }
                self.entries.clear();
                self.observed = Some(generation);
                Freshness::Current
            }
        }
    }
}

/// Process-wide cache of compiled units, keyed by snippet fingerprint.
pub struct FingerprintCache<T> {
    state: RwLock<CacheState<T>>,
}

impl<T> Default for FingerprintCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> FingerprintCache<T> {
    pub fn new() -> Self {
        FingerprintCache {
            state: RwLock::new(CacheState {
                observed: None,
                entries: HashMap::new(),
            }),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, CacheState<T>> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Look up `fingerprint` as seen at `generation`.
    pub fn get(&self, fingerprint: &Fingerprint, generation: u64) -> Option<Arc<T>> {
        {
            let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
            if state.observed == Some(generation) {
                return state.entries.get(fingerprint).cloned();
            }
        }
        // Generation moved: clear and look up under one write lock so no
        // reader sees a half-invalidated cache.
        let mut state = self.write();
        match state.sync(generation) {
            Freshness::Current => state.entries.get(fingerprint).cloned(),
            Freshness::Stale => None,
        }
    }

    /// Store `unit` under `fingerprint`, replacing any previous entry.
    ///
    /// Dropped if `generation` is older than the last observed one: the unit
    /// was compiled against a type system that no longer exists.
    pub fn put(&self, fingerprint: Fingerprint, unit: Arc<T>, generation: u64) {
        let mut state = self.write();
        match state.sync(generation) {
            Freshness::Current => {
                debug!(unit = %fingerprint.unit_name(), generation, "caching compiled unit");
                state.entries.insert(fingerprint, unit);
            }
            Freshness::Stale => {
                debug!(
                    unit = %fingerprint.unit_name(),
                    generation,
                    "discarding unit compiled under an outdated generation"
                );
            }
        }
    }

    pub fn clear(&self) {
        self.write().entries.clear();
    }

    pub fn len(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Last generation any access synchronized to.
    pub fn observed_generation(&self) -> Option<u64> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .observed
    }
}
