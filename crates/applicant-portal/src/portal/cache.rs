use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::debug;

use super::domain::{ApplicationStatus, Principal};

#[derive(Debug, Clone)]
struct CachedStatus {
    status: ApplicationStatus,
    fetched_at: Instant,
}

/// Invalidation count observed before a status fetch.
///
/// A fetch may only populate the cache if no invalidation for the principal
/// happened while it was in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusGeneration(u64);

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<Principal, CachedStatus>,
    invalidations: HashMap<Principal, u64>,
    clears: u64,
}

impl CacheState {
    fn generation(&self, principal: &Principal) -> StatusGeneration {
        let own = self.invalidations.get(principal).copied().unwrap_or(0);
        StatusGeneration(own.wrapping_add(self.clears))
    }
}

/// Short-lived read cache for application status, keyed by principal.
///
/// Entries older than the TTL are treated as absent. Mutations invalidate explicitly;
/// there is no background eviction.
#[derive(Debug)]
pub struct StatusCache {
    ttl: Duration,
    state: Mutex<CacheState>,
}

impl StatusCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get(&self, principal: &Principal) -> Option<ApplicationStatus> {
        let mut state = self.lock();
        match state.entries.get(principal) {
            Some(cached) if cached.fetched_at.elapsed() < self.ttl => Some(cached.status.clone()),
            Some(_) => {
                state.entries.remove(principal);
                None
            }
            None => None,
        }
    }

    /// Read before fetching from the backend; pass to [`StatusCache::put_if_current`].
    pub fn generation(&self, principal: &Principal) -> StatusGeneration {
        self.lock().generation(principal)
    }

    pub fn put(&self, principal: &Principal, status: ApplicationStatus) {
        let generation = self.generation(principal);
        self.put_if_current(principal, generation, status);
    }

    /// Stores `status` unless the principal was invalidated after `generation` was read.
    pub fn put_if_current(
        &self,
        principal: &Principal,
        generation: StatusGeneration,
        status: ApplicationStatus,
    ) -> bool {
        if self.ttl.is_zero() {
            return false;
        }
        let mut state = self.lock();
        if state.generation(principal) != generation {
            debug!(%principal, "discarding status fetched before invalidation");
            return false;
        }
        state.entries.insert(
            principal.clone(),
            CachedStatus {
                status,
                fetched_at: Instant::now(),
            },
        );
        true
    }

    pub fn invalidate(&self, principal: &Principal) {
        let mut state = self.lock();
        let counter = state.invalidations.entry(principal.clone()).or_insert(0);
        *counter = counter.wrapping_add(1);
        if state.entries.remove(principal).is_some() {
            debug!(%principal, "application status invalidated");
        }
    }

    pub fn clear(&self) {
        let mut state = self.lock();
        state.entries.clear();
        state.clears = state.clears.wrapping_add(1);
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
