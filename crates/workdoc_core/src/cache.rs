//! Process-level registry of shared work units.

use crate::accessor::{DocumentAccessor, LobDocumentAccessor};
use crate::config::WorkDocConfig;
use crate::location::WorkingStoreLocation;
use crate::workdoc::WorkDoc;
use parking_lot::{Mutex, RawMutex};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

/// Exclusive handle on a cached work unit.
///
/// Dropping the handle checks the work unit back into the cache.
pub type WorkDocCheckout<A = LobDocumentAccessor> =
    parking_lot::lock_api::ArcMutexGuard<RawMutex, WorkDoc<A>>;

/// One shared [`WorkDoc`] per logical document.
///
/// Work units are keyed by [`WorkingStoreLocation::cache_key`]. Checking one
/// out gives exclusive use of it within the process; the row lock taken by
/// `open` still guards against other processes.
#[derive(Debug)]
pub struct WorkDocCache<A: DocumentAccessor = LobDocumentAccessor> {
    config: WorkDocConfig,
    entries: Mutex<HashMap<String, Arc<Mutex<WorkDoc<A>>>>>,
}

impl<A: DocumentAccessor + Default> WorkDocCache<A> {
    /// Creates an empty cache whose work units use `config`.
    #[must_use]
    pub fn new(config: WorkDocConfig) -> Self {
        Self {
            config,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the shared work unit for `location`, creating it if needed.
    pub fn entry(&self, location: WorkingStoreLocation) -> Arc<Mutex<WorkDoc<A>>> {
        let key = location.cache_key();
        let mut entries = self.entries.lock();
        let entry = entries.entry(key).or_insert_with_key(|key| {
            trace!(cache_key = %key, "creating work unit");
            Arc::new(Mutex::new(WorkDoc::with_accessor(
                location,
                A::default(),
                &self.config,
            )))
        });
        Arc::clone(entry)
    }

    /// Checks out the work unit for `location`, waiting while another caller holds it.
    pub fn checkout(&self, location: WorkingStoreLocation) -> WorkDocCheckout<A> {
        self.entry(location).lock_arc()
    }

    /// Checks out the work unit for `location`, waiting at most `timeout`.
    ///
    /// Returns `None` if another caller kept it checked out.
    pub fn try_checkout_for(
        &self,
        location: WorkingStoreLocation,
        timeout: Duration,
    ) -> Option<WorkDocCheckout<A>> {
        self.entry(location).try_lock_arc_for(timeout)
    }

    /// Removes a work unit from the cache, returning true if it was present.
    ///
    /// Callers still holding a checkout keep a usable work unit.
    pub fn evict(&self, cache_key: &str) -> bool {
        self.entries.lock().remove(cache_key).is_some()
    }

    /// Returns the number of cached work units.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl<A: DocumentAccessor + Default> Default for WorkDocCache<A> {
    fn default() -> Self {
        Self::new(WorkDocConfig::default())
    }
}
