//! Per-media-package exclusive locks.
//!
//! # Responsibility
//! - Serialize mutations that target the same media package.
//!
//! # Invariants
//! - A guard owns every id it was acquired for until dropped.
//! - Ids are acquired all at once, so two callers never hold parts of each
//!   other's sets (no lock-order deadlock).
//! - Callers with disjoint id sets never wait on each other.

use crate::model::snapshot::MediaPackageId;
use parking_lot::{Condvar, Mutex};
use std::collections::{BTreeSet, HashSet};

#[derive(Debug, Default)]
pub struct EntityLocks {
    held: Mutex<HashSet<MediaPackageId>>,
    released: Condvar,
}

impl EntityLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks until every id in `ids` is free, then takes all of them.
    pub fn acquire<I>(&self, ids: I) -> EntityLockGuard<'_>
    where
        I: IntoIterator<Item = MediaPackageId>,
    {
        let ids: BTreeSet<MediaPackageId> = ids.into_iter().collect();
        let mut held = self.held.lock();
        while ids.iter().any(|id| held.contains(id)) {
            self.released.wait(&mut held);
        }
        held.extend(ids.iter().cloned());
        EntityLockGuard { locks: self, ids }
    }

    pub fn is_locked(&self, id: &MediaPackageId) -> bool {
        self.held.lock().contains(id)
    }
}

/// Releases its ids on drop.
#[derive(Debug)]
pub struct EntityLockGuard<'a> {
    locks: &'a EntityLocks,
    ids: BTreeSet<MediaPackageId>,
}

impl EntityLockGuard<'_> {
    pub fn covers(&self, id: &MediaPackageId) -> bool {
        self.ids.contains(id)
    }

    pub fn ids(&self) -> &BTreeSet<MediaPackageId> {
        &self.ids
    }
}

impl Drop for EntityLockGuard<'_> {
    fn drop(&mut self) {
        let mut held = self.locks.held.lock();
        for id in &self.ids {
            held.remove(id);
        }
        drop(held);
        self.locks.released.notify_all();
    }
}
