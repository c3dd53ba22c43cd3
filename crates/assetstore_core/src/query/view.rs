//! Consistent read of one owner's slice of the store.
//!
//! # Responsibility
//! - Hold the snapshots, per-package version statistics and properties that
//!   one query evaluates against.
//!
//! # Invariants
//! - All three parts come from the same connection state; callers load the
//!   view inside the transaction that later applies removals.
//! - Version statistics cover every stored version of a package, including
//!   versions of other owners.

use crate::model::property::{PropertyName, PropertyValue};
use crate::model::snapshot::{MediaPackageId, Snapshot, Version};
use crate::query::predicate::{EvaluationContext, Predicate};
use crate::repo::property_repo::{PropertyRepository, SqlitePropertyRepository};
use crate::repo::snapshot_repo::{SnapshotRepository, SqliteSnapshotRepository, VersionStats};
use crate::repo::RepoResult;
use rusqlite::Connection;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Default)]
pub struct StoreView {
    snapshots: Vec<Snapshot>,
    stats: BTreeMap<MediaPackageId, VersionStats>,
    properties: HashMap<MediaPackageId, HashMap<PropertyName, PropertyValue>>,
}

impl StoreView {
    /// Builds a view from already loaded parts.
    pub fn new(
        snapshots: Vec<Snapshot>,
        stats: BTreeMap<MediaPackageId, VersionStats>,
        properties: impl IntoIterator<Item = (MediaPackageId, PropertyName, PropertyValue)>,
    ) -> Self {
        let mut by_package: HashMap<MediaPackageId, HashMap<PropertyName, PropertyValue>> =
            HashMap::new();
        for (id, name, value) in properties {
            by_package.entry(id).or_default().insert(name, value);
        }
        Self {
            snapshots,
            stats,
            properties: by_package,
        }
    }

    /// Reads the owner's snapshots, statistics and properties from `conn`.
    pub fn load(conn: &Connection, owner: &str) -> RepoResult<Self> {
        let snapshot_repo = SqliteSnapshotRepository::try_new(conn)?;
        let property_repo = SqlitePropertyRepository::try_new(conn)?;

        let snapshots = snapshot_repo.list_owner_snapshots(owner)?;
        let stats = snapshot_repo.owner_version_stats(owner)?;
        let properties = property_repo
            .list_owner_properties(owner)?
            .into_iter()
            .map(|property| (property.media_package_id, property.name, property.value));

        Ok(Self::new(snapshots, stats, properties))
    }

    /// Like `load`, but reads only the packages `predicate` can match.
    ///
    /// Predicates that pin package ids skip the owner-wide scan.
    pub fn load_for(conn: &Connection, owner: &str, predicate: &Predicate) -> RepoResult<Self> {
        let Some(ids) = predicate.pinned_media_package_ids() else {
            return Self::load(conn, owner);
        };
        let snapshot_repo = SqliteSnapshotRepository::try_new(conn)?;
        let property_repo = SqlitePropertyRepository::try_new(conn)?;

        let mut snapshots = Vec::new();
        let mut stats = BTreeMap::new();
        let mut properties = Vec::new();
        for id in ids {
            let owned = snapshot_repo.list_owner_package_snapshots(owner, &id)?;
            let Some(latest) = snapshot_repo.latest_version(&id)? else {
                continue;
            };
            if owned.is_empty() {
                continue;
            }
            let count = snapshot_repo.versions_of(&id)?;
            properties.extend(
                property_repo
                    .list_properties(&id)?
                    .into_iter()
                    .map(|property| (property.media_package_id, property.name, property.value)),
            );
            stats.insert(id, VersionStats { latest, count });
            snapshots.extend(owned);
        }

        Ok(Self::new(snapshots, stats, properties))
    }

    pub fn snapshots(&self) -> &[Snapshot] {
        &self.snapshots
    }

    pub fn stats(&self, media_package_id: &MediaPackageId) -> Option<VersionStats> {
        self.stats.get(media_package_id).copied()
    }

    /// Number of stored versions before any mutation of this query.
    pub fn versions_of(&self, media_package_id: &MediaPackageId) -> u32 {
        self.stats(media_package_id).map_or(0, |stats| stats.count)
    }

    /// Owner's snapshots satisfying `predicate`, in view order.
    pub fn select(&self, predicate: &Predicate) -> Vec<Snapshot> {
        self.snapshots
            .iter()
            .filter(|snapshot| predicate.evaluate(snapshot, self))
            .cloned()
            .collect()
    }

    pub fn count(&self, predicate: &Predicate) -> usize {
        self.snapshots
            .iter()
            .filter(|snapshot| predicate.evaluate(snapshot, self))
            .count()
    }
}

impl EvaluationContext for StoreView {
    fn latest_version(&self, media_package_id: &MediaPackageId) -> Option<Version> {
        self.stats(media_package_id).map(|stats| stats.latest)
    }

    fn property_value(
        &self,
        media_package_id: &MediaPackageId,
        name: &PropertyName,
    ) -> Option<&PropertyValue> {
        self.properties.get(media_package_id)?.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::StoreView;
    use crate::db::open_db_in_memory;
    use crate::model::property::PropertyName;
    use crate::model::snapshot::{MediaPackageId, SnapshotPayload};
    use crate::query::predicate::Predicate;
    use crate::repo::property_repo::{PropertyRepository, SqlitePropertyRepository};
    use crate::repo::snapshot_repo::{SnapshotRepository, SqliteSnapshotRepository};

    #[test]
    fn pinned_load_matches_full_load() {
        let conn = open_db_in_memory().unwrap();
        let snapshots = SqliteSnapshotRepository::try_new(&conn).unwrap();
        let properties = SqlitePropertyRepository::try_new(&conn).unwrap();
        let agent = PropertyName::new("org", "agent");
        for (id, versions) in [("a", 3), ("b", 2), ("c", 1)] {
            let id = MediaPackageId::new(id);
            for _ in 0..versions {
                snapshots
                    .insert_snapshot(&id, "org", &SnapshotPayload::new("p.xml"))
                    .unwrap();
            }
            properties
                .upsert_property(&agent.property(&id, "agent-1"))
                .unwrap();
        }
        snapshots
            .insert_snapshot(
                &MediaPackageId::new("b"),
                "other",
                &SnapshotPayload::new("p.xml"),
            )
            .unwrap();

        let predicate = Predicate::MediaPackageIdEquals(MediaPackageId::new("a"))
            .or(Predicate::MediaPackageIdEquals(MediaPackageId::new("b")))
            .and(Predicate::VersionIsLatest)
            .and(Predicate::PropertyExists(agent));
        let full = StoreView::load(&conn, "org").unwrap();
        let pinned = StoreView::load_for(&conn, "org", &predicate).unwrap();

        assert_eq!(pinned.snapshots().len(), 5);
        assert_eq!(pinned.select(&predicate), full.select(&predicate));
        let b = MediaPackageId::new("b");
        assert_eq!(pinned.versions_of(&b), 3);
        assert_eq!(pinned.stats(&b), full.stats(&b));
    }

    #[test]
    fn pinned_load_skips_unknown_and_foreign_packages() {
        let conn = open_db_in_memory().unwrap();
        let snapshots = SqliteSnapshotRepository::try_new(&conn).unwrap();
        snapshots
            .insert_snapshot(
                &MediaPackageId::new("x"),
                "other",
                &SnapshotPayload::new("p.xml"),
            )
            .unwrap();

        let predicate = Predicate::MediaPackageIdEquals(MediaPackageId::new("x"))
            .or(Predicate::MediaPackageIdEquals(MediaPackageId::new("missing")));
        let view = StoreView::load_for(&conn, "org", &predicate).unwrap();
        assert!(view.snapshots().is_empty());
        assert_eq!(view.versions_of(&MediaPackageId::new("x")), 0);
    }
}
