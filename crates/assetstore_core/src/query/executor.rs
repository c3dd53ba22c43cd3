//! Delete planning and event derivation.
//!
//! # Responsibility
//! - Group a selection by media package and decide, per package, whether the
//!   delete exhausts it.
//! - Turn affected packages into the domain events handlers receive.
//!
//! # Invariants
//! - Exhaustion compares removed versions with the version count taken from
//!   the same view the selection came from.
//! - Packages without selected snapshots never produce events.

use crate::model::event::AssetEvent;
use crate::model::snapshot::{MediaPackageId, Snapshot, Version};
use crate::query::view::StoreView;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How per-snapshot events relate to the package event on exhaustion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CascadeEventPolicy {
    /// Exhaustion emits only `EntityDeleted`.
    #[default]
    Collapse,
    /// Exhaustion emits one `SnapshotDeleted` per version, then `EntityDeleted`.
    Expand,
}

/// Whether a delete removed all or some versions of a package.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalScope {
    Exhausted,
    Partial,
}

/// Per-package result of one delete execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AffectedEntity {
    pub media_package_id: MediaPackageId,
    /// Removed versions in ascending order.
    pub removed_versions: Vec<Version>,
    /// Stored versions before the delete started.
    pub versions_before: u32,
    pub scope: RemovalScope,
}

impl AffectedEntity {
    pub fn is_exhausted(&self) -> bool {
        self.scope == RemovalScope::Exhausted
    }
}

/// Result of a delete query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteOutcome {
    /// Number of snapshots removed from storage.
    pub removed: usize,
    pub affected: Vec<AffectedEntity>,
    /// Events delivered to handlers, in delivery order.
    pub events: Vec<AssetEvent>,
}

/// Groups `selection` by package and classifies each group.
pub fn plan_deletion(view: &StoreView, selection: &[Snapshot]) -> Vec<AffectedEntity> {
    let mut grouped: BTreeMap<&MediaPackageId, Vec<Version>> = BTreeMap::new();
    for snapshot in selection {
        grouped
            .entry(&snapshot.media_package_id)
            .or_default()
            .push(snapshot.version);
    }

    grouped
        .into_iter()
        .map(|(id, mut versions)| {
            versions.sort_unstable();
            versions.dedup();
            let versions_before = view.versions_of(id);
            let scope = if versions.len() as u32 >= versions_before {
                RemovalScope::Exhausted
            } else {
                RemovalScope::Partial
            };
            AffectedEntity {
                media_package_id: id.clone(),
                removed_versions: versions,
                versions_before,
                scope,
            }
        })
        .collect()
}

/// Derives the events for `affected` under `policy`.
pub fn deletion_events(affected: &[AffectedEntity], policy: CascadeEventPolicy) -> Vec<AssetEvent> {
    let mut events = Vec::new();
    for entity in affected {
        let per_snapshot = match (entity.scope, policy) {
            (RemovalScope::Partial, _) | (RemovalScope::Exhausted, CascadeEventPolicy::Expand) => {
                true
            }
            (RemovalScope::Exhausted, CascadeEventPolicy::Collapse) => false,
        };
        if per_snapshot {
            events.extend(
                entity
                    .removed_versions
                    .iter()
                    .map(|version| AssetEvent::SnapshotDeleted {
                        media_package_id: entity.media_package_id.clone(),
                        version: *version,
                    }),
            );
        }
        if entity.is_exhausted() {
            events.push(AssetEvent::EntityDeleted {
                media_package_id: entity.media_package_id.clone(),
            });
        }
    }
    events
}
