//! Domain change events.
//!
//! # Invariants
//! - One `EntityCreated` per stored snapshot.
//! - `EntityDeleted` is emitted only when a delete removed every remaining
//!   version of the media package.

use crate::model::snapshot::{MediaPackageId, Version};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Event delivered to registered handlers after a mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AssetEvent {
    /// A new snapshot (version) was taken.
    EntityCreated {
        media_package_id: MediaPackageId,
        version: Version,
    },
    /// One version was removed while other versions remain.
    SnapshotDeleted {
        media_package_id: MediaPackageId,
        version: Version,
    },
    /// The last remaining versions were removed.
    EntityDeleted { media_package_id: MediaPackageId },
}

impl AssetEvent {
    pub fn media_package_id(&self) -> &MediaPackageId {
        match self {
            Self::EntityCreated {
                media_package_id, ..
            }
            | Self::SnapshotDeleted {
                media_package_id, ..
            }
            | Self::EntityDeleted { media_package_id } => media_package_id,
        }
    }

    pub fn kind(&self) -> AssetEventKind {
        match self {
            Self::EntityCreated { .. } => AssetEventKind::EntityCreated,
            Self::SnapshotDeleted { .. } => AssetEventKind::SnapshotDeleted,
            Self::EntityDeleted { .. } => AssetEventKind::EntityDeleted,
        }
    }
}

/// Discriminant of `AssetEvent`, handy for counting and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AssetEventKind {
    EntityCreated,
    SnapshotDeleted,
    EntityDeleted,
}

impl AssetEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::EntityCreated => "entity_created",
            Self::SnapshotDeleted => "snapshot_deleted",
            Self::EntityDeleted => "entity_deleted",
        }
    }
}

impl Display for AssetEventKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
