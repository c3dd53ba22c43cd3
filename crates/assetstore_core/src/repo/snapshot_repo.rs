//! Snapshot repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Append new versions of media packages.
//! - Read snapshots and per-package version statistics.
//! - Remove single snapshots by identity.
//!
//! # Invariants
//! - Versions come from `version_counters`, so a removed latest version is
//!   never reissued.
//! - `remove_snapshot` is idempotent.
//! - Listing order is `media_package_id ASC, version ASC`.

use crate::model::snapshot::{
    validate_owner, MediaPackageId, Snapshot, SnapshotPayload, Version, FIRST_VERSION,
};
use crate::query::predicate::Predicate;
use crate::query::view::StoreView;
use crate::repo::{bool_to_int, ensure_schema_ready, int_to_bool, RepoError, RepoResult};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeMap;

const SNAPSHOT_SELECT_SQL: &str = "SELECT
    media_package_id,
    version,
    owner,
    payload_ref,
    archived,
    archived_at
FROM snapshots";

/// Version bookkeeping of one media package across all owners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionStats {
    /// Highest version currently stored.
    pub latest: Version,
    /// Number of versions currently stored.
    pub count: u32,
}

/// Repository interface for versioned snapshots.
pub trait SnapshotRepository {
    /// Stores the next version of `media_package_id`.
    fn insert_snapshot(
        &self,
        media_package_id: &MediaPackageId,
        owner: &str,
        payload: &SnapshotPayload,
    ) -> RepoResult<Snapshot>;
    /// Loads one snapshot by identity.
    fn get_snapshot(
        &self,
        media_package_id: &MediaPackageId,
        version: Version,
    ) -> RepoResult<Option<Snapshot>>;
    /// Lists every snapshot of one owner.
    fn list_owner_snapshots(&self, owner: &str) -> RepoResult<Vec<Snapshot>>;
    /// Lists the owner's snapshots of one package.
    fn list_owner_package_snapshots(
        &self,
        owner: &str,
        media_package_id: &MediaPackageId,
    ) -> RepoResult<Vec<Snapshot>>;
    /// Version statistics for every package that has a snapshot of `owner`.
    fn owner_version_stats(&self, owner: &str)
        -> RepoResult<BTreeMap<MediaPackageId, VersionStats>>;
    /// Returns the owner's snapshots matching `predicate`.
    fn find_snapshots(&self, owner: &str, predicate: &Predicate) -> RepoResult<Vec<Snapshot>>;
    /// Removes one snapshot. Returns whether it existed.
    fn remove_snapshot(&self, media_package_id: &MediaPackageId, version: Version)
        -> RepoResult<bool>;
    /// Number of stored versions of one package.
    fn versions_of(&self, media_package_id: &MediaPackageId) -> RepoResult<u32>;
    /// Highest stored version of one package.
    fn latest_version(&self, media_package_id: &MediaPackageId) -> RepoResult<Option<Version>>;
}

/// SQLite-backed snapshot repository.
pub struct SqliteSnapshotRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteSnapshotRepository<'conn> {
    /// Creates repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_schema_ready(conn)?;
        Ok(Self { conn })
    }
}

impl SnapshotRepository for SqliteSnapshotRepository<'_> {
    fn insert_snapshot(
        &self,
        media_package_id: &MediaPackageId,
        owner: &str,
        payload: &SnapshotPayload,
    ) -> RepoResult<Snapshot> {
        media_package_id.validate()?;
        let owner = validate_owner(owner)?;
        payload.validate()?;

        self.conn.execute(
            "INSERT INTO version_counters (media_package_id, last_version)
             VALUES (?1, ?2)
             ON CONFLICT(media_package_id)
             DO UPDATE SET last_version = last_version + 1;",
            params![media_package_id.as_str(), FIRST_VERSION],
        )?;
        let version: Version = self.conn.query_row(
            "SELECT last_version FROM version_counters WHERE media_package_id = ?1;",
            [media_package_id.as_str()],
            |row| row.get(0),
        )?;

        self.conn.execute(
            "INSERT INTO snapshots (
                media_package_id,
                version,
                owner,
                payload_ref,
                archived
            ) VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                media_package_id.as_str(),
                version,
                owner,
                payload.reference.trim(),
                bool_to_int(payload.archived),
            ],
        )?;

        self.get_snapshot(media_package_id, version)?
            .ok_or_else(|| {
                RepoError::InvalidData(format!(
                    "snapshot {media_package_id}@{version} missing after insert"
                ))
            })
    }

    fn get_snapshot(
        &self,
        media_package_id: &MediaPackageId,
        version: Version,
    ) -> RepoResult<Option<Snapshot>> {
        let mut stmt = self.conn.prepare(&format!(
            "{SNAPSHOT_SELECT_SQL}
             WHERE media_package_id = ?1
               AND version = ?2;"
        ))?;
        let mut rows = stmt.query(params![media_package_id.as_str(), version])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_snapshot_row(row)?));
        }
        Ok(None)
    }

    fn list_owner_snapshots(&self, owner: &str) -> RepoResult<Vec<Snapshot>> {
        let owner = validate_owner(owner)?;
        let mut stmt = self.conn.prepare(&format!(
            "{SNAPSHOT_SELECT_SQL}
             WHERE owner = ?1
             ORDER BY media_package_id ASC, version ASC;"
        ))?;
        let mut rows = stmt.query([owner])?;
        let mut snapshots = Vec::new();
        while let Some(row) = rows.next()? {
            snapshots.push(parse_snapshot_row(row)?);
        }
        Ok(snapshots)
    }

    fn list_owner_package_snapshots(
        &self,
        owner: &str,
        media_package_id: &MediaPackageId,
    ) -> RepoResult<Vec<Snapshot>> {
        let owner = validate_owner(owner)?;
        let mut stmt = self.conn.prepare(&format!(
            "{SNAPSHOT_SELECT_SQL}
             WHERE owner = ?1
               AND media_package_id = ?2
             ORDER BY version ASC;"
        ))?;
        let mut rows = stmt.query(params![owner, media_package_id.as_str()])?;
        let mut snapshots = Vec::new();
        while let Some(row) = rows.next()? {
            snapshots.push(parse_snapshot_row(row)?);
        }
        Ok(snapshots)
    }

    fn owner_version_stats(
        &self,
        owner: &str,
    ) -> RepoResult<BTreeMap<MediaPackageId, VersionStats>> {
        let owner = validate_owner(owner)?;
        let mut stmt = self.conn.prepare(
            "SELECT
                s.media_package_id AS media_package_id,
                MAX(s.version) AS latest,
                COUNT(*) AS version_count
             FROM snapshots s
             WHERE s.media_package_id IN (
                SELECT DISTINCT media_package_id FROM snapshots WHERE owner = ?1
             )
             GROUP BY s.media_package_id;",
        )?;
        let mut rows = stmt.query([owner])?;
        let mut stats = BTreeMap::new();
        while let Some(row) = rows.next()? {
            let id: String = row.get("media_package_id")?;
            stats.insert(
                MediaPackageId::new(id),
                VersionStats {
                    latest: row.get("latest")?,
                    count: row.get("version_count")?,
                },
            );
        }
        Ok(stats)
    }

    fn find_snapshots(&self, owner: &str, predicate: &Predicate) -> RepoResult<Vec<Snapshot>> {
        let view = StoreView::load_for(self.conn, owner, predicate)?;
        Ok(view.select(predicate))
    }

    fn remove_snapshot(
        &self,
        media_package_id: &MediaPackageId,
        version: Version,
    ) -> RepoResult<bool> {
        let changed = self.conn.execute(
            "DELETE FROM snapshots
             WHERE media_package_id = ?1
               AND version = ?2;",
            params![media_package_id.as_str(), version],
        )?;
        Ok(changed > 0)
    }

    fn versions_of(&self, media_package_id: &MediaPackageId) -> RepoResult<u32> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM snapshots WHERE media_package_id = ?1;",
            [media_package_id.as_str()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn latest_version(&self, media_package_id: &MediaPackageId) -> RepoResult<Option<Version>> {
        let latest = self
            .conn
            .query_row(
                "SELECT MAX(version) FROM snapshots WHERE media_package_id = ?1;",
                [media_package_id.as_str()],
                |row| row.get::<_, Option<Version>>(0),
            )
            .optional()?;
        Ok(latest.flatten())
    }
}

fn parse_snapshot_row(row: &Row<'_>) -> RepoResult<Snapshot> {
    let id_text: String = row.get("media_package_id")?;
    let media_package_id = MediaPackageId::new(id_text);
    media_package_id.validate().map_err(|_| {
        RepoError::InvalidData("empty media_package_id in snapshots".to_string())
    })?;

    let version: Version = row.get("version")?;
    if version < FIRST_VERSION {
        return Err(RepoError::InvalidData(format!(
            "invalid version `{version}` in snapshots.version"
        )));
    }

    Ok(Snapshot {
        media_package_id,
        version,
        owner: row.get("owner")?,
        payload_ref: row.get("payload_ref")?,
        archived: int_to_bool(row.get("archived")?, "snapshots.archived")?,
        archived_at: row.get("archived_at")?,
    })
}
