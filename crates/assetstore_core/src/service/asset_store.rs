//! Asset store facade.
//!
//! # Responsibility
//! - Own the storage connection, per-package locks and change notifier.
//! - Execute queries built by `QueryBuilder` and deliver resulting events.
//! - Provide snapshot and property write entry points.
//!
//! # Invariants
//! - Every storage statement group runs in one transaction under the
//!   connection guard, so readers see a delete fully applied or not at all.
//! - Mutations hold the locks of every package they touch from selection
//!   until their events have been delivered.
//! - Handler failures never roll back the mutation that produced the events.

use crate::config::{ConfigError, StoreConfig};
use crate::db::{open_db_with, DbError};
use crate::model::event::AssetEvent;
use crate::model::property::{Property, PropertyName, PropertyValue};
use crate::model::snapshot::{
    MediaPackageId, ModelValidationError, Snapshot, SnapshotPayload, Version,
};
use crate::notify::notifier::{AssetEventHandler, ChangeNotifier, DeliveryFailure, NotifierError};
use crate::query::builder::{QueryBuilder, QueryPlan};
use crate::query::executor::{deletion_events, plan_deletion, DeleteOutcome};
use crate::query::view::StoreView;
use crate::repo::property_repo::{PropertyRepository, SqlitePropertyRepository};
use crate::repo::snapshot_repo::{SnapshotRepository, SqliteSnapshotRepository};
use crate::repo::RepoError;
use crate::service::entity_locks::EntityLocks;
use log::{debug, info, warn};
use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};
use rusqlite::Connection;
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Instant;

pub type StoreResult<T> = Result<T, StoreError>;

/// Mutation that was committed before its events were delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommittedMutation {
    SnapshotTaken(Snapshot),
    Deleted(DeleteOutcome),
}

impl CommittedMutation {
    /// Snapshots removed by the mutation (0 for inserts).
    pub fn removed(&self) -> usize {
        match self {
            Self::SnapshotTaken(_) => 0,
            Self::Deleted(outcome) => outcome.removed,
        }
    }

    /// Events derived from the mutation, in delivery order.
    pub fn events(&self) -> Vec<AssetEvent> {
        match self {
            Self::SnapshotTaken(snapshot) => vec![created_event(snapshot)],
            Self::Deleted(outcome) => outcome.events.clone(),
        }
    }
}

/// Summary attached to `StoreError::HandlerFailures`.
///
/// The mutation described here has been committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub mutation: CommittedMutation,
    pub failures: Vec<DeliveryFailure>,
}

#[derive(Debug)]
pub enum StoreError {
    /// Query rejected before touching storage.
    InvalidQuery(ModelValidationError),
    Config(ConfigError),
    /// Storage failure; the operation was rolled back and nothing was emitted.
    Repo(RepoError),
    Notifier(NotifierError),
    /// Mutation committed, but at least one handler failed.
    HandlerFailures(DeliveryReport),
    Closed,
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidQuery(err) => write!(f, "invalid query: {err}"),
            Self::Config(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
            Self::Notifier(err) => write!(f, "{err}"),
            Self::HandlerFailures(report) => {
                write!(
                    f,
                    "{} handler delivery failure(s) after committed mutation",
                    report.failures.len()
                )?;
                if let Some(first) = report.failures.first() {
                    write!(f, "; first: {first}")?;
                }
                Ok(())
            }
            Self::Closed => write!(f, "asset store is closed"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidQuery(err) => Some(err),
            Self::Config(err) => Some(err),
            Self::Repo(err) => Some(err),
            Self::Notifier(err) => Some(err),
            Self::HandlerFailures(report) => report
                .failures
                .first()
                .map(|failure| &failure.error as &(dyn Error + 'static)),
            Self::Closed => None,
        }
    }
}

impl From<RepoError> for StoreError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Repo(RepoError::Db(value))
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Repo(RepoError::from(value))
    }
}

impl From<NotifierError> for StoreError {
    fn from(value: NotifierError) -> Self {
        Self::Notifier(value)
    }
}

impl From<ConfigError> for StoreError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

/// Versioned media package store with synchronous change notification.
pub struct AssetStore {
    conn: Mutex<Option<Connection>>,
    locks: EntityLocks,
    notifier: ChangeNotifier,
    config: StoreConfig,
}

impl AssetStore {
    /// Opens (and migrates) the database described by `config`.
    pub fn open(config: StoreConfig) -> StoreResult<Self> {
        config.validate()?;
        let conn = open_db_with(&config.db_target(), config.busy_timeout())?;
        info!(
            "event=store_open module=store status=ok policy={:?}",
            config.event_policy
        );
        Ok(Self {
            conn: Mutex::new(Some(conn)),
            locks: EntityLocks::new(),
            notifier: ChangeNotifier::new(),
            config,
        })
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Self::open(StoreConfig::in_memory())
    }

    /// Closes the connection. Later operations fail with `StoreError::Closed`.
    pub fn close(&self) -> StoreResult<()> {
        let Some(conn) = self.conn.lock().take() else {
            return Ok(());
        };
        conn.close().map_err(|(_, err)| StoreError::from(err))?;
        info!("event=store_close module=store status=ok");
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.conn.lock().is_some()
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Registers a handler at the end of the delivery order.
    pub fn add_event_handler(&self, handler: Arc<dyn AssetEventHandler>) -> StoreResult<()> {
        self.notifier.register(handler)?;
        Ok(())
    }

    pub fn remove_event_handler(&self, name: &str) -> bool {
        self.notifier.unregister(name)
    }

    pub fn event_handler_names(&self) -> Vec<String> {
        self.notifier.handler_names()
    }

    /// Starts a query scoped to `owner`.
    pub fn create_query(&self, owner: impl Into<String>) -> QueryBuilder<'_> {
        QueryBuilder::new(self, owner)
    }

    /// Stores the next version of `media_package_id` and emits `EntityCreated`.
    pub fn take_snapshot(
        &self,
        media_package_id: &MediaPackageId,
        owner: &str,
        payload: &SnapshotPayload,
    ) -> StoreResult<Snapshot> {
        let _guard = self.locks.acquire([media_package_id.clone()]);

        let snapshot = {
            let mut conn = self.connection()?;
            let tx = conn.transaction()?;
            let snapshot = SqliteSnapshotRepository::try_new(&tx)?.insert_snapshot(
                media_package_id,
                owner,
                payload,
            )?;
            tx.commit()?;
            snapshot
        };
        info!(
            "event=snapshot_take module=store status=ok media_package_id={} version={}",
            snapshot.media_package_id, snapshot.version
        );

        let failures = self.notifier.deliver(&created_event(&snapshot));
        finish(snapshot, failures, CommittedMutation::SnapshotTaken)
    }

    pub fn get_snapshot(
        &self,
        media_package_id: &MediaPackageId,
        version: Version,
    ) -> StoreResult<Option<Snapshot>> {
        let conn = self.connection()?;
        Ok(SqliteSnapshotRepository::try_new(&conn)?.get_snapshot(media_package_id, version)?)
    }

    /// Upserts a property of an existing media package.
    ///
    /// Returns `false` without writing when the package has no snapshot.
    pub fn set_property(&self, property: &Property) -> StoreResult<bool> {
        property.validate().map_err(RepoError::from)?;
        let _guard = self.locks.acquire([property.media_package_id.clone()]);
        let conn = self.connection()?;

        let exists = SqliteSnapshotRepository::try_new(&conn)?
            .latest_version(&property.media_package_id)?
            .is_some();
        if !exists {
            debug!(
                "event=property_set module=store status=skipped reason=unknown_media_package media_package_id={}",
                property.media_package_id
            );
            return Ok(false);
        }

        SqlitePropertyRepository::try_new(&conn)?.upsert_property(property)?;
        debug!(
            "event=property_set module=store status=ok media_package_id={} property={}",
            property.media_package_id, property.name
        );
        Ok(true)
    }

    pub fn get_property(
        &self,
        media_package_id: &MediaPackageId,
        name: &PropertyName,
    ) -> StoreResult<Option<PropertyValue>> {
        let conn = self.connection()?;
        Ok(SqlitePropertyRepository::try_new(&conn)?.get_property(media_package_id, name)?)
    }

    pub fn list_properties(
        &self,
        media_package_id: &MediaPackageId,
    ) -> StoreResult<Vec<Property>> {
        let conn = self.connection()?;
        Ok(SqlitePropertyRepository::try_new(&conn)?.list_properties(media_package_id)?)
    }

    /// Removes properties of one package, optionally only one namespace.
    pub fn delete_properties(
        &self,
        media_package_id: &MediaPackageId,
        namespace: Option<&str>,
    ) -> StoreResult<usize> {
        let _guard = self.locks.acquire([media_package_id.clone()]);
        let conn = self.connection()?;
        let removed = SqlitePropertyRepository::try_new(&conn)?
            .delete_properties(media_package_id, namespace)?;
        Ok(removed)
    }

    pub(crate) fn execute_select(&self, plan: &QueryPlan) -> StoreResult<Vec<Snapshot>> {
        plan.validate().map_err(StoreError::InvalidQuery)?;
        let selection = {
            let mut conn = self.connection()?;
            let tx = conn.transaction()?;
            let selection = SqliteSnapshotRepository::try_new(&tx)?
                .find_snapshots(&plan.owner, &plan.predicate)?;
            tx.commit()?;
            selection
        };
        debug!(
            "event=query_select module=query status=ok matched={}",
            selection.len()
        );
        Ok(selection)
    }

    pub(crate) fn execute_count(&self, plan: &QueryPlan) -> StoreResult<usize> {
        plan.validate().map_err(StoreError::InvalidQuery)?;
        let count = self.load_view(plan)?.count(&plan.predicate);
        debug!("event=query_count module=query status=ok matched={count}");
        Ok(count)
    }

    pub(crate) fn execute_delete(&self, plan: &QueryPlan) -> StoreResult<DeleteOutcome> {
        plan.validate().map_err(StoreError::InvalidQuery)?;
        let started_at = Instant::now();

        let mut candidates: BTreeSet<MediaPackageId> =
            match plan.predicate.pinned_media_package_ids() {
                Some(ids) => ids,
                None => self
                    .load_view(plan)?
                    .select(&plan.predicate)
                    .into_iter()
                    .map(|snapshot| snapshot.media_package_id)
                    .collect(),
            };

        loop {
            let guard = self.locks.acquire(candidates.iter().cloned());

            let applied = {
                let mut conn = self.connection()?;
                let tx = conn.transaction()?;
                let view = StoreView::load_for(&tx, &plan.owner, &plan.predicate)?;
                let selection = view.select(&plan.predicate);

                let unlocked: Vec<MediaPackageId> = selection
                    .iter()
                    .map(|snapshot| &snapshot.media_package_id)
                    .filter(|id| !guard.covers(id))
                    .cloned()
                    .collect();
                if unlocked.is_empty() {
                    let affected = plan_deletion(&view, &selection);
                    let snapshot_repo = SqliteSnapshotRepository::try_new(&tx)?;
                    let property_repo = SqlitePropertyRepository::try_new(&tx)?;
                    for entity in &affected {
                        for version in &entity.removed_versions {
                            if !snapshot_repo.remove_snapshot(&entity.media_package_id, *version)? {
                                return Err(StoreError::Repo(RepoError::InvalidData(format!(
                                    "snapshot {}@{version} vanished during delete",
                                    entity.media_package_id
                                ))));
                            }
                        }
                        if entity.is_exhausted() {
                            property_repo.delete_properties(&entity.media_package_id, None)?;
                        }
                    }
                    drop(snapshot_repo);
                    drop(property_repo);
                    tx.commit()?;
                    Some((selection.len(), affected))
                } else {
                    debug!(
                        "event=query_delete module=query status=retry newly_matched={}",
                        unlocked.len()
                    );
                    candidates.extend(unlocked);
                    None
                }
            };

            let Some((removed, affected)) = applied else {
                continue;
            };

            let events = deletion_events(&affected, self.config.event_policy);
            info!(
                "event=query_delete module=query status=ok removed={} entities={} exhausted={} events={} duration_ms={}",
                removed,
                affected.len(),
                affected.iter().filter(|entity| entity.is_exhausted()).count(),
                events.len(),
                started_at.elapsed().as_millis()
            );
            let failures = self.notifier.deliver_all(&events);
            drop(guard);

            let outcome = DeleteOutcome {
                removed,
                affected,
                events,
            };
            return finish(outcome, failures, CommittedMutation::Deleted);
        }
    }

    fn load_view(&self, plan: &QueryPlan) -> StoreResult<StoreView> {
        let mut conn = self.connection()?;
        let tx = conn.transaction()?;
        let view = StoreView::load_for(&tx, &plan.owner, &plan.predicate)?;
        tx.commit()?;
        Ok(view)
    }

    fn connection(&self) -> StoreResult<MappedMutexGuard<'_, Connection>> {
        MutexGuard::try_map(self.conn.lock(), Option::as_mut).map_err(|_| StoreError::Closed)
    }
}

fn created_event(snapshot: &Snapshot) -> AssetEvent {
    AssetEvent::EntityCreated {
        media_package_id: snapshot.media_package_id.clone(),
        version: snapshot.version,
    }
}

fn finish<T>(
    value: T,
    failures: Vec<DeliveryFailure>,
    committed: impl FnOnce(T) -> CommittedMutation,
) -> StoreResult<T> {
    if failures.is_empty() {
        return Ok(value);
    }
    let mutation = committed(value);
    warn!(
        "event=mutation_notify module=store status=error removed={} failures={}",
        mutation.removed(),
        failures.len()
    );
    Err(StoreError::HandlerFailures(DeliveryReport { mutation, failures }))
}
