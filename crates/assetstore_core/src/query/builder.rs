//! Fluent query construction.
//!
//! # Responsibility
//! - Offer the selector/combinator vocabulary callers use to build predicates.
//! - Bind a predicate, an owner and a terminal action into a single-use query.
//!
//! # Invariants
//! - A query is consumed by `run`; it cannot be executed twice.
//! - Queries without `where_` match every snapshot of the owner.

use crate::model::property::{PropertyName, PropertyValue};
use crate::model::snapshot::{
    validate_owner, MediaPackageId, ModelValidationError, Snapshot, Version,
};
use crate::query::executor::DeleteOutcome;
use crate::query::predicate::Predicate;
use crate::service::asset_store::{AssetStore, StoreResult};
use std::marker::PhantomData;

/// What a query operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Individual snapshot versions.
    Snapshot,
}

/// Owner, target and predicate of one query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryPlan {
    pub owner: String,
    pub target: Target,
    pub predicate: Predicate,
}

impl QueryPlan {
    pub fn validate(&self) -> Result<(), ModelValidationError> {
        validate_owner(&self.owner)?;
        self.predicate.validate()
    }
}

/// Entry point returned by `AssetStore::create_query`.
pub struct QueryBuilder<'store> {
    store: &'store AssetStore,
    owner: String,
}

impl<'store> QueryBuilder<'store> {
    pub(crate) fn new(store: &'store AssetStore, owner: impl Into<String>) -> Self {
        Self {
            store,
            owner: owner.into(),
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn snapshot(&self) -> Target {
        Target::Snapshot
    }

    pub fn always(&self) -> Predicate {
        Predicate::Always
    }

    pub fn media_package_id(&self, id: impl Into<MediaPackageId>) -> Predicate {
        Predicate::MediaPackageIdEquals(id.into())
    }

    pub fn version(&self) -> VersionField {
        VersionField
    }

    pub fn prop(&self, namespace: impl Into<String>, name: impl Into<String>) -> PropertyField {
        PropertyField {
            name: PropertyName::new(namespace, name),
        }
    }

    pub fn property(&self, name: &PropertyName) -> PropertyField {
        PropertyField { name: name.clone() }
    }

    pub fn select(&self, target: Target) -> SelectQuery<'store> {
        self.query(target)
    }

    pub fn delete(&self, target: Target) -> DeleteQuery<'store> {
        self.query(target)
    }

    pub fn count(&self, target: Target) -> CountQuery<'store> {
        self.query(target)
    }

    fn query<A>(&self, target: Target) -> Query<'store, A> {
        Query {
            store: self.store,
            plan: QueryPlan {
                owner: self.owner.clone(),
                target,
                predicate: Predicate::Always,
            },
            _action: PhantomData,
        }
    }
}

/// Version selectors.
#[derive(Debug, Clone, Copy)]
pub struct VersionField;

impl VersionField {
    pub fn is_latest(self) -> Predicate {
        Predicate::VersionIsLatest
    }

    pub fn eq(self, version: Version) -> Predicate {
        Predicate::VersionEquals(version)
    }
}

/// Selectors over one property key.
#[derive(Debug, Clone)]
pub struct PropertyField {
    name: PropertyName,
}

impl PropertyField {
    pub fn eq(self, value: impl Into<PropertyValue>) -> Predicate {
        Predicate::PropertyEquals(self.name, value.into())
    }

    pub fn exists(self) -> Predicate {
        Predicate::PropertyExists(self.name)
    }
}

/// Terminal action markers.
#[derive(Debug)]
pub struct Select;
#[derive(Debug)]
pub struct Delete;
#[derive(Debug)]
pub struct Count;

pub type SelectQuery<'store> = Query<'store, Select>;
pub type DeleteQuery<'store> = Query<'store, Delete>;
pub type CountQuery<'store> = Query<'store, Count>;

/// Single-use query bound to a store.
pub struct Query<'store, A> {
    store: &'store AssetStore,
    plan: QueryPlan,
    _action: PhantomData<A>,
}

impl<A> Query<'_, A> {
    /// Restricts the query to snapshots matching `predicate`.
    pub fn where_(mut self, predicate: Predicate) -> Self {
        self.plan.predicate = predicate;
        self
    }

    pub fn plan(&self) -> &QueryPlan {
        &self.plan
    }
}

impl Query<'_, Select> {
    pub fn run(self) -> StoreResult<Vec<Snapshot>> {
        self.store.execute_select(&self.plan)
    }
}

impl Query<'_, Count> {
    pub fn run(self) -> StoreResult<usize> {
        self.store.execute_count(&self.plan)
    }
}

impl Query<'_, Delete> {
    /// Removes matching snapshots and notifies handlers before returning.
    pub fn run(self) -> StoreResult<DeleteOutcome> {
        self.store.execute_delete(&self.plan)
    }
}
