//! Predicate algebra over snapshots.
//!
//! # Responsibility
//! - Represent selection criteria as a plain expression tree.
//! - Evaluate a tree against one snapshot and a read-only context.
//!
//! # Invariants
//! - Evaluation is pure; it never touches storage.
//! - `VersionIsLatest` compares against the snapshot's own package, never
//!   against a maximum pooled across packages.

use crate::model::property::{PropertyName, PropertyValue};
use crate::model::snapshot::{MediaPackageId, ModelValidationError, Snapshot, Version};
use std::collections::BTreeSet;
use std::ops::Not;

/// Side lookups needed while evaluating a predicate.
pub trait EvaluationContext {
    /// Highest stored version of the package, as of the start of the query.
    fn latest_version(&self, media_package_id: &MediaPackageId) -> Option<Version>;
    fn property_value(
        &self,
        media_package_id: &MediaPackageId,
        name: &PropertyName,
    ) -> Option<&PropertyValue>;
}

/// Boolean selection expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// Matches every snapshot.
    Always,
    MediaPackageIdEquals(MediaPackageId),
    VersionEquals(Version),
    VersionIsLatest,
    PropertyEquals(PropertyName, PropertyValue),
    PropertyExists(PropertyName),
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    pub fn and(self, other: Predicate) -> Predicate {
        Predicate::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Predicate) -> Predicate {
        Predicate::Or(Box::new(self), Box::new(other))
    }

    pub fn negate(self) -> Predicate {
        Predicate::Not(Box::new(self))
    }

    /// Checks every leaf for malformed identifiers.
    pub fn validate(&self) -> Result<(), ModelValidationError> {
        match self {
            Self::Always | Self::VersionEquals(_) | Self::VersionIsLatest => Ok(()),
            Self::MediaPackageIdEquals(id) => id.validate(),
            Self::PropertyEquals(name, _) | Self::PropertyExists(name) => name.validate(),
            Self::And(left, right) | Self::Or(left, right) => {
                left.validate()?;
                right.validate()
            }
            Self::Not(inner) => inner.validate(),
        }
    }

    /// Packages every matching snapshot must belong to, when the tree pins
    /// them through id leaves. `None` means any package may match.
    pub fn pinned_media_package_ids(&self) -> Option<BTreeSet<MediaPackageId>> {
        match self {
            Self::MediaPackageIdEquals(id) => Some(BTreeSet::from([id.clone()])),
            Self::And(left, right) => {
                match (
                    left.pinned_media_package_ids(),
                    right.pinned_media_package_ids(),
                ) {
                    (Some(left), Some(right)) => Some(&left & &right),
                    (Some(ids), None) | (None, Some(ids)) => Some(ids),
                    (None, None) => None,
                }
            }
            Self::Or(left, right) => {
                let mut ids = left.pinned_media_package_ids()?;
                ids.extend(right.pinned_media_package_ids()?);
                Some(ids)
            }
            Self::Always
            | Self::VersionEquals(_)
            | Self::VersionIsLatest
            | Self::PropertyEquals(..)
            | Self::PropertyExists(_)
            | Self::Not(_) => None,
        }
    }

    pub fn evaluate(&self, snapshot: &Snapshot, ctx: &impl EvaluationContext) -> bool {
        match self {
            Self::Always => true,
            Self::MediaPackageIdEquals(id) => snapshot.media_package_id == *id,
            Self::VersionEquals(version) => snapshot.version == *version,
            Self::VersionIsLatest => {
                ctx.latest_version(&snapshot.media_package_id) == Some(snapshot.version)
            }
            Self::PropertyEquals(name, value) => {
                ctx.property_value(&snapshot.media_package_id, name) == Some(value)
            }
            Self::PropertyExists(name) => ctx
                .property_value(&snapshot.media_package_id, name)
                .is_some(),
            Self::And(left, right) => left.evaluate(snapshot, ctx) && right.evaluate(snapshot, ctx),
            Self::Or(left, right) => left.evaluate(snapshot, ctx) || right.evaluate(snapshot, ctx),
            Self::Not(inner) => !inner.evaluate(snapshot, ctx),
        }
    }
}

impl Not for Predicate {
    type Output = Predicate;

    fn not(self) -> Predicate {
        self.negate()
    }
}
