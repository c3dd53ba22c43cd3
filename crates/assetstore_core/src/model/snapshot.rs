//! Snapshot domain model.
//!
//! # Responsibility
//! - Define the identity (`MediaPackageId`, `Version`) of stored versions.
//! - Define the immutable `Snapshot` record and its insert payload.
//!
//! # Invariants
//! - Versions start at `FIRST_VERSION` and strictly increase per media package.
//! - A `Snapshot` is never mutated after the store hands it out.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Per-media-package version number.
pub type Version = u32;

/// Version allocated to the first snapshot of a media package.
pub const FIRST_VERSION: Version = 1;

/// Opaque, stable identifier of one media package.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaPackageId(String);

impl MediaPackageId {
    /// Wraps an externally assigned identifier.
    ///
    /// Surrounding whitespace is trimmed; emptiness is checked by `validate`.
    pub fn new(value: impl Into<String>) -> Self {
        let value = value.into();
        Self(value.trim().to_string())
    }

    /// Creates a fresh random identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn validate(&self) -> Result<(), ModelValidationError> {
        if self.0.is_empty() {
            return Err(ModelValidationError::EmptyMediaPackageId);
        }
        Ok(())
    }
}

impl Display for MediaPackageId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MediaPackageId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for MediaPackageId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&MediaPackageId> for MediaPackageId {
    fn from(value: &MediaPackageId) -> Self {
        value.clone()
    }
}

/// Caller-provided content of a new snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotPayload {
    /// Reference to the externally stored, encoded media package.
    pub reference: String,
    /// Whether the payload has been moved to archival storage.
    pub archived: bool,
}

impl SnapshotPayload {
    pub fn new(reference: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            archived: false,
        }
    }

    pub fn archived(mut self, archived: bool) -> Self {
        self.archived = archived;
        self
    }

    pub fn validate(&self) -> Result<(), ModelValidationError> {
        if self.reference.trim().is_empty() {
            return Err(ModelValidationError::EmptyPayloadReference);
        }
        Ok(())
    }
}

/// One immutable version of a media package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub media_package_id: MediaPackageId,
    pub version: Version,
    /// Scoping tag; queries of other owners never see this snapshot.
    pub owner: String,
    pub payload_ref: String,
    pub archived: bool,
    /// Epoch milliseconds assigned by storage on insert.
    pub archived_at: i64,
}

impl Snapshot {
    /// Identity of this snapshot inside the store.
    pub fn key(&self) -> (&MediaPackageId, Version) {
        (&self.media_package_id, self.version)
    }
}

/// Checks an owner tag and returns it trimmed.
pub fn validate_owner(owner: &str) -> Result<&str, ModelValidationError> {
    let trimmed = owner.trim();
    if trimmed.is_empty() {
        return Err(ModelValidationError::EmptyOwner);
    }
    Ok(trimmed)
}

/// Validation failures for model values, raised before any storage access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelValidationError {
    EmptyMediaPackageId,
    EmptyOwner,
    EmptyPayloadReference,
    InvalidNamespace(String),
    InvalidPropertyName(String),
}

impl Display for ModelValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyMediaPackageId => write!(f, "media package id cannot be empty"),
            Self::EmptyOwner => write!(f, "owner cannot be empty"),
            Self::EmptyPayloadReference => write!(f, "snapshot payload reference cannot be empty"),
            Self::InvalidNamespace(value) => write!(f, "invalid property namespace `{value}`"),
            Self::InvalidPropertyName(value) => write!(f, "invalid property name `{value}`"),
        }
    }
}

impl Error for ModelValidationError {}
