//! Property domain model.
//!
//! # Responsibility
//! - Define namespaced, typed key/value attributes of a media package.
//!
//! # Invariants
//! - Properties belong to a media package, not to a single version.
//! - Namespace and name match `[A-Za-z0-9_.-]+`.
//! - Values of different types never compare equal.

use crate::model::snapshot::{MediaPackageId, ModelValidationError};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

static PROPERTY_IDENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_.\-]+$").expect("valid property identifier regex"));

/// Fully qualified property key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PropertyName {
    pub namespace: String,
    pub name: String,
}

impl PropertyName {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn validate(&self) -> Result<(), ModelValidationError> {
        if !PROPERTY_IDENT_RE.is_match(&self.namespace) {
            return Err(ModelValidationError::InvalidNamespace(
                self.namespace.clone(),
            ));
        }
        if !PROPERTY_IDENT_RE.is_match(&self.name) {
            return Err(ModelValidationError::InvalidPropertyName(self.name.clone()));
        }
        Ok(())
    }

    /// Binds this key to a media package and value.
    pub fn property(
        &self,
        media_package_id: impl Into<MediaPackageId>,
        value: impl Into<PropertyValue>,
    ) -> Property {
        Property {
            media_package_id: media_package_id.into(),
            name: self.clone(),
            value: value.into(),
        }
    }
}

impl Display for PropertyName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.namespace, self.name)
    }
}

/// Typed property value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PropertyValue {
    String(String),
    Long(i64),
    /// Epoch milliseconds.
    Date(i64),
    Boolean(bool),
}

impl PropertyValue {
    /// Stable type tag used by storage.
    pub fn type_tag(&self) -> &'static str {
        match self {
            Self::String(_) => "string",
            Self::Long(_) => "long",
            Self::Date(_) => "date",
            Self::Boolean(_) => "boolean",
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        Self::Long(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

/// One attribute of one media package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub media_package_id: MediaPackageId,
    pub name: PropertyName,
    pub value: PropertyValue,
}

impl Property {
    pub fn validate(&self) -> Result<(), ModelValidationError> {
        self.media_package_id.validate()?;
        self.name.validate()
    }
}
