//! Versioned media package snapshot store.
//! Owns snapshot versioning, property filtering, query-driven deletion and
//! change notification for asset management.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod notify;
pub mod query;
pub mod repo;
pub mod service;

pub use config::{ConfigError, StoreConfig};
pub use logging::{init_logging, logging_status, LogLevel, LoggingConfig, LoggingError};
pub use model::event::{AssetEvent, AssetEventKind};
pub use model::property::{Property, PropertyName, PropertyValue};
pub use model::snapshot::{
    MediaPackageId, ModelValidationError, Snapshot, SnapshotPayload, Version, FIRST_VERSION,
};
pub use notify::notifier::{AssetEventHandler, DeliveryFailure, HandlerError, NotifierError};
pub use query::builder::{Query, QueryBuilder, QueryPlan, Target};
pub use query::executor::{AffectedEntity, CascadeEventPolicy, DeleteOutcome, RemovalScope};
pub use query::predicate::Predicate;
pub use repo::{RepoError, RepoResult};
pub use service::asset_store::{
    AssetStore, CommittedMutation, DeliveryReport, StoreError, StoreResult,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
