//! Store entry points.
//!
//! # Responsibility
//! - Combine repositories, query evaluation and notification into one
//!   thread-safe `AssetStore`.

pub mod asset_store;
pub mod entity_locks;
