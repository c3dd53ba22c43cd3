//! Domain model for versioned media packages.
//!
//! # Responsibility
//! - Define canonical records shared by repositories, queries and notifier.
//!
//! # Invariants
//! - Every media package is identified by a stable `MediaPackageId`.
//! - Snapshots are append-only and immutable; properties are unversioned.

pub mod event;
pub mod property;
pub mod snapshot;
