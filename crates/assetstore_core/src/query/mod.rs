//! Declarative query language over versioned snapshots.
//!
//! # Responsibility
//! - `predicate`: expression tree and pure evaluator.
//! - `view`: consistent read each query evaluates against.
//! - `executor`: cascade planning and event derivation for deletes.
//! - `builder`: fluent construction of single-use queries.

pub mod builder;
pub mod executor;
pub mod predicate;
pub mod view;
