//! Change notification for store mutations.
//!
//! # See also
//! - `service::asset_store` for where delivery happens relative to commits.

pub mod notifier;
