//! Database module: input models and SQL repositories.
//!
//! This module is split into two submodules:
//! - `model`: input/view structs consumed and returned by repositories.
//! - `repo`: SQL-only functions that map rows into domain entities.
//!
//! External modules should import from `backhouse::db` — we re-export the
//! repository API and commonly used models for convenience.

pub mod model;
pub mod repo;

// Re-export the repository API at `crate::db::*`.
pub use repo::*;

pub use model::{NewInventoryItem, NewRecipeLine, ShiftDraft};
