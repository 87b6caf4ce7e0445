//! # CRM Core
//!
//! Runtime-free logic for the personal CRM backend: data models, the error
//! taxonomy, lookup references, the Kanban position reindexer, the
//! association-graph clusterer, and the store abstraction they run against.
//!
//! This crate contains no tokio, sqlx, or filesystem I/O. The SQLite adapter
//! lives in the `personal-crm` crate; [`store::memory`] provides an
//! in-memory adapter for tests.

pub mod cluster;
pub mod error;
pub mod kanban;
pub mod lookup;
pub mod models;
pub mod store;

pub use error::{CrmError, Entity};
