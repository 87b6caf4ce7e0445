//! Storage abstraction for the CRM core.
//!
//! The [`Store`] trait hands out units of work; a [`StoreTx`] carries the
//! read and write operations the reindexer and the clusterer need. Every
//! read and write issued through one `StoreTx` becomes visible together on
//! [`commit`](StoreTx::commit). Dropping a `StoreTx` without committing
//! discards everything it staged.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{ContactPlacement, EdgeEndpoints, Sibling, Status};

/// Abstract storage backend.
///
/// | Adapter | Crate |
/// |---------|-------|
/// | `SqliteStore` | `personal-crm` |
/// | [`memory::InMemoryStore`] | this crate (tests) |
#[async_trait]
pub trait Store: Send + Sync {
    /// Open a new unit of work.
    async fn begin(&self) -> Result<Box<dyn StoreTx>>;
}

/// A unit of work against the contacts, statuses, and associations tables.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`get_contact`](StoreTx::get_contact) | Current status and position of a contact |
/// | [`get_status`](StoreTx::get_status) | Status lookup |
/// | [`list_siblings`](StoreTx::list_siblings) | Contacts of a column, ordered by position |
/// | [`list_all_contacts`](StoreTx::list_all_contacts) | Every contact id, in creation order |
/// | [`list_all_edges`](StoreTx::list_all_edges) | Every association edge |
/// | [`update_position`](StoreTx::update_position) | Single-row placement write |
/// | [`update_cluster_label`](StoreTx::update_cluster_label) | Single-row cluster write |
#[async_trait]
pub trait StoreTx: Send {
    async fn get_contact(&mut self, contact_id: &str) -> Result<Option<ContactPlacement>>;

    async fn get_status(&mut self, status_id: &str) -> Result<Option<Status>>;

    /// Contacts in a status column, ordered by position then id.
    async fn list_siblings(&mut self, status_id: &str) -> Result<Vec<Sibling>>;

    /// Every contact id in a stable order (creation time, then id).
    async fn list_all_contacts(&mut self) -> Result<Vec<String>>;

    async fn list_all_edges(&mut self) -> Result<Vec<EdgeEndpoints>>;

    async fn update_position(
        &mut self,
        contact_id: &str,
        status_id: &str,
        position: i64,
    ) -> Result<()>;

    async fn update_cluster_label(&mut self, contact_id: &str, label: i64) -> Result<()>;

    /// Make every staged write visible. After a failed commit nothing is.
    async fn commit(&mut self) -> Result<()>;
}
