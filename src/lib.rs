//! # Personal CRM
//!
//! Backend for a personal contact manager: contacts move through pipeline
//! statuses on a Kanban board and are linked to each other in an
//! association graph that is partitioned into clusters.
//!
//! The two algorithms that need care, the column reindexer and the cluster
//! labeler, live in the `crm-core` crate behind a transactional storage
//! port. This crate supplies the SQLite adapter, CRUD around them, the HTTP
//! API and the CLI.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐
//! │   CLI    │   │   HTTP   │
//! │  (crm)   │   │  (axum)  │
//! └────┬─────┘   └────┬─────┘
//!      └──────┬───────┘
//!             ▼
//!   ┌───────────────────┐    ┌──────────────────┐
//!   │ contacts/statuses │    │ crm-core         │
//!   │ graph/lookups     │    │ kanban, cluster  │
//!   └─────────┬─────────┘    └────────┬─────────┘
//!             ▼                       ▼
//!        ┌──────────────────────────────┐
//!        │  SQLite (sqlx, WAL)          │
//!        └──────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! crm init                      # create database and default statuses
//! crm statuses                  # list board columns
//! crm move <contact> <status> 0 # move a contact to the top of a column
//! crm clusters                  # recompute graph clusters
//! crm serve                     # start HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema bootstrap and status seeding |
//! | [`sqlite_store`] | SQLite adapter for the core storage port |
//! | [`contacts`] | Contact CRUD and listing |
//! | [`statuses`] | Board columns |
//! | [`lookups`] | Tags, interests, occupations, autocomplete |
//! | [`graph`] | Graph view, edges, node layout |
//! | [`photos`] | Photo files |
//! | [`models`] | Response types |
//! | [`server`] | HTTP API |

pub mod config;
pub mod contacts;
pub mod db;
pub mod graph;
pub mod lookups;
pub mod migrate;
pub mod models;
pub mod photos;
pub mod server;
pub mod sqlite_store;
pub mod statuses;
pub mod timestamp;

pub use crm_core::cluster::{recompute, RecomputeSummary};
pub use crm_core::kanban::{move_contact, MoveOutcome, MoveRequest};
pub use crm_core::{CrmError, Entity};
