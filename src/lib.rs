//! # kbsync
//!
//! Incremental synchronization of per-project knowledge bases from
//! external directory trees.
//!
//! Each configured source is walked on demand; files are classified as
//! new, changed or unchanged against their persisted records, new and
//! changed files are materialized as documents split into overlapping
//! fragments, and vanished files are soft-deleted. Every run leaves an
//! audit trail of what it did to each file.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌─────────────┐   ┌──────────┐
//! │ Tree walker │──▶│ Glob filter  │──▶│   Change    │──▶│ Document │
//! │  (folder)   │   │              │   │  detector   │   │ material.│
//! └─────────────┘   └──────────────┘   └─────────────┘   └────┬─────┘
//!                                                             ▼
//!                                                        ┌──────────┐
//!                                                        │  SQLite  │
//!                                                        └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! kbsync init                    # create database, register sources
//! kbsync sync campaign --dry-run # report what would change
//! kbsync sync campaign           # apply it
//! kbsync runs campaign           # run history
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`connector_fs`] | Tree walker and file access |
//! | [`ingest`] | Run coordinator ([`ingest::synchronize`]) |
//! | [`progress`] | Progress reporting on stderr |
//! | [`sources`] | Config registration and source health |
//! | [`get`] | Document retrieval |
//! | [`stats`] | Run history and audit rows |
//! | [`sqlite_store`] | SQLite [`kbsync_core::store::Store`] |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod config;
pub mod connector_fs;
pub mod db;
pub mod get;
pub mod ingest;
pub mod migrate;
pub mod progress;
pub mod sources;
pub mod sqlite_store;
pub mod stats;
