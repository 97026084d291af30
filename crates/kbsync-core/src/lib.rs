//! # kbsync core
//!
//! Shared, I/O-free logic for kbsync: data models, the fragment chunker,
//! content hashing, glob filtering, change classification, the store
//! abstraction with an in-memory backend, and hash-guarded document
//! materialization.
//!
//! This crate performs no filesystem or database I/O of its own; the
//! `kbsync` crate supplies the tree walker, SQLite store and run coordinator.

pub mod change;
pub mod chunk;
pub mod embedding;
pub mod glob;
pub mod hash;
pub mod materialize;
pub mod models;
pub mod store;
