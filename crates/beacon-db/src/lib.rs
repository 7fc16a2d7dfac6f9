//! Galaxy Beacon DB - PostgreSQL document store.
//!
//! Implements [`beacon_core::traits::DocumentStore`] on a single table of
//! `jsonb` documents keyed by collection name.

pub mod filter_sql;
pub mod repository;

pub use repository::PgDocumentStore;
