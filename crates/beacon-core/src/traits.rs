//! Trait definitions for external dependencies.
//!
//! The catalog reader, the reconciler and the query translator only talk to
//! the workflow platform and the document store through these traits, so the
//! services can be driven by in-memory doubles in tests and by the Galaxy
//! client and the PostgreSQL store in the binary.
//!
//! # Example
//!
//! ```
//! use beacon_core::query::Filter;
//! use beacon_core::traits::DocumentStore;
//! use futures::TryStreamExt;
//!
//! async fn count_all<S: DocumentStore>(
//!     store: &S,
//!     collection: &str,
//! ) -> Result<usize, beacon_core::AppError> {
//!     let docs: Vec<_> = store.find(collection, &Filter::All).try_collect().await?;
//!     Ok(docs.len())
//! }
//! ```

use std::future::Future;
use std::path::Path;

use futures::stream::BoxStream;
use serde_json::Value;

use crate::models::{Document, FileKind};
use crate::query::Filter;
use crate::AppError;

/// Client for the workflow platform that hosts the variant datasets.
///
/// Dataset listings and details are returned as raw JSON objects; the
/// catalog reader owns validation and normalization.
pub trait PlatformClient: Send + Sync {
    /// Verifies connectivity and credentials. Returns the account name.
    fn whoami(&self) -> impl Future<Output = Result<String, AppError>> + Send;

    /// Lists the ids of non-deleted collections (histories) named `name`.
    fn list_collections(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<Vec<String>, AppError>> + Send;

    /// Returns the owning account id of a collection, if the platform reports one.
    fn owner_of(
        &self,
        collection_id: &str,
    ) -> impl Future<Output = Result<Option<String>, AppError>> + Send;

    /// Returns the raw value of preference `key` on account `owner_id`.
    fn sharing_preference(
        &self,
        owner_id: &str,
        key: &str,
    ) -> impl Future<Output = Result<Option<String>, AppError>> + Send;

    /// Fetches one page of non-deleted datasets of the given kinds.
    fn list_datasets(
        &self,
        collection_id: &str,
        kinds: &[FileKind],
        offset: usize,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<Value>, AppError>> + Send;

    /// Fetches the full description of one dataset.
    fn show_dataset(
        &self,
        dataset_id: &str,
    ) -> impl Future<Output = Result<Value, AppError>> + Send;

    /// Downloads the content of a dataset to `dest`. Returns the byte count.
    fn download(
        &self,
        dataset_id: &str,
        kind: FileKind,
        dest: &Path,
    ) -> impl Future<Output = Result<u64, AppError>> + Send;
}

/// Schemaless document store holding named collections.
///
/// Every inserted document receives a store-assigned storage index that is
/// stable for the lifetime of the document.
pub trait DocumentStore: Send + Sync {
    /// Checks that the store is reachable.
    fn ping(&self) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Inserts documents in order. Returns their storage indices in the same order.
    fn insert_many(
        &self,
        collection: &str,
        docs: Vec<Value>,
    ) -> impl Future<Output = Result<Vec<i64>, AppError>> + Send;

    /// Deletes every document of a collection. Returns the number removed.
    fn delete_all(
        &self,
        collection: &str,
    ) -> impl Future<Output = Result<u64, AppError>> + Send;

    /// Replaces the whole content of a collection in one atomic operation.
    fn replace_all(
        &self,
        collection: &str,
        docs: Vec<Value>,
    ) -> impl Future<Output = Result<Vec<i64>, AppError>> + Send;

    /// Streams matching documents in storage order.
    ///
    /// Each call starts a fresh stream; nothing is fetched until it is polled.
    fn find(&self, collection: &str, filter: &Filter) -> BoxStream<'static, Result<Document, AppError>>;

    /// Merges the top-level keys of `set` into every matching document.
    /// Returns the number of documents touched.
    fn update_many(
        &self,
        collection: &str,
        filter: &Filter,
        set: Value,
    ) -> impl Future<Output = Result<u64, AppError>> + Send;
}
