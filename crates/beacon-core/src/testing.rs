//! In-memory doubles for the platform and the document store.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};

use futures::stream::{self, BoxStream, StreamExt};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::models::{Document, FileKind};
use crate::query::Filter;
use crate::traits::{DocumentStore, PlatformClient};
use crate::AppError;

/// Platform dataset description with every required key set.
pub fn dataset_info(id: &str, dbkey: &str, extension: &str) -> Value {
    json!({
        "id": id,
        "name": format!("{}.{}", id, extension),
        "uuid": Uuid::new_v4().to_string(),
        "extension": extension,
        "metadata_dbkey": dbkey,
        "state": "ok",
        "deleted": false,
    })
}

#[derive(Default)]
pub struct FakePlatform {
    owners: HashMap<String, String>,
    preferences: HashMap<String, String>,
    collections: Vec<String>,
    datasets: Vec<(String, Value, Vec<u8>)>,
    failing_show: HashSet<String>,
    unreachable_show: HashSet<String>,
    vanished: HashSet<String>,
    fail_whoami: bool,
    offsets: Mutex<Vec<usize>>,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_collection(mut self, id: &str, owner: &str, preference: Option<&str>) -> Self {
        self.collections.push(id.to_string());
        self.owners.insert(id.to_string(), owner.to_string());
        if let Some(value) = preference {
            self.preferences.insert(owner.to_string(), value.to_string());
        }
        self
    }

    pub fn with_dataset(mut self, collection: &str, mut info: Value, content: &[u8]) -> Self {
        if info.get("history_id").is_none() {
            info["history_id"] = json!(collection);
        }
        self.datasets
            .push((collection.to_string(), info, content.to_vec()));
        self
    }

    pub fn failing_show(mut self, dataset_id: &str) -> Self {
        self.failing_show.insert(dataset_id.to_string());
        self
    }

    /// Lists `dataset_id` in `collection` but answers 404 when it is shown.
    pub fn with_vanished_dataset(mut self, collection: &str, dataset_id: &str) -> Self {
        self.vanished.insert(dataset_id.to_string());
        self.datasets.push((
            collection.to_string(),
            json!({ "id": dataset_id, "history_id": collection }),
            Vec::new(),
        ));
        self
    }

    /// Showing `dataset_id` fails as if the connection dropped.
    pub fn unreachable_show(mut self, dataset_id: &str) -> Self {
        self.unreachable_show.insert(dataset_id.to_string());
        self
    }

    pub fn failing_whoami(mut self) -> Self {
        self.fail_whoami = true;
        self
    }

    /// Offsets of every `list_datasets` call so far.
    pub fn page_offsets(&self) -> Vec<usize> {
        self.offsets.lock().unwrap().clone()
    }

    pub fn content_ids(&self) -> Vec<String> {
        self.datasets
            .iter()
            .filter_map(|(_, info, _)| info["uuid"].as_str().map(str::to_string))
            .collect()
    }

    fn dataset(&self, id: &str) -> Option<&(String, Value, Vec<u8>)> {
        self.datasets.iter().find(|(_, info, _)| info["id"] == id)
    }
}

impl PlatformClient for FakePlatform {
    async fn whoami(&self) -> Result<String, AppError> {
        if self.fail_whoami {
            return Err(AppError::NetworkError("connection refused".to_string()));
        }
        Ok("beacon-importer".to_string())
    }

    async fn list_collections(&self, _name: &str) -> Result<Vec<String>, AppError> {
        Ok(self.collections.clone())
    }

    async fn owner_of(&self, collection_id: &str) -> Result<Option<String>, AppError> {
        Ok(self.owners.get(collection_id).cloned())
    }

    async fn sharing_preference(
        &self,
        owner_id: &str,
        _key: &str,
    ) -> Result<Option<String>, AppError> {
        Ok(self.preferences.get(owner_id).cloned())
    }

    async fn list_datasets(
        &self,
        collection_id: &str,
        kinds: &[FileKind],
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Value>, AppError> {
        self.offsets.lock().unwrap().push(offset);
        Ok(self
            .datasets
            .iter()
            .filter(|(collection, _, _)| collection == collection_id)
            .filter(|(_, info, _)| {
                info["extension"]
                    .as_str()
                    .and_then(FileKind::from_extension)
                    .is_none_or(|kind| kinds.contains(&kind))
            })
            .skip(offset)
            .take(limit)
            .map(|(_, info, _)| json!({ "id": info["id"] }))
            .collect())
    }

    async fn show_dataset(&self, dataset_id: &str) -> Result<Value, AppError> {
        if self.failing_show.contains(dataset_id) {
            return Err(AppError::ClientError("HTTP 503 Service Unavailable".to_string()));
        }
        if self.unreachable_show.contains(dataset_id) {
            return Err(AppError::NetworkError("connection reset".to_string()));
        }
        if self.vanished.contains(dataset_id) {
            return Err(AppError::ClientError("HTTP 404 Not Found".to_string()));
        }
        self.dataset(dataset_id)
            .map(|(_, info, _)| info.clone())
            .ok_or_else(|| AppError::ClientError("HTTP 404 Not Found".to_string()))
    }

    async fn download(&self, dataset_id: &str, _kind: FileKind, dest: &Path) -> Result<u64, AppError> {
        let (_, _, content) = self
            .dataset(dataset_id)
            .ok_or_else(|| AppError::ClientError("HTTP 404 Not Found".to_string()))?;
        tokio::fs::write(dest, content).await?;
        Ok(content.len() as u64)
    }
}

#[derive(Default)]
struct MemoryState {
    next_index: i64,
    collections: BTreeMap<String, Vec<Document>>,
    fail_inserts: bool,
}

impl MemoryState {
    fn insert(&mut self, collection: &str, docs: Vec<Value>) -> Vec<i64> {
        let stored = self.collections.entry(collection.to_string()).or_default();
        let mut indices = Vec::with_capacity(docs.len());
        for body in docs {
            self.next_index += 1;
            stored.push(Document {
                index: self.next_index,
                body,
            });
            indices.push(self.next_index);
        }
        indices
    }
}

/// Store keeping every collection in memory, in insertion order.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later insert fail with a store error.
    pub fn fail_inserts(&self) {
        self.inner.lock().unwrap().fail_inserts = true;
    }

    pub fn documents(&self, collection: &str) -> Vec<Document> {
        self.inner
            .lock()
            .unwrap()
            .collections
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    /// Every stored body, serialized.
    pub fn dump(&self) -> String {
        let state = self.inner.lock().unwrap();
        state
            .collections
            .values()
            .flatten()
            .map(|doc| doc.body.to_string())
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn matching(&self, collection: &str, filter: &Filter) -> Vec<Document> {
        self.documents(collection)
            .into_iter()
            .filter(|doc| filter.matches(&doc.body))
            .collect()
    }
}

impl DocumentStore for MemoryStore {
    async fn ping(&self) -> Result<(), AppError> {
        Ok(())
    }

    async fn insert_many(&self, collection: &str, docs: Vec<Value>) -> Result<Vec<i64>, AppError> {
        let mut state = self.inner.lock().unwrap();
        if state.fail_inserts {
            return Err(AppError::StoreError("insert rejected".to_string()));
        }
        Ok(state.insert(collection, docs))
    }

    async fn delete_all(&self, collection: &str) -> Result<u64, AppError> {
        let mut state = self.inner.lock().unwrap();
        let removed = state.collections.remove(collection).unwrap_or_default();
        Ok(removed.len() as u64)
    }

    async fn replace_all(&self, collection: &str, docs: Vec<Value>) -> Result<Vec<i64>, AppError> {
        let mut state = self.inner.lock().unwrap();
        state.collections.remove(collection);
        Ok(state.insert(collection, docs))
    }

    fn find(&self, collection: &str, filter: &Filter) -> BoxStream<'static, Result<Document, AppError>> {
        let store = self.clone();
        let collection = collection.to_string();
        let filter = filter.clone();
        stream::once(async move { store.matching(&collection, &filter) })
            .flat_map(|docs| stream::iter(docs.into_iter().map(Ok)))
            .boxed()
    }

    async fn update_many(&self, collection: &str, filter: &Filter, set: Value) -> Result<u64, AppError> {
        let mut state = self.inner.lock().unwrap();
        let Some(docs) = state.collections.get_mut(collection) else {
            return Ok(0);
        };
        let mut touched = 0;
        for doc in docs.iter_mut().filter(|d| filter.matches(&d.body)) {
            if let (Value::Object(body), Value::Object(fields)) = (&mut doc.body, &set) {
                for (key, value) in fields {
                    body.insert(key.clone(), value.clone());
                }
                touched += 1;
            }
        }
        Ok(touched)
    }
}
