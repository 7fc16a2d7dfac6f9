//! Dataset catalog reader.
//!
//! Enumerates the datasets of a platform collection page by page and turns
//! the raw platform descriptions into validated [`DatasetDescriptor`]s. A
//! dataset is only returned when its owner opted in to sharing and its
//! reference assembly is a recognized human build.

use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::assembly::normalize_assembly;
use crate::config::ImportConfig;
use crate::guard::CallGuard;
use crate::models::{DatasetDescriptor, FileKind};
use crate::traits::PlatformClient;
use crate::AppError;

/// Keys every platform dataset description must carry.
pub const REQUIRED_FIELDS: [&str; 5] = ["name", "id", "uuid", "extension", "metadata_dbkey"];

/// Returns true for `true`, `yes`, `on` and `1`, ignoring case.
///
/// # Examples
///
/// ```
/// use beacon_core::catalog::is_truthy;
///
/// assert!(is_truthy("True"));
/// assert!(is_truthy("1"));
/// assert!(!is_truthy("0"));
/// assert!(!is_truthy(""));
/// ```
pub fn is_truthy(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "true" | "yes" | "on" | "1"
    )
}

/// Validates a platform dataset description and normalizes its assembly.
///
/// Fails with [`AppError::MissingField`] when a required key is absent,
/// [`AppError::InvalidField`] when a value is unusable, and
/// [`AppError::UnknownAssembly`] when the reference is not a human build.
pub fn parse_descriptor(info: &Value) -> Result<DatasetDescriptor, AppError> {
    for key in REQUIRED_FIELDS {
        if info.get(key).is_none_or(Value::is_null) {
            return Err(AppError::MissingField(key.to_string()));
        }
    }

    let text = |key: &str| -> Result<String, AppError> {
        match &info[key] {
            Value::String(s) => Ok(s.clone()),
            other => Err(AppError::InvalidField {
                field: key.to_string(),
                value: other.to_string(),
            }),
        }
    };

    let uuid = text("uuid")?;
    let content_id = Uuid::parse_str(&uuid).map_err(|_| AppError::InvalidField {
        field: "uuid".to_string(),
        value: uuid.clone(),
    })?;

    let extension = text("extension")?;
    let file_kind = FileKind::from_extension(&extension).ok_or_else(|| AppError::InvalidField {
        field: "extension".to_string(),
        value: extension.clone(),
    })?;

    let dbkey = text("metadata_dbkey")?;
    let reference_assembly =
        normalize_assembly(&dbkey).ok_or_else(|| AppError::UnknownAssembly(dbkey.clone()))?;

    Ok(DatasetDescriptor {
        name: text("name")?,
        external_id: text("id")?,
        content_id,
        file_kind,
        reference_assembly,
    })
}

/// Reads importable dataset descriptors from the platform.
pub struct CatalogReader<'a, P: PlatformClient> {
    platform: &'a P,
    guard: &'a CallGuard,
    config: &'a ImportConfig,
}

impl<'a, P: PlatformClient> CatalogReader<'a, P> {
    pub fn new(platform: &'a P, guard: &'a CallGuard, config: &'a ImportConfig) -> Self {
        Self {
            platform,
            guard,
            config,
        }
    }

    /// Lists the ids of the export collections.
    pub async fn collections(&self) -> Result<Vec<String>, AppError> {
        self.guard
            .run(self.platform.list_collections(&self.config.history_name))
            .await
    }

    /// Enumerates the importable datasets of one collection, in platform order.
    ///
    /// Pages are requested at offsets `0, page_size, 2 * page_size, ...` until
    /// the platform returns an empty page. Entries that fail validation, have
    /// an unknown assembly, an HTTP error status, or whose owner has not opted
    /// in are skipped with a warning. Listing failures, transport failures,
    /// timeouts and cancellation end the enumeration with an error.
    pub async fn datasets(&self, collection_id: &str) -> Result<Vec<DatasetDescriptor>, AppError> {
        let limit = self.config.page_size;
        let mut offset = 0;
        let mut descriptors = Vec::new();

        loop {
            let page = self
                .guard
                .run(self.platform.list_datasets(
                    collection_id,
                    &self.config.file_kinds,
                    offset,
                    limit,
                ))
                .await?;

            if page.is_empty() {
                break;
            }
            debug!(
                "Collection {}: {} entries at offset {}",
                collection_id,
                page.len(),
                offset
            );

            for entry in &page {
                match self.describe(collection_id, entry).await {
                    Ok(Some(descriptor)) => descriptors.push(descriptor),
                    Ok(None) => {}
                    Err(e) if e.drops_entry() => {
                        warn!("Not reading dataset {}: {}", entry_label(entry), e);
                    }
                    Err(e) => return Err(e),
                }
            }

            offset += limit;
        }

        Ok(descriptors)
    }

    /// Fetches, validates and permission-checks one listing entry.
    async fn describe(
        &self,
        collection_id: &str,
        entry: &Value,
    ) -> Result<Option<DatasetDescriptor>, AppError> {
        let id = entry
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| AppError::MissingField("id".to_string()))?;

        let info = self.guard.run(self.platform.show_dataset(id)).await?;
        let descriptor = parse_descriptor(&info)?;

        let owner_collection = info
            .get("history_id")
            .and_then(Value::as_str)
            .unwrap_or(collection_id);
        if !self.is_shared(owner_collection).await? {
            debug!(
                "Dataset {} excluded: owner has not enabled {}",
                descriptor.external_id, self.config.sharing_preference
            );
            return Ok(None);
        }

        Ok(Some(descriptor))
    }

    /// Checks the sharing preference of the collection's owner.
    pub async fn is_shared(&self, collection_id: &str) -> Result<bool, AppError> {
        let Some(owner) = self.guard.run(self.platform.owner_of(collection_id)).await? else {
            return Ok(false);
        };
        let value = self
            .guard
            .run(
                self.platform
                    .sharing_preference(&owner, &self.config.sharing_preference),
            )
            .await?;
        Ok(value.as_deref().is_some_and(is_truthy))
    }
}

fn entry_label(entry: &Value) -> String {
    entry
        .get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| entry.to_string())
}
