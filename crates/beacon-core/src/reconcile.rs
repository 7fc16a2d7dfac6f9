//! Import reconciler: rebuilds the variant store from the platform.
//!
//! A rebuild walks through
//! `Idle -> Connected -> Cleared -> Importing -> CountsFinalized -> Done`.
//! Nothing is deleted before the store has answered, the whole catalog has
//! been read, and the working directory and provenance log are open.
//! Once the store has been cleared there is no rollback: a failure after that
//! point leaves a partially rebuilt store, and the fix is to rebuild again.
//!
//! Per-dataset download and parse failures are logged and skipped. Store
//! failures, cancellation, an expired deadline and local I/O failures end
//! the rebuild.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};

use futures::TryStreamExt;
use serde_json::{json, Value};
use tracing::debug;

use crate::batch::{FileCategory, ImportBatch};
use crate::catalog::CatalogReader;
use crate::config::ImportConfig;
use crate::guard::CallGuard;
use crate::models::{DatasetCounts, DatasetDescriptor, DatasetHandle, DatasetMetadata, VariantRecord};
use crate::progress::{ProgressReporter, RebuildEvent, SilentReporter};
use crate::provenance::{Locus, ProvenanceEntry, ProvenanceLog};
use crate::query::{Clause, Condition, Filter};
use crate::traits::{DocumentStore, PlatformClient};
use crate::variants::{read_variant_file, VariantFile};
use crate::AppError;

/// Phase of a rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildState {
    Idle,
    Connected,
    Cleared,
    Importing,
    CountsFinalized,
    Done,
    Failed,
}

/// Outcome of a successful rebuild.
#[derive(Debug, Default, Clone)]
pub struct RebuildSummary {
    /// Export collections found on the platform.
    pub collections: usize,
    /// Datasets imported.
    pub imported: usize,
    /// Datasets skipped after a download or parse failure.
    pub failed: usize,
    /// Variant records inserted.
    pub records: usize,
    /// Lines written to the provenance log.
    pub provenance_lines: usize,
    /// Final per-dataset totals.
    pub counts: Vec<DatasetCounts>,
}

/// Rebuilds the store from the datasets shared on the platform.
///
/// # Example
///
/// ```ignore
/// let guard = CallGuard::new(&GuardConfig::default(), CancellationToken::new());
/// let mut reconciler = Reconciler::new(&galaxy, &store, ImportConfig::default(), guard)
///     .with_origins_file("/tmp/variant-origins.txt");
///
/// let summary = reconciler.rebuild_with_progress(&TracingReporter).await?;
/// println!("{} dataset(s) imported", summary.imported);
/// ```
pub struct Reconciler<'a, P: PlatformClient, S: DocumentStore> {
    platform: &'a P,
    store: &'a S,
    config: ImportConfig,
    guard: CallGuard,
    origins_file: Option<PathBuf>,
    state: RebuildState,
}

impl<'a, P: PlatformClient, S: DocumentStore> Reconciler<'a, P, S> {
    pub fn new(platform: &'a P, store: &'a S, config: ImportConfig, guard: CallGuard) -> Self {
        Self {
            platform,
            store,
            config,
            guard,
            origins_file: None,
            state: RebuildState::Idle,
        }
    }

    /// Enables the provenance log at `path`.
    pub fn with_origins_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.origins_file = Some(path.into());
        self
    }

    pub fn state(&self) -> RebuildState {
        self.state
    }

    /// Runs a full rebuild without progress reporting.
    pub async fn rebuild(&mut self) -> Result<RebuildSummary, AppError> {
        self.rebuild_with_progress(&SilentReporter).await
    }

    /// Runs a full rebuild, emitting progress events through `reporter`.
    pub async fn rebuild_with_progress<R: ProgressReporter>(
        &mut self,
        reporter: &R,
    ) -> Result<RebuildSummary, AppError> {
        self.state = RebuildState::Idle;
        let result = self.run(reporter).await;
        if result.is_err() {
            self.state = RebuildState::Failed;
        }
        result
    }

    async fn run<R: ProgressReporter>(&mut self, reporter: &R) -> Result<RebuildSummary, AppError> {
        let catalog = self.connect(reporter).await?;
        let mut batch = ImportBatch::new(&self.config.work_dir)?;
        let mut log = match &self.origins_file {
            Some(path) => Some(ProvenanceLog::open(path).await?),
            None => None,
        };

        self.clear(reporter, log.as_mut()).await?;
        let mut summary = RebuildSummary {
            collections: catalog.len(),
            ..RebuildSummary::default()
        };

        self.state = RebuildState::Importing;
        for (_, datasets) in &catalog {
            for descriptor in datasets {
                self.guard.check()?;
                reporter.report(RebuildEvent::DatasetStarted {
                    name: &descriptor.name,
                    assembly: &descriptor.reference_assembly,
                });

                let outcome = self
                    .import_dataset(&mut batch, descriptor, log.as_mut())
                    .await;
                batch.release()?;

                match outcome {
                    Ok(records) => {
                        summary.imported += 1;
                        summary.records += records;
                        reporter.report(RebuildEvent::DatasetImported {
                            name: &descriptor.name,
                            records,
                        });
                    }
                    Err(e) if e.aborts_rebuild() => return Err(e),
                    Err(e) => {
                        summary.failed += 1;
                        reporter.report(RebuildEvent::DatasetFailed {
                            name: &descriptor.name,
                            error: &e.to_string(),
                        });
                    }
                }
            }
        }

        if let Some(log) = log.as_mut() {
            log.flush().await?;
            summary.provenance_lines = log.lines();
        }

        summary.counts = self.finalize_counts().await?;
        self.state = RebuildState::CountsFinalized;
        reporter.report(RebuildEvent::CountsFinalized {
            datasets: summary.counts.len(),
        });

        self.state = RebuildState::Done;
        reporter.report(RebuildEvent::Completed { summary: &summary });
        Ok(summary)
    }

    /// Runs a store call under the guard. A store that stops answering is
    /// treated like a store failure.
    async fn store_call<T>(
        &self,
        call: impl Future<Output = Result<T, AppError>>,
    ) -> Result<T, AppError> {
        self.guard.run(call).await.map_err(|e| match e {
            AppError::Timeout(secs) => {
                AppError::StoreError(format!("store did not answer within {} seconds", secs))
            }
            other => other,
        })
    }

    /// Checks both ends and reads the whole catalog. Returns the importable
    /// datasets of every export collection, in platform order.
    async fn connect<R: ProgressReporter>(
        &mut self,
        reporter: &R,
    ) -> Result<Vec<(String, Vec<DatasetDescriptor>)>, AppError> {
        self.store_call(self.store.ping()).await?;
        let account = self.guard.run(self.platform.whoami()).await?;
        let reader = CatalogReader::new(self.platform, &self.guard, &self.config);
        let collections = reader.collections().await?;
        reporter.report(RebuildEvent::Connected {
            account: &account,
            collections: collections.len(),
        });

        let mut catalog = Vec::with_capacity(collections.len());
        for collection_id in collections {
            let datasets = reader.datasets(&collection_id).await?;
            reporter.report(RebuildEvent::CollectionListed {
                collection_id: &collection_id,
                datasets: datasets.len(),
            });
            catalog.push((collection_id, datasets));
        }

        self.state = RebuildState::Connected;
        Ok(catalog)
    }

    async fn clear<R: ProgressReporter>(
        &mut self,
        reporter: &R,
        log: Option<&mut ProvenanceLog>,
    ) -> Result<(), AppError> {
        let mut removed = 0;
        for collection in [
            &self.config.variants_collection,
            &self.config.datasets_collection,
            &self.config.counts_collection,
        ] {
            removed += self.store_call(self.store.delete_all(collection)).await?;
        }
        if let Some(log) = log {
            log.truncate().await?;
        }

        self.state = RebuildState::Cleared;
        reporter.report(RebuildEvent::Cleared { removed });
        Ok(())
    }

    /// Imports one dataset. Returns the number of records inserted.
    async fn import_dataset(
        &self,
        batch: &mut ImportBatch,
        descriptor: &DatasetDescriptor,
        log: Option<&mut ProvenanceLog>,
    ) -> Result<usize, AppError> {
        let path = batch.path_for(FileCategory::Variants, &descriptor.content_id);
        let bytes = self
            .guard
            .run(
                self.platform
                    .download(&descriptor.external_id, descriptor.file_kind, &path),
            )
            .await?;
        debug!("Downloaded {} byte(s) to {}", bytes, path.display());

        let parsed = parse_in_background(path, descriptor).await?;

        let metadata = DatasetMetadata::for_assembly(
            &descriptor.reference_assembly,
            &self.config.external_url,
            parsed.sample_count,
        );
        let metadata_path = batch
            .write_metadata(&descriptor.content_id, &metadata)
            .await?;
        let handle = self.register_metadata(&metadata_path).await?;

        let records = parsed.records(&handle.dataset_id, &descriptor.reference_assembly);
        let docs = records
            .iter()
            .map(VariantRecord::to_document)
            .collect::<Result<Vec<_>, _>>()?;
        let indices = if docs.is_empty() {
            Vec::new()
        } else {
            self.store_call(
                self.store
                    .insert_many(&self.config.variants_collection, docs),
            )
            .await?
        };
        if indices.len() != records.len() {
            return Err(AppError::StoreError(format!(
                "inserted {} record(s) but got {} index(es) back",
                records.len(),
                indices.len()
            )));
        }

        if let Some(log) = log {
            record_provenance(log, descriptor, &records, &indices).await?;
        }

        Ok(records.len())
    }

    /// Registers the metadata file of a dataset, reusing an existing entry
    /// with the same id.
    async fn register_metadata(&self, path: &Path) -> Result<DatasetHandle, AppError> {
        let body: Value = serde_json::from_slice(&tokio::fs::read(path).await?)?;
        let dataset_id = body
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| AppError::MissingField("id".to_string()))?
            .to_string();

        let filter = Filter::single(Clause::new().with("id", Condition::Equals(json!(dataset_id))));
        let mut existing = self
            .store
            .find(&self.config.datasets_collection, &filter);
        if let Some(doc) = self.store_call(existing.try_next()).await? {
            return Ok(DatasetHandle {
                index: doc.index,
                dataset_id,
            });
        }

        let indices = self
            .store_call(
                self.store
                    .insert_many(&self.config.datasets_collection, vec![body]),
            )
            .await?;
        let index = indices
            .first()
            .copied()
            .ok_or_else(|| AppError::StoreError("insert returned no index".to_string()))?;
        debug!("Registered dataset {} at index {}", dataset_id, index);

        Ok(DatasetHandle { index, dataset_id })
    }

    /// Recomputes per-dataset totals from the stored variant records.
    ///
    /// The counts collection is replaced as a whole, the totals are copied
    /// onto the dataset metadata, and `sampleCount` is reset to null on every
    /// metadata entry.
    pub async fn finalize_counts(&self) -> Result<Vec<DatasetCounts>, AppError> {
        let mut totals: BTreeMap<String, (i64, i64)> = BTreeMap::new();
        let mut records = self
            .store
            .find(&self.config.variants_collection, &Filter::All);
        while let Some(doc) = self.store_call(records.try_next()).await? {
            let Some(dataset_id) = doc.body.get("datasetId").and_then(Value::as_str) else {
                continue;
            };
            let calls = doc.body.get("callCount").and_then(Value::as_i64).unwrap_or(0);
            let total = totals.entry(dataset_id.to_string()).or_default();
            total.0 += 1;
            total.1 += calls;
        }

        let counts: Vec<DatasetCounts> = totals
            .into_iter()
            .map(|(dataset_id, (variant_count, call_count))| DatasetCounts {
                dataset_id,
                variant_count,
                call_count,
            })
            .collect();

        self.store_call(self.store.replace_all(
            &self.config.counts_collection,
            counts.iter().map(DatasetCounts::to_document).collect(),
        ))
        .await?;

        for count in &counts {
            let filter = Filter::single(
                Clause::new().with("id", Condition::Equals(json!(count.dataset_id))),
            );
            self.store_call(self.store.update_many(
                &self.config.datasets_collection,
                &filter,
                json!({ "variantCount": count.variant_count, "callCount": count.call_count }),
            ))
            .await?;
        }

        self.store_call(self.store.update_many(
            &self.config.datasets_collection,
            &Filter::All,
            json!({ "sampleCount": null }),
        ))
        .await?;

        Ok(counts)
    }
}

async fn parse_in_background(
    path: PathBuf,
    descriptor: &DatasetDescriptor,
) -> Result<VariantFile, AppError> {
    let kind = descriptor.file_kind;
    tokio::task::spawn_blocking(move || read_variant_file(&path, kind))
        .await
        .map_err(|e| AppError::Generic(format!("variant reader task failed: {}", e)))?
}

/// Appends one provenance line per stored record of this dataset matching
/// each allele on `(start, referenceBases, alternateBases)`.
///
/// `indices[i]` is the storage index of `records[i]`. Records imported from
/// other datasets are never attributed to this one.
async fn record_provenance(
    log: &mut ProvenanceLog,
    descriptor: &DatasetDescriptor,
    records: &[VariantRecord],
    indices: &[i64],
) -> Result<(), AppError> {
    for record in records {
        let matches = records
            .iter()
            .zip(indices)
            .filter(|(stored, _)| stored.same_variant(record));
        for (stored, index) in matches {
            let line = ProvenanceEntry {
                index: *index,
                dataset_id: descriptor.external_id.clone(),
                locus: Some(Locus {
                    assembly_id: stored.assembly_id.clone(),
                    reference_name: stored.reference_name.clone(),
                    start: stored.start,
                    reference_bases: stored.reference_bases.clone(),
                    alternate_bases: stored.alternate_bases.clone(),
                }),
            };
            log.append(&line).await?;
        }
    }
    Ok(())
}
