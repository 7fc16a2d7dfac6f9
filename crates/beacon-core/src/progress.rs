//! Progress reporting for rebuild operations.
//!
//! The reconciler emits [`RebuildEvent`]s through a [`ProgressReporter`] so
//! the CLI can log progress without the pipeline knowing how it is shown.

use crate::reconcile::RebuildSummary;

/// Events emitted while rebuilding the store.
#[derive(Debug, Clone)]
pub enum RebuildEvent<'a> {
    /// Store and platform are reachable.
    Connected {
        /// Account the platform credentials belong to.
        account: &'a str,
        /// Number of export collections found.
        collections: usize,
    },

    /// Previous store content has been removed.
    Cleared {
        /// Documents deleted across all managed collections.
        removed: u64,
    },

    /// Enumeration of one collection finished.
    CollectionListed {
        collection_id: &'a str,
        /// Descriptors that passed validation and permission checks.
        datasets: usize,
    },

    /// Import of one dataset is starting.
    DatasetStarted {
        name: &'a str,
        assembly: &'a str,
    },

    /// One dataset was imported.
    DatasetImported {
        name: &'a str,
        /// Variant records inserted for this dataset.
        records: usize,
    },

    /// One dataset was skipped after a download or parse failure.
    DatasetFailed { name: &'a str, error: &'a str },

    /// Dataset counts were recomputed.
    CountsFinalized {
        /// Number of dataset ids with at least one record.
        datasets: usize,
    },

    /// Rebuild finished.
    Completed { summary: &'a RebuildSummary },
}

/// Trait for reporting rebuild progress.
///
/// The default implementation does nothing (silent mode), which suits
/// library usage and tests.
///
/// # Example
///
/// ```
/// use beacon_core::progress::{ProgressReporter, RebuildEvent};
///
/// struct FailureCounter(std::sync::atomic::AtomicUsize);
///
/// impl ProgressReporter for FailureCounter {
///     fn report(&self, event: RebuildEvent<'_>) {
///         if let RebuildEvent::DatasetFailed { .. } = event {
///             self.0.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
///         }
///     }
/// }
/// ```
pub trait ProgressReporter: Send + Sync {
    /// Called when a rebuild event occurs.
    fn report(&self, event: RebuildEvent<'_>) {
        let _ = event;
    }
}

/// A no-op reporter that ignores all events.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}

/// A reporter that logs events using the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ProgressReporter for TracingReporter {
    fn report(&self, event: RebuildEvent<'_>) {
        use tracing::{info, warn};

        match event {
            RebuildEvent::Connected {
                account,
                collections,
            } => {
                info!(
                    "Connected as \"{}\", {} export collection(s) found",
                    account, collections
                );
            }
            RebuildEvent::Cleared { removed } => {
                info!("Cleared {} document(s) from the store", removed);
            }
            RebuildEvent::CollectionListed {
                collection_id,
                datasets,
            } => {
                info!(
                    "Collection {}: {} importable dataset(s)",
                    collection_id, datasets
                );
            }
            RebuildEvent::DatasetStarted { name, assembly } => {
                info!("Next file is {} ({})", name, assembly);
            }
            RebuildEvent::DatasetImported { name, records } => {
                info!("Imported {} variant record(s) from {}", records, name);
            }
            RebuildEvent::DatasetFailed { name, error } => {
                warn!("Skipped {}: {}", name, error);
            }
            RebuildEvent::CountsFinalized { datasets } => {
                info!("Set variant counts for {} dataset(s)", datasets);
            }
            RebuildEvent::Completed { summary } => {
                info!(
                    "Rebuild complete: {} dataset(s) imported, {} failed, {} record(s), {} origin line(s)",
                    summary.imported, summary.failed, summary.records, summary.provenance_lines
                );
            }
        }
    }
}
