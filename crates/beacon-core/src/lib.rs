//! Galaxy Beacon Core - domain types, rebuild pipeline and query translation.

pub mod assembly;
pub mod batch;
pub mod catalog;
pub mod config;
pub mod error;
pub mod guard;
pub mod models;
pub mod progress;
pub mod provenance;
pub mod query;
pub mod reconcile;
pub mod traits;
pub mod variants;

#[cfg(test)]
mod testing;

pub use config::{
    default_config_path, load_settings, DbConfig, GuardConfig, HttpConfig, ImportConfig, Settings,
};
pub use error::{AppError, ErrorClass};
pub use guard::CallGuard;
pub use models::{
    DatasetCounts, DatasetDescriptor, DatasetHandle, DatasetMetadata, Document, FileKind,
    VariantRecord,
};
pub use progress::{ProgressReporter, RebuildEvent, SilentReporter, TracingReporter};
pub use reconcile::{RebuildState, RebuildSummary, Reconciler};
pub use traits::{DocumentStore, PlatformClient};
