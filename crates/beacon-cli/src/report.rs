//! Formatting helpers for `beacon stats`.

use beacon_core::{DatasetCounts, Document};
use tracing::warn;

/// Reads the stored count documents. Documents that do not hold a dataset id
/// and both totals are skipped with a warning.
pub fn dataset_counts(docs: Vec<Document>) -> Vec<DatasetCounts> {
    docs.into_iter()
        .filter_map(|doc| match serde_json::from_value::<DatasetCounts>(doc.body) {
            Ok(counts) => Some(counts),
            Err(e) => {
                warn!("Skipping malformed count document {}: {}", doc.index, e);
                None
            }
        })
        .collect()
}

/// One aligned table row.
pub fn count_row(counts: &DatasetCounts) -> String {
    format!(
        "  {:<20} {:>12} {:>12}",
        counts.dataset_id, counts.variant_count, counts.call_count
    )
}
