//! Domain types shared by the catalog reader, reconciler and query translator.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::AppError;

/// Variant file formats accepted from the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    Vcf,
    VcfBgzip,
    Json,
    JsonBgzip,
}

impl FileKind {
    pub const ALL: [FileKind; 4] = [
        FileKind::Vcf,
        FileKind::VcfBgzip,
        FileKind::Json,
        FileKind::JsonBgzip,
    ];

    /// Galaxy datatype extension for this kind.
    pub fn extension(self) -> &'static str {
        match self {
            FileKind::Vcf => "vcf",
            FileKind::VcfBgzip => "vcf_bgzip",
            FileKind::Json => "json",
            FileKind::JsonBgzip => "json_bgzip",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.extension() == ext)
    }

    /// True for VCF kinds, false for Beacon-friendly JSON kinds.
    pub fn is_vcf(self) -> bool {
        matches!(self, FileKind::Vcf | FileKind::VcfBgzip)
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Normalized description of one importable dataset.
///
/// Only the catalog reader constructs descriptors, and only after the
/// reference assembly has been normalized (see [`crate::assembly`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetDescriptor {
    /// Display name on the platform. Never written to the store.
    pub name: String,
    /// Platform dataset id. Only ever written to the provenance log.
    pub external_id: String,
    /// Platform content UUID; keys the working files.
    pub content_id: Uuid,
    pub file_kind: FileKind,
    /// `GRCh<N>` or `hg<N>`.
    pub reference_assembly: String,
}

/// One alternate allele of a stored variant.
///
/// Persisted with the flat field layout of the legacy beacon data table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantRecord {
    pub dataset_id: String,
    pub assembly_id: String,
    pub reference_name: String,
    /// 0-based start position.
    pub start: i64,
    pub end: i64,
    pub reference_bases: String,
    pub alternate_bases: String,
    pub variant_type: String,
    pub call_count: i64,
    pub internal_id: String,
}

impl VariantRecord {
    /// Builds the internal id from public coordinates only.
    pub fn internal_id_for(
        assembly: &str,
        reference_name: &str,
        start: i64,
        reference_bases: &str,
        alternate_bases: &str,
    ) -> String {
        format!(
            "{}:{}:{}{}>{}",
            assembly, reference_name, start, reference_bases, alternate_bases
        )
    }

    /// True when both records describe the same allele at the same position.
    pub fn same_variant(&self, other: &VariantRecord) -> bool {
        self.start == other.start
            && self.reference_bases == other.reference_bases
            && self.alternate_bases == other.alternate_bases
    }

    pub fn to_document(&self) -> Result<Value, AppError> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Public metadata for the datasets of one reference assembly.
///
/// Everything here is queryable through the store, so it is built only from
/// the normalized assembly id and fixed template text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetMetadata {
    pub id: String,
    pub name: String,
    pub description: String,
    pub assembly_id: String,
    pub external_url: String,
    pub access_type: String,
    pub create_date_time: DateTime<Utc>,
    pub update_date_time: DateTime<Utc>,
    pub version: String,
    pub call_count: i64,
    pub variant_count: i64,
    pub sample_count: Option<i64>,
}

impl DatasetMetadata {
    /// Synthesizes metadata for `assembly`.
    ///
    /// # Examples
    ///
    /// ```
    /// use beacon_core::models::DatasetMetadata;
    ///
    /// let meta = DatasetMetadata::for_assembly("GRCh38", "usegalaxy.eu", Some(3));
    /// assert_eq!(meta.id, "galaxy-grch38");
    /// assert_eq!(meta.name, "Galaxy.eu variants for GRCh38");
    /// ```
    pub fn for_assembly(assembly: &str, external_url: &str, sample_count: Option<i64>) -> Self {
        let now = Utc::now();
        Self {
            id: format!("galaxy-{}", assembly.to_lowercase()),
            name: format!("Galaxy.eu variants for {}", assembly),
            description: "variants shared by galaxy.eu users".to_string(),
            assembly_id: assembly.to_string(),
            external_url: external_url.to_string(),
            access_type: "PUBLIC".to_string(),
            create_date_time: now,
            update_date_time: now,
            version: "v0.1".to_string(),
            call_count: 0,
            variant_count: 0,
            sample_count,
        }
    }
}

/// Store identity of a registered dataset metadata entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetHandle {
    /// Storage index of the metadata document.
    pub index: i64,
    /// Dataset id referenced by variant records.
    pub dataset_id: String,
}

/// Derived per-dataset totals, recomputed after every rebuild.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetCounts {
    pub dataset_id: String,
    pub variant_count: i64,
    pub call_count: i64,
}

impl DatasetCounts {
    pub fn to_document(&self) -> Value {
        json!({
            "datasetId": self.dataset_id,
            "variantCount": self.variant_count,
            "callCount": self.call_count,
        })
    }
}

/// A stored document together with its store-assigned index.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub index: i64,
    pub body: Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_kind_extensions() {
        assert_eq!(FileKind::from_extension("vcf_bgzip"), Some(FileKind::VcfBgzip));
        assert_eq!(FileKind::from_extension("json"), Some(FileKind::Json));
        assert_eq!(FileKind::from_extension("bam"), None);
        assert!(FileKind::Vcf.is_vcf());
        assert!(!FileKind::JsonBgzip.is_vcf());
    }

    #[test]
    fn test_file_kind_deserializes_from_snake_case() {
        let kind: FileKind = serde_json::from_str("\"json_bgzip\"").unwrap();
        assert_eq!(kind, FileKind::JsonBgzip);
    }

    #[test]
    fn test_variant_record_uses_camel_case_fields() {
        let record = VariantRecord {
            dataset_id: "galaxy-grch38".into(),
            assembly_id: "GRCh38".into(),
            reference_name: "1".into(),
            start: 100,
            end: 101,
            reference_bases: "A".into(),
            alternate_bases: "G".into(),
            variant_type: "SNP".into(),
            call_count: 0,
            internal_id: VariantRecord::internal_id_for("GRCh38", "1", 100, "A", "G"),
        };

        let doc = record.to_document().unwrap();
        assert_eq!(doc["referenceBases"], "A");
        assert_eq!(doc["alternateBases"], "G");
        assert_eq!(doc["callCount"], 0);
        assert_eq!(doc["internalId"], "GRCh38:1:100A>G");
    }

    #[test]
    fn test_metadata_has_no_platform_identifiers() {
        let meta = DatasetMetadata::for_assembly("hg19", "usegalaxy.eu", None);
        let doc = serde_json::to_value(&meta).unwrap();
        let keys: Vec<&str> = doc.as_object().unwrap().keys().map(String::as_str).collect();

        assert_eq!(doc["id"], "galaxy-hg19");
        assert_eq!(doc["accessType"], "PUBLIC");
        assert!(doc["sampleCount"].is_null());
        for key in ["externalId", "uuid", "owner", "filename"] {
            assert!(!keys.contains(&key));
        }
    }

    #[test]
    fn test_metadata_timestamps_round_trip_as_rfc3339() {
        let meta = DatasetMetadata::for_assembly("GRCh38", "usegalaxy.eu", Some(2));
        let doc = serde_json::to_value(&meta).unwrap();

        let created = doc["createDateTime"].as_str().unwrap();
        assert!(DateTime::parse_from_rfc3339(created).is_ok());
        assert_eq!(doc["createDateTime"], doc["updateDateTime"]);

        let back: DatasetMetadata = serde_json::from_value(doc).unwrap();
        assert_eq!(back.create_date_time, meta.create_date_time);
    }
}
