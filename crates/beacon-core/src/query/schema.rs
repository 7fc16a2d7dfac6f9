//! Logical-to-physical field mappings.
//!
//! Variant collections have been written with two document layouts over
//! time: the flat legacy layout produced by the rebuild pipeline and the
//! nested Beacon v2 layout. Variant queries try both. Entity collections
//! have a single layout.

use super::criteria::{EntityKind, QueryKind};

/// Ordered list of logical field name to physical document path pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaMapping {
    name: String,
    fields: Vec<(String, String)>,
}

impl SchemaMapping {
    pub fn new<L, P>(name: impl Into<String>, fields: impl IntoIterator<Item = (L, P)>) -> Self
    where
        L: Into<String>,
        P: Into<String>,
    {
        Self {
            name: name.into(),
            fields: fields
                .into_iter()
                .map(|(l, p)| (l.into(), p.into()))
                .collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Physical path of a logical field, if this layout stores it.
    pub fn physical(&self, logical: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(l, _)| l == logical)
            .map(|(_, p)| p.as_str())
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(l, p)| (l.as_str(), p.as_str()))
    }
}

const FLAT: &str = "flat";
const NESTED: &str = "beacon-v2";

const NESTED_REFERENCE_NAME: &str = "variation.location.sequence_id";
const NESTED_START: &str = "variation.location.interval.start.value";
const NESTED_END: &str = "variation.location.interval.end.value";
const NESTED_VARIANT_TYPE: &str = "variation.variantType";
const NESTED_ALTERNATE: &str = "variation.alternateBases";
const NESTED_REFERENCE: &str = "variation.referenceBases";
const NESTED_AMINOACID: &str = "molecularAttributes.aminoacidChanges";
const NESTED_GENE: &str = "molecularAttributes.geneIds";

/// Mapping where every logical field is stored under its own name.
fn identity(name: &str, kind: QueryKind) -> SchemaMapping {
    SchemaMapping::new(name, kind.fields().iter().map(|f| (f.name, f.name)))
}

/// Returns the mappings of a query kind, in the order candidates are built.
pub fn mappings_for(kind: QueryKind) -> Vec<SchemaMapping> {
    match kind {
        QueryKind::Sequence => vec![
            identity(FLAT, kind),
            SchemaMapping::new(
                NESTED,
                [
                    ("referenceName", NESTED_REFERENCE_NAME),
                    ("start", NESTED_START),
                    ("alternateBases", NESTED_ALTERNATE),
                    ("referenceBases", NESTED_REFERENCE),
                    ("collectionIds", "caseLevelData.biosampleId"),
                ],
            ),
        ],
        QueryKind::Range => vec![
            identity(FLAT, kind),
            SchemaMapping::new(
                NESTED,
                [
                    ("referenceName", NESTED_REFERENCE_NAME),
                    ("start", NESTED_START),
                    ("end", NESTED_END),
                    ("variantType", NESTED_VARIANT_TYPE),
                    ("alternateBases", NESTED_ALTERNATE),
                    ("aminoacidChange", NESTED_AMINOACID),
                    ("variantMinLength", NESTED_START),
                    ("variantMaxLength", NESTED_END),
                ],
            ),
        ],
        QueryKind::Gene => vec![
            identity(FLAT, kind),
            SchemaMapping::new(
                NESTED,
                [
                    ("geneId", NESTED_GENE),
                    ("variantType", NESTED_VARIANT_TYPE),
                    ("alternateBases", NESTED_ALTERNATE),
                    ("aminoacidChange", NESTED_AMINOACID),
                    ("variantMinLength", NESTED_START),
                    ("variantMaxLength", NESTED_END),
                ],
            ),
        ],
        QueryKind::Bracket => vec![
            SchemaMapping::new(
                FLAT,
                [
                    ("referenceName", "referenceName"),
                    ("startMinimum", "start"),
                    ("startMaximum", "start"),
                    ("endMinimum", "end"),
                    ("endMaximum", "end"),
                    ("variantType", "variantType"),
                ],
            ),
            SchemaMapping::new(
                NESTED,
                [
                    ("referenceName", NESTED_REFERENCE_NAME),
                    ("startMinimum", NESTED_START),
                    ("startMaximum", NESTED_START),
                    ("endMinimum", NESTED_END),
                    ("endMaximum", NESTED_END),
                    ("variantType", NESTED_VARIANT_TYPE),
                ],
            ),
        ],
        QueryKind::Entity(entity) => vec![entity_mapping(entity)],
    }
}

fn entity_mapping(entity: EntityKind) -> SchemaMapping {
    let name = entity.name();
    match entity {
        EntityKind::Analyses | EntityKind::Datasets | EntityKind::Runs => {
            identity(name, QueryKind::Entity(entity))
        }
        EntityKind::Biosamples => SchemaMapping::new(
            name,
            [
                ("id", "id"),
                ("individualId", "individualId"),
                ("biosampleStatus", "biosampleStatus.id"),
                ("sampleOriginType", "sampleOriginType.id"),
                ("collectionMoment", "collectionMoment"),
                ("histologicalDiagnosis", "histologicalDiagnosis.id"),
            ],
        ),
        EntityKind::Cohorts => SchemaMapping::new(
            name,
            [
                ("id", "id"),
                ("name", "name"),
                ("cohortType", "cohortType"),
                ("cohortDesign", "cohortDesign.id"),
                ("minCohortSize", "cohortSize"),
            ],
        ),
        EntityKind::Individuals => SchemaMapping::new(
            name,
            [
                ("id", "id"),
                ("sex", "sex.id"),
                ("ethnicity", "ethnicity.id"),
                ("geographicOrigin", "geographicOrigin.id"),
                ("diseaseCode", "diseases.diseaseCode.id"),
                ("phenotypicFeature", "phenotypicFeatures.featureType.id"),
            ],
        ),
        EntityKind::StructuralVariants => SchemaMapping::new(
            name,
            [
                ("variantInternalId", "variantInternalId"),
                ("referenceName", NESTED_REFERENCE_NAME),
                ("variantType", NESTED_VARIANT_TYPE),
                ("start", NESTED_START),
                ("end", NESTED_END),
                ("geneId", NESTED_GENE),
            ],
        ),
    }
}
