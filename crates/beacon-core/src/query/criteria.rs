//! Query kinds and typed search criteria.

use std::collections::BTreeMap;
use std::fmt;

use crate::AppError;

/// Value type accepted by a criteria field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Text,
    Integer,
    /// Comma-separated list of text values.
    List,
}

/// How a field constrains the documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Equals,
    /// Inclusive lower bound.
    AtLeast,
    /// Inclusive upper bound.
    AtMost,
}

/// One logical field of a query kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub value_type: ValueType,
    pub comparison: Comparison,
    pub required: bool,
}

const fn text(name: &'static str) -> FieldSpec {
    FieldSpec {
        name,
        value_type: ValueType::Text,
        comparison: Comparison::Equals,
        required: false,
    }
}

const fn integer(name: &'static str, comparison: Comparison) -> FieldSpec {
    FieldSpec {
        name,
        value_type: ValueType::Integer,
        comparison,
        required: false,
    }
}

const fn list(name: &'static str) -> FieldSpec {
    FieldSpec {
        name,
        value_type: ValueType::List,
        comparison: Comparison::Equals,
        required: false,
    }
}

const fn required(spec: FieldSpec) -> FieldSpec {
    FieldSpec {
        required: true,
        ..spec
    }
}

const SEQUENCE_FIELDS: &[FieldSpec] = &[
    text("referenceName"),
    integer("start", Comparison::Equals),
    required(text("referenceBases")),
    required(text("alternateBases")),
    list("collectionIds"),
];

const RANGE_FIELDS: &[FieldSpec] = &[
    text("referenceName"),
    required(integer("start", Comparison::AtLeast)),
    required(integer("end", Comparison::AtMost)),
    text("variantType"),
    text("alternateBases"),
    text("aminoacidChange"),
    integer("variantMinLength", Comparison::AtLeast),
    integer("variantMaxLength", Comparison::AtMost),
];

const GENE_FIELDS: &[FieldSpec] = &[
    required(text("geneId")),
    text("variantType"),
    text("alternateBases"),
    text("aminoacidChange"),
    integer("variantMinLength", Comparison::AtLeast),
    integer("variantMaxLength", Comparison::AtMost),
];

const BRACKET_FIELDS: &[FieldSpec] = &[
    text("referenceName"),
    required(integer("startMinimum", Comparison::AtLeast)),
    required(integer("startMaximum", Comparison::AtMost)),
    required(integer("endMinimum", Comparison::AtLeast)),
    required(integer("endMaximum", Comparison::AtMost)),
    text("variantType"),
];

const ANALYSES_FIELDS: &[FieldSpec] = &[
    text("id"),
    text("runId"),
    text("biosampleId"),
    text("individualId"),
    text("pipelineName"),
    text("variantCaller"),
    text("aligner"),
];

const BIOSAMPLES_FIELDS: &[FieldSpec] = &[
    text("id"),
    text("individualId"),
    text("biosampleStatus"),
    text("sampleOriginType"),
    text("collectionMoment"),
    text("histologicalDiagnosis"),
];

const COHORTS_FIELDS: &[FieldSpec] = &[
    text("id"),
    text("name"),
    text("cohortType"),
    text("cohortDesign"),
    integer("minCohortSize", Comparison::AtLeast),
];

const DATASETS_FIELDS: &[FieldSpec] = &[text("id"), text("name"), text("assemblyId")];

const INDIVIDUALS_FIELDS: &[FieldSpec] = &[
    text("id"),
    text("sex"),
    text("ethnicity"),
    text("geographicOrigin"),
    text("diseaseCode"),
    text("phenotypicFeature"),
];

const RUNS_FIELDS: &[FieldSpec] = &[
    text("id"),
    text("biosampleId"),
    text("individualId"),
    text("libraryStrategy"),
    text("platform"),
    text("runDate"),
];

const STRUCTURAL_VARIANT_FIELDS: &[FieldSpec] = &[
    text("variantInternalId"),
    text("referenceName"),
    text("variantType"),
    integer("start", Comparison::AtLeast),
    integer("end", Comparison::AtMost),
    text("geneId"),
];

/// Fixed-schema entity collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Analyses,
    Biosamples,
    Cohorts,
    Datasets,
    Individuals,
    Runs,
    StructuralVariants,
}

impl EntityKind {
    pub const ALL: [EntityKind; 7] = [
        EntityKind::Analyses,
        EntityKind::Biosamples,
        EntityKind::Cohorts,
        EntityKind::Datasets,
        EntityKind::Individuals,
        EntityKind::Runs,
        EntityKind::StructuralVariants,
    ];

    pub fn name(self) -> &'static str {
        match self {
            EntityKind::Analyses => "analyses",
            EntityKind::Biosamples => "biosamples",
            EntityKind::Cohorts => "cohorts",
            EntityKind::Datasets => "datasets",
            EntityKind::Individuals => "individuals",
            EntityKind::Runs => "runs",
            EntityKind::StructuralVariants => "structural-variants",
        }
    }

    /// Collection searched when none is given.
    pub fn default_collection(self) -> &'static str {
        match self {
            EntityKind::StructuralVariants => "structuralVariants",
            other => other.name(),
        }
    }
}

/// The search a [`QueryCriteria`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    /// Variant at an exact position.
    Sequence,
    /// Variants inside a position range.
    Range,
    /// Variants of a gene.
    Gene,
    /// Variants whose start and end fall in two brackets.
    Bracket,
    Entity(EntityKind),
}

impl QueryKind {
    /// All kinds, variant kinds first.
    pub fn all() -> impl Iterator<Item = QueryKind> {
        [
            QueryKind::Sequence,
            QueryKind::Range,
            QueryKind::Gene,
            QueryKind::Bracket,
        ]
        .into_iter()
        .chain(EntityKind::ALL.into_iter().map(QueryKind::Entity))
    }

    pub fn name(self) -> &'static str {
        match self {
            QueryKind::Sequence => "sequence",
            QueryKind::Range => "range",
            QueryKind::Gene => "gene",
            QueryKind::Bracket => "bracket",
            QueryKind::Entity(entity) => entity.name(),
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::all().find(|k| k.name() == name)
    }

    /// True for variant kinds, which search several physical layouts at once.
    pub fn is_multi_schema(self) -> bool {
        !matches!(self, QueryKind::Entity(_))
    }

    pub fn fields(self) -> &'static [FieldSpec] {
        match self {
            QueryKind::Sequence => SEQUENCE_FIELDS,
            QueryKind::Range => RANGE_FIELDS,
            QueryKind::Gene => GENE_FIELDS,
            QueryKind::Bracket => BRACKET_FIELDS,
            QueryKind::Entity(EntityKind::Analyses) => ANALYSES_FIELDS,
            QueryKind::Entity(EntityKind::Biosamples) => BIOSAMPLES_FIELDS,
            QueryKind::Entity(EntityKind::Cohorts) => COHORTS_FIELDS,
            QueryKind::Entity(EntityKind::Datasets) => DATASETS_FIELDS,
            QueryKind::Entity(EntityKind::Individuals) => INDIVIDUALS_FIELDS,
            QueryKind::Entity(EntityKind::Runs) => RUNS_FIELDS,
            QueryKind::Entity(EntityKind::StructuralVariants) => STRUCTURAL_VARIANT_FIELDS,
        }
    }

    pub fn field(self, name: &str) -> Option<&'static FieldSpec> {
        self.fields().iter().find(|f| f.name == name)
    }

    /// Collection searched when none is given.
    pub fn default_collection(self) -> &'static str {
        match self {
            QueryKind::Entity(entity) => entity.default_collection(),
            _ => "genomicVariations",
        }
    }
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A typed criteria value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CriteriaValue {
    Text(String),
    Integer(i64),
    List(Vec<String>),
}

impl CriteriaValue {
    fn matches_type(&self, value_type: ValueType) -> bool {
        matches!(
            (self, value_type),
            (CriteriaValue::Text(_), ValueType::Text)
                | (CriteriaValue::Integer(_), ValueType::Integer)
                | (CriteriaValue::List(_), ValueType::List)
        )
    }

    fn is_empty(&self) -> bool {
        match self {
            CriteriaValue::Text(s) => s.is_empty(),
            CriteriaValue::Integer(_) => false,
            CriteriaValue::List(items) => items.is_empty(),
        }
    }
}

/// Search criteria for one query kind.
///
/// Only fields of the kind can be set. Empty text and empty lists are the
/// same as an absent value: they do not constrain anything.
///
/// # Examples
///
/// ```
/// use beacon_core::query::{CriteriaValue, QueryCriteria, QueryKind};
///
/// let mut criteria = QueryCriteria::new(QueryKind::Gene);
/// criteria.set("geneId", CriteriaValue::Text("BRCA1".into())).unwrap();
/// criteria.set_raw("variantMinLength", "3").unwrap();
///
/// assert_eq!(criteria.get("variantMinLength"), Some(&CriteriaValue::Integer(3)));
/// assert!(criteria.missing_required().is_empty());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryCriteria {
    kind: QueryKind,
    values: BTreeMap<&'static str, CriteriaValue>,
}

impl QueryCriteria {
    pub fn new(kind: QueryKind) -> Self {
        Self {
            kind,
            values: BTreeMap::new(),
        }
    }

    pub fn kind(&self) -> QueryKind {
        self.kind
    }

    fn spec(&self, name: &str) -> Result<&'static FieldSpec, AppError> {
        self.kind.field(name).ok_or_else(|| {
            AppError::InvalidCriteria(format!(
                "\"{}\" is not a {} field (expected one of: {})",
                name,
                self.kind,
                self.kind
                    .fields()
                    .iter()
                    .map(|f| f.name)
                    .collect::<Vec<_>>()
                    .join(", ")
            ))
        })
    }

    /// Sets a typed value. Empty values clear the field.
    pub fn set(&mut self, name: &str, value: CriteriaValue) -> Result<(), AppError> {
        let spec = self.spec(name)?;
        if !value.matches_type(spec.value_type) {
            return Err(AppError::InvalidCriteria(format!(
                "{} expects a {:?} value",
                name, spec.value_type
            )));
        }
        if value.is_empty() {
            self.values.remove(spec.name);
        } else {
            self.values.insert(spec.name, value);
        }
        Ok(())
    }

    /// Parses `raw` according to the field's type and sets it.
    pub fn set_raw(&mut self, name: &str, raw: &str) -> Result<(), AppError> {
        let spec = self.spec(name)?;
        let raw = raw.trim();
        let value = match spec.value_type {
            ValueType::Text => CriteriaValue::Text(raw.to_string()),
            ValueType::Integer if raw.is_empty() => {
                self.values.remove(spec.name);
                return Ok(());
            }
            ValueType::Integer => CriteriaValue::Integer(raw.parse().map_err(|_| {
                AppError::InvalidCriteria(format!("{} expects an integer, got \"{}\"", name, raw))
            })?),
            ValueType::List => CriteriaValue::List(
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect(),
            ),
        };
        self.set(name, value)
    }

    /// Builder form of [`set`](Self::set) for optional values.
    pub fn with(mut self, name: &str, value: Option<CriteriaValue>) -> Result<Self, AppError> {
        if let Some(value) = value {
            self.set(name, value)?;
        }
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&CriteriaValue> {
        self.values.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Required fields of the kind that have no value, in declaration order.
    pub fn missing_required(&self) -> Vec<&'static str> {
        self.kind
            .fields()
            .iter()
            .filter(|f| f.required && !self.values.contains_key(f.name))
            .map(|f| f.name)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names_round_trip() {
        for kind in QueryKind::all() {
            assert_eq!(QueryKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(QueryKind::from_name("variants"), None);
        assert_eq!(QueryKind::all().count(), 11);
    }

    #[test]
    fn test_required_fields() {
        let names = |kind: QueryKind| QueryCriteria::new(kind).missing_required();

        assert_eq!(names(QueryKind::Sequence), vec!["referenceBases", "alternateBases"]);
        assert_eq!(names(QueryKind::Range), vec!["start", "end"]);
        assert_eq!(names(QueryKind::Gene), vec!["geneId"]);
        assert_eq!(
            names(QueryKind::Bracket),
            vec!["startMinimum", "startMaximum", "endMinimum", "endMaximum"]
        );
        for entity in EntityKind::ALL {
            assert!(names(QueryKind::Entity(entity)).is_empty());
        }
    }

    #[test]
    fn test_empty_values_are_absent() {
        let mut criteria = QueryCriteria::new(QueryKind::Sequence);
        criteria.set_raw("referenceName", "1").unwrap();
        criteria.set_raw("referenceName", "  ").unwrap();
        criteria.set_raw("collectionIds", " , ").unwrap();
        criteria.set_raw("start", "").unwrap();

        assert!(criteria.is_empty());
    }

    #[test]
    fn test_set_raw_parses_types() {
        let mut criteria = QueryCriteria::new(QueryKind::Sequence);
        criteria.set_raw("start", "43044294").unwrap();
        criteria.set_raw("collectionIds", "S1, S2").unwrap();

        assert_eq!(criteria.get("start"), Some(&CriteriaValue::Integer(43044294)));
        assert_eq!(
            criteria.get("collectionIds"),
            Some(&CriteriaValue::List(vec!["S1".into(), "S2".into()]))
        );
    }

    #[test]
    fn test_rejects_unknown_fields_and_bad_types() {
        let mut criteria = QueryCriteria::new(QueryKind::Gene);

        let err = criteria.set_raw("start", "1").unwrap_err();
        assert!(matches!(err, AppError::InvalidCriteria(_)));
        assert!(err.to_string().contains("geneId"));

        assert!(criteria.set_raw("variantMinLength", "three").is_err());
        assert!(criteria
            .set("geneId", CriteriaValue::Integer(1))
            .is_err());
    }
}
