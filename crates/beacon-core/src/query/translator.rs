//! Compiles criteria into store filters and runs them.

use futures::stream::BoxStream;
use serde_json::json;
use tracing::warn;

use super::criteria::{Comparison, CriteriaValue, FieldSpec, QueryCriteria, QueryKind};
use super::filter::{Clause, Condition, Filter};
use super::schema::{mappings_for, SchemaMapping};
use crate::models::Document;
use crate::traits::DocumentStore;
use crate::AppError;

/// Query translator for one query kind.
///
/// For multi-schema kinds one candidate clause is built per mapping and the
/// result is the OR of the non-empty candidates. A mapping that has no path
/// for a constrained field cannot express the query and contributes no
/// candidate. An empty OR matches the whole collection, whether the criteria
/// are empty or no mapping could express them; the latter is logged.
///
/// # Examples
///
/// ```
/// use beacon_core::query::{CriteriaValue, QueryCriteria, QueryKind, QueryTranslator};
/// use serde_json::json;
///
/// let mut criteria = QueryCriteria::new(QueryKind::Sequence);
/// criteria.set("referenceBases", CriteriaValue::Text("A".into())).unwrap();
/// criteria.set("alternateBases", CriteriaValue::Text("G".into())).unwrap();
///
/// let filter = QueryTranslator::new(QueryKind::Sequence).compile(&criteria).unwrap();
/// assert_eq!(filter.to_json(), json!({ "$or": [
///     { "referenceBases": "A", "alternateBases": "G" },
///     { "variation.referenceBases": "A", "variation.alternateBases": "G" },
/// ]}));
/// ```
#[derive(Debug, Clone)]
pub struct QueryTranslator {
    kind: QueryKind,
    mappings: Vec<SchemaMapping>,
}

impl QueryTranslator {
    /// Uses the built-in mappings of `kind`.
    pub fn new(kind: QueryKind) -> Self {
        Self {
            kind,
            mappings: mappings_for(kind),
        }
    }

    /// Uses caller-provided mappings, tried in order.
    pub fn with_mappings(kind: QueryKind, mappings: Vec<SchemaMapping>) -> Self {
        Self { kind, mappings }
    }

    pub fn kind(&self) -> QueryKind {
        self.kind
    }

    /// Checks the target collection and the kind's required fields.
    pub fn validate(&self, collection: &str, criteria: &QueryCriteria) -> Result<(), AppError> {
        self.check_kind(criteria)?;
        if collection.trim().is_empty() {
            return Err(AppError::MissingParameter("collection".to_string()));
        }
        if let Some(field) = criteria.missing_required().first() {
            return Err(AppError::MissingParameter(field.to_string()));
        }
        Ok(())
    }

    fn check_kind(&self, criteria: &QueryCriteria) -> Result<(), AppError> {
        if criteria.kind() != self.kind {
            return Err(AppError::InvalidCriteria(format!(
                "{} criteria given to a {} query",
                criteria.kind(),
                self.kind
            )));
        }
        Ok(())
    }

    /// Builds the filter for `criteria`. Does not check required fields.
    pub fn compile(&self, criteria: &QueryCriteria) -> Result<Filter, AppError> {
        self.check_kind(criteria)?;

        let candidates: Vec<Clause> = self
            .mappings
            .iter()
            .filter_map(|mapping| self.candidate(mapping, criteria))
            .collect();

        if candidates.is_empty() && !criteria.is_empty() {
            warn!(
                "No {} layout stores all of the given fields; the filter matches every document",
                self.kind
            );
        }

        if self.kind.is_multi_schema() {
            Ok(Filter::any_of(candidates))
        } else {
            Ok(candidates
                .into_iter()
                .next()
                .map(Filter::single)
                .unwrap_or(Filter::All))
        }
    }

    /// Clause for one mapping, or `None` if the mapping lacks a constrained field.
    fn candidate(&self, mapping: &SchemaMapping, criteria: &QueryCriteria) -> Option<Clause> {
        let mut clause = Clause::new();
        for spec in self.kind.fields() {
            let Some(value) = criteria.get(spec.name) else {
                continue;
            };
            let path = mapping.physical(spec.name)?;
            clause.push(path, condition(spec, value));
        }
        Some(clause)
    }

    /// Validates, compiles and starts streaming the matching documents.
    pub fn search<S: DocumentStore>(
        &self,
        store: &S,
        collection: &str,
        criteria: &QueryCriteria,
    ) -> Result<BoxStream<'static, Result<Document, AppError>>, AppError> {
        self.validate(collection, criteria)?;
        let filter = self.compile(criteria)?;
        tracing::debug!("Compiled {} query: {}", self.kind, filter.to_json());
        Ok(store.find(collection, &filter))
    }
}

fn condition(spec: &FieldSpec, value: &CriteriaValue) -> Condition {
    match (value, spec.comparison) {
        (CriteriaValue::Integer(n), Comparison::AtLeast) => Condition::at_least(*n),
        (CriteriaValue::Integer(n), Comparison::AtMost) => Condition::at_most(*n),
        (CriteriaValue::Integer(n), Comparison::Equals) => Condition::Equals(json!(n)),
        (CriteriaValue::Text(s), _) => Condition::Equals(json!(s)),
        (CriteriaValue::List(items), _) => Condition::AnyOf(items.iter().map(|i| json!(i)).collect()),
    }
}
