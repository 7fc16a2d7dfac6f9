//! Turns parsed search arguments into query criteria.

use beacon_core::query::{CriteriaValue, EntityKind, QueryCriteria, QueryKind};
use beacon_core::AppError;

use crate::config::{
    BracketArgs, EntityArgs, GeneArgs, RangeArgs, SearchKind, SearchTarget, SequenceArgs,
    VariantFilters,
};

fn text(value: &Option<String>) -> Option<CriteriaValue> {
    value.clone().map(CriteriaValue::Text)
}

fn integer(value: Option<i64>) -> Option<CriteriaValue> {
    value.map(CriteriaValue::Integer)
}

impl SearchKind {
    pub fn kind(&self) -> QueryKind {
        match self {
            SearchKind::Sequence(_) => QueryKind::Sequence,
            SearchKind::Range(_) => QueryKind::Range,
            SearchKind::Gene(_) => QueryKind::Gene,
            SearchKind::Bracket(_) => QueryKind::Bracket,
            SearchKind::Analyses(_) => QueryKind::Entity(EntityKind::Analyses),
            SearchKind::Biosamples(_) => QueryKind::Entity(EntityKind::Biosamples),
            SearchKind::Cohorts(_) => QueryKind::Entity(EntityKind::Cohorts),
            SearchKind::Datasets(_) => QueryKind::Entity(EntityKind::Datasets),
            SearchKind::Individuals(_) => QueryKind::Entity(EntityKind::Individuals),
            SearchKind::Runs(_) => QueryKind::Entity(EntityKind::Runs),
            SearchKind::StructuralVariants(_) => QueryKind::Entity(EntityKind::StructuralVariants),
        }
    }

    pub fn target(&self) -> &SearchTarget {
        match self {
            SearchKind::Sequence(args) => &args.target,
            SearchKind::Range(args) => &args.target,
            SearchKind::Gene(args) => &args.target,
            SearchKind::Bracket(args) => &args.target,
            SearchKind::Analyses(args)
            | SearchKind::Biosamples(args)
            | SearchKind::Cohorts(args)
            | SearchKind::Datasets(args)
            | SearchKind::Individuals(args)
            | SearchKind::Runs(args)
            | SearchKind::StructuralVariants(args) => &args.target,
        }
    }

    /// Builds the criteria of this search. Fails on unknown or mistyped fields.
    pub fn criteria(&self) -> Result<QueryCriteria, AppError> {
        let kind = self.kind();
        match self {
            SearchKind::Sequence(args) => sequence(args),
            SearchKind::Range(args) => range(args),
            SearchKind::Gene(args) => gene(args),
            SearchKind::Bracket(args) => bracket(args),
            SearchKind::Analyses(args)
            | SearchKind::Biosamples(args)
            | SearchKind::Cohorts(args)
            | SearchKind::Datasets(args)
            | SearchKind::Individuals(args)
            | SearchKind::Runs(args)
            | SearchKind::StructuralVariants(args) => entity(kind, args),
        }
    }

    /// Collection named by `--collection`, or the kind's default.
    pub fn collection(&self) -> String {
        self.target()
            .collection
            .clone()
            .unwrap_or_else(|| self.kind().default_collection().to_string())
    }
}

fn sequence(args: &SequenceArgs) -> Result<QueryCriteria, AppError> {
    let ids = (!args.collection_ids.is_empty()).then(|| CriteriaValue::List(args.collection_ids.clone()));
    QueryCriteria::new(QueryKind::Sequence)
        .with("referenceName", text(&args.reference_name))?
        .with("start", integer(args.start))?
        .with("referenceBases", text(&args.reference_bases))?
        .with("alternateBases", text(&args.alternate_bases))?
        .with("collectionIds", ids)
}

fn with_variant_filters(
    criteria: QueryCriteria,
    filters: &VariantFilters,
) -> Result<QueryCriteria, AppError> {
    criteria
        .with("variantType", text(&filters.variant_type))?
        .with("alternateBases", text(&filters.alternate_bases))?
        .with("aminoacidChange", text(&filters.aminoacid_change))?
        .with("variantMinLength", integer(filters.variant_min_length))?
        .with("variantMaxLength", integer(filters.variant_max_length))
}

fn range(args: &RangeArgs) -> Result<QueryCriteria, AppError> {
    let criteria = QueryCriteria::new(QueryKind::Range)
        .with("referenceName", text(&args.reference_name))?
        .with("start", integer(args.start))?
        .with("end", integer(args.end))?;
    with_variant_filters(criteria, &args.variant)
}

fn gene(args: &GeneArgs) -> Result<QueryCriteria, AppError> {
    let criteria = QueryCriteria::new(QueryKind::Gene).with("geneId", text(&args.gene_id))?;
    with_variant_filters(criteria, &args.variant)
}

fn bracket(args: &BracketArgs) -> Result<QueryCriteria, AppError> {
    QueryCriteria::new(QueryKind::Bracket)
        .with("referenceName", text(&args.reference_name))?
        .with("startMinimum", integer(args.start_minimum))?
        .with("startMaximum", integer(args.start_maximum))?
        .with("endMinimum", integer(args.end_minimum))?
        .with("endMaximum", integer(args.end_maximum))?
        .with("variantType", text(&args.variant_type))
}

fn entity(kind: QueryKind, args: &EntityArgs) -> Result<QueryCriteria, AppError> {
    let mut criteria = QueryCriteria::new(kind);
    if let Some(id) = &args.id {
        criteria.set_raw("id", id)?;
    }
    for filter in &args.filters {
        let (field, value) = filter.split_once('=').ok_or_else(|| {
            AppError::InvalidCriteria(format!("expected FIELD=VALUE, got \"{}\"", filter))
        })?;
        criteria.set_raw(field.trim(), value)?;
    }
    Ok(criteria)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Command, Config};
    use clap::Parser;

    fn search(args: &[&str]) -> SearchKind {
        let argv = ["beacon", "search"].iter().chain(args.iter());
        match Config::try_parse_from(argv).unwrap().command {
            Command::Search(kind) => kind,
            other => panic!("expected search, got {:?}", other),
        }
    }

    #[test]
    fn test_sequence_flags_accept_camel_case() {
        let kind = search(&[
            "sequence",
            "--referenceBases",
            "A",
            "--alternate-bases",
            "G",
            "--start",
            "43044294",
            "--collectionIds",
            "S1,S2",
        ]);
        let criteria = kind.criteria().unwrap();

        assert_eq!(criteria.kind(), QueryKind::Sequence);
        assert_eq!(criteria.get("referenceBases"), Some(&CriteriaValue::Text("A".into())));
        assert_eq!(criteria.get("start"), Some(&CriteriaValue::Integer(43044294)));
        assert_eq!(
            criteria.get("collectionIds"),
            Some(&CriteriaValue::List(vec!["S1".into(), "S2".into()]))
        );
        assert_eq!(kind.collection(), "genomicVariations");
    }

    #[test]
    fn test_missing_flags_leave_criteria_empty() {
        let criteria = search(&["range"]).criteria().unwrap();
        assert!(criteria.is_empty());
        assert_eq!(criteria.missing_required(), vec!["start", "end"]);
    }

    #[test]
    fn test_gene_with_variant_filters() {
        let criteria = search(&["gene", "--geneId", "BRCA1", "--variant-min-length", "5"])
            .criteria()
            .unwrap();
        assert_eq!(criteria.get("geneId"), Some(&CriteriaValue::Text("BRCA1".into())));
        assert_eq!(criteria.get("variantMinLength"), Some(&CriteriaValue::Integer(5)));
    }

    #[test]
    fn test_entity_filters() {
        let kind = search(&[
            "cohorts",
            "--id",
            "cohort-1",
            "-f",
            "minCohortSize=10",
            "--collection",
            "myCohorts",
        ]);
        let criteria = kind.criteria().unwrap();

        assert_eq!(criteria.get("id"), Some(&CriteriaValue::Text("cohort-1".into())));
        assert_eq!(criteria.get("minCohortSize"), Some(&CriteriaValue::Integer(10)));
        assert_eq!(kind.collection(), "myCohorts");
    }

    #[test]
    fn test_entity_filter_errors() {
        let err = search(&["individuals", "-f", "sex"]).criteria().unwrap_err();
        assert!(matches!(err, AppError::InvalidCriteria(_)));

        let err = search(&["individuals", "-f", "shoeSize=42"]).criteria().unwrap_err();
        assert!(matches!(err, AppError::InvalidCriteria(_)));

        let err = search(&["cohorts", "-f", "minCohortSize=many"]).criteria().unwrap_err();
        assert!(matches!(err, AppError::InvalidCriteria(_)));
    }

    #[test]
    fn test_structural_variants_default_collection() {
        let kind = search(&["structural-variants", "-f", "geneId=TP53"]);
        assert_eq!(kind.collection(), "structuralVariants");
    }

    #[test]
    fn test_unknown_flag_is_parse_error() {
        let result = Config::try_parse_from(["beacon", "search", "sequence", "--gene-id", "X"]);
        assert!(result.is_err());
    }
}
