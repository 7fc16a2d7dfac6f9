//! Store-independent filter representation.
//!
//! A [`Filter`] is what the translator hands to a [`crate::traits::DocumentStore`].
//! Stores either compile it to their native query language or evaluate it
//! with [`Filter::matches`]. [`Filter::to_json`] renders the MongoDB-style
//! document used for `--explain` output.

use serde_json::{json, Map, Value};

/// Comparison applied to one physical field.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Field equals the value, or is an array containing it.
    Equals(Value),
    /// Field equals any of the values.
    AnyOf(Vec<Value>),
    /// Numeric field within inclusive bounds.
    Range { min: Option<i64>, max: Option<i64> },
}

impl Condition {
    pub fn at_least(min: i64) -> Self {
        Condition::Range {
            min: Some(min),
            max: None,
        }
    }

    pub fn at_most(max: i64) -> Self {
        Condition::Range {
            min: None,
            max: Some(max),
        }
    }

    fn matches_leaf(&self, value: &Value) -> bool {
        match self {
            Condition::Equals(expected) => equals_or_contains(value, expected),
            Condition::AnyOf(options) => options.iter().any(|o| equals_or_contains(value, o)),
            Condition::Range { min, max } => {
                let Some(n) = value.as_f64() else {
                    return false;
                };
                min.is_none_or(|m| n >= m as f64) && max.is_none_or(|m| n <= m as f64)
            }
        }
    }

    fn to_json(&self) -> Value {
        match self {
            Condition::Equals(v) => v.clone(),
            Condition::AnyOf(vs) => json!({ "$in": vs }),
            Condition::Range { min, max } => {
                let mut ops = Map::new();
                if let Some(min) = min {
                    ops.insert("$gte".to_string(), json!(min));
                }
                if let Some(max) = max {
                    ops.insert("$lte".to_string(), json!(max));
                }
                Value::Object(ops)
            }
        }
    }
}

fn equals_or_contains(value: &Value, expected: &Value) -> bool {
    value == expected || matches!(value, Value::Array(items) if items.contains(expected))
}

/// Conjunction of conditions on dotted physical paths.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Clause {
    conditions: Vec<(String, Condition)>,
}

impl Clause {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a condition. Two ranges on the same path are intersected.
    pub fn push(&mut self, path: impl Into<String>, condition: Condition) {
        let path = path.into();
        if let Condition::Range { min, max } = &condition {
            let existing = self.conditions.iter_mut().find_map(|(p, c)| match c {
                Condition::Range { min, max } if *p == path => Some((min, max)),
                _ => None,
            });
            if let Some((cur_min, cur_max)) = existing {
                *cur_min = tighter(*cur_min, *min, i64::max);
                *cur_max = tighter(*cur_max, *max, i64::min);
                return;
            }
        }
        self.conditions.push((path, condition));
    }

    pub fn with(mut self, path: impl Into<String>, condition: Condition) -> Self {
        self.push(path, condition);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn conditions(&self) -> &[(String, Condition)] {
        &self.conditions
    }

    pub fn matches(&self, doc: &Value) -> bool {
        self.conditions.iter().all(|(path, condition)| {
            resolve(doc, path)
                .into_iter()
                .any(|leaf| condition.matches_leaf(leaf))
        })
    }

    pub fn to_json(&self) -> Value {
        let mut object = Map::new();
        for (path, condition) in &self.conditions {
            if object.contains_key(path) {
                // a path constrained twice cannot share one object
                let parts = self
                    .conditions
                    .iter()
                    .map(|(p, c)| json!({ p.as_str(): c.to_json() }))
                    .collect::<Vec<_>>();
                return json!({ "$and": parts });
            }
            object.insert(path.clone(), condition.to_json());
        }
        Value::Object(object)
    }
}

fn tighter(a: Option<i64>, b: Option<i64>, pick: fn(i64, i64) -> i64) -> Option<i64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(pick(a, b)),
        (a, b) => a.or(b),
    }
}

/// Collects every value reachable by `path`, descending into arrays the way
/// MongoDB does for dotted paths.
fn resolve<'a>(doc: &'a Value, path: &str) -> Vec<&'a Value> {
    let mut current = vec![doc];
    for segment in path.split('.') {
        let mut next = Vec::new();
        for value in current {
            match value {
                Value::Object(map) => next.extend(map.get(segment)),
                Value::Array(items) => next.extend(
                    items
                        .iter()
                        .filter_map(|item| item.as_object().and_then(|m| m.get(segment))),
                ),
                _ => {}
            }
        }
        current = next;
    }
    current
}

/// Complete filter over one collection.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Matches every document.
    All,
    /// Single fixed-schema clause.
    Clause(Clause),
    /// Disjunction of per-schema candidates.
    AnyOf(Vec<Clause>),
}

impl Filter {
    /// Builds a fixed-schema filter. An empty clause matches everything.
    pub fn single(clause: Clause) -> Self {
        if clause.is_empty() {
            Filter::All
        } else {
            Filter::Clause(clause)
        }
    }

    /// Builds an OR filter, dropping empty candidates. No candidates left
    /// means the filter matches everything.
    pub fn any_of(candidates: impl IntoIterator<Item = Clause>) -> Self {
        let candidates: Vec<Clause> = candidates.into_iter().filter(|c| !c.is_empty()).collect();
        if candidates.is_empty() {
            Filter::All
        } else {
            Filter::AnyOf(candidates)
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Filter::All)
    }

    pub fn matches(&self, doc: &Value) -> bool {
        match self {
            Filter::All => true,
            Filter::Clause(clause) => clause.matches(doc),
            Filter::AnyOf(candidates) => candidates.iter().any(|c| c.matches(doc)),
        }
    }

    /// Renders the filter as a MongoDB query document.
    pub fn to_json(&self) -> Value {
        match self {
            Filter::All => json!({}),
            Filter::Clause(clause) => clause.to_json(),
            Filter::AnyOf(candidates) => {
                json!({ "$or": candidates.iter().map(Clause::to_json).collect::<Vec<_>>() })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nested_variant() -> Value {
        json!({
            "variation": {
                "location": {
                    "sequence_id": "NC_000017.11",
                    "interval": { "start": { "value": 43044294 }, "end": { "value": 43044295 } }
                },
                "alternateBases": "T"
            },
            "molecularAttributes": { "geneIds": ["BRCA1", "NBR2"] },
            "caseLevelData": [ { "biosampleId": "S1" }, { "biosampleId": "S2" } ]
        })
    }

    #[test]
    fn test_equals_on_nested_path() {
        let clause = Clause::new().with("variation.alternateBases", Condition::Equals(json!("T")));
        assert!(clause.matches(&nested_variant()));

        let clause = Clause::new().with("variation.alternateBases", Condition::Equals(json!("G")));
        assert!(!clause.matches(&nested_variant()));
    }

    #[test]
    fn test_equals_matches_array_element() {
        let clause = Clause::new().with("molecularAttributes.geneIds", Condition::Equals(json!("BRCA1")));
        assert!(clause.matches(&nested_variant()));
    }

    #[test]
    fn test_path_descends_into_arrays_of_objects() {
        let clause = Clause::new().with(
            "caseLevelData.biosampleId",
            Condition::AnyOf(vec![json!("S9"), json!("S2")]),
        );
        assert!(clause.matches(&nested_variant()));
    }

    #[test]
    fn test_range_is_inclusive() {
        let doc = nested_variant();
        let path = "variation.location.interval.start.value";
        assert!(Clause::new().with(path, Condition::at_least(43044294)).matches(&doc));
        assert!(Clause::new().with(path, Condition::at_most(43044294)).matches(&doc));
        assert!(!Clause::new().with(path, Condition::at_least(43044295)).matches(&doc));
    }

    #[test]
    fn test_range_ignores_non_numeric_fields() {
        let doc = json!({ "start": "100" });
        assert!(!Clause::new().with("start", Condition::at_least(0)).matches(&doc));
    }

    #[test]
    fn test_ranges_on_same_path_are_intersected() {
        let clause = Clause::new()
            .with("start", Condition::at_least(10))
            .with("start", Condition::at_most(20))
            .with("start", Condition::at_least(15));

        assert_eq!(clause.len(), 1);
        assert_eq!(clause.to_json(), json!({ "start": { "$gte": 15, "$lte": 20 } }));
    }

    #[test]
    fn test_duplicate_paths_render_as_and() {
        let clause = Clause::new()
            .with("start", Condition::Equals(json!(5)))
            .with("start", Condition::at_least(1));

        assert_eq!(
            clause.to_json(),
            json!({ "$and": [ { "start": 5 }, { "start": { "$gte": 1 } } ] })
        );
    }

    #[test]
    fn test_any_of_drops_empty_candidates() {
        let filter = Filter::any_of(vec![
            Clause::new(),
            Clause::new().with("geneId", Condition::Equals(json!("BRCA1"))),
        ]);

        assert_eq!(filter.to_json(), json!({ "$or": [ { "geneId": "BRCA1" } ] }));
    }

    #[test]
    fn test_empty_filters_match_everything() {
        assert!(Filter::any_of(vec![Clause::new(), Clause::new()]).is_all());
        assert!(Filter::single(Clause::new()).is_all());
        assert!(Filter::All.matches(&json!({ "anything": 1 })));
        assert_eq!(Filter::All.to_json(), json!({}));
    }

    #[test]
    fn test_missing_path_never_matches() {
        let clause = Clause::new().with("missing.path", Condition::Equals(json!(null)));
        assert!(!clause.matches(&json!({ "other": 1 })));
    }
}
