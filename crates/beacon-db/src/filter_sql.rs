//! Compiles store filters into PostgreSQL predicates over the `body` column.
//!
//! Every condition becomes one `jsonb_path_exists` call with a lax-mode SQL/JSON
//! path and a bound variables object. Lax mode unwraps arrays both along the
//! path and in comparisons, so `caseLevelData.biosampleId` matches when
//! `caseLevelData` is an array of objects and an equality on a field matches
//! when the field is an array containing the value. Range comparisons between
//! a number and a non-number evaluate to unknown, which filters the document
//! out.

use beacon_core::query::{Clause, Condition, Filter};
use serde_json::{json, Map, Value};
use sqlx::types::Json;
use sqlx::{Postgres, QueryBuilder};

/// A SQL/JSON path predicate and the variables it references.
#[derive(Debug, Clone, PartialEq)]
pub struct PathPredicate {
    pub path: String,
    pub vars: Value,
}

impl PathPredicate {
    pub fn for_condition(path: &str, condition: &Condition) -> Self {
        let mut vars = Map::new();
        let test = match condition {
            Condition::Equals(value) => {
                vars.insert("v".to_string(), value.clone());
                "@ == $v".to_string()
            }
            Condition::AnyOf(values) if values.is_empty() => "false".to_string(),
            Condition::AnyOf(values) => values
                .iter()
                .enumerate()
                .map(|(i, value)| {
                    let name = format!("v{}", i);
                    vars.insert(name.clone(), value.clone());
                    format!("@ == ${}", name)
                })
                .collect::<Vec<_>>()
                .join(" || "),
            Condition::Range { min, max } => {
                let mut bounds = Vec::new();
                if let Some(min) = min {
                    vars.insert("min".to_string(), json!(min));
                    bounds.push("@ >= $min");
                }
                if let Some(max) = max {
                    vars.insert("max".to_string(), json!(max));
                    bounds.push("@ <= $max");
                }
                if bounds.is_empty() {
                    "@.type() == \"number\"".to_string()
                } else {
                    bounds.join(" && ")
                }
            }
        };

        Self {
            path: format!("{} ? ({})", json_path(path), test),
            vars: Value::Object(vars),
        }
    }
}

/// Turns a dotted document path into a quoted SQL/JSON path.
///
/// ```
/// use beacon_db::filter_sql::json_path;
///
/// assert_eq!(json_path("variation.referenceBases"), r#"$."variation"."referenceBases""#);
/// ```
pub fn json_path(dotted: &str) -> String {
    let mut path = String::from("$");
    for segment in dotted.split('.') {
        path.push_str(".\"");
        for c in segment.chars() {
            if c == '"' || c == '\\' {
                path.push('\\');
            }
            path.push(c);
        }
        path.push('"');
    }
    path
}

/// Appends the predicate of `filter` to `qb`.
pub fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &Filter) {
    match filter {
        Filter::All => {
            qb.push("TRUE");
        }
        Filter::Clause(clause) => push_clause(qb, clause),
        Filter::AnyOf(clauses) if clauses.is_empty() => {
            qb.push("FALSE");
        }
        Filter::AnyOf(clauses) => {
            qb.push("(");
            for (i, clause) in clauses.iter().enumerate() {
                if i > 0 {
                    qb.push(" OR ");
                }
                push_clause(qb, clause);
            }
            qb.push(")");
        }
    }
}

fn push_clause(qb: &mut QueryBuilder<'_, Postgres>, clause: &Clause) {
    if clause.is_empty() {
        qb.push("TRUE");
        return;
    }

    qb.push("(");
    for (i, (path, condition)) in clause.conditions().iter().enumerate() {
        if i > 0 {
            qb.push(" AND ");
        }
        let predicate = PathPredicate::for_condition(path, condition);
        qb.push("jsonb_path_exists(body, ");
        qb.push_bind(predicate.path);
        qb.push("::jsonpath, ");
        qb.push_bind(Json(predicate.vars));
        qb.push("::jsonb)");
    }
    qb.push(")");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_path_escapes_quotes() {
        assert_eq!(json_path("start"), r#"$."start""#);
        assert_eq!(json_path(r#"we"ird"#), r#"$."we\"ird""#);
    }

    #[test]
    fn test_equality_predicate() {
        let predicate = PathPredicate::for_condition("referenceBases", &Condition::Equals(json!("A")));
        assert_eq!(predicate.path, r#"$."referenceBases" ? (@ == $v)"#);
        assert_eq!(predicate.vars, json!({ "v": "A" }));
    }

    #[test]
    fn test_any_of_predicate() {
        let predicate = PathPredicate::for_condition(
            "caseLevelData.biosampleId",
            &Condition::AnyOf(vec![json!("S1"), json!("S2")]),
        );
        assert_eq!(
            predicate.path,
            r#"$."caseLevelData"."biosampleId" ? (@ == $v0 || @ == $v1)"#
        );
        assert_eq!(predicate.vars, json!({ "v0": "S1", "v1": "S2" }));
    }

    #[test]
    fn test_range_predicate() {
        let both = PathPredicate::for_condition(
            "start",
            &Condition::Range {
                min: Some(10),
                max: Some(20),
            },
        );
        assert_eq!(both.path, r#"$."start" ? (@ >= $min && @ <= $max)"#);
        assert_eq!(both.vars, json!({ "min": 10, "max": 20 }));

        let upper = PathPredicate::for_condition("end", &Condition::at_most(5));
        assert_eq!(upper.path, r#"$."end" ? (@ <= $max)"#);
    }

    #[test]
    fn test_match_all_sql() {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT 1 WHERE ");
        push_filter(&mut qb, &Filter::All);
        assert_eq!(qb.sql(), "SELECT 1 WHERE TRUE");
    }

    #[test]
    fn test_any_of_sql_binds_two_values_per_condition() {
        let filter = Filter::any_of([
            Clause::new()
                .with("start", Condition::Equals(json!(100)))
                .with("referenceBases", Condition::Equals(json!("A"))),
            Clause::new().with(
                "variation.location.interval.start.value",
                Condition::Equals(json!(100)),
            ),
        ]);

        let mut qb = QueryBuilder::<Postgres>::new("SELECT idx FROM documents WHERE ");
        push_filter(&mut qb, &filter);

        assert_eq!(
            qb.sql(),
            "SELECT idx FROM documents WHERE (\
             (jsonb_path_exists(body, $1::jsonpath, $2::jsonb) \
             AND jsonb_path_exists(body, $3::jsonpath, $4::jsonb)) \
             OR (jsonb_path_exists(body, $5::jsonpath, $6::jsonb)))"
        );
    }
}
