//! Query translation: typed criteria to store filters.

pub mod criteria;
pub mod filter;
pub mod schema;
pub mod translator;

pub use criteria::{Comparison, CriteriaValue, EntityKind, FieldSpec, QueryCriteria, QueryKind, ValueType};
pub use filter::{Clause, Condition, Filter};
pub use schema::{mappings_for, SchemaMapping};
pub use translator::QueryTranslator;
