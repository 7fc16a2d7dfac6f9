//! Document store for PostgreSQL, one `jsonb` row per document.
//!
//! Tests against a live server are in `tests/pg_store.rs`.

use beacon_core::config::DbConfig;
use beacon_core::error::AppError;
use beacon_core::models::Document;
use beacon_core::query::Filter;
use beacon_core::traits::DocumentStore;
use futures::stream::{BoxStream, StreamExt};
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool, Pool, Postgres, QueryBuilder};
use tracing::debug;

use crate::filter_sql::push_filter;

/// Rows per multi-row INSERT. Two bind parameters per row keeps this well
/// below the PostgreSQL limit of 65535.
const INSERT_CHUNK: usize = 1000;

const SCHEMA: [&str; 2] = [
    r#"
    CREATE TABLE IF NOT EXISTS documents (
        idx BIGSERIAL PRIMARY KEY,
        collection TEXT NOT NULL,
        body JSONB NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS documents_collection_idx ON documents (collection, idx)",
];

/// Named collections of JSON documents in a single `documents` table.
///
/// The storage index of a document is its `idx` column, assigned on insert
/// and never reused.
///
/// # Examples
///
/// ```no_run
/// use beacon_core::config::DbConfig;
/// use beacon_db::PgDocumentStore;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = PgDocumentStore::connect("postgresql://localhost/beacon", &DbConfig::default()).await?;
/// store.ensure_schema().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct PgDocumentStore {
    pool: Pool<Postgres>,
}

impl PgDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a connection pool to `database_url`.
    pub async fn connect(database_url: &str, config: &DbConfig) -> Result<Self, AppError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(database_url)
            .await
            .map_err(AppError::DatabaseError)?;
        Ok(Self::new(pool))
    }

    /// Creates the documents table and its index if they do not exist.
    pub async fn ensure_schema(&self) -> Result<(), AppError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(AppError::DatabaseError)?;
        }
        Ok(())
    }

    /// Number of documents in a collection.
    pub async fn count(&self, collection: &str) -> Result<i64, AppError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM documents WHERE collection = $1")
                .bind(collection)
                .fetch_one(&self.pool)
                .await
                .map_err(AppError::DatabaseError)?;
        Ok(count)
    }
}

/// Inserts `docs` in chunks on one connection. Returns the new indices in order.
async fn insert_chunks(
    conn: &mut PgConnection,
    collection: &str,
    docs: Vec<Value>,
) -> Result<Vec<i64>, AppError> {
    let mut indices = Vec::with_capacity(docs.len());
    for chunk in docs.chunks(INSERT_CHUNK) {
        let mut qb = QueryBuilder::<Postgres>::new("INSERT INTO documents (collection, body) ");
        qb.push_values(chunk, |mut row, doc| {
            row.push_bind(collection.to_string()).push_bind(Json(doc.clone()));
        });
        qb.push(" RETURNING idx");

        let inserted: Vec<i64> = qb
            .build_query_scalar::<i64>()
            .fetch_all(&mut *conn)
            .await
            .map_err(AppError::DatabaseError)?;
        indices.extend(inserted);
    }
    Ok(indices)
}

async fn delete_collection(conn: &mut PgConnection, collection: &str) -> Result<u64, AppError> {
    let result = sqlx::query("DELETE FROM documents WHERE collection = $1")
        .bind(collection)
        .execute(conn)
        .await
        .map_err(AppError::DatabaseError)?;
    Ok(result.rows_affected())
}

fn select_documents(collection: &str, filter: &Filter) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new("SELECT idx, body FROM documents WHERE collection = ");
    qb.push_bind(collection.to_string());
    qb.push(" AND ");
    push_filter(&mut qb, filter);
    qb.push(" ORDER BY idx");
    qb
}

impl DocumentStore for PgDocumentStore {
    async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(AppError::DatabaseError)?;
        Ok(())
    }

    async fn insert_many(&self, collection: &str, docs: Vec<Value>) -> Result<Vec<i64>, AppError> {
        if docs.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.pool.acquire().await.map_err(AppError::DatabaseError)?;
        let indices = insert_chunks(&mut conn, collection, docs).await?;
        debug!("Inserted {} document(s) into {}", indices.len(), collection);
        Ok(indices)
    }

    async fn delete_all(&self, collection: &str) -> Result<u64, AppError> {
        let mut conn = self.pool.acquire().await.map_err(AppError::DatabaseError)?;
        let removed = delete_collection(&mut conn, collection).await?;
        debug!("Deleted {} document(s) from {}", removed, collection);
        Ok(removed)
    }

    async fn replace_all(&self, collection: &str, docs: Vec<Value>) -> Result<Vec<i64>, AppError> {
        let mut tx = self.pool.begin().await.map_err(AppError::DatabaseError)?;
        delete_collection(&mut tx, collection).await?;
        let indices = insert_chunks(&mut tx, collection, docs).await?;
        tx.commit().await.map_err(AppError::DatabaseError)?;
        Ok(indices)
    }

    fn find(&self, collection: &str, filter: &Filter) -> BoxStream<'static, Result<Document, AppError>> {
        let pool = self.pool.clone();
        let collection = collection.to_string();
        let filter = filter.clone();

        let stream = async_stream::stream! {
            let mut qb = select_documents(&collection, &filter);
            let mut rows = qb.build_query_as::<DocumentRow>().fetch(&pool);
            while let Some(row) = rows.next().await {
                yield row.map(Document::from).map_err(AppError::DatabaseError);
            }
        };
        stream.boxed()
    }

    async fn update_many(&self, collection: &str, filter: &Filter, set: Value) -> Result<u64, AppError> {
        let mut qb = QueryBuilder::<Postgres>::new("UPDATE documents SET body = body || ");
        qb.push_bind(Json(set));
        qb.push("::jsonb WHERE collection = ");
        qb.push_bind(collection.to_string());
        qb.push(" AND ");
        push_filter(&mut qb, filter);

        let result = qb
            .build()
            .execute(&self.pool)
            .await
            .map_err(AppError::DatabaseError)?;
        Ok(result.rows_affected())
    }
}

/// Helper struct for deserializing document rows
#[derive(sqlx::FromRow)]
struct DocumentRow {
    idx: i64,
    body: Json<Value>,
}

impl From<DocumentRow> for Document {
    fn from(row: DocumentRow) -> Self {
        Document {
            index: row.idx,
            body: row.body.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_core::query::{Clause, Condition};
    use serde_json::json;

    #[test]
    fn test_select_orders_by_storage_index() {
        let filter = Filter::single(Clause::new().with("id", Condition::Equals(json!("galaxy-hg19"))));
        let qb = select_documents("datasets", &filter);

        assert_eq!(
            qb.sql(),
            "SELECT idx, body FROM documents WHERE collection = $1 AND \
             (jsonb_path_exists(body, $2::jsonpath, $3::jsonb)) ORDER BY idx"
        );
    }

    #[test]
    fn test_select_all() {
        let qb = select_documents("genomicVariations", &Filter::All);
        assert_eq!(
            qb.sql(),
            "SELECT idx, body FROM documents WHERE collection = $1 AND TRUE ORDER BY idx"
        );
    }

    #[test]
    fn test_document_from_row() {
        let row = DocumentRow {
            idx: 42,
            body: Json(json!({ "datasetId": "galaxy-grch38" })),
        };
        let doc = Document::from(row);
        assert_eq!(doc.index, 42);
        assert_eq!(doc.body["datasetId"], "galaxy-grch38");
    }

    #[test]
    fn test_insert_chunk_fits_bind_limit() {
        assert!(INSERT_CHUNK * 2 < u16::MAX as usize);
    }
}
