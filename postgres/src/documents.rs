use serde_json::{Map, Value};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use thiserror::Error;
use tracing::debug;

/// One stored document.
#[derive(Debug, Clone, FromRow)]
pub struct DocumentRow {
    pub id: String,
    pub data: Json<Map<String, Value>>,
}

/// Filtered, cursor-paginated read over one collection, ordered by document id.
#[derive(Debug, Clone, Copy)]
pub struct DocumentQuery<'a> {
    pub collection: &'a str,
    /// Top-level fields that must equal the given JSON values.
    pub filters: &'a [(String, Value)],
    /// Only documents with an id strictly greater than this one are returned.
    pub start_after: Option<&'a str>,
    pub limit: Option<i64>,
}

/// A single write applied inside a batch transaction.
#[derive(Debug, Clone, Copy)]
pub enum DocumentWrite<'a> {
    /// Creates the document; when it exists, replaces it or merges top-level fields into it.
    Set {
        collection: &'a str,
        id: &'a str,
        data: &'a Map<String, Value>,
        merge: bool,
    },
    /// Merges top-level fields into an existing document.
    Update {
        collection: &'a str,
        id: &'a str,
        fields: &'a Map<String, Value>,
    },
}

/// Errors raised while applying a batch of writes.
#[derive(Debug, Error)]
pub enum DocumentWriteError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error("document `{collection}/{id}` does not exist")]
    MissingDocument { collection: String, id: String },
}

/// Returns the document stored under `collection/id`, if any.
pub async fn get_document(
    pool: &PgPool,
    collection: &str,
    id: &str,
) -> sqlx::Result<Option<Map<String, Value>>> {
    let data: Option<Json<Map<String, Value>>> = sqlx::query_scalar(
        r#"
        select data from documents
        where collection = $1 and id = $2
        "#,
    )
    .bind(collection)
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(data.map(|Json(data)| data))
}

/// Returns the documents of `collection` whose id is in `ids`, in no particular order.
///
/// Ids without a stored document are absent from the result.
pub async fn get_documents(
    pool: &PgPool,
    collection: &str,
    ids: &[String],
) -> sqlx::Result<Vec<DocumentRow>> {
    sqlx::query_as::<_, DocumentRow>(
        r#"
        select id, data from documents
        where collection = $1 and id = any($2)
        "#,
    )
    .bind(collection)
    .bind(ids)
    .fetch_all(pool)
    .await
}

/// Runs a [`DocumentQuery`].
pub async fn query_documents(
    pool: &PgPool,
    query: DocumentQuery<'_>,
) -> sqlx::Result<Vec<DocumentRow>> {
    let mut builder: QueryBuilder<'_, Postgres> =
        QueryBuilder::new("select id, data from documents where collection = ");
    builder.push_bind(query.collection);

    for (field, value) in query.filters {
        builder.push(" and data -> ");
        builder.push_bind(field.as_str());
        builder.push(" = ");
        builder.push_bind(Json(value));
    }

    if let Some(start_after) = query.start_after {
        builder.push(" and id > ");
        builder.push_bind(start_after);
    }

    builder.push(" order by id");

    if let Some(limit) = query.limit {
        builder.push(" limit ");
        builder.push_bind(limit);
    }

    builder.build_query_as::<DocumentRow>().fetch_all(pool).await
}

/// Applies `writes` atomically: either every write lands or none does.
pub async fn apply_document_writes(
    pool: &PgPool,
    writes: &[DocumentWrite<'_>],
) -> Result<(), DocumentWriteError> {
    let mut tx = pool.begin().await?;

    for write in writes {
        match *write {
            DocumentWrite::Set {
                collection,
                id,
                data,
                merge: false,
            } => {
                sqlx::query(
                    r#"
                    insert into documents (collection, id, data, updated_at)
                    values ($1, $2, $3, now())
                    on conflict (collection, id)
                    do update set data = excluded.data, updated_at = now()
                    "#,
                )
                .bind(collection)
                .bind(id)
                .bind(Json(data))
                .execute(&mut *tx)
                .await?;
            }
            DocumentWrite::Set {
                collection,
                id,
                data,
                merge: true,
            } => {
                sqlx::query(
                    r#"
                    insert into documents (collection, id, data, updated_at)
                    values ($1, $2, $3, now())
                    on conflict (collection, id)
                    do update set data = documents.data || excluded.data, updated_at = now()
                    "#,
                )
                .bind(collection)
                .bind(id)
                .bind(Json(data))
                .execute(&mut *tx)
                .await?;
            }
            DocumentWrite::Update {
                collection,
                id,
                fields,
            } => {
                let result = sqlx::query(
                    r#"
                    update documents
                    set data = data || $3, updated_at = now()
                    where collection = $1 and id = $2
                    "#,
                )
                .bind(collection)
                .bind(id)
                .bind(Json(fields))
                .execute(&mut *tx)
                .await?;

                if result.rows_affected() == 0 {
                    // Dropping `tx` rolls back the writes applied so far.
                    return Err(DocumentWriteError::MissingDocument {
                        collection: collection.to_string(),
                        id: id.to_string(),
                    });
                }
            }
        }
    }

    tx.commit().await?;
    debug!(writes = writes.len(), "document batch committed");

    Ok(())
}
