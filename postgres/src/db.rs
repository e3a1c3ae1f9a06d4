use config::shared::{IntoConnectOptions, PgConnectionConfig};
use sqlx::{Executor, PgPool, postgres::PgPoolOptions};

/// Schema holding the document table and the `_sqlx_migrations` bookkeeping table.
pub const DOCUMENT_SCHEMA: &str = "reconcile";

/// Name reported in `pg_stat_activity` for pooled connections.
const APPLICATION_NAME: &str = "reconcile_document_store";

/// Connects to the document database with a pool of at most `max_connections`.
///
/// Each connection creates [`DOCUMENT_SCHEMA`] if missing and points its `search_path` at it,
/// so unqualified table names and the migrations table resolve inside that schema.
pub async fn connect_document_store(
    config: &PgConnectionConfig,
    max_connections: u32,
) -> Result<PgPool, sqlx::Error> {
    let options = config.with_db().application_name(APPLICATION_NAME);

    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(max_connections)
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                conn.execute(format!("create schema if not exists {DOCUMENT_SCHEMA};").as_str())
                    .await?;
                conn.execute(format!("set search_path = '{DOCUMENT_SCHEMA}';").as_str())
                    .await?;
                Ok(())
            })
        })
        .connect_with(options)
        .await?;

    Ok(pool)
}
