// Tuple and individual tables. Keys are the primary keys the upserts conflict on.

use sqlx::SqlitePool;

use crate::error::StoreError;

pub(super) async fn init_aggregate_tables(pool: &SqlitePool) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tuples (
            query TEXT NOT NULL,
            type TEXT NOT NULL,
            answer TEXT NOT NULL,
            count INTEGER NOT NULL,
            ttl INTEGER,
            "first" REAL NOT NULL,
            "last" REAL NOT NULL,
            PRIMARY KEY (query, type, answer)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_tuples_answer ON tuples(answer)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS individual (
            which TEXT NOT NULL,
            value TEXT NOT NULL,
            count INTEGER NOT NULL,
            "first" REAL NOT NULL,
            "last" REAL NOT NULL,
            PRIMARY KEY (which, value)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_individual_value ON individual(value)")
        .execute(pool)
        .await?;

    Ok(())
}
