// SQLite store for tuple and individual aggregates.
// `update` merges a snapshot with the same combine rule as `Aggregator::merge`, inside one
// transaction: any failing batch rolls back the whole call. Query values are stored reversed.

mod batch;
mod provenance;
mod schema;

pub use provenance::FileRecord;

use std::path::Path;
use std::str::FromStr;
use std::time::{Duration, Instant};

use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::{info, instrument};

use crate::config::DatabaseConfig;
use crate::error::StoreError;
use crate::models::{Role, Snapshot, UpdateOutcome};
use crate::transform::reverse_query;

/// A stored aggregate row as read back from the database.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredStat {
    pub count: u64,
    /// Always `None` for individual rows.
    pub ttl: Option<i64>,
    pub first: f64,
    pub last: f64,
}

pub struct DnsStore {
    pool: SqlitePool,
    batch_size: usize,
}

impl DnsStore {
    /// Open (creating if missing) the SQLite database at `config.path` with WAL and a busy
    /// timeout, so concurrent writers from other processes wait instead of failing.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        if let Some(parent) = Path::new(&config.path).parent() {
            std::fs::create_dir_all(parent)?;
        }
        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}", config.path))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(config.busy_timeout_secs))
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);
        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_pool_size)
            .connect_with(opts)
            .await?;
        Ok(Self {
            pool,
            batch_size: config.batch_size.max(1),
        })
    }

    pub async fn init(&self) -> Result<(), StoreError> {
        schema::init_aggregate_tables(&self.pool).await?;
        provenance::init_filenames_table(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Merge `snapshot` into the stored aggregates. All-or-nothing: on error nothing from
    /// this call is committed and the caller should retry the whole snapshot.
    #[instrument(skip(self, snapshot), fields(repo = "store", operation = "update", tuples = snapshot.tuples_len(), individual = snapshot.individual_len()))]
    pub async fn update(&self, snapshot: &Snapshot) -> Result<UpdateOutcome, StoreError> {
        let start = Instant::now();
        let mut outcome = UpdateOutcome::default();
        if snapshot.tuples.is_empty() && snapshot.individual.is_empty() {
            return Ok(outcome);
        }

        let mut tx = self.pool.begin().await?;

        let full_tuple_sql = batch::tuple_upsert_sql(self.batch_size);
        for chunk in snapshot.tuples.chunks(self.batch_size) {
            let tally = if chunk.len() == self.batch_size {
                batch::upsert_tuples(&mut tx, &full_tuple_sql, chunk).await?
            } else {
                let sql = batch::tuple_upsert_sql(chunk.len());
                batch::upsert_tuples(&mut tx, &sql, chunk).await?
            };
            outcome.inserted += tally.inserted;
            outcome.updated += tally.updated;
        }

        let full_individual_sql = batch::individual_upsert_sql(self.batch_size);
        for chunk in snapshot.individual.chunks(self.batch_size) {
            let tally = if chunk.len() == self.batch_size {
                batch::upsert_individual(&mut tx, &full_individual_sql, chunk).await?
            } else {
                let sql = batch::individual_upsert_sql(chunk.len());
                batch::upsert_individual(&mut tx, &sql, chunk).await?
            };
            outcome.inserted += tally.inserted;
            outcome.updated += tally.updated;
        }

        tx.commit().await?;
        outcome.duration = start.elapsed();
        info!(
            inserted = outcome.inserted,
            updated = outcome.updated,
            duration_ms = outcome.duration.as_millis() as u64,
            "store updated"
        );
        Ok(outcome)
    }

    /// Close the pool. Safe to call more than once.
    pub async fn close(&self) {
        if !self.pool.is_closed() {
            self.pool.close().await;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }

    pub async fn is_processed(&self, filename: &str) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT 1 FROM filenames WHERE filename = $1")
            .bind(filename)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    #[instrument(skip(self, rec), fields(repo = "store", operation = "record_file", file = %rec.filename))]
    pub async fn record_file(&self, rec: &FileRecord) -> Result<(), StoreError> {
        provenance::insert_file_record(&self.pool, rec).await
    }

    /// Stored tuple for an (unreversed) query name.
    pub async fn get_tuple(
        &self,
        query: &str,
        qtype: &str,
        answer: &str,
    ) -> Result<Option<StoredStat>, StoreError> {
        let row = sqlx::query(
            r#"SELECT count, ttl, "first", "last" FROM tuples
               WHERE query = $1 AND type = $2 AND answer = $3"#,
        )
        .bind(reverse_query(query))
        .bind(qtype)
        .bind(answer)
        .fetch_optional(&self.pool)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(StoredStat {
            count: row.try_get::<i64, _>("count")? as u64,
            ttl: row.try_get("ttl")?,
            first: row.try_get("first")?,
            last: row.try_get("last")?,
        }))
    }

    /// Stored individual value; query values are looked up by their unreversed form.
    pub async fn get_individual(
        &self,
        role: Role,
        value: &str,
    ) -> Result<Option<StoredStat>, StoreError> {
        let value = match role {
            Role::Query => reverse_query(value),
            Role::Answer => value.to_owned(),
        };
        let row = sqlx::query(
            r#"SELECT count, "first", "last" FROM individual WHERE which = $1 AND value = $2"#,
        )
        .bind(role.code())
        .bind(value)
        .fetch_optional(&self.pool)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(StoredStat {
            count: row.try_get::<i64, _>("count")? as u64,
            ttl: None,
            first: row.try_get("first")?,
            last: row.try_get("last")?,
        }))
    }

    pub async fn count_tuples(&self) -> Result<u64, StoreError> {
        let n = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM tuples")
            .fetch_one(&self.pool)
            .await?;
        Ok(n as u64)
    }

    pub async fn count_individual(&self) -> Result<u64, StoreError> {
        let n = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM individual")
            .fetch_one(&self.pool)
            .await?;
        Ok(n as u64)
    }
}
