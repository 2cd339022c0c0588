// Per-file bookkeeping so reprocessing a file already merged into the store can be skipped.

use std::time::Duration;

use sqlx::SqlitePool;

use crate::error::StoreError;
use crate::models::{Snapshot, UpdateOutcome};

/// One processed input file.
#[derive(Debug, Clone, PartialEq)]
pub struct FileRecord {
    pub filename: String,
    pub aggregation_time: Duration,
    pub total_records: u64,
    pub skipped_records: u64,
    pub tuples: u64,
    pub individual: u64,
    pub store_time: Duration,
    pub inserted: u64,
    pub updated: u64,
}

impl FileRecord {
    pub fn new(filename: impl Into<String>, snapshot: &Snapshot, outcome: &UpdateOutcome) -> Self {
        Self {
            filename: filename.into(),
            aggregation_time: snapshot.duration,
            total_records: snapshot.total_records,
            skipped_records: snapshot.skipped_records,
            tuples: snapshot.tuples_len() as u64,
            individual: snapshot.individual_len() as u64,
            store_time: outcome.duration,
            inserted: outcome.inserted,
            updated: outcome.updated,
        }
    }
}

pub(super) async fn init_filenames_table(pool: &SqlitePool) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS filenames (
            filename TEXT PRIMARY KEY NOT NULL,
            time INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
            aggregation_time REAL,
            total_records INTEGER,
            skipped_records INTEGER,
            tuples INTEGER,
            individual INTEGER,
            store_time REAL,
            inserted INTEGER,
            updated INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

pub(super) async fn insert_file_record(
    pool: &SqlitePool,
    rec: &FileRecord,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT OR REPLACE INTO filenames
        (filename, aggregation_time, total_records, skipped_records, tuples, individual,
         store_time, inserted, updated)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(&rec.filename)
    .bind(rec.aggregation_time.as_secs_f64())
    .bind(rec.total_records as i64)
    .bind(rec.skipped_records as i64)
    .bind(rec.tuples as i64)
    .bind(rec.individual as i64)
    .bind(rec.store_time.as_secs_f64())
    .bind(rec.inserted as i64)
    .bind(rec.updated as i64)
    .execute(pool)
    .await?;
    Ok(())
}
