// Subcommand bodies: aggregate files to JSON lines, or index them into the store.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::AsyncWrite;
use tracing::{info, instrument};

use crate::config::AppConfig;
use crate::export;
use crate::ingest;
use crate::store::{DnsStore, FileRecord};

/// Which record kind `aggregate` writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    Tuples,
    Individual,
}

/// Aggregate `files` in parallel, merge, and write JSON lines to `out`. Returns lines written.
#[instrument(skip(config, files, out), fields(operation = "aggregate", files = files.len()))]
pub async fn aggregate<W: AsyncWrite + Unpin>(
    config: &AppConfig,
    files: Vec<PathBuf>,
    kind: ExportKind,
    reverse: bool,
    out: &mut W,
) -> anyhow::Result<u64> {
    let agg = ingest::aggregate_files(files, &config.aggregation).await?;
    let snapshot = Arc::new(agg.snapshot());
    info!(
        total_records = snapshot.total_records,
        skipped_records = snapshot.skipped_records,
        tuples = snapshot.tuples_len(),
        individual = snapshot.individual_len(),
        duration_ms = snapshot.duration.as_millis() as u64,
        "aggregation complete"
    );
    let stream = match kind {
        ExportKind::Tuples => export::tuple_lines(snapshot, reverse),
        ExportKind::Individual => export::individual_lines(snapshot, reverse),
    };
    Ok(stream.write_to(out).await?)
}

/// Files indexed vs skipped as already processed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexSummary {
    pub indexed: usize,
    pub already_processed: usize,
}

/// Aggregate every file not yet recorded in the store and merge it in, one update per file.
#[instrument(skip(config, files), fields(operation = "index", files = files.len()))]
pub async fn index(config: &AppConfig, files: Vec<PathBuf>) -> anyhow::Result<IndexSummary> {
    let store = DnsStore::connect(&config.database).await?;
    store.init().await?;

    let mut summary = IndexSummary::default();
    let mut pending = Vec::with_capacity(files.len());
    for path in files {
        if store.is_processed(&path.to_string_lossy()).await? {
            info!(file = %path.display(), "already processed, skipping");
            summary.already_processed += 1;
        } else {
            pending.push(path);
        }
    }

    let result = store_each(&store, config, pending, &mut summary).await;
    store.close().await;
    result?;
    Ok(summary)
}

/// Store each file as soon as its aggregation finishes, so files completed before a
/// failure stay indexed. Files finishing together land in completion order.
async fn store_each(
    store: &DnsStore,
    config: &AppConfig,
    pending: Vec<PathBuf>,
    summary: &mut IndexSummary,
) -> anyhow::Result<()> {
    let mut tasks = ingest::FileTasks::spawn(pending, &config.aggregation);
    while let Some(result) = tasks.next().await {
        let (_, path, agg) = result?;
        let snapshot = agg.snapshot();
        let outcome = store.update(&snapshot).await?;
        let filename = path.to_string_lossy();
        store
            .record_file(&FileRecord::new(&*filename, &snapshot, &outcome))
            .await?;
        info!(
            file = %filename,
            total_records = snapshot.total_records,
            skipped_records = snapshot.skipped_records,
            inserted = outcome.inserted,
            updated = outcome.updated,
            "indexed file"
        );
        summary.indexed += 1;
    }
    Ok(())
}

/// Create the schema.
pub async fn init(config: &AppConfig) -> anyhow::Result<()> {
    let store = DnsStore::connect(&config.database).await?;
    let result = store.init().await;
    store.close().await;
    result?;
    info!(path = %config.database.path, "schema ready");
    Ok(())
}
