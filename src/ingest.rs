// Per-file aggregation loop and parallel fan-out.
// Each file gets a private Aggregator on a blocking task (no shared state, no locks);
// the partial aggregators are then folded into one destination sequentially.
// The first failing file cancels the run: no new files start and running workers
// stop at their next record.

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use crate::aggregator::Aggregator;
use crate::config::AggregationConfig;
use crate::error::{DecodeError, IngestError};
use crate::input;
use crate::models::DnsRecord;
use crate::zeek_reader::ZeekReader;

/// Feed every record from `reader` into `agg`. Records with missing fields are counted
/// as skipped; any other decode error stops the unit and is returned.
pub fn aggregate_reader<R: BufRead>(agg: &mut Aggregator, reader: R) -> Result<(), DecodeError> {
    aggregate_reader_until(agg, reader, &AtomicBool::new(false)).map(|_| ())
}

/// Same as `aggregate_reader`, but checks `cancel` before each record.
/// Returns `Ok(false)` if it stopped because `cancel` was set.
pub fn aggregate_reader_until<R: BufRead>(
    agg: &mut Aggregator,
    reader: R,
    cancel: &AtomicBool,
) -> Result<bool, DecodeError> {
    let mut zeek = ZeekReader::new(reader);
    loop {
        if cancel.load(Ordering::Relaxed) {
            return Ok(false);
        }
        let Some(raw) = zeek.next_record()? else {
            return Ok(true);
        };
        match DnsRecord::decode(&raw) {
            Ok(record) => {
                agg.add_record(&record);
            }
            Err(e) if e.is_missing_field() => {
                debug!(error = %e, "skipping record with missing fields");
                agg.skip_record();
            }
            Err(e) => return Err(e),
        }
    }
}

pub fn aggregate_file(agg: &mut Aggregator, path: &Path) -> Result<(), IngestError> {
    aggregate_file_until(agg, path, &AtomicBool::new(false))
}

fn aggregate_file_until(
    agg: &mut Aggregator,
    path: &Path,
    cancel: &AtomicBool,
) -> Result<(), IngestError> {
    let reader = input::open(path).map_err(|source| IngestError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    match aggregate_reader_until(agg, reader, cancel) {
        Ok(true) => Ok(()),
        Ok(false) => Err(IngestError::Cancelled {
            path: path.to_path_buf(),
        }),
        Err(source) => Err(IngestError::Decode {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// One finished file: its position in the input list, its path and its aggregator.
pub type FileResult = (usize, PathBuf, Aggregator);

/// Per-file aggregation tasks, at most `workers` running at once. Results are yielded
/// as files finish, not in input order.
///
/// A failure cancels the set: pending files are never started and running workers stop
/// at their next record. Dropping the set cancels it as well.
pub struct FileTasks {
    tasks: JoinSet<Result<FileResult, IngestError>>,
    pending: std::iter::Enumerate<std::vec::IntoIter<PathBuf>>,
    cancel: Arc<AtomicBool>,
    max_value_len: usize,
}

impl FileTasks {
    /// Start the first `config.workers` files. Must be called inside a tokio runtime.
    pub fn spawn(paths: Vec<PathBuf>, config: &AggregationConfig) -> Self {
        let mut set = Self {
            tasks: JoinSet::new(),
            pending: paths.into_iter().enumerate(),
            cancel: Arc::new(AtomicBool::new(false)),
            max_value_len: config.max_value_len,
        };
        for _ in 0..config.workers.max(1) {
            if !set.spawn_next() {
                break;
            }
        }
        set
    }

    fn spawn_next(&mut self) -> bool {
        if self.is_cancelled() {
            return false;
        }
        let Some((idx, path)) = self.pending.next() else {
            return false;
        };
        let cancel = Arc::clone(&self.cancel);
        let max_value_len = self.max_value_len;
        self.tasks.spawn_blocking(move || {
            let mut agg = Aggregator::with_max_value_len(max_value_len);
            aggregate_file_until(&mut agg, &path, &cancel)?;
            info!(
                file = %path.display(),
                total_records = agg.total_records(),
                skipped_records = agg.skipped_records(),
                tuples = agg.tuples_len(),
                individual = agg.individual_len(),
                "aggregated file"
            );
            Ok((idx, path, agg))
        });
        true
    }

    /// Next finished file, or `None` once every file is done or the set was cancelled.
    /// After the first error the set is cancelled and further calls return `None`.
    pub async fn next(&mut self) -> Option<Result<FileResult, IngestError>> {
        if self.is_cancelled() {
            return None;
        }
        let joined = self.tasks.join_next().await?;
        let result = joined
            .map_err(|e| IngestError::Task(e.to_string()))
            .and_then(|r| r);
        match &result {
            Ok(_) => {
                self.spawn_next();
            }
            Err(e) => {
                warn!(error = %e, running = self.tasks.len(), "file failed, cancelling remaining files");
                self.cancel();
            }
        }
        Some(result)
    }

    /// Stop starting files and signal running workers to stop.
    pub fn cancel(&mut self) {
        self.cancel.store(true, Ordering::Relaxed);
        self.tasks.abort_all();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }
}

impl Drop for FileTasks {
    fn drop(&mut self) {
        // Blocking tasks already running cannot be aborted; the flag stops their loops.
        self.cancel.store(true, Ordering::Relaxed);
    }
}

/// Aggregate each file into its own Aggregator, at most `config.workers` at a time.
/// Results come back in input order. The first failing file fails the call.
#[instrument(skip(paths, config), fields(operation = "aggregate_each", files = paths.len(), workers = config.workers))]
pub async fn aggregate_each(
    paths: Vec<PathBuf>,
    config: &AggregationConfig,
) -> Result<Vec<(PathBuf, Aggregator)>, IngestError> {
    let mut done = Vec::with_capacity(paths.len());
    let mut tasks = FileTasks::spawn(paths, config);
    while let Some(result) = tasks.next().await {
        done.push(result?);
    }
    done.sort_by_key(|(idx, _, _)| *idx);
    Ok(done.into_iter().map(|(_, path, agg)| (path, agg)).collect())
}

/// Aggregate all files in parallel, then merge them into a single Aggregator in input order.
pub async fn aggregate_files(
    paths: Vec<PathBuf>,
    config: &AggregationConfig,
) -> Result<Aggregator, IngestError> {
    let parts = aggregate_each(paths, config).await?;
    let mut dest = Aggregator::with_max_value_len(config.max_value_len);
    for (_path, part) in parts {
        dest.merge(part);
    }
    Ok(dest)
}
