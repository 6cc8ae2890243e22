// Ingest pipeline: per-file blocking parse tasks feed one writer task.
// Files parse in parallel (bounded); the writer owns the sink and batches.

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{Semaphore, mpsc};
use tokio::time::{Duration, interval};
use tracing::{debug, info, instrument, warn};

use crate::bucketer::Bucketer;
use crate::config::AggregationMode;
use crate::error::Result;
use crate::models::Observation;
use crate::parser::{ExpansionMode, RecordExpander, SnapshotParser};
use crate::sink::{Output, Sink, WriteSummary};
use crate::window::BucketWindow;

/// Channel capacity for outputs (backpressure if the writer falls behind).
pub fn writer_channel_capacity(batch_size: usize) -> usize {
    (batch_size * 2).max(32)
}

/// Everything a file task needs; shared read-only across tasks.
pub struct IngestPlan {
    pub identity_markers: Vec<String>,
    pub expander: RecordExpander,
    pub expansion: ExpansionMode,
    pub bucketer: Bucketer,
    pub mode: AggregationMode,
}

/// Per-file outcome. Every record that did not reach the sink is counted here.
#[derive(Debug, Clone, Default)]
pub struct FileStats {
    pub path: PathBuf,
    pub lines: u64,
    pub snapshots: u64,
    pub records: u64,
    pub outputs: u64,
    /// Bad timestamps plus unparseable values plus records missing a fact.
    pub format_errors: u64,
    pub orphan_rows: u64,
    pub dropped_non_positive: u64,
    /// Set when the file could not be opened or a read failed part way.
    pub io_error: Option<String>,
}

/// Parse one line source and emit outputs. `emit` returns false once the
/// receiver is gone, which stops the parse early (the source is dropped).
pub fn ingest_reader<R: BufRead>(
    mut parser: SnapshotParser<R>,
    plan: &IngestPlan,
    mut emit: impl FnMut(Output) -> bool,
) -> FileStats {
    let mut stats = FileStats::default();
    let mut window = BucketWindow::new(&plan.bucketer);
    let mut open = true;

    'snapshots: for item in parser.by_ref() {
        let snapshot = match item {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, operation = "read_line", "log read failed");
                stats.io_error = Some(e.to_string());
                break;
            }
        };
        let mut results = Vec::new();
        let (errors, dropped) = match plan.expansion {
            ExpansionMode::Column => {
                let expansion = plan.expander.expand(&snapshot);
                for record in &expansion.records {
                    results.push(aggregate(plan, &mut window, record));
                }
                (expansion.errors, expansion.dropped)
            }
            ExpansionMode::Row => {
                let expansion = plan.expander.expand_row(&snapshot);
                if let Some(record) = &expansion.record {
                    results.push(aggregate(plan, &mut window, record));
                }
                (expansion.errors, expansion.dropped)
            }
        };
        stats.dropped_non_positive += dropped as u64;
        stats.format_errors += errors.len() as u64;
        for e in &errors {
            debug!(error = %e, "dropping record");
        }

        for outputs in results {
            stats.records += 1;
            let outputs = match outputs {
                Ok(o) => o,
                Err(e) => {
                    stats.format_errors += 1;
                    debug!(error = %e, "dropping record");
                    continue;
                }
            };
            for output in outputs {
                if !emit(output) {
                    open = false;
                    break 'snapshots;
                }
                stats.outputs += 1;
            }
        }
    }

    if open {
        for agg in window.finish() {
            if !emit(Output::Bucket(plan.bucketer.to_document(&agg))) {
                break;
            }
            stats.outputs += 1;
        }
    }

    let parse = parser.stats();
    stats.lines = parse.lines;
    stats.snapshots = parse.snapshots;
    stats.orphan_rows = parse.orphan_rows;
    stats.format_errors += parse.format_errors;
    stats
}

/// Route one record through the configured aggregation path.
fn aggregate<R: Observation>(
    plan: &IngestPlan,
    window: &mut BucketWindow<'_>,
    record: &R,
) -> Result<Vec<Output>> {
    match plan.mode {
        AggregationMode::Point => Ok(vec![Output::Point(plan.bucketer.bucket(record)?)]),
        AggregationMode::Batch => Ok(window
            .push(record)?
            .iter()
            .map(|agg| Output::Bucket(plan.bucketer.to_document(agg)))
            .collect()),
    }
}

/// Blocking: parse `path` and send outputs on `tx`. Call from `spawn_blocking`.
pub fn ingest_file(path: &Path, plan: &IngestPlan, tx: &mpsc::Sender<Output>) -> FileStats {
    let parser = match SnapshotParser::open(path) {
        Ok(p) => p.with_identity_markers(plan.identity_markers.iter().cloned()),
        Err(e) => {
            warn!(error = %e, path = %path.display(), "cannot open log");
            return FileStats {
                path: path.to_path_buf(),
                io_error: Some(e.to_string()),
                ..Default::default()
            };
        }
    };
    let mut stats = ingest_reader(parser, plan, |output| tx.blocking_send(output).is_ok());
    stats.path = path.to_path_buf();
    stats
}

/// Ingest every path, at most `max_parallel` at a time. Results are in `paths` order.
#[instrument(skip_all, fields(files = paths.len(), max_parallel = max_parallel))]
pub async fn ingest_all(
    paths: Vec<PathBuf>,
    plan: Arc<IngestPlan>,
    tx: mpsc::Sender<Output>,
    max_parallel: usize,
) -> Vec<FileStats> {
    let permits = Arc::new(Semaphore::new(max_parallel.max(1)));
    let mut handles = Vec::with_capacity(paths.len());

    for path in paths {
        let permits = permits.clone();
        let plan = plan.clone();
        let tx = tx.clone();
        handles.push(tokio::spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return FileStats {
                    path,
                    io_error: Some("ingest cancelled".into()),
                    ..Default::default()
                };
            };
            info!(path = %path.display(), "reading file");
            let task_path = path.clone();
            tokio::task::spawn_blocking(move || ingest_file(&task_path, &plan, &tx))
                .await
                .unwrap_or_else(|e| FileStats {
                    path,
                    io_error: Some(format!("ingest task failed: {e}")),
                    ..Default::default()
                })
        }));
    }

    let mut out = Vec::with_capacity(handles.len());
    for handle in handles {
        match handle.await {
            Ok(stats) => out.push(stats),
            Err(e) => warn!(error = %e, "ingest task panicked"),
        }
    }
    out
}

/// Writer batching: flush at `batch_size` outputs or every `flush_interval_secs`.
pub struct WriterConfig {
    pub batch_size: usize,
    pub flush_interval_secs: u64,
}

/// Spawns the task that owns the sink. When every sender is dropped it flushes
/// what is left, closes the sink and returns the totals.
pub fn spawn_sink_writer(
    mut rx: mpsc::Receiver<Output>,
    mut sink: Sink,
    config: WriterConfig,
) -> tokio::task::JoinHandle<WriteSummary> {
    let flush_interval = Duration::from_secs(config.flush_interval_secs);
    tokio::spawn(async move {
        let mut buffer: Vec<Output> = Vec::with_capacity(config.batch_size);
        let mut total = WriteSummary::default();
        let mut flush_tick = interval(flush_interval);
        flush_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                result = rx.recv() => {
                    match result {
                        Some(output) => {
                            buffer.push(output);
                            if buffer.len() >= config.batch_size {
                                total += flush_buffer(&mut sink, &mut buffer).await;
                            }
                        }
                        None => break,
                    }
                }
                _ = flush_tick.tick() => {
                    total += flush_buffer(&mut sink, &mut buffer).await;
                }
            }
        }
        total += flush_buffer(&mut sink, &mut buffer).await;
        if let Err(e) = sink.close().await {
            warn!(error = %e, "sink writer: close failed");
        }
        debug!(%total, "sink writer shutting down");
        total
    })
}

/// Write and clear the buffer. A failed batch is counted, logged and dropped.
async fn flush_buffer(sink: &mut Sink, buffer: &mut Vec<Output>) -> WriteSummary {
    if buffer.is_empty() {
        return WriteSummary::default();
    }
    let n = buffer.len();
    let summary = match sink.write(buffer).await {
        Ok(s) => {
            debug!(operation = "write_batch", outputs_count = n, "batch written");
            s
        }
        Err(e) => {
            warn!(error = %e, operation = "write_batch", outputs_count = n, "sink write failed");
            WriteSummary {
                failed: n as u64,
                ..Default::default()
            }
        }
    };
    buffer.clear();
    summary
}

/// Expand input paths: files as given, directories walked recursively (sorted).
pub fn collect_input_files(paths: &[PathBuf]) -> std::io::Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for path in paths {
        if !path.exists() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} does not exist", path.display()),
            ));
        }
        walk(path, &mut out)?;
    }
    Ok(out)
}

/// Sockets, fifos and dangling links inside a directory are skipped.
fn walk(path: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    if path.is_dir() {
        let mut entries: Vec<PathBuf> = std::fs::read_dir(path)?
            .map(|e| e.map(|e| e.path()))
            .collect::<std::io::Result<_>>()?;
        entries.sort();
        for entry in entries {
            walk(&entry, out)?;
        }
    } else if path.is_file() {
        out.push(path.to_path_buf());
    }
    Ok(())
}
