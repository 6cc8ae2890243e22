use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use iostat_loader::*;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

/// Load iostat logs into time-bucketed aggregates.
#[derive(Debug, Parser)]
#[command(name = "iostat-loader", version)]
struct Args {
    /// Config file (default: $CONFIG_FILE, then ./config.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log files or directories; replaces input.paths from the config.
    paths: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .init();

    let args = Args::parse();
    let mut app_config = match &args.config {
        Some(path) => config::AppConfig::load_from_path(path)?,
        None => config::AppConfig::load()?,
    };
    if !args.paths.is_empty() {
        app_config.input.paths = args.paths;
    }
    anyhow::ensure!(
        !app_config.input.paths.is_empty(),
        "no input: pass log paths or set input.paths"
    );
    tracing::info!(loader = LOADER_ID, "starting");

    let bucketer = bucketer::Bucketer::new(app_config.bucketing.bucketer.clone())?;
    let expander = parser::RecordExpander::new()
        .with_filters(app_config.input.metric_filter.iter().cloned())
        .with_attributes(app_config.input.attributes.clone())
        .with_drop_non_positive(app_config.input.drop_non_positive);
    let plan = Arc::new(worker::IngestPlan {
        identity_markers: app_config.input.identity_markers.clone(),
        expander,
        expansion: app_config.input.expansion,
        bucketer,
        mode: app_config.bucketing.mode,
    });

    let files = worker::collect_input_files(&app_config.input.paths)?;
    tracing::info!(
        files = files.len(),
        mode = ?plan.mode,
        expansion = ?plan.expansion,
        "processing"
    );

    let sink = sink::Sink::open(app_config.sink.kind, &app_config.sink.path).await?;
    let (tx, rx) =
        tokio::sync::mpsc::channel(worker::writer_channel_capacity(app_config.sink.batch_size));
    let writer_handle = worker::spawn_sink_writer(
        rx,
        sink,
        worker::WriterConfig {
            batch_size: app_config.sink.batch_size,
            flush_interval_secs: app_config.sink.flush_interval_secs,
        },
    );

    let results =
        worker::ingest_all(files, plan, tx, app_config.input.max_parallel_files).await;
    let mut failed_files = 0usize;
    for stats in &results {
        if let Some(err) = &stats.io_error {
            failed_files += 1;
            tracing::error!(path = %stats.path.display(), error = %err, "file ingest failed");
        }
        tracing::info!(
            path = %stats.path.display(),
            lines = stats.lines,
            snapshots = stats.snapshots,
            records = stats.records,
            outputs = stats.outputs,
            format_errors = stats.format_errors,
            orphan_rows = stats.orphan_rows,
            dropped_non_positive = stats.dropped_non_positive,
            "file complete"
        );
    }

    let total = writer_handle.await?;
    tracing::info!(
        inserted = total.inserted,
        modified = total.modified,
        failed = total.failed,
        failed_files,
        "processing complete"
    );
    Ok(())
}
