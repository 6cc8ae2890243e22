// Output sinks for bucketed data.

pub mod document;
mod jsonl;
mod sqlite;

use std::fmt;
use std::ops::AddAssign;

use serde::Deserialize;

use crate::models::{Document, UpsertDescription};

pub use jsonl::JsonLinesSink;
pub use sqlite::SqliteStore;

/// One unit of work for a sink.
#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    /// Point path: upsert against the per-bucket document.
    Point(UpsertDescription),
    /// Batch path: a finished bucket aggregate.
    Bucket(Document),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    #[default]
    Sqlite,
    Jsonl,
}

/// Running totals across writes. `failed` counts outputs lost to write errors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteSummary {
    pub inserted: u64,
    pub modified: u64,
    pub failed: u64,
}

impl AddAssign for WriteSummary {
    fn add_assign(&mut self, rhs: Self) {
        self.inserted += rhs.inserted;
        self.modified += rhs.modified;
        self.failed += rhs.failed;
    }
}

impl fmt::Display for WriteSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "inserted={} modified={} failed={}",
            self.inserted, self.modified, self.failed
        )
    }
}

pub enum Sink {
    Sqlite(SqliteStore),
    JsonLines(JsonLinesSink),
}

impl Sink {
    pub async fn open(kind: SinkKind, path: &str) -> anyhow::Result<Self> {
        match kind {
            SinkKind::Sqlite => {
                let store = SqliteStore::connect(path).await?;
                store.init().await?;
                Ok(Sink::Sqlite(store))
            }
            SinkKind::Jsonl => Ok(Sink::JsonLines(JsonLinesSink::open(path).await?)),
        }
    }

    pub async fn write(&mut self, batch: &[Output]) -> anyhow::Result<WriteSummary> {
        match self {
            Sink::Sqlite(store) => {
                let mut points = Vec::new();
                let mut docs = Vec::new();
                for item in batch {
                    match item {
                        Output::Point(u) => points.push(u.clone()),
                        Output::Bucket(d) => docs.push(d.clone()),
                    }
                }
                let mut summary = store.apply_upserts(&points).await?;
                summary += store.insert_aggregates(&docs).await?;
                Ok(summary)
            }
            Sink::JsonLines(sink) => sink.write(batch).await,
        }
    }

    pub async fn close(self) -> anyhow::Result<()> {
        match self {
            Sink::Sqlite(store) => {
                store.close().await;
                Ok(())
            }
            Sink::JsonLines(sink) => sink.close().await,
        }
    }
}
