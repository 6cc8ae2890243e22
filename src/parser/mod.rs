// Incremental iostat log parser: a pull-based state machine over a line source.
//
// Holds one line buffer, the current machine id, timestamp and section headers;
// never the whole file. Each data row yields a freshly built `Snapshot`.

pub mod date;
pub mod expand;

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::{Arc, LazyLock};

use chrono::NaiveDateTime;
use regex::Regex;
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::{SectionKind, Snapshot};

pub use expand::{ExpansionMode, Expansion, RecordExpander, RowExpansion};

/// First token of the `uname` banner iostat prints at the top of a log.
pub const DEFAULT_IDENTITY_MARKERS: &[&str] = &["Linux"];

static MACHINE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\((.+?)\)").expect("machine pattern compiles"));

/// Extract the parenthesized host name from a banner line, e.g.
/// `Linux 2.6.32 (db01)  12/16/18  _x86_64_  (24 CPU)` -> `db01`.
pub fn machine_from_identity(line: &str) -> Option<String> {
    MACHINE_ID
        .captures(line)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Split on whitespace runs. An indented line keeps a leading empty token so
/// CPU values stay aligned with the `avg-cpu:` header column.
pub(crate) fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    if line.starts_with(char::is_whitespace) {
        tokens.push(String::new());
    }
    tokens.extend(line.split_whitespace().map(str::to_string));
    tokens
}

/// Counters for one parse. Format errors and orphan rows never end the parse.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseStats {
    pub lines: u64,
    pub snapshots: u64,
    /// Timestamp-shaped lines with an impossible date.
    pub format_errors: u64,
    /// Data rows seen before any timestamp or section header.
    pub orphan_rows: u64,
}

#[derive(Debug, Clone)]
struct Section {
    headers: Arc<[String]>,
    kind: SectionKind,
}

pub struct SnapshotParser<R> {
    /// `None` once input is exhausted or failed; dropping it closes the file.
    reader: Option<R>,
    buf: String,
    identity_markers: Vec<String>,
    machine_id: Option<String>,
    timestamp: Option<NaiveDateTime>,
    section: Option<Section>,
    stats: ParseStats,
}

impl SnapshotParser<BufReader<File>> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self::from_reader(BufReader::new(file)))
    }
}

impl<R: BufRead> SnapshotParser<R> {
    pub fn from_reader(reader: R) -> Self {
        Self {
            reader: Some(reader),
            buf: String::new(),
            identity_markers: DEFAULT_IDENTITY_MARKERS
                .iter()
                .map(|m| m.to_string())
                .collect(),
            machine_id: None,
            timestamp: None,
            section: None,
            stats: ParseStats::default(),
        }
    }

    pub fn with_identity_markers<I, S>(mut self, markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.identity_markers = markers.into_iter().map(Into::into).collect();
        self
    }

    pub fn stats(&self) -> ParseStats {
        self.stats
    }

    pub fn machine_id(&self) -> Option<&str> {
        self.machine_id.as_deref()
    }

    /// True once the line source has been released.
    pub fn is_closed(&self) -> bool {
        self.reader.is_none()
    }

    fn consume(&mut self, raw: &str) -> Option<Snapshot> {
        let line = raw.trim_end_matches(['\n', '\r']);
        let line_number = self.stats.lines;

        if self
            .identity_markers
            .iter()
            .any(|m| line.starts_with(m.as_str()))
        {
            if let Some(id) = machine_from_identity(line) {
                self.machine_id = Some(id);
            }
            return None;
        }

        if date::is_timestamp_line(line) {
            match date::parse_timestamp(line) {
                Ok(ts) => self.timestamp = Some(ts),
                Err(e) => {
                    self.stats.format_errors += 1;
                    self.timestamp = None;
                    debug!(error = %e.at_line(line_number), "skipping bad timestamp");
                }
            }
            return None;
        }

        if line.trim().is_empty() {
            return None;
        }

        let tokens = tokenize(line);
        if tokens.first().is_some_and(|t| t.ends_with(':')) {
            let kind = SectionKind::from_header_token(&tokens[0]);
            self.section = Some(Section {
                headers: tokens.into(),
                kind,
            });
            return None;
        }

        let (Some(timestamp), Some(section)) = (self.timestamp, self.section.as_ref()) else {
            self.stats.orphan_rows += 1;
            return None;
        };
        self.stats.snapshots += 1;
        Some(Snapshot {
            machine_id: self.machine_id.clone(),
            timestamp,
            headers: Arc::clone(&section.headers),
            kind: section.kind.clone(),
            values: tokens,
            line_number,
        })
    }
}

impl<R: BufRead> Iterator for SnapshotParser<R> {
    type Item = Result<Snapshot>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let reader = self.reader.as_mut()?;
            self.buf.clear();
            match reader.read_line(&mut self.buf) {
                Ok(0) => {
                    self.reader = None;
                    return None;
                }
                Ok(_) => {
                    self.stats.lines += 1;
                    let line = std::mem::take(&mut self.buf);
                    let snapshot = self.consume(&line);
                    self.buf = line;
                    if let Some(snapshot) = snapshot {
                        return Some(Ok(snapshot));
                    }
                }
                Err(e) => {
                    self.reader = None;
                    return Some(Err(Error::Io(e)));
                }
            }
        }
    }
}

impl<R: BufRead> std::iter::FusedIterator for SnapshotParser<R> {}
