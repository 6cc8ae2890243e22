// One parsed section row of an iostat log, prior to per-metric expansion.

use std::fmt;
use std::sync::Arc;

use chrono::NaiveDateTime;
use serde::{Serialize, Serializer};

/// Header token -> section kind. Anything else colon-terminated is `Other`.
const SECTION_KINDS: &[(&str, SectionKind)] = &[
    ("avg-cpu:", SectionKind::Cpu),
    ("Device:", SectionKind::Device),
];

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SectionKind {
    Cpu,
    Device,
    /// Unrecognized section; holds the header token without its colon.
    Other(String),
}

impl SectionKind {
    /// Classify a section header's first token (e.g. `avg-cpu:`).
    pub fn from_header_token(token: &str) -> Self {
        SECTION_KINDS
            .iter()
            .find(|(marker, _)| *marker == token)
            .map(|(_, kind)| kind.clone())
            .unwrap_or_else(|| SectionKind::Other(token.trim_end_matches(':').to_string()))
    }

    pub fn as_str(&self) -> &str {
        match self {
            SectionKind::Cpu => "cpu",
            SectionKind::Device => "device",
            SectionKind::Other(name) => name,
        }
    }
}

impl fmt::Display for SectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for SectionKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Point-in-time copy of the parser state at a data row. Built fresh for every
/// emitted row; headers are shared between rows of the same section.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub machine_id: Option<String>,
    pub timestamp: NaiveDateTime,
    pub headers: Arc<[String]>,
    pub kind: SectionKind,
    /// Raw row tokens, aligned with `headers`. Index 0 is the row label
    /// (device name, or the empty token before indented CPU counters).
    pub values: Vec<String>,
    /// 1-based source line of the data row.
    pub line_number: u64,
}

impl Snapshot {
    /// Row label: the device name for device sections.
    pub fn label(&self) -> Option<&str> {
        self.values
            .first()
            .map(String::as_str)
            .filter(|s| !s.is_empty())
    }
}
