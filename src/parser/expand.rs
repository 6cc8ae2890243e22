// Snapshot expansion: column-wise (one MetricRecord per metric column) or
// row-wise (one RowRecord per data row, every column a fact).

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use crate::error::Error;
use serde::Deserialize;

use crate::models::{Document, MetricRecord, RowRecord, SectionKind, Snapshot};

/// Records built from one snapshot, plus what was rejected on the way.
#[derive(Debug, Default)]
pub struct Expansion {
    pub records: Vec<MetricRecord>,
    /// Unparseable or non-finite values; each dropped its own record only.
    pub errors: Vec<Error>,
    /// Records removed by the non-positive value policy.
    pub dropped: usize,
}

/// Which record shape a snapshot row becomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpansionMode {
    /// One `MetricRecord` per column (`metric`/`value` fields).
    #[default]
    Column,
    /// One `RowRecord` per row; columns are facts by header name.
    Row,
}

/// Row-wise result for one snapshot. `record` is `None` when no column survived.
#[derive(Debug, Default)]
pub struct RowExpansion {
    pub record: Option<RowRecord>,
    pub errors: Vec<Error>,
    pub dropped: usize,
}

#[derive(Debug, Clone, Default)]
pub struct RecordExpander {
    filters: HashSet<String>,
    extra: Arc<Document>,
    drop_non_positive: bool,
}

impl RecordExpander {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow-list of metric names. Empty means every column is emitted.
    pub fn with_filters<I, S>(mut self, filters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filters = filters.into_iter().map(Into::into).collect();
        self
    }

    /// Constant attributes merged into every record.
    pub fn with_attributes(mut self, extra: Document) -> Self {
        self.extra = Arc::new(extra);
        self
    }

    pub fn with_drop_non_positive(mut self, drop: bool) -> Self {
        self.drop_non_positive = drop;
        self
    }

    fn wants(&self, metric: &str) -> bool {
        self.filters.is_empty() || self.filters.contains(metric)
    }

    /// Parse one column, applying the value policy. `Ok(None)` means dropped.
    fn column_value(&self, snapshot: &Snapshot, i: usize) -> Result<Option<f64>, Error> {
        let metric = &snapshot.headers[i];
        let raw = &snapshot.values[i];
        match raw.parse::<f64>() {
            Ok(v) if v.is_finite() => Ok((!self.drop_non_positive || v > 0.0).then_some(v)),
            _ => Err(Error::format(
                snapshot.line_number,
                format!("{metric}: not a finite number: {raw:?}"),
            )),
        }
    }

    pub fn expand(&self, snapshot: &Snapshot) -> Expansion {
        let mut out = Expansion::default();
        let columns = snapshot.headers.len().min(snapshot.values.len());
        let device = match snapshot.kind {
            SectionKind::Device => snapshot.label().map(str::to_string),
            _ => None,
        };

        for i in 1..columns {
            let metric = &snapshot.headers[i];
            if !self.wants(metric) {
                continue;
            }
            let value = match self.column_value(snapshot, i) {
                Ok(Some(v)) => v,
                Ok(None) => {
                    out.dropped += 1;
                    continue;
                }
                Err(e) => {
                    out.errors.push(e);
                    continue;
                }
            };
            out.records.push(MetricRecord {
                machine_id: snapshot.machine_id.clone(),
                timestamp: snapshot.timestamp,
                kind: snapshot.kind.clone(),
                device: device.clone(),
                metric: metric.clone(),
                value,
                extra: Arc::clone(&self.extra),
            });
        }
        out
    }

    /// Row-wise expansion: every kept column of the row lands on one record.
    pub fn expand_row(&self, snapshot: &Snapshot) -> RowExpansion {
        let mut out = RowExpansion::default();
        let columns = snapshot.headers.len().min(snapshot.values.len());
        let mut values = BTreeMap::new();

        for i in 1..columns {
            let metric = &snapshot.headers[i];
            if !self.wants(metric) {
                continue;
            }
            match self.column_value(snapshot, i) {
                Ok(Some(v)) => {
                    values.insert(metric.clone(), v);
                }
                Ok(None) => out.dropped += 1,
                Err(e) => out.errors.push(e),
            }
        }

        if !values.is_empty() {
            out.record = Some(RowRecord {
                machine_id: snapshot.machine_id.clone(),
                timestamp: snapshot.timestamp,
                kind: snapshot.kind.clone(),
                label: snapshot.label().map(str::to_string),
                columns: values,
                extra: Arc::clone(&self.extra),
            });
        }
        out
    }
}
