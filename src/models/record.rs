// Expanded observations: one metric per record (column-wise) or one data row
// per record (row-wise), both answering to named fields for bucketing.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDateTime;
use serde_json::Value;

use super::aggregate::{Document, ts_value};
use super::SectionKind;

/// Field names a record answers to in `MetricRecord::field`.
pub mod field {
    pub const MACHINE: &str = "machine";
    pub const TIMESTAMP: &str = "ts";
    pub const TYPE: &str = "type";
    pub const METRIC: &str = "metric";
    pub const DEVICE: &str = "device";
    pub const VALUE: &str = "value";
}

/// A timestamped set of named fields that the bucketer can group and fold.
pub trait Observation {
    fn timestamp(&self) -> NaiveDateTime;

    /// Named field used for dimensions.
    fn field(&self, name: &str) -> Option<Value>;

    /// Numeric fact lookup; `None` when absent or not a number.
    fn fact(&self, name: &str) -> Option<f64>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricRecord {
    pub machine_id: Option<String>,
    pub timestamp: NaiveDateTime,
    pub kind: SectionKind,
    /// Set for device-section records only.
    pub device: Option<String>,
    pub metric: String,
    /// Always finite.
    pub value: f64,
    /// Constant attributes shared by every record of a run (tags, run id).
    pub extra: Arc<Document>,
}

impl MetricRecord {
    /// Named field lookup used for dimensions and facts. Built-in names win over
    /// extra attributes of the same name.
    pub fn field(&self, name: &str) -> Option<Value> {
        match name {
            field::MACHINE => self.machine_id.clone().map(Value::String),
            field::TIMESTAMP => Some(ts_value(self.timestamp)),
            field::TYPE => Some(Value::String(self.kind.as_str().to_string())),
            field::METRIC => Some(Value::String(self.metric.clone())),
            field::DEVICE => self.device.clone().map(Value::String),
            field::VALUE => Some(Value::from(self.value)),
            other => self.extra.get(other).cloned(),
        }
    }

    /// Numeric fact lookup; `None` when absent or not a number.
    pub fn fact(&self, name: &str) -> Option<f64> {
        match name {
            field::VALUE => Some(self.value),
            other => self.extra.get(other).and_then(Value::as_f64),
        }
    }

    /// Flat document form: extra attributes first, then the built-in fields.
    pub fn to_document(&self) -> Document {
        let mut doc = (*self.extra).clone();
        for name in [
            field::MACHINE,
            field::TIMESTAMP,
            field::TYPE,
            field::METRIC,
            field::DEVICE,
            field::VALUE,
        ] {
            if let Some(value) = self.field(name) {
                doc.insert(name.to_string(), value);
            }
        }
        doc
    }
}

impl Observation for MetricRecord {
    fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }

    fn field(&self, name: &str) -> Option<Value> {
        MetricRecord::field(self, name)
    }

    fn fact(&self, name: &str) -> Option<f64> {
        MetricRecord::fact(self, name)
    }
}

/// Every numeric column of one data row, keyed by header name. The row label
/// (device name) is exposed under the section's own name, e.g. `device`.
#[derive(Debug, Clone, PartialEq)]
pub struct RowRecord {
    pub machine_id: Option<String>,
    pub timestamp: NaiveDateTime,
    pub kind: SectionKind,
    pub label: Option<String>,
    /// Header -> finite value.
    pub columns: BTreeMap<String, f64>,
    pub extra: Arc<Document>,
}

impl RowRecord {
    pub fn field(&self, name: &str) -> Option<Value> {
        match name {
            field::MACHINE => self.machine_id.clone().map(Value::String),
            field::TIMESTAMP => Some(ts_value(self.timestamp)),
            field::TYPE => Some(Value::String(self.kind.as_str().to_string())),
            label if label == self.kind.as_str() => self.label.clone().map(Value::String),
            other => match self.columns.get(other) {
                Some(v) => Some(Value::from(*v)),
                None => self.extra.get(other).cloned(),
            },
        }
    }

    pub fn fact(&self, name: &str) -> Option<f64> {
        match self.columns.get(name) {
            Some(v) => Some(*v),
            None => self.extra.get(name).and_then(Value::as_f64),
        }
    }

    /// Wide document form: extra attributes, then identity fields, then columns.
    pub fn to_document(&self) -> Document {
        let mut doc = (*self.extra).clone();
        for name in [field::MACHINE, field::TIMESTAMP, field::TYPE] {
            if let Some(value) = self.field(name) {
                doc.insert(name.to_string(), value);
            }
        }
        if let Some(label) = &self.label {
            doc.insert(self.kind.as_str().to_string(), Value::String(label.clone()));
        }
        for (name, v) in &self.columns {
            doc.insert(name.clone(), Value::from(*v));
        }
        doc
    }
}

impl Observation for RowRecord {
    fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }

    fn field(&self, name: &str) -> Option<Value> {
        RowRecord::field(self, name)
    }

    fn fact(&self, name: &str) -> Option<f64> {
        RowRecord::fact(self, name)
    }
}
