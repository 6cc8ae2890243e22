// Bucket aggregates (in-process fold) and upsert descriptions (store-side fold).

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::Serialize;
use serde_json::Value;

/// JSON document as written to a sink.
pub type Document = serde_json::Map<String, Value>;

/// Timestamps are written as ISO-8601 local date-times without zone.
pub(crate) fn ts_value(ts: NaiveDateTime) -> Value {
    Value::String(ts.format("%Y-%m-%dT%H:%M:%S").to_string())
}

/// Filter + update operators for one point upsert against a per-bucket document.
/// `update` uses `$set`, `$max`, `$min` and `$inc`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpsertDescription {
    pub filter: Document,
    pub update: Document,
    pub upsert: bool,
}

/// Running statistics of one fact within a bucket.
///
/// `Default` is the fold seed: zero count, and `min`/`max` at the opposite
/// representable extremes so the first value replaces both.
#[derive(Debug, Clone, PartialEq)]
pub struct FactAggregate {
    /// Sparse offset -> value; last write wins per offset.
    pub offset_values: BTreeMap<i64, f64>,
    pub min: f64,
    pub max: f64,
    pub count: u64,
    pub sum: f64,
}

impl Default for FactAggregate {
    fn default() -> Self {
        Self {
            offset_values: BTreeMap::new(),
            min: f64::MAX,
            max: f64::MIN,
            count: 0,
            sum: 0.0,
        }
    }
}

impl FactAggregate {
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// `sum / count`, or 0 for an empty aggregate.
    pub fn avg(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.sum / (self.count as f64)
    }

    /// Fold one value. `offset` is `None` when per-offset values are not kept.
    pub fn push(&mut self, offset: Option<i64>, v: f64) {
        if let Some(offset) = offset {
            self.offset_values.insert(offset, v);
        }
        self.max = self.max.max(v);
        self.min = self.min.min(v);
        self.count += 1;
        self.sum += v;
    }

    /// Scalars combine field-wise; `later` wins on colliding offsets.
    pub fn merge(&self, later: &FactAggregate) -> FactAggregate {
        if self.is_empty() {
            return later.clone();
        }
        if later.is_empty() {
            return self.clone();
        }
        let mut offset_values = self.offset_values.clone();
        offset_values.extend(later.offset_values.iter().map(|(k, v)| (*k, *v)));
        FactAggregate {
            offset_values,
            min: self.min.min(later.min),
            max: self.max.max(later.max),
            count: self.count + later.count,
            sum: self.sum + later.sum,
        }
    }
}

/// Running aggregate for one (bucket, dimensions) key, one entry per fact field
/// seen so far. `Default` is the empty fold seed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BucketAggregate {
    pub bucket_ts: NaiveDateTime,
    pub dimensions: Vec<(String, Value)>,
    pub facts: BTreeMap<String, FactAggregate>,
}

impl BucketAggregate {
    pub fn is_empty(&self) -> bool {
        self.facts.values().all(FactAggregate::is_empty)
    }

    pub fn fact(&self, name: &str) -> Option<&FactAggregate> {
        self.facts.get(name)
    }

    /// Merge two partial aggregates of the same key, fact by fact. `later` wins
    /// on colliding offsets, so argument order is receipt order.
    pub fn merge(&self, later: &BucketAggregate) -> BucketAggregate {
        if self.is_empty() {
            return later.clone();
        }
        if later.is_empty() {
            return self.clone();
        }
        let mut facts = self.facts.clone();
        for (name, agg) in &later.facts {
            let merged = match facts.get(name) {
                Some(earlier) => earlier.merge(agg),
                None => agg.clone(),
            };
            facts.insert(name.clone(), merged);
        }
        BucketAggregate {
            bucket_ts: self.bucket_ts,
            dimensions: self.dimensions.clone(),
            facts,
        }
    }
}
