// Temporal bucketing: bucket keys, sub-bucket offsets, and the two aggregation
// paths (store-side upsert operators and in-process fold).

pub mod time;

use chrono::NaiveDateTime;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::models::{BucketAggregate, Document, FactAggregate, Observation, UpsertDescription, field};

pub use time::TimeUnit;

/// Joins dimension values in `dimension_key`; cannot appear in iostat tokens.
const KEY_SEPARATOR: char = '\u{1f}';

/// Output document field names.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FieldNames {
    pub timestamp: String,
    pub max: String,
    pub min: String,
    pub avg: String,
    pub sum: String,
    pub count: String,
    pub values: String,
}

impl Default for FieldNames {
    fn default() -> Self {
        Self {
            timestamp: "ts".into(),
            max: "max".into(),
            min: "min".into(),
            avg: "avg".into(),
            sum: "sum".into(),
            count: "count".into(),
            values: "values".into(),
        }
    }
}

fn default_fact_fields() -> Vec<String> {
    vec![field::VALUE.to_string()]
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct BucketerConfig {
    pub bucket_level: TimeUnit,
    /// Must be the same as or finer than `bucket_level`.
    pub resolution: TimeUnit,
    #[serde(default)]
    pub dimension_fields: Vec<String>,
    /// More than one fact nests each fact's aggregates under its own name.
    #[serde(default = "default_fact_fields")]
    pub fact_fields: Vec<String>,
    #[serde(default = "default_true")]
    pub include_max: bool,
    #[serde(default = "default_true")]
    pub include_min: bool,
    #[serde(default = "default_true")]
    pub include_avg: bool,
    #[serde(default = "default_true")]
    pub include_count: bool,
    #[serde(default = "default_true")]
    pub include_values: bool,
    #[serde(default)]
    pub fields: FieldNames,
}

impl BucketerConfig {
    pub fn new(bucket_level: TimeUnit, resolution: TimeUnit) -> Self {
        Self {
            bucket_level,
            resolution,
            dimension_fields: Vec::new(),
            fact_fields: default_fact_fields(),
            include_max: true,
            include_min: true,
            include_avg: true,
            include_count: true,
            include_values: true,
            fields: FieldNames::default(),
        }
    }

    pub fn dimensions<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dimension_fields = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn facts<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fact_fields = names.into_iter().map(Into::into).collect();
        self
    }

    /// Output keys a dimension may not take: the bucket timestamp, plus the
    /// aggregate names (one fact) or the fact names (several facts).
    pub fn reserved_field_names(&self) -> Vec<&str> {
        let f = &self.fields;
        let mut names = vec![f.timestamp.as_str()];
        if self.fact_fields.len() == 1 {
            names.extend([
                f.values.as_str(),
                f.max.as_str(),
                f.min.as_str(),
                f.avg.as_str(),
                f.count.as_str(),
            ]);
        } else {
            names.extend(self.fact_fields.iter().map(String::as_str));
        }
        names
    }
}

#[derive(Debug, Clone)]
pub struct Bucketer {
    config: BucketerConfig,
}

impl Bucketer {
    /// Rejects a resolution coarser than the bucket level, an empty fact list,
    /// and dimensions named like an output field.
    pub fn new(config: BucketerConfig) -> Result<Self> {
        if !config.resolution.is_finer_or_equal(config.bucket_level) {
            return Err(Error::Config(format!(
                "resolution {:?} is coarser than bucket level {:?}",
                config.resolution, config.bucket_level
            )));
        }
        if config.fact_fields.is_empty() {
            return Err(Error::Config("at least one fact field is required".into()));
        }
        let reserved = config.reserved_field_names();
        if let Some(clash) = config
            .dimension_fields
            .iter()
            .find(|d| reserved.contains(&d.as_str()))
        {
            return Err(Error::Config(format!(
                "dimension {clash:?} collides with an output field"
            )));
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &BucketerConfig {
        &self.config
    }

    pub fn truncate(&self, ts: NaiveDateTime) -> NaiveDateTime {
        time::truncate(ts, self.config.bucket_level)
    }

    pub fn offset(&self, bucket_ts: NaiveDateTime, ts: NaiveDateTime) -> i64 {
        time::offset(bucket_ts, ts, self.config.resolution)
    }

    /// True iff `ts` sits exactly on a bucket boundary.
    pub fn split_on(&self, ts: NaiveDateTime) -> bool {
        ts == self.truncate(ts)
    }

    /// Present dimension fields of `record`, in configured order.
    pub fn dimensions<R: Observation + ?Sized>(&self, record: &R) -> Vec<(String, Value)> {
        self.config
            .dimension_fields
            .iter()
            .filter_map(|name| record.field(name).map(|v| (name.clone(), v)))
            .collect()
    }

    /// Group identity of `record` within one bucket window.
    pub fn dimension_key<R: Observation + ?Sized>(&self, record: &R) -> String {
        let mut key = String::new();
        for (i, (_, value)) in self.dimensions(record).iter().enumerate() {
            if i > 0 {
                key.push(KEY_SEPARATOR);
            }
            match value {
                Value::String(s) => key.push_str(s),
                other => key.push_str(&other.to_string()),
            }
        }
        key
    }

    /// Configured facts present on `record`, in configured order. A record
    /// carrying none of them is a format error.
    fn present_facts<R: Observation + ?Sized>(&self, record: &R) -> Result<Vec<(&str, f64)>> {
        let facts: Vec<_> = self
            .config
            .fact_fields
            .iter()
            .filter_map(|name| record.fact(name).map(|v| (name.as_str(), v)))
            .collect();
        if facts.is_empty() {
            return Err(Error::format(
                0,
                format!("none of the fact fields {:?} present", self.config.fact_fields),
            ));
        }
        Ok(facts)
    }

    /// Point aggregation: one idempotent-shaped upsert against the bucket document.
    pub fn bucket<R: Observation + ?Sized>(&self, record: &R) -> Result<UpsertDescription> {
        let c = &self.config;
        let f = &c.fields;
        let facts = self.present_facts(record)?;
        let bucket_ts = self.truncate(record.timestamp());
        let offset = self.offset(bucket_ts, record.timestamp());

        let mut filter = Document::new();
        filter.insert(f.timestamp.clone(), crate::models::ts_value(bucket_ts));
        filter.extend(self.dimensions(record));

        let mut set = Document::new();
        let mut max = Document::new();
        let mut min = Document::new();
        let mut inc = Document::new();

        if c.fact_fields.len() == 1 {
            let v = Value::from(facts[0].1);
            if c.include_values {
                set.insert(format!("{}.{offset}", f.values), v.clone());
            }
            if c.include_max {
                max.insert(f.max.clone(), v.clone());
            }
            if c.include_min {
                min.insert(f.min.clone(), v);
            }
            if c.include_count {
                inc.insert(f.count.clone(), Value::from(1));
            }
        } else {
            let nested = c.include_count || c.include_max || c.include_min;
            for (fact, v) in facts {
                let v = Value::from(v);
                if c.include_values {
                    let path = if nested {
                        format!("{fact}.{}.{offset}", f.values)
                    } else {
                        format!("{fact}.{offset}")
                    };
                    set.insert(path, v.clone());
                }
                if c.include_max {
                    max.insert(format!("{fact}.{}", f.max), v.clone());
                }
                if c.include_min {
                    min.insert(format!("{fact}.{}", f.min), v);
                }
                if c.include_count {
                    inc.insert(format!("{fact}.{}", f.count), Value::from(1));
                }
            }
        }

        let mut update = Document::new();
        if c.include_max {
            update.insert("$max".into(), Value::Object(max));
        }
        if c.include_min {
            update.insert("$min".into(), Value::Object(min));
        }
        if c.include_count {
            update.insert("$inc".into(), Value::Object(inc));
        }
        if c.include_values {
            update.insert("$set".into(), Value::Object(set));
        }

        Ok(UpsertDescription {
            filter,
            update,
            upsert: true,
        })
    }

    /// Fold `record` into `acc` in place, once per configured fact it carries.
    /// Records of one bucket partition must arrive in timestamp order: a
    /// colliding offset keeps the last value.
    pub fn fold<R: Observation + ?Sized>(&self, acc: &mut BucketAggregate, record: &R) -> Result<()> {
        let facts = self.present_facts(record)?;
        let bucket_ts = self.truncate(record.timestamp());
        let offset = self
            .config
            .include_values
            .then(|| self.offset(bucket_ts, record.timestamp()));
        acc.bucket_ts = bucket_ts;
        acc.dimensions = self.dimensions(record);
        for (name, v) in facts {
            acc.facts.entry(name.to_string()).or_default().push(offset, v);
        }
        Ok(())
    }

    /// In-process aggregation step: `previous` plus one record.
    pub fn combine<R: Observation + ?Sized>(
        &self,
        previous: &BucketAggregate,
        record: &R,
    ) -> Result<BucketAggregate> {
        let mut next = previous.clone();
        self.fold(&mut next, record)?;
        Ok(next)
    }

    /// Document written for a finished aggregate. One fact is written flat;
    /// several facts nest under their own names, as in `bucket`. `sum` is
    /// internal and never written; `count` is kept whenever `avg` is.
    pub fn to_document(&self, agg: &BucketAggregate) -> Document {
        let c = &self.config;
        let mut doc = Document::new();
        doc.insert(c.fields.timestamp.clone(), crate::models::ts_value(agg.bucket_ts));
        doc.extend(agg.dimensions.iter().cloned());

        if c.fact_fields.len() == 1 {
            let empty = FactAggregate::default();
            let stats = agg.fact(&c.fact_fields[0]).unwrap_or(&empty);
            doc.extend(self.fact_document(stats));
            return doc;
        }

        let nested = c.include_count || c.include_max || c.include_min || c.include_avg;
        for name in &c.fact_fields {
            let Some(stats) = agg.fact(name) else {
                continue;
            };
            let value = if nested {
                Value::Object(self.fact_document(stats))
            } else {
                Value::Object(offset_values(stats))
            };
            doc.insert(name.clone(), value);
        }
        doc
    }

    fn fact_document(&self, stats: &FactAggregate) -> Document {
        let c = &self.config;
        let f = &c.fields;
        let mut doc = Document::new();
        if c.include_values {
            doc.insert(f.values.clone(), Value::Object(offset_values(stats)));
        }
        if c.include_max {
            doc.insert(f.max.clone(), Value::from(stats.max));
        }
        if c.include_min {
            doc.insert(f.min.clone(), Value::from(stats.min));
        }
        if c.include_count || c.include_avg {
            doc.insert(f.count.clone(), Value::from(stats.count));
        }
        if c.include_avg {
            doc.insert(f.avg.clone(), Value::from(stats.avg()));
        }
        doc
    }
}

fn offset_values(stats: &FactAggregate) -> Document {
    stats
        .offset_values
        .iter()
        .map(|(k, v)| (k.to_string(), Value::from(*v)))
        .collect()
}
