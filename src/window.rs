// Bucket windows for the batch path: group a timestamp-ordered record stream by
// bucket and dimension key, folding each group with `Bucketer::fold`.

use std::collections::HashMap;

use chrono::NaiveDateTime;

use crate::bucketer::Bucketer;
use crate::error::Result;
use crate::models::{BucketAggregate, Observation};

/// Open window over one bucket. Groups are emitted in first-seen order when the
/// bucket changes or on `finish`.
pub struct BucketWindow<'a> {
    bucketer: &'a Bucketer,
    current: Option<NaiveDateTime>,
    index: HashMap<String, usize>,
    groups: Vec<BucketAggregate>,
}

impl<'a> BucketWindow<'a> {
    pub fn new(bucketer: &'a Bucketer) -> Self {
        Self {
            bucketer,
            current: None,
            index: HashMap::new(),
            groups: Vec::new(),
        }
    }

    /// Number of groups in the open window.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Add one record. Returns the previous window's aggregates when `record`
    /// opens a new bucket, otherwise an empty vec. A record carrying none of the
    /// facts is rejected without touching the window.
    pub fn push<R: Observation + ?Sized>(&mut self, record: &R) -> Result<Vec<BucketAggregate>> {
        let bucket_ts = self.bucketer.truncate(record.timestamp());
        let closes = matches!(self.current, Some(current) if current != bucket_ts);
        let key = self.bucketer.dimension_key(record);

        if let (false, Some(&slot)) = (closes, self.index.get(&key)) {
            self.bucketer.fold(&mut self.groups[slot], record)?;
            return Ok(Vec::new());
        }

        let mut seed = BucketAggregate::default();
        self.bucketer.fold(&mut seed, record)?;
        let closed = if closes { self.take() } else { Vec::new() };
        self.current = Some(bucket_ts);
        self.index.insert(key, self.groups.len());
        self.groups.push(seed);
        Ok(closed)
    }

    /// Close the open window and return its aggregates.
    pub fn finish(mut self) -> Vec<BucketAggregate> {
        self.take()
    }

    fn take(&mut self) -> Vec<BucketAggregate> {
        self.index.clear();
        self.current = None;
        std::mem::take(&mut self.groups)
    }
}
