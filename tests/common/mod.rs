// Shared test helpers: sample iostat log and record builders

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use iostat_loader::models::{BucketAggregate, Document, FactAggregate, MetricRecord, SectionKind};

/// Two `iostat -x -t` snapshots ten seconds apart.
pub const SAMPLE_LOG: &str = "\
Linux 2.6.32-754.2.1.el6.x86_64 (gbrpsr000003291) \t12/16/18 \t_x86_64_\t(24 CPU)

12/16/18 15:00:10
avg-cpu:  %user   %nice %system %iowait  %steal   %idle
           5.00    0.00    1.50    0.25    0.00   93.25

Device:         rrqm/s   wrqm/s     r/s     w/s   rkB/s   wkB/s
sda               0.00     1.20    2.00    3.00   16.00   40.00
sdb               0.00     0.00    0.00    0.00    0.00    0.00

12/16/18 15:00:20
avg-cpu:  %user   %nice %system %iowait  %steal   %idle
           7.00    0.00    2.50    0.75    0.00   89.75

Device:         rrqm/s   wrqm/s     r/s     w/s   rkB/s   wkB/s
sda               0.00     0.80    4.00    1.00   32.00    8.00
sdb               0.00     0.00    1.00    0.00    4.00    0.00
";

pub fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, mo, d)
        .unwrap()
        .and_hms_opt(h, mi, s)
        .unwrap()
}

pub fn record(ts: NaiveDateTime, metric: &str, value: f64) -> MetricRecord {
    MetricRecord {
        machine_id: Some("machine123".into()),
        timestamp: ts,
        kind: SectionKind::Device,
        device: None,
        metric: metric.into(),
        value,
        extra: Arc::new(Document::new()),
    }
}

pub fn device_record(ts: NaiveDateTime, device: &str, metric: &str, value: f64) -> MetricRecord {
    MetricRecord {
        device: Some(device.into()),
        ..record(ts, metric, value)
    }
}

/// Statistics of the default `value` fact.
pub fn value_stats(agg: &BucketAggregate) -> &FactAggregate {
    agg.fact("value").expect("value fact")
}
