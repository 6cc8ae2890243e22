// Domain models: parsed snapshots, expanded metric records, bucket aggregates

mod aggregate;
mod record;
mod snapshot;

pub use aggregate::{BucketAggregate, Document, FactAggregate, UpsertDescription};
pub(crate) use aggregate::ts_value;
pub use record::{MetricRecord, Observation, RowRecord, field};
pub use snapshot::{SectionKind, Snapshot};
