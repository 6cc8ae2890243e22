// Parser tests: state machine transitions, expansion, error and EOF handling

mod common;

use std::io::{self, BufReader, Cursor, Read};

use common::{SAMPLE_LOG, at};
use iostat_loader::Error;
use iostat_loader::models::SectionKind;
use iostat_loader::parser::{RecordExpander, SnapshotParser, date};

fn parse(text: &str) -> SnapshotParser<Cursor<&[u8]>> {
    SnapshotParser::from_reader(Cursor::new(text.as_bytes()))
}

#[test]
fn timestamp_pattern_matches_iostat_format() {
    assert!(date::is_timestamp_line("12/16/18 15:00:10"));
    assert_eq!(
        date::parse_timestamp("12/16/18 15:00:10").unwrap(),
        at(2018, 12, 16, 15, 0, 10)
    );
}

#[test]
fn impossible_date_is_format_error() {
    assert!(date::is_timestamp_line("13/40/18 15:00:10"));
    let err = date::parse_timestamp("13/40/18 15:00:10").unwrap_err();
    assert!(err.is_format());
}

#[test]
fn cpu_section_expands_to_one_record() {
    let text = "12/16/18 15:00:10\navg-cpu:   %user\n          5.00\n";
    let snapshots: Vec<_> = parse(text).map(Result::unwrap).collect();
    assert_eq!(snapshots.len(), 1);

    let out = RecordExpander::new().expand(&snapshots[0]);
    assert!(out.errors.is_empty());
    assert_eq!(out.records.len(), 1);
    let r = &out.records[0];
    assert_eq!(r.metric, "%user");
    assert_eq!(r.value, 5.00);
    assert_eq!(r.kind, SectionKind::Cpu);
    assert_eq!(r.device, None);
    assert_eq!(r.timestamp, at(2018, 12, 16, 15, 0, 10));
}

#[test]
fn device_section_sets_device() {
    let text = "12/16/18 15:00:10\nDevice:   tps\nsda       12.30\n";
    let snapshots: Vec<_> = parse(text).map(Result::unwrap).collect();
    let out = RecordExpander::new().expand(&snapshots[0]);
    assert_eq!(out.records.len(), 1);
    let r = &out.records[0];
    assert_eq!(r.device.as_deref(), Some("sda"));
    assert_eq!(r.metric, "tps");
    assert_eq!(r.value, 12.30);
    assert_eq!(r.kind, SectionKind::Device);
}

#[test]
fn filter_keeps_only_listed_metrics() {
    let text = "12/16/18 15:00:10\nDevice:   tps   kB_read/s\nsda       12.30  4.00\n";
    let snapshots: Vec<_> = parse(text).map(Result::unwrap).collect();
    let out = RecordExpander::new().with_filters(["tps"]).expand(&snapshots[0]);
    assert_eq!(out.records.len(), 1);
    assert_eq!(out.records[0].metric, "tps");
    assert_eq!(out.dropped, 0);
}

#[test]
fn identity_and_timestamp_only_yields_nothing() {
    let text = "Linux 5.4.0 (host1) \t01/02/19 \t_x86_64_\t(4 CPU)\n\n01/02/19 10:00:00\n\n01/02/19 10:00:10\n";
    let mut parser = parse(text);
    assert!(parser.next().is_none());
    assert_eq!(parser.machine_id(), Some("host1"));
    assert_eq!(parser.stats().snapshots, 0);
    assert!(parser.is_closed());
}

#[test]
fn sample_log_emits_one_snapshot_per_data_row() {
    let mut parser = parse(SAMPLE_LOG);
    let snapshots: Vec<_> = parser.by_ref().map(Result::unwrap).collect();
    assert_eq!(snapshots.len(), 6);
    assert!(snapshots
        .iter()
        .all(|s| s.machine_id.as_deref() == Some("gbrpsr000003291")));
    assert_eq!(snapshots[0].kind, SectionKind::Cpu);
    assert_eq!(snapshots[1].label(), Some("sda"));
    assert_eq!(snapshots[2].label(), Some("sdb"));
    assert_eq!(snapshots[3].timestamp, at(2018, 12, 16, 15, 0, 20));
    assert_eq!(parser.stats().snapshots, 6);
    assert_eq!(parser.stats().format_errors, 0);

    let records: usize = snapshots
        .iter()
        .map(|s| RecordExpander::new().expand(s).records.len())
        .sum();
    assert_eq!(records, 36);
}

#[test]
fn emitted_snapshots_do_not_see_later_rows() {
    let mut parser = parse(SAMPLE_LOG);
    let first = parser.next().unwrap().unwrap();
    let rest: Vec<_> = parser.map(Result::unwrap).collect();
    assert_eq!(first.values[1], "5.00");
    assert_eq!(first.timestamp, at(2018, 12, 16, 15, 0, 10));
    assert_eq!(rest.len(), 5);
}

#[test]
fn rows_before_timestamp_or_header_are_skipped() {
    let text = "sda 1.0\n12/16/18 15:00:10\nsdb 2.0\nDevice: tps\nsdc 3.0\n";
    let mut parser = parse(text);
    let snapshots: Vec<_> = parser.by_ref().map(Result::unwrap).collect();
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].label(), Some("sdc"));
    assert_eq!(parser.stats().orphan_rows, 2);
}

#[test]
fn bad_timestamp_suspends_rows_until_next_valid_one() {
    let text = "\
12/16/18 15:00:10
Device: tps
sda 1.0
13/45/18 15:00:20
sda 2.0
12/16/18 15:00:30
sda 3.0
";
    let mut parser = parse(text);
    let snapshots: Vec<_> = parser.by_ref().map(Result::unwrap).collect();
    let values: Vec<_> = snapshots.iter().map(|s| s.values[1].as_str()).collect();
    assert_eq!(values, vec!["1.0", "3.0"]);
    assert_eq!(parser.stats().format_errors, 1);
    assert_eq!(parser.stats().orphan_rows, 1);
}

#[test]
fn unknown_section_is_kept_as_other() {
    let text = "12/16/18 15:00:10\nnet-if:  rx  tx\neth0  1.0  2.0\n";
    let snapshots: Vec<_> = parse(text).map(Result::unwrap).collect();
    assert_eq!(snapshots[0].kind, SectionKind::Other("net-if".into()));
    let out = RecordExpander::new().expand(&snapshots[0]);
    assert_eq!(out.records.len(), 2);
    assert_eq!(out.records[0].device, None);
}

#[test]
fn unparseable_value_drops_only_that_record() {
    let text = "12/16/18 15:00:10\nDevice: tps r/s w/s\nsda 1.0 oops inf\n";
    let snapshots: Vec<_> = parse(text).map(Result::unwrap).collect();
    let out = RecordExpander::new().expand(&snapshots[0]);
    assert_eq!(out.records.len(), 1);
    assert_eq!(out.records[0].metric, "tps");
    assert_eq!(out.errors.len(), 2);
    assert!(matches!(out.errors[0], Error::Format { line: 3, .. }));
}

#[test]
fn short_rows_use_the_common_prefix() {
    let text = "12/16/18 15:00:10\nDevice: tps r/s w/s\nsda 1.0\n";
    let snapshots: Vec<_> = parse(text).map(Result::unwrap).collect();
    let out = RecordExpander::new().expand(&snapshots[0]);
    assert_eq!(out.records.len(), 1);
}

#[test]
fn non_positive_policy_drops_and_counts() {
    let text = "12/16/18 15:00:10\nDevice: tps r/s w/s\nsda 1.0 0.00 -2.0\n";
    let snapshots: Vec<_> = parse(text).map(Result::unwrap).collect();

    let keep = RecordExpander::new().expand(&snapshots[0]);
    assert_eq!(keep.records.len(), 3);

    let drop = RecordExpander::new()
        .with_drop_non_positive(true)
        .expand(&snapshots[0]);
    assert_eq!(drop.records.len(), 1);
    assert_eq!(drop.dropped, 2);
}

#[test]
fn attributes_are_merged_into_every_record() {
    let text = "12/16/18 15:00:10\nDevice: tps r/s\nsda 1.0 2.0\n";
    let snapshots: Vec<_> = parse(text).map(Result::unwrap).collect();
    let mut attrs = iostat_loader::models::Document::new();
    attrs.insert("env".into(), serde_json::json!("prod"));
    let out = RecordExpander::new().with_attributes(attrs).expand(&snapshots[0]);
    assert!(out
        .records
        .iter()
        .all(|r| r.field("env") == Some(serde_json::json!("prod"))));
}

struct FailAtEnd(Cursor<Vec<u8>>);

impl Read for FailAtEnd {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.0.read(buf)? {
            0 => Err(io::Error::other("device gone")),
            n => Ok(n),
        }
    }
}

#[test]
fn read_failure_ends_sequence_with_io_error() {
    let text = "12/16/18 15:00:10\nDevice: tps\nsda 1.0\n";
    let reader = BufReader::new(FailAtEnd(Cursor::new(text.as_bytes().to_vec())));
    let mut parser = SnapshotParser::from_reader(reader);

    assert!(parser.next().unwrap().is_ok());
    assert!(matches!(parser.next(), Some(Err(Error::Io(_)))));
    assert!(parser.next().is_none());
    assert!(parser.is_closed());
}

#[test]
fn open_reads_from_file_and_custom_markers() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("iostat.log");
    let text = SAMPLE_LOG.replace("Linux", "SunOS");
    std::fs::write(&path, text).unwrap();

    let parser = SnapshotParser::open(&path).unwrap().with_identity_markers(["SunOS"]);
    let snapshots: Vec<_> = parser.map(Result::unwrap).collect();
    assert_eq!(snapshots.len(), 6);
    assert_eq!(snapshots[0].machine_id.as_deref(), Some("gbrpsr000003291"));
}

#[test]
fn open_missing_file_is_io_error() {
    let err = SnapshotParser::open("/nonexistent/iostat.log").err().unwrap();
    assert!(matches!(err, Error::Io(_)));
}

#[test]
fn row_expansion_puts_every_column_on_one_record() {
    let text = "12/16/18 15:00:10\nDevice:   r/s   w/s   %util\nsda       2.00  3.00  0.50\n";
    let snapshots: Vec<_> = parse(text).map(Result::unwrap).collect();
    let out = RecordExpander::new().expand_row(&snapshots[0]);
    assert!(out.errors.is_empty());

    let row = out.record.expect("row record");
    assert_eq!(row.fact("r/s"), Some(2.0));
    assert_eq!(row.fact("%util"), Some(0.5));
    assert_eq!(row.field("device"), Some(serde_json::json!("sda")));
    assert_eq!(row.field("type"), Some(serde_json::json!("device")));
    assert_eq!(
        serde_json::Value::Object(row.to_document()),
        serde_json::json!({
            "ts": "2018-12-16T15:00:10",
            "type": "device",
            "device": "sda",
            "r/s": 2.0,
            "w/s": 3.0,
            "%util": 0.5,
        })
    );
}

#[test]
fn row_expansion_of_cpu_has_no_label() {
    let text = "12/16/18 15:00:10\navg-cpu:   %user  %idle\n          5.00   95.00\n";
    let snapshots: Vec<_> = parse(text).map(Result::unwrap).collect();
    let row = RecordExpander::new().expand_row(&snapshots[0]).record.unwrap();
    assert_eq!(row.label, None);
    assert_eq!(row.field("cpu"), None);
    assert_eq!(row.fact("%idle"), Some(95.0));
}

#[test]
fn row_expansion_applies_filter_and_value_policy() {
    let text = "12/16/18 15:00:10\nDevice: tps r/s w/s rkB/s\nsda 1.0 0.00 oops 8.0\n";
    let snapshots: Vec<_> = parse(text).map(Result::unwrap).collect();
    let out = RecordExpander::new()
        .with_filters(["r/s", "w/s", "rkB/s"])
        .with_drop_non_positive(true)
        .expand_row(&snapshots[0]);
    let row = out.record.unwrap();
    assert_eq!(row.columns.keys().collect::<Vec<_>>(), vec!["rkB/s"]);
    assert_eq!(out.dropped, 1);
    assert_eq!(out.errors.len(), 1);

    let none = RecordExpander::new().with_filters(["await"]).expand_row(&snapshots[0]);
    assert!(none.record.is_none());
}
