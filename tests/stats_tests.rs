// rockgauge/tests/stats_tests.rs
mod common;

use common::setup_logging;

use rockgauge::{parse_stats, StatEntry, StoreError};

const DUMP: &str = "\
rocksdb.block.cache.miss COUNT : 42
rocksdb.block.cache.hit COUNT : 1337

rocksdb.db.get.micros P50 : 1.500000 P95 : 3.000000 P99 : 4.250000 P100 : 12.000000 COUNT : 100 SUM : 175
rocksdb.db.write.micros P50 : 2.000000 P95 : 5.000000 P99 : 7.000000 P100 : 9.000000 COUNT : 8
rocksdb.some.future.stat COUNT : 3
";

#[test]
fn test_counters_and_histograms() {
  setup_logging();
  let snapshot = parse_stats(DUMP).unwrap();

  assert_eq!(snapshot.len(), 5);
  assert_eq!(snapshot.malformed_lines(), 0);
  assert_eq!(snapshot.counter("rocksdb.block.cache.miss"), Some(42));
  assert_eq!(snapshot.counter("rocksdb.block.cache.hit"), Some(1337));

  let get = snapshot.histogram("rocksdb.db.get.micros").unwrap();
  assert_eq!(get.p50, 1.5);
  assert_eq!(get.p95, 3.0);
  assert_eq!(get.p99, 4.25);
  assert_eq!(get.p100, 12.0);
  assert_eq!(get.count, 100);
  assert_eq!(get.sum, Some(175.0));

  // Without a SUM field the sum is absent, not zero.
  let write = snapshot.histogram("rocksdb.db.write.micros").unwrap();
  assert_eq!(write.count, 8);
  assert_eq!(write.sum, None);
}

#[test]
fn test_unknown_names_are_kept() {
  setup_logging();
  let snapshot = parse_stats(DUMP).unwrap();
  assert_eq!(snapshot.get("rocksdb.some.future.stat"), Some(&StatEntry::Counter(3)));
}

#[test]
fn test_malformed_lines_are_skipped_and_counted() {
  setup_logging();
  let blob = "\
rocksdb.block.cache.miss COUNT : 5
rocksdb.broken COUNT 5
rocksdb.db.get.micros P50 : x P95 : 1 P99 : 1 P100 : 1 COUNT : 1
rocksdb.block.cache.hit COUNT : 6
";
  let snapshot = parse_stats(blob).unwrap();
  assert_eq!(snapshot.len(), 2);
  assert_eq!(snapshot.malformed_lines(), 2);
  assert_eq!(snapshot.counter("rocksdb.block.cache.miss"), Some(5));
  assert_eq!(snapshot.counter("rocksdb.block.cache.hit"), Some(6));
  assert!(snapshot.get("rocksdb.db.get.micros").is_none());
}

#[test]
fn test_empty_and_blank_dumps() {
  setup_logging();
  assert!(parse_stats("").unwrap().is_empty());
  let blank = parse_stats("\n   \n\t\n").unwrap();
  assert!(blank.is_empty());
  assert_eq!(blank.malformed_lines(), 0);
}

#[test]
fn test_entirely_unparseable_dump_is_rejected() {
  setup_logging();
  let err = parse_stats("this is not\na statistics dump\n").unwrap_err();
  assert!(matches!(err, StoreError::MalformedStats(_)));
  assert!(err.is_sampling_error());
}

#[test]
fn test_repeated_name_keeps_last_entry() {
  setup_logging();
  let snapshot = parse_stats("a COUNT : 1\na COUNT : 2\n").unwrap();
  assert_eq!(snapshot.counter("a"), Some(2));
  assert_eq!(snapshot.len(), 1);
}

#[test]
fn test_counter_and_histogram_accessors_do_not_cross() {
  setup_logging();
  let snapshot = parse_stats(DUMP).unwrap();
  assert_eq!(snapshot.counter("rocksdb.db.get.micros"), None);
  assert!(snapshot.histogram("rocksdb.block.cache.miss").is_none());
  assert_eq!(snapshot.iter().count(), snapshot.len());
}

#[test]
fn test_single_counter_and_histogram_lines() {
  setup_logging();
  let snapshot = parse_stats("foo.bar COUNT : 42").unwrap();
  assert_eq!(snapshot.len(), 1);
  assert_eq!(snapshot.get("foo.bar"), Some(&StatEntry::Counter(42)));

  let snapshot = parse_stats("  db.get.micros P50 : 1.5 P95 : 3.0 P99 : 4.2 P100 : 9.9 COUNT : 100 SUM : 150  ").unwrap();
  let h = snapshot.histogram("db.get.micros").unwrap();
  assert_eq!((h.p50, h.p95, h.p99, h.p100), (1.5, 3.0, 4.2, 9.9));
  assert_eq!(h.count, 100);
  assert_eq!(h.sum, Some(150.0));
}
