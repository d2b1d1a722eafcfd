// rockgauge/tests/persisted_tests.rs
mod common;

use common::setup_logging;

use rockgauge::persisted::{bloom_bits_per_key, latest_options_file};
use rockgauge::{load_latest_options, OptionBundle, OptionsFile, StoreError};
use std::fs;
use tempfile::TempDir;

const SINGLE_CF_OPTIONS: &str = r#"
# This is a RocksDB option file.
[Version]
  rocksdb_version=8.10.0
  options_file_version=1.1

[DBOptions]
  max_open_files=512
  max_background_jobs=4
  use_fsync=true
  bytes_per_sync=1048576
  info_log_level=INFO_LEVEL

[CFOptions "default"]
  write_buffer_size=33554432
  num_levels=5
  max_bytes_for_level_multiplier=8.000000
  compression=kLZ4Compression

[TableOptions/BlockBasedTable "default"]
  block_size=8192
  format_version=5
  filter_policy=bloomfilter:12:false
"#;

const TWO_CF_OPTIONS: &str = r#"
[DBOptions]
  max_open_files=512

[CFOptions "default"]
  num_levels=7

[CFOptions "metadata"]
  num_levels=7
"#;

fn db_dir(tmp: &TempDir, name: &str) -> std::path::PathBuf {
  let path = tmp.path().join(name);
  fs::create_dir_all(&path).expect("create db dir");
  path
}

#[test]
fn test_missing_directory_means_no_persisted_options() {
  setup_logging();
  let tmp = tempfile::tempdir().unwrap();
  let path = tmp.path().join("never_created.db");
  assert!(load_latest_options(&path).unwrap().is_none());
  assert!(!path.exists());
}

#[test]
fn test_directory_without_options_file() {
  setup_logging();
  let tmp = tempfile::tempdir().unwrap();
  let path = db_dir(&tmp, "empty.db");
  fs::write(path.join("OPTIONS-garbage"), "ignored").unwrap();
  assert!(load_latest_options(&path).unwrap().is_none());
}

#[test]
fn test_single_default_cf_is_loaded() {
  setup_logging();
  let tmp = tempfile::tempdir().unwrap();
  let path = db_dir(&tmp, "application.db");
  fs::write(path.join("OPTIONS-000007"), SINGLE_CF_OPTIONS).unwrap();

  let bundle = load_latest_options(&path).unwrap().expect("options present");
  let defaults = OptionBundle::default();

  assert_eq!(bundle.db.max_open_files, 512);
  assert_eq!(bundle.db.max_background_jobs, 4);
  assert!(bundle.db.use_fsync);
  assert_eq!(bundle.db.bytes_per_sync, 1_048_576);
  assert_eq!(bundle.cf.write_buffer_size, 33_554_432);
  assert_eq!(bundle.cf.num_levels, 5);
  assert_eq!(bundle.cf.max_bytes_for_level_multiplier, 8.0);
  assert_eq!(bundle.table.block_size, 8192);
  assert_eq!(bundle.table.bits_per_key, 12.0);

  // Values the file does not carry keep their factory defaults.
  assert_eq!(bundle.cf.max_write_buffer_number, defaults.cf.max_write_buffer_number);
  assert_eq!(bundle.table.block_cache_size, defaults.table.block_cache_size);
}

#[test]
fn test_more_than_one_cf_is_rejected() {
  setup_logging();
  let tmp = tempfile::tempdir().unwrap();
  let path = db_dir(&tmp, "multi.db");
  fs::write(path.join("OPTIONS-000003"), TWO_CF_OPTIONS).unwrap();

  let err = load_latest_options(&path).unwrap_err();
  assert!(matches!(err, StoreError::UnexpectedConfiguration));
  assert_eq!(
    err.to_string(),
    "unexpected rocksdb configuration, rocksdb should have only one column family named default"
  );
}

#[test]
fn test_single_non_default_cf_is_rejected() {
  setup_logging();
  let file = OptionsFile::parse("[DBOptions]\n max_open_files=1\n[CFOptions \"blocks\"]\n num_levels=7\n").unwrap();
  assert_eq!(file.column_family_names(), vec!["blocks"]);
  assert!(matches!(file.to_bundle(), Err(StoreError::UnexpectedConfiguration)));
}

#[test]
fn test_newest_options_file_wins() {
  setup_logging();
  let tmp = tempfile::tempdir().unwrap();
  let path = db_dir(&tmp, "state.db");
  fs::write(path.join("OPTIONS-000009"), TWO_CF_OPTIONS).unwrap();
  fs::write(path.join("OPTIONS-000012"), SINGLE_CF_OPTIONS).unwrap();
  fs::write(path.join("OPTIONS-000012.dbtmp"), "half written").unwrap();

  let latest = latest_options_file(&path).unwrap().unwrap();
  assert!(latest.ends_with("OPTIONS-000012"));
  assert!(load_latest_options(&path).unwrap().is_some());
}

#[test]
fn test_unparseable_persisted_value_is_an_error() {
  setup_logging();
  let file = OptionsFile::parse("[DBOptions]\n max_open_files=unbounded\n[CFOptions \"default\"]\n").unwrap();
  assert!(matches!(file.to_bundle(), Err(StoreError::Coercion { .. })));
}

#[test]
fn test_parse_rejects_entries_outside_sections() {
  setup_logging();
  let err = OptionsFile::parse("max_open_files=10\n").unwrap_err();
  assert!(err.is_configuration_error());
}

#[test]
fn test_bloom_bits_per_key() {
  setup_logging();
  assert_eq!(bloom_bits_per_key("bloomfilter:10:false"), Some(10.0));
  assert_eq!(bloom_bits_per_key("rocksdb.BuiltinBloomFilter:9.5:false"), Some(9.5));
  assert_eq!(bloom_bits_per_key("nullptr"), None);
  assert_eq!(bloom_bits_per_key("ribbonfilter:10"), None);
}
