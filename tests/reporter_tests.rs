// rockgauge/tests/reporter_tests.rs
mod common;

use common::setup_logging;

use parking_lot::Mutex;
use prometheus::Registry;
use rockgauge::properties::OPTIONS_STATISTICS;
use rockgauge::{
  load_properties, MetricsReporter, PropertySource, StorageMetrics, StoreError, StoreResult, TickOutcome,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

const DB: &str = "application";

/// Engine stand-in whose answers can be changed between ticks.
#[derive(Default)]
struct ScriptedEngine {
  state: Mutex<EngineState>,
}

#[derive(Default)]
struct EngineState {
  unavailable: bool,
  block_cache_usage: u64,
  statistics: String,
}

impl ScriptedEngine {
  fn new(statistics: &str) -> Arc<Self> {
    let engine = Self::default();
    engine.set_statistics(statistics);
    engine.state.lock().block_cache_usage = 4096;
    Arc::new(engine)
  }

  fn set_statistics(&self, statistics: &str) {
    self.state.lock().statistics = statistics.to_string();
  }

  fn set_unavailable(&self, unavailable: bool) {
    self.state.lock().unavailable = unavailable;
  }
}

impl PropertySource for ScriptedEngine {
  fn read_property(&self, name: &str) -> StoreResult<Option<String>> {
    let state = self.state.lock();
    if state.unavailable {
      return Ok(None);
    }
    let value = match name {
      OPTIONS_STATISTICS => state.statistics.clone(),
      "rocksdb.block-cache-usage" => state.block_cache_usage.to_string(),
      _ => "7".to_string(),
    };
    Ok(Some(value))
  }
}

fn fresh_metrics() -> Arc<StorageMetrics> {
  Arc::new(StorageMetrics::new(&Registry::new()).expect("register metrics"))
}

const STATS_V1: &str = "\
rocksdb.block.cache.miss COUNT : 5
rocksdb.block.cache.hit COUNT : 11
rocksdb.db.get.micros P50 : 1.000000 P95 : 2.000000 P99 : 3.000000 P100 : 4.000000 COUNT : 10 SUM : 25
";

#[test]
fn test_tick_publishes_properties_and_statistics() {
  setup_logging();
  let engine = ScriptedEngine::new(STATS_V1);
  let metrics = fresh_metrics();
  let reporter = MetricsReporter::new(DB, engine, metrics.clone());

  assert_eq!(reporter.tick(), TickOutcome::Published { malformed_lines: 0 });

  assert_eq!(metrics.value("memory", "block_cache_usage", DB), Some(4096.0));
  assert_eq!(metrics.value("key", "estimate_num_keys", DB), Some(7.0));
  assert_eq!(metrics.value("cache", "block_cache_miss", DB), Some(5.0));
  assert_eq!(metrics.value("cache", "block_cache_hit", DB), Some(11.0));
  assert_eq!(metrics.value("latency", "db_get_micros_p99", DB), Some(3.0));
  assert_eq!(metrics.value("latency", "db_get_micros_count", DB), Some(10.0));
  assert_eq!(metrics.value("latency", "db_get_micros_sum", DB), Some(25.0));
  assert_eq!(metrics.published_samples.with_label_values(&[DB]).get(), 1);

  // Other databases are untouched.
  assert_eq!(metrics.value("cache", "block_cache_miss", "blockstore"), None);
}

#[test]
fn test_failed_tick_is_isolated() {
  setup_logging();
  let engine = ScriptedEngine::new(STATS_V1);
  let metrics = fresh_metrics();
  let reporter = MetricsReporter::new(DB, engine.clone(), metrics.clone());

  assert!(reporter.tick().is_published());

  engine.set_unavailable(true);
  engine.set_statistics("rocksdb.block.cache.miss COUNT : 999\n");
  assert_eq!(reporter.tick(), TickOutcome::PropertiesUnavailable);
  assert_eq!(metrics.value("cache", "block_cache_miss", DB), Some(5.0));
  assert_eq!(metrics.failed_samples.with_label_values(&[DB, "properties"]).get(), 1);

  engine.set_unavailable(false);
  assert!(reporter.tick().is_published());
  assert_eq!(metrics.value("cache", "block_cache_miss", DB), Some(999.0));
  assert_eq!(metrics.published_samples.with_label_values(&[DB]).get(), 2);
}

#[test]
fn test_unparseable_statistics_skip_the_tick() {
  setup_logging();
  let engine = ScriptedEngine::new(STATS_V1);
  let metrics = fresh_metrics();
  let reporter = MetricsReporter::new(DB, engine.clone(), metrics.clone());
  reporter.tick();

  engine.set_statistics("statistics are\nnot what they used to be\n");
  engine.state.lock().block_cache_usage = 1;
  assert_eq!(reporter.tick(), TickOutcome::StatsMalformed);

  // Nothing from the skipped tick is published, properties included.
  assert_eq!(metrics.value("memory", "block_cache_usage", DB), Some(4096.0));
  assert_eq!(metrics.failed_samples.with_label_values(&[DB, "statistics"]).get(), 1);
}

#[test]
fn test_missing_statistic_keeps_last_value() {
  setup_logging();
  let engine = ScriptedEngine::new(STATS_V1);
  let metrics = fresh_metrics();
  let reporter = MetricsReporter::new(DB, engine.clone(), metrics.clone());
  reporter.tick();

  engine.set_statistics("rocksdb.block.cache.hit COUNT : 12\nnonsense line\n");
  assert_eq!(reporter.tick(), TickOutcome::Published { malformed_lines: 1 });

  assert_eq!(metrics.value("cache", "block_cache_hit", DB), Some(12.0));
  assert_eq!(metrics.value("cache", "block_cache_miss", DB), Some(5.0));
  assert_eq!(metrics.value("latency", "db_get_micros_p50", DB), Some(1.0));
  assert_eq!(metrics.malformed_stat_lines.with_label_values(&[DB]).get(), 1);
}

#[test]
fn test_histogram_without_sum_leaves_sum_gauge_alone() {
  setup_logging();
  let engine = ScriptedEngine::new(
    "rocksdb.db.write.micros P50 : 1.000000 P95 : 1.000000 P99 : 1.000000 P100 : 1.000000 COUNT : 3\n",
  );
  let metrics = fresh_metrics();
  let reporter = MetricsReporter::new(DB, engine, metrics.clone());
  reporter.tick();

  assert_eq!(metrics.value("latency", "db_write_micros_count", DB), Some(3.0));
  assert_eq!(metrics.value("latency", "db_write_micros_sum", DB), None);
}

#[test]
fn test_properties_loader_requires_every_property() {
  setup_logging();
  let engine = ScriptedEngine::new(STATS_V1);
  let props = load_properties(engine.as_ref()).unwrap();
  assert_eq!(props.block_cache_usage, 4096);
  assert_eq!(props.live_sst_files_size, 7);
  assert_eq!(props.options_statistics, STATS_V1);

  engine.set_unavailable(true);
  assert!(matches!(
    load_properties(engine.as_ref()),
    Err(StoreError::PropertyUnavailable(_))
  ));
}

#[test]
fn test_metrics_register_once_per_registry() {
  setup_logging();
  let registry = Registry::new();
  let metrics = StorageMetrics::new(&registry).unwrap();
  assert!(metrics.gauge_count() > 0);
  assert!(matches!(StorageMetrics::new(&registry), Err(StoreError::Metrics(_))));

  let global = StorageMetrics::global().unwrap();
  assert!(Arc::ptr_eq(&global, &StorageMetrics::global().unwrap()));
}

#[test]
fn test_spawned_reporter_ticks_until_stopped() {
  setup_logging();
  let engine = ScriptedEngine::new(STATS_V1);
  let metrics = fresh_metrics();
  let handle = MetricsReporter::new(DB, engine, metrics.clone())
    .spawn(Duration::from_millis(20))
    .unwrap();
  assert!(handle.is_running());
  assert_eq!(handle.db_name(), DB);

  let published = || metrics.published_samples.with_label_values(&[DB]).get();
  let deadline = Instant::now() + Duration::from_secs(5);
  while published() < 2 && Instant::now() < deadline {
    std::thread::sleep(Duration::from_millis(10));
  }
  assert!(published() >= 2, "reporter did not tick in time");

  handle.stop();
  let after_stop = published();
  std::thread::sleep(Duration::from_millis(100));
  assert_eq!(published(), after_stop);
}

#[test]
fn test_zero_interval_is_rejected() {
  setup_logging();
  let engine = ScriptedEngine::new(STATS_V1);
  let err = MetricsReporter::new(DB, engine, fresh_metrics())
    .spawn(Duration::ZERO)
    .unwrap_err();
  assert!(err.is_configuration_error());
}
