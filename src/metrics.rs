// rockgauge/src/metrics.rs

//! Prometheus gauges for engine statistics and properties.
//!
//! All series live under the `storage_stats_v2` namespace and carry a `db_name` label, so
//! every database of the process shares one set of gauge vectors without its samples
//! colliding with another database's.

use crate::error::StoreResult;
use crate::properties::Properties;
use crate::stats::StatsSnapshot;

use once_cell::sync::OnceCell;
use prometheus::core::Collector;
use prometheus::{GaugeVec, IntCounterVec, Opts, Registry};
use std::collections::HashMap;
use std::sync::Arc;

pub const METRICS_NAMESPACE: &str = "storage_stats_v2";
pub const DB_NAME_LABEL: &str = "db_name";
const REASON_LABEL: &str = "reason";

/// Statistic name -> (subsystem, gauge name, help) for counters published as-is.
const COUNTER_METRICS: &[(&str, &str, &str, &str)] = &[
  // Keys
  ("rocksdb.number.keys.written", "key", "number_keys_written", "number of keys written"),
  ("rocksdb.number.keys.read", "key", "number_keys_read", "number of keys read"),
  ("rocksdb.number.keys.updated", "key", "number_keys_updated", "number of keys updated in place"),
  // Files
  ("rocksdb.no.file.opens", "file", "number_file_opens", "number of file opens"),
  ("rocksdb.no.file.errors", "file", "number_file_errors", "number of file errors"),
  // Cache
  ("rocksdb.block.cache.miss", "cache", "block_cache_miss", "block_cache_miss == block_cache_index_miss + block_cache_filter_miss + block_cache_data_miss"),
  ("rocksdb.block.cache.hit", "cache", "block_cache_hit", "block_cache_hit == block_cache_index_hit + block_cache_filter_hit + block_cache_data_hit"),
  ("rocksdb.block.cache.add", "cache", "block_cache_add", "number of blocks added to block cache"),
  ("rocksdb.block.cache.add.failures", "cache", "block_cache_add_failures", "number of failures when adding blocks to block cache"),
  // Detailed cache
  ("rocksdb.block.cache.index.miss", "detailed_cache", "block_cache_index_miss", "index block cache misses"),
  ("rocksdb.block.cache.index.hit", "detailed_cache", "block_cache_index_hit", "index block cache hits"),
  ("rocksdb.block.cache.index.bytes.insert", "detailed_cache", "block_cache_index_bytes_insert", "bytes of index blocks inserted into cache"),
  ("rocksdb.block.cache.filter.miss", "detailed_cache", "block_cache_filter_miss", "filter block cache misses"),
  ("rocksdb.block.cache.filter.hit", "detailed_cache", "block_cache_filter_hit", "filter block cache hits"),
  ("rocksdb.block.cache.filter.bytes.insert", "detailed_cache", "block_cache_filter_bytes_insert", "bytes of filter blocks inserted into cache"),
  ("rocksdb.block.cache.data.miss", "detailed_cache", "block_cache_data_miss", "data block cache misses"),
  ("rocksdb.block.cache.data.hit", "detailed_cache", "block_cache_data_hit", "data block cache hits"),
  ("rocksdb.block.cache.data.bytes.insert", "detailed_cache", "block_cache_data_bytes_insert", "bytes of data blocks inserted into cache"),
  // Write stall
  ("rocksdb.stall.micros", "stall", "stall_micros", "Writer has to wait for compaction or flush to finish."),
  // Bloom filter
  ("rocksdb.bloom.filter.useful", "filter", "bloom_filter_useful", "number of times bloom filter has avoided file reads, i.e., negatives."),
  ("rocksdb.bloom.filter.full.positive", "filter", "bloom_filter_full_positive", "number of times bloom FullFilter has not avoided the reads."),
  ("rocksdb.bloom.filter.full.true.positive", "filter", "bloom_filter_full_true_positive", "number of times bloom FullFilter has not avoided the reads and data actually exist."),
  // LSM tree
  ("rocksdb.last.level.read.bytes", "lsm", "last_level_read_bytes", "bytes read from the last level"),
  ("rocksdb.last.level.read.count", "lsm", "last_level_read_count", "reads served by the last level"),
  ("rocksdb.non.last.level.read.bytes", "lsm", "non_last_level_read_bytes", "bytes read from levels above the last"),
  ("rocksdb.non.last.level.read.count", "lsm", "non_last_level_read_count", "reads served by levels above the last"),
  ("rocksdb.l0.hit", "lsm", "get_hit_l0", "number of Get() queries served by L0"),
  ("rocksdb.l1.hit", "lsm", "get_hit_l1", "number of Get() queries served by L1"),
  ("rocksdb.l2andup.hit", "lsm", "get_hit_l2_and_up", "number of Get() queries served by L2 and up"),
];

/// Statistic name -> (subsystem, gauge name prefix, help) for histograms.
const HISTOGRAM_METRICS: &[(&str, &str, &str, &str)] = &[
  ("rocksdb.db.get.micros", "latency", "db_get_micros", "Get() latency in microseconds"),
  ("rocksdb.db.write.micros", "latency", "db_write_micros", "Write() latency in microseconds"),
  ("rocksdb.db.write.stall", "stall", "db_write_stall", "write stall duration in microseconds"),
];

const HISTOGRAM_FIELDS: &[&str] = &["p50", "p95", "p99", "p100", "count", "sum"];

/// (subsystem, gauge name, help) for gauges fed from engine properties.
const PROPERTY_METRICS: &[(&str, &str, &str)] = &[
  ("key", "estimate_num_keys", "estimated number of total keys in the active and unflushed immutable memtables and storage"),
  ("memory", "block_cache_usage", "memory size for the entries residing in block cache"),
  ("memory", "block_cache_pinned_usage", "returns the memory size for the entries being pinned"),
  ("memory", "block_cache_capacity", "block cache capacity"),
  ("memory", "estimate_table_readers_mem", "estimated memory used for reading SST tables, excluding memory used in block cache (e.g., filter and index blocks)"),
  ("memory", "cur_size_all_mem_tables", "approximate size of active and unflushed immutable memtables (bytes)"),
  ("lsm", "live_sst_files_size", "total size of all SST files of the live version"),
  ("lsm", "estimate_live_data_size", "estimated amount of live data in bytes"),
];

fn gauge_key(subsystem: &str, name: &str) -> String {
  format!("{}_{}", subsystem, name)
}

/// Every gauge published by the metrics reporter, registered once per registry.
#[derive(Clone)]
pub struct StorageMetrics {
  gauges: HashMap<String, GaugeVec>,
  pub failed_samples: IntCounterVec,
  pub malformed_stat_lines: IntCounterVec,
  pub published_samples: IntCounterVec,
}

impl std::fmt::Debug for StorageMetrics {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("StorageMetrics")
      .field("namespace", &METRICS_NAMESPACE)
      .field("gauges", &self.gauges.len())
      .finish()
  }
}

static GLOBAL_METRICS: OnceCell<Arc<StorageMetrics>> = OnceCell::new();

impl StorageMetrics {
  pub fn new(registry: &Registry) -> StoreResult<Self> {
    let mut gauges = HashMap::new();
    let mut register_gauge = |subsystem: &str, name: &str, help: &str| -> StoreResult<()> {
      let opts = Opts::new(name, help)
        .namespace(METRICS_NAMESPACE)
        .subsystem(subsystem);
      let gauge = GaugeVec::new(opts, &[DB_NAME_LABEL])?;
      registry.register(Box::new(gauge.clone()))?;
      gauges.insert(gauge_key(subsystem, name), gauge);
      Ok(())
    };

    for (_, subsystem, name, help) in COUNTER_METRICS {
      register_gauge(subsystem, name, help)?;
    }
    for (_, subsystem, prefix, help) in HISTOGRAM_METRICS {
      for field in HISTOGRAM_FIELDS {
        let name = format!("{}_{}", prefix, field);
        let help = format!("{} ({})", help, field);
        register_gauge(subsystem, &name, &help)?;
      }
    }
    for (subsystem, name, help) in PROPERTY_METRICS {
      register_gauge(subsystem, name, help)?;
    }

    let failed_samples = IntCounterVec::new(
      Opts::new("failed_samples", "sampling ticks skipped because properties or statistics were unusable")
        .namespace(METRICS_NAMESPACE)
        .subsystem("reporter"),
      &[DB_NAME_LABEL, REASON_LABEL],
    )?;
    registry.register(Box::new(failed_samples.clone()))?;

    let malformed_stat_lines = IntCounterVec::new(
      Opts::new("malformed_stat_lines", "statistics lines skipped because they could not be parsed")
        .namespace(METRICS_NAMESPACE)
        .subsystem("reporter"),
      &[DB_NAME_LABEL],
    )?;
    registry.register(Box::new(malformed_stat_lines.clone()))?;

    let published_samples = IntCounterVec::new(
      Opts::new("published_samples", "sampling ticks that were published")
        .namespace(METRICS_NAMESPACE)
        .subsystem("reporter"),
      &[DB_NAME_LABEL],
    )?;
    registry.register(Box::new(published_samples.clone()))?;

    Ok(Self {
      gauges,
      failed_samples,
      malformed_stat_lines,
      published_samples,
    })
  }

  /// Process-wide metrics on the default prometheus registry.
  ///
  /// Registration happens exactly once; concurrent first callers race for it and every
  /// later caller gets the same handle.
  pub fn global() -> StoreResult<Arc<Self>> {
    GLOBAL_METRICS
      .get_or_try_init(|| {
        log::info!("Registering storage metrics on the default prometheus registry");
        StorageMetrics::new(prometheus::default_registry()).map(Arc::new)
      })
      .cloned()
  }

  pub fn gauge(&self, subsystem: &str, name: &str) -> Option<&GaugeVec> {
    self.gauges.get(&gauge_key(subsystem, name))
  }

  /// Current value of one series, if it has ever been set for `db_name`.
  pub fn value(&self, subsystem: &str, name: &str, db_name: &str) -> Option<f64> {
    let families = self.gauge(subsystem, name)?.collect();
    families
      .iter()
      .flat_map(|family| family.get_metric().iter())
      .find(|metric| {
        metric
          .get_label()
          .iter()
          .any(|label| label.get_name() == DB_NAME_LABEL && label.get_value() == db_name)
      })
      .map(|metric| metric.get_gauge().get_value())
  }

  /// Number of registered gauge vectors.
  pub fn gauge_count(&self) -> usize {
    self.gauges.len()
  }

  fn set(&self, subsystem: &str, name: &str, db_name: &str, value: f64) {
    match self.gauges.get(&gauge_key(subsystem, name)) {
      Some(gauge) => gauge.with_label_values(&[db_name]).set(value),
      None => log::warn!("No gauge registered for {}_{}", subsystem, name),
    }
  }

  /// Publishes one sample for `db_name`.
  ///
  /// Only recognised statistics are published. A recognised statistic missing from the
  /// snapshot leaves its gauge at whatever it was last set to.
  pub fn report(&self, db_name: &str, props: &Properties, stats: &StatsSnapshot) {
    self.set("key", "estimate_num_keys", db_name, props.estimate_num_keys as f64);
    self.set("memory", "block_cache_usage", db_name, props.block_cache_usage as f64);
    self.set("memory", "block_cache_pinned_usage", db_name, props.block_cache_pinned_usage as f64);
    self.set("memory", "block_cache_capacity", db_name, props.block_cache_capacity as f64);
    self.set("memory", "estimate_table_readers_mem", db_name, props.estimate_table_readers_mem as f64);
    self.set("memory", "cur_size_all_mem_tables", db_name, props.cur_size_all_mem_tables as f64);
    self.set("lsm", "live_sst_files_size", db_name, props.live_sst_files_size as f64);
    self.set("lsm", "estimate_live_data_size", db_name, props.estimate_live_data_size as f64);

    for (stat, subsystem, name, _) in COUNTER_METRICS {
      if let Some(value) = stats.counter(stat) {
        self.set(subsystem, name, db_name, value as f64);
      }
    }

    for (stat, subsystem, prefix, _) in HISTOGRAM_METRICS {
      let Some(h) = stats.histogram(stat) else {
        continue;
      };
      self.set(subsystem, &format!("{}_p50", prefix), db_name, h.p50);
      self.set(subsystem, &format!("{}_p95", prefix), db_name, h.p95);
      self.set(subsystem, &format!("{}_p99", prefix), db_name, h.p99);
      self.set(subsystem, &format!("{}_p100", prefix), db_name, h.p100);
      self.set(subsystem, &format!("{}_count", prefix), db_name, h.count as f64);
      if let Some(sum) = h.sum {
        self.set(subsystem, &format!("{}_sum", prefix), db_name, sum);
      }
    }

    if stats.malformed_lines() > 0 {
      self
        .malformed_stat_lines
        .with_label_values(&[db_name])
        .inc_by(stats.malformed_lines() as u64);
    }
    self.published_samples.with_label_values(&[db_name]).inc();
  }

  pub(crate) fn record_failure(&self, db_name: &str, reason: &str) {
    self.failed_samples.with_label_values(&[db_name, reason]).inc();
  }
}
