// rockgauge/src/options.rs

//! Typed option bundles and the overlay that applies configured overrides to them.
//!
//! Each bundle field carries its configuration key (what operators write in `app.toml`)
//! and, when the engine persists it, its native key (what RocksDB writes into its
//! `OPTIONS-*` file). Fields are only ever replaced when a key is explicitly present.

use crate::coerce::Coerce;
use crate::error::StoreResult;
use crate::source::{OptionSource, OptionValue};
use crate::tunable::Tunable;

use rocksdb::{BlockBasedOptions, Cache, Options as RocksDbOptions, ReadOptions};
use std::collections::HashMap;
use std::time::Duration;

pub const DEFAULT_BLOCK_CACHE_SIZE: usize = 1 << 30;
pub const DEFAULT_BITS_PER_KEY: f64 = 10.0;
pub const DEFAULT_MAX_OPEN_FILES: i32 = 4096;
pub const DEFAULT_REPORT_METRICS_INTERVAL_SECS: u64 = 15;

/// Memtable budget the column-family defaults are derived from (level-style compaction).
pub const MEMTABLE_MEMORY_BUDGET: u64 = 512 * 1024 * 1024;

/// The native option holding the block based table options of a column family.
pub const TABLE_FACTORY_OPTION: &str = "block_based_table_factory";

// Native column-family and table options RocksDB accepts through SetOptions on an open database.
const MUTABLE_CF_NATIVE_KEYS: &[&str] = &[
  "write_buffer_size",
  "max_write_buffer_number",
  "max_bytes_for_level_base",
  "max_bytes_for_level_multiplier",
  "target_file_size_base",
  "target_file_size_multiplier",
  "level0_file_num_compaction_trigger",
  "level0_slowdown_writes_trigger",
];
const MUTABLE_TABLE_NATIVE_KEYS: &[&str] = &["block_size"];

pub const ENABLE_METRICS_OPT: &str = "enable-metrics";
pub const REPORT_METRICS_INTERVAL_SECS_OPT: &str = "report-metrics-interval-secs";

macro_rules! option_bundle {
  (
    $(#[$meta:meta])*
    pub struct $name:ident {
      $(
        $(#[$fmeta:meta])*
        $field:ident: $ty:ty = $default:expr, key = $key:literal $(, native = $native:literal)?;
      )*
    }
  ) => {
    $(#[$meta])*
    #[derive(Debug, Clone, PartialEq)]
    pub struct $name {
      $(
        $(#[$fmeta])*
        pub $field: $ty,
      )*
    }

    impl Default for $name {
      fn default() -> Self {
        Self {
          $( $field: $default, )*
        }
      }
    }

    impl $name {
      /// Configuration keys understood by this bundle.
      pub const KEYS: &'static [&'static str] = &[$($key),*];

      /// Replaces every field whose key `source` answers and returns the keys that were applied.
      /// Fields whose key is absent are left untouched.
      pub fn overlay<S: OptionSource + ?Sized>(&mut self, source: &S) -> StoreResult<Vec<&'static str>> {
        let mut applied = Vec::new();
        $(
          if let Some(raw) = source.get($key) {
            self.$field = <$ty as Coerce>::coerce($key, &raw)?;
            applied.push($key);
          }
        )*
        Ok(applied)
      }

      /// Seeds fields from one section of a persisted engine `OPTIONS` file.
      #[allow(dead_code, unused_variables)]
      pub(crate) fn load_native(&mut self, section: &HashMap<String, String>) -> StoreResult<()> {
        $($(
          if let Some(raw) = section.get($native) {
            self.$field = <$ty as Coerce>::coerce($native, &OptionValue::Str(raw.clone()))?;
          }
        )?)*
        Ok(())
      }

      /// `(key, native key, engine value)` for every field in `keys` that the engine persists.
      #[allow(dead_code, unused_mut, unused_variables)]
      pub(crate) fn native_overrides(&self, keys: &[&str]) -> Vec<(&'static str, &'static str, String)> {
        let mut out = Vec::new();
        $($(
          if keys.contains(&$key) {
            out.push(($key, $native, self.$field.to_string()));
          }
        )?)*
        out
      }
    }
  };
}

option_bundle! {
  /// Engine-wide (DB-level) options.
  pub struct DbOptions {
    max_open_files: i32 = DEFAULT_MAX_OPEN_FILES, key = "max-open-files", native = "max_open_files";
    max_file_opening_threads: i32 = 16, key = "max-file-opening-threads", native = "max_file_opening_threads";
    table_cache_numshardbits: i32 = 6, key = "table-cache-numshardbits", native = "table_cache_numshardbits";
    allow_mmap_writes: bool = false, key = "allow-mmap-writes", native = "allow_mmap_writes";
    allow_mmap_reads: bool = false, key = "allow-mmap-reads", native = "allow_mmap_reads";
    use_fsync: bool = false, key = "use-fsync", native = "use_fsync";
    use_adaptive_mutex: bool = false, key = "use-adaptive-mutex", native = "use_adaptive_mutex";
    bytes_per_sync: u64 = 0, key = "bytes-per-sync", native = "bytes_per_sync";
    max_background_jobs: i32 = num_cpus::get().max(2) as i32, key = "max-background-jobs", native = "max_background_jobs";
  }
}

option_bundle! {
  /// Options of the single `default` column family.
  pub struct CfOptions {
    write_buffer_size: usize = (MEMTABLE_MEMORY_BUDGET / 4) as usize, key = "write-buffer-size", native = "write_buffer_size";
    num_levels: i32 = 7, key = "num-levels", native = "num_levels";
    max_write_buffer_number: i32 = 6, key = "max-write-buffer-number", native = "max_write_buffer_number";
    min_write_buffer_number_to_merge: i32 = 2, key = "min-write-buffer-number-to-merge", native = "min_write_buffer_number_to_merge";
    max_bytes_for_level_base: u64 = MEMTABLE_MEMORY_BUDGET, key = "max-bytes-for-level-base", native = "max_bytes_for_level_base";
    max_bytes_for_level_multiplier: f64 = 10.0, key = "max-bytes-for-level-multiplier", native = "max_bytes_for_level_multiplier";
    target_file_size_base: u64 = MEMTABLE_MEMORY_BUDGET / 8, key = "target-file-size-base", native = "target_file_size_base";
    target_file_size_multiplier: i32 = 1, key = "target-file-size-multiplier", native = "target_file_size_multiplier";
    level0_file_num_compaction_trigger: i32 = 2, key = "level0-file-num-compaction-trigger", native = "level0_file_num_compaction_trigger";
    level0_slowdown_writes_trigger: i32 = 20, key = "level0-slowdown-writes-trigger", native = "level0_slowdown_writes_trigger";
  }
}

option_bundle! {
  /// Block based table options. The block cache and bloom filter are built fresh from
  /// `block_cache_size` and `bits_per_key` every time the engine is opened.
  pub struct TableOptions {
    block_cache_size: usize = DEFAULT_BLOCK_CACHE_SIZE, key = "block-cache-size";
    bits_per_key: f64 = DEFAULT_BITS_PER_KEY, key = "bits-per-key";
    block_size: usize = 4096, key = "block-size", native = "block_size";
    cache_index_and_filter_blocks: bool = false, key = "cache-index-and-filter-blocks", native = "cache_index_and_filter_blocks";
    pin_l0_filter_and_index_blocks_in_cache: bool = false, key = "pin-l0-filter-and-index-blocks-in-cache", native = "pin_l0_filter_and_index_blocks_in_cache";
    format_version: i32 = 5, key = "format-version", native = "format_version";
  }
}

option_bundle! {
  /// Options applied to every read issued through the database handle.
  pub struct ReadOptionsConfig {
    async_io: bool = false, key = "read-async-io";
  }
}

impl DbOptions {
  pub fn apply(&self, opts: &mut Tunable<RocksDbOptions>) {
    self.apply_where(opts, |_| true);
  }

  /// Writes only the fields whose configuration key is in `keys`, leaving every other
  /// value of `opts` as loaded.
  pub fn apply_keys(&self, opts: &mut Tunable<RocksDbOptions>, keys: &[&str]) {
    self.apply_where(opts, |key| keys.contains(&key));
  }

  fn apply_where(&self, opts: &mut Tunable<RocksDbOptions>, wanted: impl Fn(&str) -> bool) {
    if wanted("max-open-files") {
      opts.set_max_open_files(self.max_open_files);
    }
    if wanted("max-file-opening-threads") {
      opts.set_max_file_opening_threads(self.max_file_opening_threads);
    }
    if wanted("table-cache-numshardbits") {
      opts.set_table_cache_num_shard_bits(self.table_cache_numshardbits);
    }
    if wanted("allow-mmap-writes") {
      opts.set_allow_mmap_writes(self.allow_mmap_writes);
    }
    if wanted("allow-mmap-reads") {
      opts.set_allow_mmap_reads(self.allow_mmap_reads);
    }
    if wanted("use-fsync") {
      opts.set_use_fsync(self.use_fsync);
    }
    if wanted("use-adaptive-mutex") {
      opts.set_use_adaptive_mutex(self.use_adaptive_mutex);
    }
    if wanted("bytes-per-sync") {
      opts.set_bytes_per_sync(self.bytes_per_sync);
    }
    if wanted("max-background-jobs") {
      opts.set_max_background_jobs(self.max_background_jobs);
    }
  }
}

impl CfOptions {
  pub fn apply(&self, opts: &mut Tunable<RocksDbOptions>) {
    opts
      .set_write_buffer_size(self.write_buffer_size)
      .set_num_levels(self.num_levels)
      .set_max_write_buffer_number(self.max_write_buffer_number)
      .set_min_write_buffer_number_to_merge(self.min_write_buffer_number_to_merge)
      .set_max_bytes_for_level_base(self.max_bytes_for_level_base)
      .set_max_bytes_for_level_multiplier(self.max_bytes_for_level_multiplier)
      .set_target_file_size_base(self.target_file_size_base)
      .set_target_file_size_multiplier(self.target_file_size_multiplier)
      .set_level0_file_num_compaction_trigger(self.level0_file_num_compaction_trigger)
      .set_level0_slowdown_writes_trigger(self.level0_slowdown_writes_trigger);
  }
}

impl TableOptions {
  /// Builds a new LRU block cache and the table factory options that reference it.
  ///
  /// The same `BlockBasedOptions` must be installed on both the DB-level and the column
  /// family options so that both observe this one cache instance.
  pub fn build(&self) -> (Cache, BlockBasedOptions) {
    let cache = Cache::new_lru_cache(self.block_cache_size);
    let mut bbto = BlockBasedOptions::default();
    bbto.set_block_cache(&cache);
    bbto.set_bloom_filter(self.bits_per_key, false);
    bbto.set_block_size(self.block_size);
    bbto.set_cache_index_and_filter_blocks(self.cache_index_and_filter_blocks);
    bbto.set_pin_l0_filter_and_index_blocks_in_cache(self.pin_l0_filter_and_index_blocks_in_cache);
    bbto.set_format_version(self.format_version);
    (cache, bbto)
  }
}

impl ReadOptionsConfig {
  pub fn to_read_options(&self) -> ReadOptions {
    let mut ro = ReadOptions::default();
    ro.set_async_io(self.async_io);
    ro
  }
}

/// The complete set of engine tuning values for one database.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OptionBundle {
  pub db: DbOptions,
  pub cf: CfOptions,
  pub table: TableOptions,
  pub read: ReadOptionsConfig,
}

impl OptionBundle {
  /// Applies every override present in `source`, bundle by bundle. Returns the applied keys.
  ///
  /// On error the bundle may be partially updated; callers resolve into an owned copy and
  /// discard it on failure.
  pub fn overlay<S: OptionSource + ?Sized>(&mut self, source: &S) -> StoreResult<Vec<&'static str>> {
    let mut applied = self.db.overlay(source)?;
    applied.extend(self.cf.overlay(source)?);
    applied.extend(self.table.overlay(source)?);
    applied.extend(self.read.overlay(source)?);
    Ok(applied)
  }

  /// Sorts the column-family and table keys among `applied` by whether RocksDB can change
  /// them on an open column family. Table options that can are folded into a single
  /// `block_based_table_factory` pair. The block cache size never appears here: the cache
  /// is handed to the engine when the persisted options are loaded.
  pub fn cf_overrides(&self, applied: &[&str]) -> CfOverrides {
    let mut overrides = CfOverrides::default();
    for (key, native, value) in self.cf.native_overrides(applied) {
      if MUTABLE_CF_NATIVE_KEYS.contains(&native) {
        overrides.live.push((native, value));
      } else {
        overrides.frozen.push(key);
      }
    }

    let mut table = String::new();
    for (key, native, value) in self.table.native_overrides(applied) {
      if MUTABLE_TABLE_NATIVE_KEYS.contains(&native) {
        table.push_str(&format!("{}={};", native, value));
      } else {
        overrides.frozen.push(key);
      }
    }
    // The filter policy is fixed once a column family is open.
    if applied.contains(&"bits-per-key") {
      overrides.frozen.push("bits-per-key");
    }
    if !table.is_empty() {
      overrides.live.push((TABLE_FACTORY_OPTION, format!("{{{}}}", table)));
    }
    overrides
  }
}

/// Column-family overrides for a database reopened on its persisted options.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CfOverrides {
  /// `(native key, value)` pairs the engine accepts on the open column family.
  pub live: Vec<(&'static str, String)>,
  /// Configuration keys that only take effect when the column family options are rebuilt.
  pub frozen: Vec<&'static str>,
}

impl CfOverrides {
  pub fn is_empty(&self) -> bool {
    self.live.is_empty() && self.frozen.is_empty()
  }

  /// Pairs in the shape `rocksdb::DB::set_options` takes.
  pub fn set_options_pairs(&self) -> Vec<(&str, &str)> {
    self.live.iter().map(|(k, v)| (*k, v.as_str())).collect()
  }
}

/// Whether and how often statistics are harvested for one database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSettings {
  pub enabled: bool,
  pub report_interval: Duration,
}

impl Default for MetricsSettings {
  fn default() -> Self {
    Self {
      enabled: false,
      report_interval: Duration::from_secs(DEFAULT_REPORT_METRICS_INTERVAL_SECS),
    }
  }
}

impl MetricsSettings {
  pub fn resolve<S: OptionSource + ?Sized>(source: &S) -> StoreResult<Self> {
    let mut settings = Self::default();
    if let Some(raw) = source.get(ENABLE_METRICS_OPT) {
      settings.enabled = bool::coerce(ENABLE_METRICS_OPT, &raw)?;
    }
    if let Some(raw) = source.get(REPORT_METRICS_INTERVAL_SECS_OPT) {
      let secs = u64::coerce(REPORT_METRICS_INTERVAL_SECS_OPT, &raw)?;
      if secs > 0 {
        settings.report_interval = Duration::from_secs(secs);
      }
    }
    Ok(settings)
  }
}

/// Fully resolved configuration for one database, validated before the engine is touched.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedDbConfig {
  pub bundle: OptionBundle,
  pub metrics: MetricsSettings,
  /// Configuration keys that overrode a loaded or default value.
  pub applied_keys: Vec<&'static str>,
}

impl ResolvedDbConfig {
  /// Overlays `source` onto `loaded`. Any non-coercible value aborts resolution as a whole.
  pub fn resolve<S: OptionSource + ?Sized>(loaded: OptionBundle, source: &S) -> StoreResult<Self> {
    let mut bundle = loaded;
    let applied_keys = bundle.overlay(source)?;
    let metrics = MetricsSettings::resolve(source)?;
    Ok(Self {
      bundle,
      metrics,
      applied_keys,
    })
  }
}
