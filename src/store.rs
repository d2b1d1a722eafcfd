// rockgauge/src/store.rs

use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use rocksdb::{BlockBasedOptions, Cache, ColumnFamilyDescriptor, Options as RocksDbOptions, WriteOptions, DB};

use crate::error::{StoreError, StoreResult};
use crate::metrics::StorageMetrics;
use crate::options::{OptionBundle, ReadOptionsConfig, ResolvedDbConfig, MEMTABLE_MEMORY_BUDGET};
use crate::persisted::{load_engine_options, load_latest_options, DEFAULT_COLUMN_FAMILY_NAME};
use crate::reporter::{MetricsReporter, ReporterHandle};
use crate::resolver::{DbScopedOptions, DEFAULT_NAMESPACE};
use crate::source::OptionSource;
use crate::tunable::Tunable;

/// Where and under which name a database is opened.
#[derive(Clone)]
pub struct StorageDbConfig {
  /// Directory holding every database of the node; this one lives in `<data_dir>/<db_name>.db`.
  pub data_dir: PathBuf,
  pub db_name: String,
  /// Configuration namespace, `rocksdb` unless the host application says otherwise.
  pub namespace: String,
  /// Registry handle for the metrics reporter. `None` falls back to `StorageMetrics::global()`.
  pub metrics: Option<Arc<StorageMetrics>>,
}

impl Debug for StorageDbConfig {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("StorageDbConfig")
      .field("data_dir", &self.data_dir)
      .field("db_name", &self.db_name)
      .field("namespace", &self.namespace)
      .field("metrics_is_some", &self.metrics.is_some())
      .finish()
  }
}

impl StorageDbConfig {
  pub fn new(data_dir: impl Into<PathBuf>, db_name: &str) -> Self {
    Self {
      data_dir: data_dir.into(),
      db_name: db_name.to_string(),
      namespace: DEFAULT_NAMESPACE.to_string(),
      metrics: None,
    }
  }

  pub fn db_path(&self) -> PathBuf {
    self.data_dir.join(format!("{}.db", self.db_name))
  }
}

/// A RocksDB database opened with layered configuration, optionally reporting its
/// statistics in the background.
pub struct StorageDb {
  db: Arc<DB>,
  db_name: String,
  path: PathBuf,
  config: ResolvedDbConfig,
  block_cache: Cache,
  reporter: Mutex<Option<ReporterHandle>>,
}

impl Debug for StorageDb {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("StorageDb")
      .field("db_name", &self.db_name)
      .field("path", &self.path)
      .field("db", &"<Arc<rocksdb::DB>>")
      .field("config", &self.config)
      .field("reporting", &self.is_reporting())
      .finish()
  }
}

/// Builds engine-level and column-family options for a database created from scratch.
///
/// `bbto` is installed on both, so both observe one block cache.
pub fn build_engine_options(
  bundle: &OptionBundle,
  bbto: &BlockBasedOptions,
  enable_statistics: bool,
) -> (RocksDbOptions, RocksDbOptions) {
  let mut db_opts = Tunable::new(RocksDbOptions::default());
  db_opts.set_create_if_missing(true);
  db_opts.set_create_missing_column_families(true);
  let cores = num_cpus::get().max(2) as i32;
  db_opts.tune_set_increase_parallelism(cores);
  // Applied after parallelism so an explicit max-background-jobs survives it.
  bundle.db.apply(&mut db_opts);
  db_opts.set_block_based_table_factory(bbto);
  if enable_statistics {
    db_opts.set_enable_statistics();
  }
  log::debug!("DB-level options set: {:?}", db_opts.locked_keys());

  let mut cf_opts = Tunable::new(RocksDbOptions::default());
  cf_opts.tune_set_optimize_level_style_compaction(MEMTABLE_MEMORY_BUDGET as usize);
  let cf_opts = bundle_cf_options(cf_opts, bundle, bbto);

  (db_opts.into_inner(), cf_opts)
}

fn bundle_cf_options(
  mut cf_opts: Tunable<RocksDbOptions>,
  bundle: &OptionBundle,
  bbto: &BlockBasedOptions,
) -> RocksDbOptions {
  bundle.cf.apply(&mut cf_opts);
  cf_opts.set_block_based_table_factory(bbto);
  log::debug!("CF-level options set: {:?}", cf_opts.locked_keys());
  cf_opts.into_inner()
}

fn open_default_cf(db_opts: &RocksDbOptions, path: &Path, cf: ColumnFamilyDescriptor) -> StoreResult<DB> {
  DB::open_cf_descriptors(db_opts, path, vec![cf]).map_err(StoreError::RocksDb)
}

/// Reopens an existing database on the options RocksDB persisted for it, changing only
/// what `resolved` overrides.
fn reopen_engine(
  db_name: &str,
  db_path: &Path,
  resolved: &ResolvedDbConfig,
  bbto: &BlockBasedOptions,
  block_cache: &Cache,
) -> StoreResult<DB> {
  let (loaded_db_opts, loaded_cf) = load_engine_options(db_path, block_cache)?;
  let bundle = &resolved.bundle;

  let mut db_opts = Tunable::new(loaded_db_opts);
  db_opts.set_create_if_missing(true);
  bundle.db.apply_keys(&mut db_opts, &resolved.applied_keys);
  db_opts.set_block_based_table_factory(bbto);
  if resolved.metrics.enabled {
    db_opts.set_enable_statistics();
  }
  log::debug!("[{}] DB-level options set: {:?}", db_name, db_opts.locked_keys());
  let db_opts = db_opts.into_inner();

  let overrides = bundle.cf_overrides(&resolved.applied_keys);
  if !overrides.frozen.is_empty() {
    log::warn!(
      "[{}] {:?} cannot change on an open column family; rebuilding its options, unmodeled persisted values are reset",
      db_name,
      overrides.frozen
    );
    let cf_opts = bundle_cf_options(Tunable::new(RocksDbOptions::default()), bundle, bbto);
    return open_default_cf(&db_opts, db_path, ColumnFamilyDescriptor::new(DEFAULT_COLUMN_FAMILY_NAME, cf_opts));
  }

  let db = open_default_cf(&db_opts, db_path, loaded_cf)?;
  if !overrides.live.is_empty() {
    let pairs = overrides.set_options_pairs();
    log::debug!("[{}] Applying column family overrides {:?}", db_name, pairs);
    db.set_options(&pairs).map_err(|e| {
      StoreError::InvalidConfiguration(format!("cannot apply column family overrides {:?}: {}", pairs, e))
    })?;
  }
  Ok(db)
}

impl StorageDb {
  /// Opens (or creates) the database described by `cfg`.
  ///
  /// Options are resolved in layers: the persisted options of an existing database (or
  /// factory defaults for a new one), then every key explicitly present in `app_opts`,
  /// database-specific keys winning over fallback keys. Configuration errors abort before
  /// anything is created on disk.
  pub fn open<S: OptionSource + ?Sized>(cfg: StorageDbConfig, app_opts: &S) -> StoreResult<Self> {
    let db_path = cfg.db_path();
    log::info!("Opening database '{}' at '{}'", cfg.db_name, db_path.display());

    let loaded = load_latest_options(&db_path)?;
    let fresh = loaded.is_none();
    let scoped = DbScopedOptions::new(app_opts, &cfg.namespace, &cfg.db_name);
    let resolved = ResolvedDbConfig::resolve(loaded.unwrap_or_default(), &scoped)?;
    if !resolved.applied_keys.is_empty() {
      log::info!("[{}] Configured overrides: {:?}", cfg.db_name, resolved.applied_keys);
    }

    let (block_cache, bbto) = resolved.bundle.table.build();
    let db = if fresh {
      let (db_opts, cf_opts) = build_engine_options(&resolved.bundle, &bbto, resolved.metrics.enabled);
      std::fs::create_dir_all(&db_path)?;
      open_default_cf(&db_opts, &db_path, ColumnFamilyDescriptor::new(DEFAULT_COLUMN_FAMILY_NAME, cf_opts))?
    } else {
      reopen_engine(&cfg.db_name, &db_path, &resolved, &bbto, &block_cache)?
    };
    let db = Arc::new(db);

    let reporter = if resolved.metrics.enabled {
      let metrics = match cfg.metrics.clone() {
        Some(metrics) => metrics,
        None => StorageMetrics::global()?,
      };
      let handle = MetricsReporter::new(&cfg.db_name, db.clone(), metrics).spawn(resolved.metrics.report_interval)?;
      Some(handle)
    } else {
      None
    };

    log::info!("Database '{}' opened", cfg.db_name);
    Ok(Self {
      db,
      db_name: cfg.db_name,
      path: db_path,
      config: resolved,
      block_cache,
      reporter: Mutex::new(reporter),
    })
  }

  pub fn name(&self) -> &str {
    &self.db_name
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  /// The configuration the database was opened with.
  pub fn config(&self) -> &ResolvedDbConfig {
    &self.config
  }

  pub fn read_options(&self) -> &ReadOptionsConfig {
    &self.config.bundle.read
  }

  /// Bytes currently held by the shared block cache.
  pub fn block_cache_usage(&self) -> usize {
    self.block_cache.get_usage()
  }

  /// Returns a thread-safe reference (`Arc`) to the underlying `rocksdb::DB` instance.
  pub fn db_raw(&self) -> Arc<DB> {
    self.db.clone()
  }

  pub fn is_reporting(&self) -> bool {
    self.reporter.lock().as_ref().map_or(false, |r| r.is_running())
  }

  pub fn get<K: AsRef<[u8]>>(&self, key: K) -> StoreResult<Option<Vec<u8>>> {
    let ro = self.config.bundle.read.to_read_options();
    self.db.get_opt(key, &ro).map_err(StoreError::RocksDb)
  }

  pub fn set<K: AsRef<[u8]>, V: AsRef<[u8]>>(&self, key: K, value: V) -> StoreResult<()> {
    self
      .db
      .put_opt(key, value, &WriteOptions::default())
      .map_err(StoreError::RocksDb)
  }

  /// Like `set`, but waits for the write-ahead log to be synced.
  pub fn set_sync<K: AsRef<[u8]>, V: AsRef<[u8]>>(&self, key: K, value: V) -> StoreResult<()> {
    let mut wo = WriteOptions::default();
    wo.set_sync(true);
    self.db.put_opt(key, value, &wo).map_err(StoreError::RocksDb)
  }

  pub fn delete<K: AsRef<[u8]>>(&self, key: K) -> StoreResult<()> {
    self
      .db
      .delete_opt(key, &WriteOptions::default())
      .map_err(StoreError::RocksDb)
  }

  /// Stops the metrics reporter, if any. Safe to call more than once.
  pub fn close(&self) {
    if let Some(reporter) = self.reporter.lock().take() {
      reporter.stop();
    }
  }
}

impl Drop for StorageDb {
  fn drop(&mut self) {
    self.close();
  }
}
