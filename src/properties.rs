// rockgauge/src/properties.rs

use crate::error::{StoreError, StoreResult};

use rocksdb::DB;

pub const BLOCK_CACHE_CAPACITY: &str = "rocksdb.block-cache-capacity";
pub const BLOCK_CACHE_USAGE: &str = "rocksdb.block-cache-usage";
pub const BLOCK_CACHE_PINNED_USAGE: &str = "rocksdb.block-cache-pinned-usage";
pub const CUR_SIZE_ACTIVE_MEM_TABLE: &str = "rocksdb.cur-size-active-mem-table";
pub const CUR_SIZE_ALL_MEM_TABLES: &str = "rocksdb.cur-size-all-mem-tables";
pub const SIZE_ALL_MEM_TABLES: &str = "rocksdb.size-all-mem-tables";
pub const ESTIMATE_NUM_KEYS: &str = "rocksdb.estimate-num-keys";
pub const ESTIMATE_LIVE_DATA_SIZE: &str = "rocksdb.estimate-live-data-size";
pub const ESTIMATE_TABLE_READERS_MEM: &str = "rocksdb.estimate-table-readers-mem";
pub const LIVE_SST_FILES_SIZE: &str = "rocksdb.live-sst-files-size";
pub const OPTIONS_STATISTICS: &str = "rocksdb.options-statistics";

/// Anything that can answer named introspection property reads.
///
/// Implemented for `rocksdb::DB`; tests substitute scripted sources.
pub trait PropertySource {
  /// Reads one property. `Ok(None)` means the engine does not know the property.
  fn read_property(&self, name: &str) -> StoreResult<Option<String>>;
}

impl PropertySource for DB {
  fn read_property(&self, name: &str) -> StoreResult<Option<String>> {
    self.property_value(name).map_err(StoreError::RocksDb)
  }
}

impl<P: PropertySource + ?Sized> PropertySource for std::sync::Arc<P> {
  fn read_property(&self, name: &str) -> StoreResult<Option<String>> {
    (**self).read_property(name)
  }
}

/// Point-in-time engine figures plus the raw statistics dump, read once per tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
  pub block_cache_capacity: u64,
  pub block_cache_usage: u64,
  pub block_cache_pinned_usage: u64,
  pub cur_size_active_mem_table: u64,
  pub cur_size_all_mem_tables: u64,
  pub size_all_mem_tables: u64,
  pub estimate_num_keys: u64,
  pub estimate_live_data_size: u64,
  pub estimate_table_readers_mem: u64,
  pub live_sst_files_size: u64,
  pub options_statistics: String,
}

/// Reads the fixed property set from an engine. No caching: every call re-reads.
pub struct PropertiesLoader<'a, P: ?Sized> {
  source: &'a P,
}

impl<'a, P: PropertySource + ?Sized> PropertiesLoader<'a, P> {
  pub fn new(source: &'a P) -> Self {
    Self { source }
  }

  pub fn load(&self) -> StoreResult<Properties> {
    Ok(Properties {
      block_cache_capacity: self.uint(BLOCK_CACHE_CAPACITY)?,
      block_cache_usage: self.uint(BLOCK_CACHE_USAGE)?,
      block_cache_pinned_usage: self.uint(BLOCK_CACHE_PINNED_USAGE)?,
      cur_size_active_mem_table: self.uint(CUR_SIZE_ACTIVE_MEM_TABLE)?,
      cur_size_all_mem_tables: self.uint(CUR_SIZE_ALL_MEM_TABLES)?,
      size_all_mem_tables: self.uint(SIZE_ALL_MEM_TABLES)?,
      estimate_num_keys: self.uint(ESTIMATE_NUM_KEYS)?,
      estimate_live_data_size: self.uint(ESTIMATE_LIVE_DATA_SIZE)?,
      estimate_table_readers_mem: self.uint(ESTIMATE_TABLE_READERS_MEM)?,
      live_sst_files_size: self.uint(LIVE_SST_FILES_SIZE)?,
      options_statistics: self.string(OPTIONS_STATISTICS)?,
    })
  }

  fn string(&self, name: &str) -> StoreResult<String> {
    match self.source.read_property(name) {
      Ok(Some(value)) => Ok(value),
      Ok(None) => Err(StoreError::PropertyUnavailable(name.to_string())),
      Err(e) => Err(StoreError::PropertyUnavailable(format!("{}: {}", name, e))),
    }
  }

  fn uint(&self, name: &str) -> StoreResult<u64> {
    let raw = self.string(name)?;
    raw
      .trim()
      .parse::<u64>()
      .map_err(|_| StoreError::PropertyUnavailable(format!("{}: not an unsigned integer: '{}'", name, raw)))
  }
}

/// Shorthand for `PropertiesLoader::new(source).load()`.
pub fn load_properties<P: PropertySource + ?Sized>(source: &P) -> StoreResult<Properties> {
  PropertiesLoader::new(source).load()
}
