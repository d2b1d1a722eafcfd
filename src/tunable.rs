use rocksdb::{BlockBasedOptions, Options};
use std::collections::HashSet;

/// Performs conditional tuning on `rocksdb::Options`.
///
/// `set_*` writes a value and locks its key; `tune_set_*` writes only while the key is
/// still unlocked. Explicitly configured values are applied with `set_*`, factory
/// adjustments with `tune_set_*`, so the latter can never clobber the former.
#[derive(Debug)]
pub struct Tunable<T> {
  pub inner: T,
  locked: HashSet<&'static str>,
}

impl<T> Tunable<T> {
  pub fn new(inner: T) -> Self {
    Tunable {
      inner,
      locked: HashSet::new(),
    }
  }

  pub fn into_inner(self) -> T {
    self.inner
  }

  pub fn is_locked(&self, key: &'static str) -> bool {
    self.locked.contains(key)
  }

  /// Keys written through a locking setter, sorted for stable logging.
  pub fn locked_keys(&self) -> Vec<&'static str> {
    let mut keys: Vec<_> = self.locked.iter().copied().collect();
    keys.sort_unstable();
    keys
  }

  fn lock(&mut self, key: &'static str) {
    self.locked.insert(key);
  }
}

/// Macro to generate `set_...` (locking) and `tune_...` (conditional)
/// methods for `Tunable<rocksdb::Options>`.
#[macro_export]
macro_rules! tunable_methods {
    (
        $ty:ty;
        $(
            $(#[$outer:meta])*
            fn $set_fn:ident(&mut self, $($arg_name:ident: $arg_ty:ty),*) => $inner_fn:ident {
                key: $key_str:expr
            }
        ),* $(,)?
    ) => {
        impl $crate::tunable::Tunable<$ty> {
            $(
                // locking setter
                $(#[$outer])*
                pub fn $set_fn(&mut self, $($arg_name: $arg_ty),*) -> &mut Self {
                    self.inner.$inner_fn($($arg_name),*);
                    self.lock($key_str);
                    self
                }

                // conditional tuner
                $(#[$outer])*
                paste::paste! {
                    pub fn [<tune_$set_fn>](&mut self, $($arg_name: $arg_ty),*) -> &mut Self {
                        if !self.is_locked($key_str) {
                            self.inner.$inner_fn($($arg_name),*);
                        }
                        self
                    }
                }
            )*
        }
    };
}

tunable_methods! {
    Options;

    // --- DB-Level ---
    fn set_create_if_missing(&mut self, val: bool) => create_if_missing {
        key: "db_create_if_missing"
    },
    fn set_create_missing_column_families(&mut self, val: bool) => create_missing_column_families {
        key: "db_create_missing_column_families"
    },
    fn set_increase_parallelism(&mut self, total_threads: i32) => increase_parallelism {
        key: "db_increase_parallelism"
    },
    fn set_max_open_files(&mut self, nfiles: i32) => set_max_open_files {
        key: "db_max_open_files"
    },
    fn set_max_file_opening_threads(&mut self, nthreads: i32) => set_max_file_opening_threads {
        key: "db_max_file_opening_threads"
    },
    fn set_table_cache_num_shard_bits(&mut self, nbits: i32) => set_table_cache_num_shard_bits {
        key: "db_table_cache_numshardbits"
    },
    fn set_allow_mmap_writes(&mut self, allow: bool) => set_allow_mmap_writes {
        key: "db_allow_mmap_writes"
    },
    fn set_allow_mmap_reads(&mut self, allow: bool) => set_allow_mmap_reads {
        key: "db_allow_mmap_reads"
    },
    fn set_use_fsync(&mut self, useit: bool) => set_use_fsync {
        key: "db_use_fsync"
    },
    fn set_use_adaptive_mutex(&mut self, enabled: bool) => set_use_adaptive_mutex {
        key: "db_use_adaptive_mutex"
    },
    fn set_bytes_per_sync(&mut self, nbytes: u64) => set_bytes_per_sync {
        key: "db_bytes_per_sync"
    },
    fn set_max_background_jobs(&mut self, jobs: i32) => set_max_background_jobs {
        key: "db_max_background_jobs"
    },

    // --- CF-Level ---
    fn set_write_buffer_size(&mut self, size: usize) => set_write_buffer_size {
        key: "cf_write_buffer_size"
    },
    fn set_num_levels(&mut self, nlevels: i32) => set_num_levels {
        key: "cf_num_levels"
    },
    fn set_max_write_buffer_number(&mut self, num: i32) => set_max_write_buffer_number {
        key: "cf_max_write_buffer_number"
    },
    fn set_min_write_buffer_number_to_merge(&mut self, num: i32) => set_min_write_buffer_number_to_merge {
        key: "cf_min_write_buffer_number_to_merge"
    },
    fn set_max_bytes_for_level_base(&mut self, size: u64) => set_max_bytes_for_level_base {
        key: "cf_max_bytes_for_level_base"
    },
    fn set_max_bytes_for_level_multiplier(&mut self, mul: f64) => set_max_bytes_for_level_multiplier {
        key: "cf_max_bytes_for_level_multiplier"
    },
    fn set_target_file_size_base(&mut self, size: u64) => set_target_file_size_base {
        key: "cf_target_file_size_base"
    },
    fn set_target_file_size_multiplier(&mut self, multiplier: i32) => set_target_file_size_multiplier {
        key: "cf_target_file_size_multiplier"
    },
    fn set_level0_file_num_compaction_trigger(&mut self, trigger: i32) => set_level_zero_file_num_compaction_trigger {
        key: "cf_level0_file_num_compaction_trigger"
    },
    fn set_level0_slowdown_writes_trigger(&mut self, trigger: i32) => set_level_zero_slowdown_writes_trigger {
        key: "cf_level0_slowdown_writes_trigger"
    },
    fn set_optimize_level_style_compaction(&mut self, memtable_memory_budget: usize) => optimize_level_style_compaction {
        key: "cf_optimize_level_style_compaction"
    },
}

impl Tunable<Options> {
  /// Installs the block based table factory, which carries the block cache and filter policy.
  pub fn set_block_based_table_factory(&mut self, factory_opts: &BlockBasedOptions) -> &mut Self {
    self.inner.set_block_based_table_factory(factory_opts);
    self.lock("cf_block_based_table_factory");
    self
  }

  pub fn tune_set_block_based_table_factory(&mut self, factory_opts: &BlockBasedOptions) -> &mut Self {
    if !self.is_locked("cf_block_based_table_factory") {
      self.inner.set_block_based_table_factory(factory_opts);
    }
    self
  }

  /// Statistics collection has no off switch once enabled, so this only ever turns it on.
  pub fn set_enable_statistics(&mut self) -> &mut Self {
    self.inner.enable_statistics();
    self.lock("db_enable_statistics");
    self
  }
}
