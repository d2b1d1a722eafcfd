//! Per-database RocksDB option resolution and statistics telemetry.
//!
//! A node opens several RocksDB databases side by side (`application`, `blockstore`, ...).
//! This crate opens each of them with a layered configuration (persisted engine options,
//! then database-specific overrides, then namespace-wide overrides) and, when enabled,
//! harvests the engine's statistics and properties into Prometheus gauges labelled by
//! database name.

pub mod coerce;
pub mod error;
pub mod metrics;
pub mod options;
pub mod persisted;
pub mod properties;
pub mod reporter;
pub mod resolver;
pub mod source;
pub mod stats;
pub mod store;
pub mod tunable;

// --- Re-exports ---
pub use error::{StoreError, StoreResult};
pub use metrics::{StorageMetrics, DB_NAME_LABEL, METRICS_NAMESPACE};
pub use options::{
  CfOptions, CfOverrides, DbOptions, MetricsSettings, OptionBundle, ReadOptionsConfig, ResolvedDbConfig, TableOptions,
};
pub use persisted::{load_engine_options, load_latest_options, OptionsFile};
pub use properties::{load_properties, Properties, PropertySource};
pub use reporter::{MetricsReporter, ReporterHandle, TickOutcome};
pub use resolver::{DbScopedOptions, DEFAULT_NAMESPACE};
pub use source::{OptionSource, OptionValue, TomlOptionSource};
pub use stats::{parse_stats, Histogram, StatEntry, StatsSnapshot};
pub use store::{StorageDb, StorageDbConfig};
pub use tunable::Tunable;
