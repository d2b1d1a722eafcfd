use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
  #[error("RocksDB operation failed: {0}")]
  RocksDb(#[from] rocksdb::Error),

  #[error("Underlying IO error: {0}")]
  Io(#[from] std::io::Error),

  #[error("Invalid configuration: {0}")]
  InvalidConfiguration(String),

  #[error("unexpected rocksdb configuration, rocksdb should have only one column family named default")]
  UnexpectedConfiguration,

  #[error("Option '{key}' expects {expected}, got '{value}'")]
  Coercion {
    key: String,
    expected: &'static str,
    value: String,
  },

  #[error("Malformed statistics dump: {0}")]
  MalformedStats(String),

  #[error("Property '{0}' is unavailable")]
  PropertyUnavailable(String),

  #[error("Metrics registration failed: {0}")]
  Metrics(#[from] prometheus::Error),
}

impl StoreError {
  /// True for errors that only invalidate a single sampling tick.
  pub fn is_sampling_error(&self) -> bool {
    matches!(self, Self::MalformedStats(_) | Self::PropertyUnavailable(_))
  }

  /// True for errors raised while resolving configuration, before the engine is touched.
  pub fn is_configuration_error(&self) -> bool {
    matches!(
      self,
      Self::InvalidConfiguration(_) | Self::UnexpectedConfiguration | Self::Coercion { .. }
    )
  }
}

// Helper type alias
pub type StoreResult<T> = Result<T, StoreError>;
