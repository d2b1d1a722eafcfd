// rockgauge/src/resolver.rs

use crate::source::{OptionSource, OptionValue};

/// Default configuration namespace for storage-engine options.
pub const DEFAULT_NAMESPACE: &str = "rocksdb";

/// Database-scoped view over an `OptionSource`.
///
/// Every lookup first tries `<namespace>.<db_name>.<key>` and only falls back to
/// `<namespace>.<key>` when the database-specific key is absent. Values are never
/// merged: whichever key answers first supplies the whole value.
#[derive(Debug, Clone)]
pub struct DbScopedOptions<S> {
  source: S,
  namespace: String,
  db_name: String,
}

impl<S: OptionSource> DbScopedOptions<S> {
  pub fn new(source: S, namespace: &str, db_name: &str) -> Self {
    Self {
      source,
      namespace: namespace.to_string(),
      db_name: db_name.to_string(),
    }
  }

  pub fn db_name(&self) -> &str {
    &self.db_name
  }

  pub fn namespace(&self) -> &str {
    &self.namespace
  }

  pub fn db_specific_key(&self, key: &str) -> String {
    format!("{}.{}.{}", self.namespace, self.db_name, key)
  }

  pub fn fallback_key(&self, key: &str) -> String {
    format!("{}.{}", self.namespace, key)
  }

  /// Resolves `key`, database-specific first.
  pub fn resolve(&self, key: &str) -> Option<OptionValue> {
    let db_specific_key = self.db_specific_key(key);
    if let Some(value) = self.source.get(&db_specific_key) {
      log::trace!("option '{}' resolved from '{}'", key, db_specific_key);
      return Some(value);
    }

    let fallback_key = self.fallback_key(key);
    let value = self.source.get(&fallback_key);
    if value.is_some() {
      log::trace!("option '{}' resolved from '{}'", key, fallback_key);
    }
    value
  }
}

impl<S: OptionSource> OptionSource for DbScopedOptions<S> {
  fn get(&self, key: &str) -> Option<OptionValue> {
    self.resolve(key)
  }
}

/// Convenience wrapper for a one-off lookup.
pub fn resolve<S: OptionSource + ?Sized>(
  source: &S,
  namespace: &str,
  db_name: &str,
  key: &str,
) -> Option<OptionValue> {
  DbScopedOptions::new(source, namespace, db_name).resolve(key)
}
