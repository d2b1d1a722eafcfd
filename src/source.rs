// rockgauge/src/source.rs

//! Raw option sources.
//!
//! An `OptionSource` is the host application's view of its configuration: a flat
//! `key -> value` lookup with no knowledge of the types a value will be coerced into.

use crate::error::{StoreError, StoreResult};

use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;

/// An untyped scalar as provided by a configuration source.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
  Bool(bool),
  Int(i64),
  UInt(u64),
  Float(f64),
  Str(String),
}

impl fmt::Display for OptionValue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      OptionValue::Bool(b) => write!(f, "{}", b),
      OptionValue::Int(i) => write!(f, "{}", i),
      OptionValue::UInt(u) => write!(f, "{}", u),
      OptionValue::Float(x) => write!(f, "{}", x),
      OptionValue::Str(s) => f.write_str(s),
    }
  }
}

impl From<bool> for OptionValue {
  fn from(v: bool) -> Self {
    OptionValue::Bool(v)
  }
}

impl From<i32> for OptionValue {
  fn from(v: i32) -> Self {
    OptionValue::Int(v as i64)
  }
}

impl From<i64> for OptionValue {
  fn from(v: i64) -> Self {
    OptionValue::Int(v)
  }
}

impl From<u64> for OptionValue {
  fn from(v: u64) -> Self {
    OptionValue::UInt(v)
  }
}

impl From<f64> for OptionValue {
  fn from(v: f64) -> Self {
    OptionValue::Float(v)
  }
}

impl From<&str> for OptionValue {
  fn from(v: &str) -> Self {
    OptionValue::Str(v.to_string())
  }
}

impl From<String> for OptionValue {
  fn from(v: String) -> Self {
    OptionValue::Str(v)
  }
}

/// Read-only key/value capability over the host application's configuration.
///
/// Absence (`None`) is a valid answer and means "keep whatever value is already in place".
pub trait OptionSource {
  fn get(&self, key: &str) -> Option<OptionValue>;
}

impl<S: OptionSource + ?Sized> OptionSource for &S {
  fn get(&self, key: &str) -> Option<OptionValue> {
    (**self).get(key)
  }
}

impl OptionSource for HashMap<String, OptionValue> {
  fn get(&self, key: &str) -> Option<OptionValue> {
    HashMap::get(self, key).cloned()
  }
}

/// Option source backed by a TOML document (typically the node's `app.toml`).
///
/// `rocksdb.application.max-open-files` resolves by walking the nested tables
/// `[rocksdb.application]` -> `max-open-files`. A quoted dotted key at the document
/// root (`"rocksdb.max-open-files" = 10`) is honoured as well.
#[derive(Debug, Clone, Default)]
pub struct TomlOptionSource {
  root: toml::Table,
}

impl TomlOptionSource {
  pub fn load<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
    let content = fs::read_to_string(path.as_ref())?;
    Self::parse(&content).map_err(|e| match e {
      StoreError::InvalidConfiguration(msg) => {
        StoreError::InvalidConfiguration(format!("{}: {}", path.as_ref().display(), msg))
      }
      other => other,
    })
  }

  pub fn parse(content: &str) -> StoreResult<Self> {
    let root: toml::Table =
      toml::from_str(content).map_err(|e| StoreError::InvalidConfiguration(e.to_string()))?;
    Ok(Self { root })
  }

  fn lookup(&self, key: &str) -> Option<&toml::Value> {
    if let Some(v) = self.root.get(key) {
      return Some(v);
    }

    let mut segments = key.split('.').peekable();
    let mut table = &self.root;
    while let Some(segment) = segments.next() {
      let value = table.get(segment)?;
      if segments.peek().is_none() {
        return Some(value);
      }
      table = value.as_table()?;
    }
    None
  }
}

impl OptionSource for TomlOptionSource {
  fn get(&self, key: &str) -> Option<OptionValue> {
    let value = self.lookup(key)?;
    match value.clone().try_into::<OptionValue>() {
      Ok(v) => Some(v),
      // Arrays and tables are handed through as text so coercion reports them.
      Err(_) => Some(OptionValue::Str(value.to_string())),
    }
  }
}
