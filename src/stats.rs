// rockgauge/src/stats.rs

//! Parser for the statistics dump RocksDB serves through `rocksdb.options-statistics`.
//!
//! The dump is one entry per line:
//!
//! ```text
//! rocksdb.block.cache.miss COUNT : 5
//! rocksdb.db.get.micros P50 : 1.5 P95 : 3.0 P99 : 4.2 P100 : 9.9 COUNT : 100 SUM : 150
//! ```
//!
//! Counters carry a single `COUNT` field; histograms carry `P50 P95 P99 P100 COUNT` in that
//! order, optionally followed by `SUM`. Lines that do not fit either shape are skipped and
//! counted, so a format change in one statistic never hides the others.

use crate::error::{StoreError, StoreResult};

use std::collections::HashMap;
use std::fmt;

/// Five-point latency summary of one engine histogram.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Histogram {
  pub p50: f64,
  pub p95: f64,
  pub p99: f64,
  pub p100: f64,
  pub count: u64,
  /// `None` when the engine omitted the `SUM` field, which is not the same as a zero sum.
  pub sum: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StatEntry {
  Counter(u64),
  Histogram(Histogram),
}

/// Why a single statistics line was rejected.
#[derive(Debug, Clone, PartialEq)]
pub enum LineError {
  MissingName,
  MissingSeparator { label: String },
  MissingValue { label: String },
  BadNumber { label: String, value: String },
  UnexpectedLayout { labels: Vec<String> },
}

impl fmt::Display for LineError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      LineError::MissingName => f.write_str("line has no statistic name"),
      LineError::MissingSeparator { label } => write!(f, "field '{}' is not followed by ':'", label),
      LineError::MissingValue { label } => write!(f, "field '{}' has no value", label),
      LineError::BadNumber { label, value } => write!(f, "field '{}' has non-numeric value '{}'", label, value),
      LineError::UnexpectedLayout { labels } => write!(f, "unexpected field layout {:?}", labels),
    }
  }
}

/// Every statistic parsed from one dump. Lives for one reporting cycle only.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatsSnapshot {
  entries: HashMap<String, StatEntry>,
  malformed_lines: usize,
}

impl StatsSnapshot {
  pub fn get(&self, name: &str) -> Option<&StatEntry> {
    self.entries.get(name)
  }

  pub fn counter(&self, name: &str) -> Option<u64> {
    match self.entries.get(name) {
      Some(StatEntry::Counter(v)) => Some(*v),
      _ => None,
    }
  }

  pub fn histogram(&self, name: &str) -> Option<&Histogram> {
    match self.entries.get(name) {
      Some(StatEntry::Histogram(h)) => Some(h),
      _ => None,
    }
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// Number of non-blank lines that were skipped because they could not be parsed.
  pub fn malformed_lines(&self) -> usize {
    self.malformed_lines
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &StatEntry)> {
    self.entries.iter().map(|(k, v)| (k.as_str(), v))
  }
}

fn parse_number<T: std::str::FromStr>(label: &str, value: &str) -> Result<T, LineError> {
  value.parse::<T>().map_err(|_| LineError::BadNumber {
    label: label.to_string(),
    value: value.to_string(),
  })
}

fn parse_float(label: &str, value: &str) -> Result<f64, LineError> {
  parse_number::<f64>(label, value)
}

/// Parses a single non-blank line into its statistic name and value.
pub fn parse_line(line: &str) -> Result<(String, StatEntry), LineError> {
  let mut tokens = line.split_whitespace();
  let name = tokens.next().ok_or(LineError::MissingName)?;

  let mut fields: Vec<(&str, &str)> = Vec::with_capacity(6);
  while let Some(label) = tokens.next() {
    match tokens.next() {
      Some(":") => {}
      _ => {
        return Err(LineError::MissingSeparator {
          label: label.to_string(),
        })
      }
    }
    let value = tokens.next().ok_or_else(|| LineError::MissingValue {
      label: label.to_string(),
    })?;
    fields.push((label, value));
  }

  let labels: Vec<&str> = fields.iter().map(|(label, _)| *label).collect();
  let entry = match labels.as_slice() {
    ["COUNT"] => StatEntry::Counter(parse_number::<u64>("COUNT", fields[0].1)?),
    ["P50", "P95", "P99", "P100", "COUNT"] | ["P50", "P95", "P99", "P100", "COUNT", "SUM"] => {
      let sum = match fields.get(5) {
        Some((label, value)) => Some(parse_float(label, value)?),
        None => None,
      };
      StatEntry::Histogram(Histogram {
        p50: parse_float("P50", fields[0].1)?,
        p95: parse_float("P95", fields[1].1)?,
        p99: parse_float("P99", fields[2].1)?,
        p100: parse_float("P100", fields[3].1)?,
        count: parse_number::<u64>("COUNT", fields[4].1)?,
        sum,
      })
    }
    _ => {
      return Err(LineError::UnexpectedLayout {
        labels: labels.iter().map(|l| l.to_string()).collect(),
      })
    }
  };

  Ok((name.to_string(), entry))
}

/// Parses a full statistics dump.
///
/// Blank lines are ignored and malformed lines are skipped. The dump as a whole is rejected
/// only when it has content but not a single line could be parsed, which means the format
/// no longer matches at all.
pub fn parse_stats(blob: &str) -> StoreResult<StatsSnapshot> {
  let mut snapshot = StatsSnapshot::default();

  for line in blob.lines().map(str::trim).filter(|l| !l.is_empty()) {
    match parse_line(line) {
      Ok((name, entry)) => {
        snapshot.entries.insert(name, entry);
      }
      Err(e) => {
        log::debug!("Skipping malformed statistics line '{}': {}", line, e);
        snapshot.malformed_lines += 1;
      }
    }
  }

  if snapshot.entries.is_empty() && snapshot.malformed_lines > 0 {
    return Err(StoreError::MalformedStats(format!(
      "none of {} statistics lines could be parsed",
      snapshot.malformed_lines
    )));
  }

  Ok(snapshot)
}
