// rockgauge/src/reporter.rs

//! Periodic harvesting of engine statistics into `StorageMetrics`.
//!
//! Each tick walks `Idle -> Sampling -> Publishing -> Idle`. A failure while sampling
//! (properties unreadable, statistics unparseable) skips that tick only; the next tick of
//! the timer is the retry. One reporter runs per database on its own thread, so a slow
//! engine read delays that database's next tick and nothing else.

use crate::error::{StoreError, StoreResult};
use crate::metrics::StorageMetrics;
use crate::properties::{load_properties, PropertySource};
use crate::stats::parse_stats;

use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Result of a single sampling tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
  Published { malformed_lines: usize },
  PropertiesUnavailable,
  StatsMalformed,
}

impl TickOutcome {
  pub fn is_published(&self) -> bool {
    matches!(self, TickOutcome::Published { .. })
  }
}

pub struct MetricsReporter<P> {
  db_name: String,
  source: Arc<P>,
  metrics: Arc<StorageMetrics>,
}

impl<P: PropertySource> MetricsReporter<P> {
  pub fn new(db_name: &str, source: Arc<P>, metrics: Arc<StorageMetrics>) -> Self {
    Self {
      db_name: db_name.to_string(),
      source,
      metrics,
    }
  }

  pub fn db_name(&self) -> &str {
    &self.db_name
  }

  /// Runs one full sample-and-publish cycle.
  pub fn tick(&self) -> TickOutcome {
    let props = match load_properties(self.source.as_ref()) {
      Ok(props) => props,
      Err(e) => {
        log::warn!("[{}] Skipping metrics tick, properties unavailable: {}", self.db_name, e);
        self.metrics.record_failure(&self.db_name, "properties");
        return TickOutcome::PropertiesUnavailable;
      }
    };

    let stats = match parse_stats(&props.options_statistics) {
      Ok(stats) => stats,
      Err(e) => {
        log::warn!("[{}] Skipping metrics tick: {}", self.db_name, e);
        self.metrics.record_failure(&self.db_name, "statistics");
        return TickOutcome::StatsMalformed;
      }
    };

    if stats.malformed_lines() > 0 {
      log::debug!(
        "[{}] {} statistics lines skipped this tick",
        self.db_name,
        stats.malformed_lines()
      );
    }

    self.metrics.report(&self.db_name, &props, &stats);
    TickOutcome::Published {
      malformed_lines: stats.malformed_lines(),
    }
  }
}

impl<P: PropertySource + Send + Sync + 'static> MetricsReporter<P> {
  /// Starts ticking every `interval` on a dedicated thread.
  ///
  /// The first tick happens one full interval after spawning. Ticks never overlap: the wait
  /// for the next one starts only after the previous publish has finished.
  pub fn spawn(self, interval: Duration) -> StoreResult<ReporterHandle> {
    if interval.is_zero() {
      return Err(StoreError::InvalidConfiguration(
        "metrics report interval must be positive".to_string(),
      ));
    }

    let (stop_tx, stop_rx) = mpsc::channel::<()>();
    let db_name = self.db_name.clone();
    let thread = thread::Builder::new()
      .name(format!("rockgauge-metrics-{}", db_name))
      .spawn(move || {
        log::info!(
          "[{}] Metrics reporter started, interval {:?}",
          self.db_name,
          interval
        );
        loop {
          match stop_rx.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {
              self.tick();
            }
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
          }
        }
        log::info!("[{}] Metrics reporter stopped", self.db_name);
      })?;

    Ok(ReporterHandle {
      db_name,
      stop_tx: Some(stop_tx),
      thread: Some(thread),
    })
  }
}

/// Owner of a running reporter. Stopping (explicitly or on drop) wakes the reporter
/// immediately and waits for its thread to exit.
#[derive(Debug)]
pub struct ReporterHandle {
  db_name: String,
  stop_tx: Option<Sender<()>>,
  thread: Option<JoinHandle<()>>,
}

impl ReporterHandle {
  pub fn db_name(&self) -> &str {
    &self.db_name
  }

  pub fn is_running(&self) -> bool {
    self.thread.as_ref().map_or(false, |t| !t.is_finished())
  }

  pub fn stop(mut self) {
    self.shutdown();
  }

  fn shutdown(&mut self) {
    if let Some(tx) = self.stop_tx.take() {
      let _ = tx.send(());
    }
    if let Some(thread) = self.thread.take() {
      if thread.join().is_err() {
        log::error!("[{}] Metrics reporter thread panicked", self.db_name);
      }
    }
  }
}

impl Drop for ReporterHandle {
  fn drop(&mut self) {
    self.shutdown();
  }
}
