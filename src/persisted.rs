// rockgauge/src/persisted.rs

//! Reading the option set RocksDB persisted for an existing database.
//!
//! RocksDB writes an `OPTIONS-<n>` file into the database directory on every open. The
//! newest one describes the configuration the database was last opened with. It is read
//! twice: as a typed option bundle that configured overrides are layered onto, and through
//! the engine's own loader so that options the bundle does not model (compression, for
//! one) survive a reopen.

use crate::error::{StoreError, StoreResult};
use crate::options::OptionBundle;

use rocksdb::{Cache, ColumnFamilyDescriptor, Env, Options as RocksDbOptions};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_COLUMN_FAMILY_NAME: &str = rocksdb::DEFAULT_COLUMN_FAMILY_NAME;

const OPTIONS_FILE_PREFIX: &str = "OPTIONS-";
const DB_OPTIONS_SECTION: &str = "DBOptions";
const CF_OPTIONS_SECTION: &str = "CFOptions";
const TABLE_OPTIONS_SECTION: &str = "TableOptions/BlockBasedTable";
const FILTER_POLICY_KEY: &str = "filter_policy";

/// One `[Kind "name"]` block of an options file.
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
  pub kind: String,
  pub name: Option<String>,
  pub entries: HashMap<String, String>,
}

/// Parsed contents of an engine `OPTIONS-*` file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OptionsFile {
  sections: Vec<Section>,
}

impl OptionsFile {
  pub fn load(path: &Path) -> StoreResult<Self> {
    let content = fs::read_to_string(path)?;
    Self::parse(&content).map_err(|e| match e {
      StoreError::InvalidConfiguration(msg) => {
        StoreError::InvalidConfiguration(format!("{}: {}", path.display(), msg))
      }
      other => other,
    })
  }

  pub fn parse(content: &str) -> StoreResult<Self> {
    let mut sections: Vec<Section> = Vec::new();

    for (idx, raw_line) in content.lines().enumerate() {
      let line = raw_line.trim();
      if line.is_empty() || line.starts_with('#') {
        continue;
      }

      if let Some(header) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
        let header = header.trim();
        let (kind, name) = match header.split_once(char::is_whitespace) {
          Some((kind, rest)) => (kind, Some(rest.trim().trim_matches('"').to_string())),
          None => (header, None),
        };
        sections.push(Section {
          kind: kind.to_string(),
          name,
          entries: HashMap::new(),
        });
        continue;
      }

      let (key, value) = line.split_once('=').ok_or_else(|| {
        StoreError::InvalidConfiguration(format!("line {}: expected 'key=value', got '{}'", idx + 1, line))
      })?;
      let section = sections.last_mut().ok_or_else(|| {
        StoreError::InvalidConfiguration(format!("line {}: option '{}' outside of any section", idx + 1, key.trim()))
      })?;
      section.entries.insert(key.trim().to_string(), value.trim().to_string());
    }

    Ok(Self { sections })
  }

  pub fn section(&self, kind: &str, name: Option<&str>) -> Option<&Section> {
    self
      .sections
      .iter()
      .find(|s| s.kind == kind && s.name.as_deref() == name)
  }

  pub fn column_family_names(&self) -> Vec<&str> {
    self
      .sections
      .iter()
      .filter(|s| s.kind == CF_OPTIONS_SECTION)
      .map(|s| s.name.as_deref().unwrap_or(""))
      .collect()
  }

  /// Turns the file into an option bundle, starting from factory defaults.
  ///
  /// The file must describe exactly one column family, named `default`.
  pub fn to_bundle(&self) -> StoreResult<OptionBundle> {
    let cf_names = self.column_family_names();
    if cf_names.len() != 1 || cf_names[0] != DEFAULT_COLUMN_FAMILY_NAME {
      log::error!("Persisted options describe column families {:?}", cf_names);
      return Err(StoreError::UnexpectedConfiguration);
    }

    let db_section = self
      .section(DB_OPTIONS_SECTION, None)
      .ok_or_else(|| StoreError::InvalidConfiguration("missing [DBOptions] section".to_string()))?;

    let mut bundle = OptionBundle::default();
    bundle.db.load_native(&db_section.entries)?;

    if let Some(cf_section) = self.section(CF_OPTIONS_SECTION, Some(DEFAULT_COLUMN_FAMILY_NAME)) {
      bundle.cf.load_native(&cf_section.entries)?;
    }

    if let Some(table_section) = self.section(TABLE_OPTIONS_SECTION, Some(DEFAULT_COLUMN_FAMILY_NAME)) {
      bundle.table.load_native(&table_section.entries)?;
      if let Some(policy) = table_section.entries.get(FILTER_POLICY_KEY) {
        match bloom_bits_per_key(policy) {
          Some(bits) => bundle.table.bits_per_key = bits,
          None => log::debug!("Ignoring unrecognised filter policy '{}'", policy),
        }
      }
    }

    Ok(bundle)
  }
}

/// Extracts bits-per-key from a persisted filter policy such as `bloomfilter:10:false`.
pub fn bloom_bits_per_key(policy: &str) -> Option<f64> {
  let mut parts = policy.split(':');
  let kind = parts.next()?.trim().to_ascii_lowercase();
  if !kind.contains("bloom") {
    return None;
  }
  parts
    .next()
    .and_then(|bits| bits.trim().parse::<f64>().ok())
    .filter(|bits| bits.is_finite() && *bits > 0.0)
}

/// Finds the newest `OPTIONS-<n>` file in `db_path`, if the database exists at all.
pub fn latest_options_file(db_path: &Path) -> StoreResult<Option<PathBuf>> {
  if !db_path.is_dir() {
    return Ok(None);
  }

  let mut latest: Option<(u64, PathBuf)> = None;
  for entry in fs::read_dir(db_path)? {
    let entry = entry?;
    let file_name = entry.file_name();
    let Some(number) = file_name
      .to_str()
      .and_then(|n| n.strip_prefix(OPTIONS_FILE_PREFIX))
      .and_then(|n| n.parse::<u64>().ok())
    else {
      continue;
    };
    if latest.as_ref().map_or(true, |(best, _)| number > *best) {
      latest = Some((number, entry.path()));
    }
  }

  Ok(latest.map(|(_, path)| path))
}

/// Loads the option bundle a database was last opened with.
///
/// Returns `Ok(None)` when there is no persisted options file, meaning the database has not
/// been created yet and factory defaults apply.
pub fn load_latest_options(db_path: &Path) -> StoreResult<Option<OptionBundle>> {
  match latest_options_file(db_path)? {
    Some(path) => {
      log::info!("Loading persisted options from '{}'", path.display());
      OptionsFile::load(&path)?.to_bundle().map(Some)
    }
    None => {
      log::info!(
        "No persisted options under '{}', using factory defaults",
        db_path.display()
      );
      Ok(None)
    }
  }
}

/// Loads the engine options of an existing database through RocksDB itself.
///
/// `cache` becomes the block cache of the loaded table options. The database must have
/// exactly one column family, named `default`; its descriptor is returned together with
/// the DB-level options.
pub fn load_engine_options(
  db_path: &Path,
  cache: &Cache,
) -> StoreResult<(RocksDbOptions, ColumnFamilyDescriptor)> {
  let env = Env::new()?;
  let (db_opts, mut descriptors) = RocksDbOptions::load_latest(db_path, env, true, cache.clone())?;

  let names: Vec<&str> = descriptors.iter().map(|cf| cf.name()).collect();
  if names != [DEFAULT_COLUMN_FAMILY_NAME] {
    log::error!("Database at '{}' has column families {:?}", db_path.display(), names);
    return Err(StoreError::UnexpectedConfiguration);
  }

  let cf = descriptors.pop().ok_or(StoreError::UnexpectedConfiguration)?;
  Ok((db_opts, cf))
}
