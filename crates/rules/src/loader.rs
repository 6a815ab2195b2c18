//! Filesystem rule loader.
//!
//! Each configured directory is laid out as:
//!
//! ```text
//! rules/
//!   common.yaml          <- shared by every event type
//!   AAI-EVENT/           <- one subfolder per event type
//!     vserver.yaml
//!   POA-EVENT/
//!     service.yaml
//! ```
//!
//! Files are read in file-name order so that later definitions of a rule
//! name deterministically override earlier ones.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::{Result, RuleError};
use crate::schema::RuleFile;

/// Outcome of loading a single rule file.
#[derive(Debug)]
pub struct LoadResult {
    /// Path to the file that was loaded.
    pub path: PathBuf,
    /// Status of the load attempt.
    pub status: LoadStatus,
}

/// Status of a single file load attempt.
#[derive(Debug, PartialEq, Eq)]
pub enum LoadStatus {
    /// File parsed; counts of rule definitions and entity sections.
    Loaded { rules: usize, entities: usize },
    /// File was skipped (dotfile, non-YAML, etc.).
    Skipped { reason: String },
}

/// Parsed rule files grouped by where they were found.
#[derive(Debug, Default)]
pub struct RuleSources {
    /// Top-level files, shared by every event type.
    pub common: Vec<RuleFile>,
    /// Files under each event-type subfolder.
    pub by_event_type: BTreeMap<String, Vec<RuleFile>>,
}

impl RuleSources {
    /// Common files followed by the event type's own files.
    pub fn files_for<'a>(&'a self, event_type: &str) -> Vec<&'a RuleFile> {
        self.common
            .iter()
            .chain(self.by_event_type.get(event_type).into_iter().flatten())
            .collect()
    }

    /// Event types that have their own subfolder.
    pub fn event_types(&self) -> impl Iterator<Item = &str> {
        self.by_event_type.keys().map(String::as_str)
    }
}

/// Reads rule YAML from one or more directories.
pub struct RuleLoader {
    dirs: Vec<PathBuf>,
}

impl RuleLoader {
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        Self { dirs }
    }

    /// Scan every directory.
    ///
    /// Dotfiles and non-YAML files are skipped. A malformed file or a missing
    /// directory is an error: a partially loaded rule set is never used.
    pub fn load_all(&self) -> Result<(RuleSources, Vec<LoadResult>)> {
        let mut sources = RuleSources::default();
        let mut results = Vec::new();

        for dir in &self.dirs {
            if !dir.is_dir() {
                return Err(RuleError::Config(format!(
                    "rule directory '{}' does not exist",
                    dir.display()
                )));
            }

            for entry in WalkDir::new(dir)
                .min_depth(1)
                .max_depth(1)
                .sort_by_file_name()
            {
                let entry = entry?;
                let path = entry.path();
                let name = entry.file_name().to_string_lossy();

                if name.starts_with('.') {
                    if entry.file_type().is_file() {
                        results.push(skipped(path, "dotfile"));
                    }
                    continue;
                }

                if entry.file_type().is_dir() {
                    let files = load_event_type_dir(path, &mut results)?;
                    debug!(event_type = %name, files = files.len(), "scanned event type folder");
                    sources
                        .by_event_type
                        .entry(name.into_owned())
                        .or_default()
                        .extend(files);
                } else if let Some(file) = load_if_yaml(path, &mut results)? {
                    sources.common.push(file);
                }
            }
        }

        info!(
            dirs = self.dirs.len(),
            common = sources.common.len(),
            event_types = sources.by_event_type.len(),
            "rule sources loaded"
        );
        Ok((sources, results))
    }

    /// Parse one rule file. An empty file is an empty rule set.
    pub fn load_file(path: &Path) -> Result<RuleFile> {
        let content = fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(RuleFile::default());
        }
        serde_yaml::from_str(&content).map_err(|source| RuleError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// All YAML files below an event-type folder, recursively.
fn load_event_type_dir(dir: &Path, results: &mut Vec<LoadResult>) -> Result<Vec<RuleFile>> {
    let mut files = Vec::new();
    let walker = WalkDir::new(dir)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !e.file_name().to_string_lossy().starts_with('.') || e.depth() == 0);

    for entry in walker {
        let entry = entry?;
        if entry.file_type().is_file() {
            if let Some(file) = load_if_yaml(entry.path(), results)? {
                files.push(file);
            }
        }
    }
    Ok(files)
}

fn load_if_yaml(path: &Path, results: &mut Vec<LoadResult>) -> Result<Option<RuleFile>> {
    let is_yaml = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e == "yml" || e == "yaml")
        .unwrap_or(false);

    if !is_yaml {
        results.push(skipped(path, "not a YAML file"));
        return Ok(None);
    }

    let file = RuleLoader::load_file(path)?;
    debug!(path = %path.display(), rules = file.rules.len(), entities = file.entities.len(), "loaded rule file");
    results.push(LoadResult {
        path: path.to_path_buf(),
        status: LoadStatus::Loaded {
            rules: file.rules.len(),
            entities: file.entities.len(),
        },
    });
    Ok(Some(file))
}

fn skipped(path: &Path, reason: &str) -> LoadResult {
    LoadResult {
        path: path.to_path_buf(),
        status: LoadStatus::Skipped {
            reason: reason.to_string(),
        },
    }
}
