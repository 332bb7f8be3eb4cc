//! The SOP library.
//!
//! A YAML mapping keyed by short task id (the last dot segment of a
//! WorkArena id):
//!
//! ```yaml
//! create-change-request:
//!   target_task_id: workarena.servicenow.create-change-request
//!   template_output_format:
//!     sop_content:
//!       - {action: fill, role: textbox, target: Short description, value: "..."}
//!       - Open the "Closure Information" tab before filling close notes.
//! ```
//!
//! `sop_content` may also sit at the top level of an entry. The file is read
//! once per library and cached.

use serde_yaml::Value as Yaml;
use sopilot_core::error::PlanError;
use sopilot_core::sop::{Sop, SopEntry};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::OnceLock;
use tracing::{info, warn};

type Database = BTreeMap<String, Yaml>;

pub struct SopLibrary {
    path: PathBuf,
    enabled: bool,
    cache: OnceLock<Database>,
}

/// `a.b.c` → `c`.
pub fn short_task_id(task_id: &str) -> &str {
    task_id.rsplit('.').next().unwrap_or(task_id)
}

fn parse_database(text: &str) -> Result<Database, PlanError> {
    if text.trim().is_empty() {
        return Ok(Database::new());
    }
    serde_yaml::from_str(text).map_err(|e| PlanError::SopLibrary(e.to_string()))
}

fn entry_content(entry: &Yaml) -> Option<&Vec<Yaml>> {
    let nested = entry
        .get("template_output_format")
        .and_then(|t| t.get("sop_content"))
        .and_then(Yaml::as_sequence)
        .filter(|s| !s.is_empty());
    nested.or_else(|| entry.get("sop_content").and_then(Yaml::as_sequence).filter(|s| !s.is_empty()))
}

impl SopLibrary {
    pub fn new(path: impl Into<PathBuf>, enabled: bool) -> Self {
        Self {
            path: path.into(),
            enabled,
            cache: OnceLock::new(),
        }
    }

    /// A library that never returns an SOP.
    pub fn disabled() -> Self {
        Self::new(PathBuf::new(), false)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Read and parse the library file, reporting any failure.
    pub fn open(&self) -> Result<usize, PlanError> {
        let text = std::fs::read_to_string(&self.path)
            .map_err(|e| PlanError::SopLibrary(format!("{}: {e}", self.path.display())))?;
        Ok(parse_database(&text)?.len())
    }

    fn database(&self) -> &Database {
        self.cache.get_or_init(|| {
            let text = match std::fs::read_to_string(&self.path) {
                Ok(text) => text,
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "SOP library not readable");
                    return Database::new();
                }
            };
            match parse_database(&text) {
                Ok(db) => {
                    info!(path = %self.path.display(), entries = db.len(), "SOP library loaded");
                    db
                }
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "SOP library not parseable");
                    Database::new()
                }
            }
        })
    }

    /// The SOP for `task_id`, if SOPs are enabled and one is on file.
    ///
    /// Matches the short id as a key first, then any entry whose
    /// `target_task_id` is the short or the full id.
    pub fn lookup(&self, task_id: &str) -> Option<Sop> {
        if !self.enabled || task_id.is_empty() {
            return None;
        }
        let db = self.database();
        let short = short_task_id(task_id);
        let entry = db.get(short).or_else(|| {
            db.values().find(|entry| {
                entry
                    .get("target_task_id")
                    .and_then(Yaml::as_str)
                    .is_some_and(|t| t == short || t == task_id)
            })
        });
        let Some(content) = entry.and_then(entry_content) else {
            warn!(task_id, short, "no SOP matched");
            return None;
        };

        let entries = content
            .iter()
            .filter_map(|item| match serde_yaml::from_value::<SopEntry>(item.clone()) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(task_id, error = %e, "skipping unreadable SOP line");
                    None
                }
            })
            .collect();
        Some(Sop::new(task_id, entries))
    }
}
