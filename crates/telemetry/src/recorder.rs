//! On-disk step recording.
//!
//! Each step writes its heavy payloads to their own files next to a small
//! `step_<label>_state_metadata.json`, so a run can be replayed offline.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Map, Value};
use sopilot_core::Observation;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::RecorderError;
use crate::model::{HISTORY_FILE, StepRecord, TaskHistory};

const JSON_PAYLOADS: [&str; 3] = ["dom_object", "axtree_object", "extra_element_properties"];

/// Directory-safe task name: drops the WorkArena prefix, turns `/` and `.`
/// into `_`, keeps `[A-Za-z0-9_-]` and at most 50 characters.
pub fn sanitize_task_name(task_id: &str) -> String {
    file_safe(&task_id.replace("workarena.servicenow.", ""))
}

fn file_safe(name: &str) -> String {
    name.replace(['/', '.'], "_")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .take(50)
        .collect()
}

/// One step to record.
#[derive(Debug, Clone, Copy)]
pub struct StepState<'a> {
    pub observation: &'a Observation,
    pub info: &'a Map<String, Value>,
    pub action: Option<&'a str>,
    pub reward: f64,
    pub terminated: bool,
    pub truncated: bool,
}

impl<'a> StepState<'a> {
    /// A step with no action and no reward yet.
    pub fn initial(observation: &'a Observation, info: &'a Map<String, Value>) -> Self {
        Self {
            observation,
            info,
            action: None,
            reward: 0.0,
            terminated: false,
            truncated: false,
        }
    }

    pub fn with_action(mut self, action: &'a str) -> Self {
        self.action = Some(action);
        self
    }
}

/// Writes step files for one task.
pub struct StepRecorder {
    dir: PathBuf,
}

impl StepRecorder {
    /// Create the task directory `<output_dir>/<sanitized task id>`.
    pub fn for_task(output_dir: impl AsRef<Path>, task_id: &str) -> Result<Self, RecorderError> {
        let dir = output_dir.as_ref().join(sanitize_task_name(task_id));
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Save one step. Returns the record and the metadata file path.
    ///
    /// The label is reduced to the task-name character set before it
    /// becomes part of a file name. A payload that fails to save is logged
    /// and left out of `saved_files`; only the metadata file itself is fatal.
    pub fn save_step(&self, label: &str, state: StepState<'_>) -> Result<(StepRecord, PathBuf), RecorderError> {
        let label = match file_safe(label) {
            safe if safe.is_empty() => "step".to_string(),
            safe => safe,
        };
        let label = label.as_str();
        let obs = state.observation;
        let mut saved_files = BTreeMap::new();

        if let Some(encoded) = &obs.screenshot {
            let name = format!("step_{label}_screenshot.png");
            match STANDARD
                .decode(encoded.as_bytes())
                .map_err(RecorderError::from)
                .and_then(|bytes| std::fs::write(self.dir.join(&name), bytes).map_err(RecorderError::from))
            {
                Ok(()) => {
                    saved_files.insert("screenshot".to_string(), name);
                }
                Err(e) => warn!(step = label, error = %e, "screenshot not saved"),
            }
        }

        let payloads = [&obs.dom_object, &obs.axtree_object, &obs.extra_element_properties];
        for (key, payload) in JSON_PAYLOADS.iter().zip(payloads) {
            let Some(data) = payload else { continue };
            let name = format!("step_{label}_{key}.json");
            match serde_json::to_vec_pretty(data)
                .map_err(RecorderError::from)
                .and_then(|bytes| std::fs::write(self.dir.join(&name), bytes).map_err(RecorderError::from))
            {
                Ok(()) => {
                    saved_files.insert((*key).to_string(), name);
                }
                Err(e) => warn!(step = label, payload = key, error = %e, "payload not saved"),
            }
        }

        let record = StepRecord {
            step: label.to_string(),
            action_taken: state.action.map(str::to_string),
            reward: state.reward,
            terminated: state.terminated,
            truncated: state.truncated,
            observation_metadata: serde_json::to_value(obs.metadata())?,
            info_data: state.info.clone(),
            saved_files,
        };

        let path = self.dir.join(format!("step_{label}_state_metadata.json"));
        std::fs::write(&path, serde_json::to_vec_pretty(&record)?)?;
        debug!(step = label, path = %path.display(), "step recorded");
        Ok((record, path))
    }

    /// Write `task_execution_history.json`.
    pub fn write_history(&self, history: &TaskHistory) -> Result<PathBuf, RecorderError> {
        let path = self.dir.join(HISTORY_FILE);
        std::fs::write(&path, serde_json::to_vec_pretty(&history.steps)?)?;
        Ok(path)
    }
}

/// Rebuild the observation a metadata file describes, reading the payload
/// files it references from the same directory.
pub fn load_observation(metadata_path: impl AsRef<Path>) -> Result<Observation, RecorderError> {
    let metadata_path = metadata_path.as_ref();
    let dir = metadata_path.parent().unwrap_or_else(|| Path::new("."));
    let record: StepRecord = serde_json::from_slice(&std::fs::read(metadata_path)?)?;

    let mut observation: Observation = serde_json::from_value(record.observation_metadata.clone())?;
    for key in JSON_PAYLOADS {
        let Some(name) = record.saved_files.get(key) else { continue };
        let data: Value = serde_json::from_slice(&std::fs::read(dir.join(name))?)?;
        match key {
            "dom_object" => observation.dom_object = Some(data),
            "axtree_object" => observation.axtree_object = Some(data),
            _ => observation.extra_element_properties = Some(data),
        }
    }
    if let Some(name) = record.saved_files.get("screenshot") {
        observation.screenshot = Some(STANDARD.encode(std::fs::read(dir.join(name))?));
    }
    Ok(observation)
}
