//! LLM exchange traces.
//!
//! Every prompt and its parsed answer land in a timestamped
//! `<stamp>_<mode>_IN.txt` / `<stamp>_<mode>_OUT.json` pair, so a directory
//! listing reads in call order.

use chrono::Local;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::RecorderError;

#[derive(Debug, Clone)]
pub struct LlmTraceWriter {
    dir: Option<PathBuf>,
}

impl LlmTraceWriter {
    /// Traces go to `<base>/<subdir>`, created on demand.
    pub fn new(base: impl AsRef<Path>, subdir: &str) -> Result<Self, RecorderError> {
        let dir = base.as_ref().join(subdir);
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir: Some(dir) })
    }

    /// A writer that records nothing.
    pub fn disabled() -> Self {
        Self { dir: None }
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// Write one exchange. Returns the IN/OUT paths when enabled.
    pub fn write(&self, mode: &str, prompt: &str, response: &Value) -> Result<Option<(PathBuf, PathBuf)>, RecorderError> {
        let Some(dir) = &self.dir else {
            return Ok(None);
        };
        let stamp = Local::now().format("%Y%m%d_%H%M%S_%6f");
        let in_path = dir.join(format!("{stamp}_{mode}_IN.txt"));
        let out_path = dir.join(format!("{stamp}_{mode}_OUT.json"));
        std::fs::write(&in_path, prompt)?;
        std::fs::write(&out_path, serde_json::to_vec_pretty(response)?)?;
        Ok(Some((in_path, out_path)))
    }

    /// Like [`write`](Self::write), but a failure is only logged.
    pub fn record(&self, mode: &str, prompt: &str, response: &Value) {
        if let Err(e) = self.write(mode, prompt, response) {
            warn!(mode, error = %e, "failed to write LLM trace");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn writes_in_out_pair() {
        let dir = tempfile::tempdir().unwrap();
        let writer = LlmTraceWriter::new(dir.path(), "planner_logs").unwrap();
        let (in_path, out_path) = writer
            .write("initial", "PROMPT", &json!({"parsed_data": {"concrete_steps": []}}))
            .unwrap()
            .unwrap();

        assert!(in_path.starts_with(dir.path().join("planner_logs")));
        assert!(in_path.to_string_lossy().ends_with("_initial_IN.txt"));
        assert_eq!(std::fs::read_to_string(in_path).unwrap(), "PROMPT");
        let out: Value = serde_json::from_str(&std::fs::read_to_string(out_path).unwrap()).unwrap();
        assert!(out["parsed_data"]["concrete_steps"].is_array());
    }

    #[test]
    fn disabled_writer_is_silent() {
        let writer = LlmTraceWriter::disabled();
        assert!(writer.write("x", "p", &Value::Null).unwrap().is_none());
        writer.record("x", "p", &Value::Null);
    }
}
