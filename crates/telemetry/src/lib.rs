//! Run recording for sopilot.
//!
//! Writes what the agent saw and did at every step, the raw LLM exchanges
//! behind each plan and extraction, and the task history with its final
//! summary. Recorded steps can be loaded back as observations for offline
//! inspection.

pub mod model;
pub mod recorder;
pub mod trace;

pub use model::{HISTORY_FILE, RunSummary, StepRecord, TaskHistory};
pub use recorder::{StepRecorder, StepState, load_observation, sanitize_task_name};
pub use trace::LlmTraceWriter;

/// Errors from the recording subsystem.
#[derive(Debug, thiserror::Error)]
pub enum RecorderError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("screenshot is not valid base64: {0}")]
    Screenshot(#[from] base64::DecodeError),
}

impl From<RecorderError> for sopilot_core::Error {
    fn from(e: RecorderError) -> Self {
        match e {
            RecorderError::Io(io) => sopilot_core::Error::Io(io),
            RecorderError::SerdeError(se) => sopilot_core::Error::Serialization(se),
            other => sopilot_core::Error::Internal(other.to_string()),
        }
    }
}
