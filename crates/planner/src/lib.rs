//! # sopilot-planner
//!
//! Everything between a goal and an executable plan:
//!
//! - [`GoalAnalyzer`] turns the natural-language goal into a manifest;
//! - [`SopLibrary`] supplies the procedure for a task, when one is on file;
//! - [`ConcretePlanner`] plans against the live page, verifying and
//!   repairing until the plan is clean;
//! - [`ObservationExtractor`] reads values off the page for `extractLLM`.

pub mod extractor;
pub mod goal;
pub mod planner;
pub mod prompts;
pub mod sop_library;
pub mod verify;

pub use extractor::{NOT_FOUND, ObservationExtractor, normalize_value};
pub use goal::GoalAnalyzer;
pub use planner::{ConcretePlanner, PlanOutcome};
pub use prompts::PromptTemplates;
pub use sop_library::{SopLibrary, short_task_id};
pub use verify::{PlanIssue, completed_fields, issue_report, verify_plan};
