//! # sopilot-observe
//!
//! Turns a raw browser observation into the element table the planner and
//! grounder read.
//!
//! - [`ObservationAnalyzer`] fuses the DOM snapshot, the accessibility tree
//!   and the per-bid layout properties into labelled [`UiElement`] rows
//! - [`ObservationFilter`] trims rows before they go into a prompt
//! - [`to_csv`] renders a table in the 25-column prompt format
//!
//! [`UiElement`]: sopilot_core::element::UiElement

pub mod analyzer;
pub mod filter;
pub mod render;
pub mod snapshot;

#[cfg(test)]
pub(crate) mod fixtures;

pub use analyzer::{FusedNode, FusedPage, FusionStats, ObservationAnalyzer};
pub use filter::{FilterMode, FilterStats, ObservationFilter};
pub use render::{COLUMNS, to_csv};

use sopilot_core::Observation;
use sopilot_core::element::ElementTable;
use sopilot_core::error::ObservationError;

/// Fuse and analyze an observation in one call.
pub fn element_table(observation: &Observation) -> Result<ElementTable, ObservationError> {
    let page = ObservationAnalyzer::fuse(observation)?;
    tracing::debug!(stats = %page.stats, "observation fused");
    Ok(page.analyze())
}

/// Filter a table and render it as CSV, returning the reduction stats too.
pub fn prompt_table(table: &ElementTable, mode: FilterMode) -> Result<(String, FilterStats), csv::Error> {
    let filtered = ObservationFilter::apply(table, mode);
    let stats = FilterStats::compute(table, &filtered);
    Ok((to_csv(&filtered)?, stats))
}
