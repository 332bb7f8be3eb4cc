//! The task loop: the heart of sopilot.
//!
//! A [`TaskRunner`] follows an **Observe → Plan → Act** cycle against one
//! browser environment:
//!
//! 1. **Observe**: fuse the page into an element table and audit progress
//! 2. **Plan**: analyze the goal once, then plan, verify and repair per page
//! 3. **Act**: ground stale targets just in time and execute one action at
//!    a time, recording every step
//!
//! The loop ends when the environment reports the task done, the planner
//! has nothing left to do, or the loop budget is spent.

pub mod loop_runner;
pub mod progress;

#[cfg(test)]
mod test_helpers;

pub use loop_runner::{RunSettings, TaskRunner, insert_focus_before_final_click};
pub use progress::Progress;
