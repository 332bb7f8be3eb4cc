//! # sopilot-grounding
//!
//! Resolves identifier-free references to live element ids.
//!
//! [`Grounder`] answers "which element on this page is the Submit button?"
//! at execution time. [`BidIndex`] answers the same question for every
//! manifest field at once, ahead of planning.

pub mod bid_index;
pub mod grounder;
pub mod roles;

pub use bid_index::{BidIndex, IndexEntry, LABEL_ROLES, Located, NOT_FOUND, PRIMARY_SEARCH_INPUT, SUBMIT_BUTTON};
pub use grounder::{Grounder, Grounding};
pub use roles::RoleConstraint;
