//! # sopilot-browser
//!
//! The browser side of the agent: a [`BrowserEnv`] backed by an HTTP bridge
//! to BrowserGym, and the renderer that turns planned actions into the
//! action code the bridge executes.
//!
//! [`BrowserEnv`]: sopilot_core::BrowserEnv

pub mod action_code;
pub mod remote;

pub use action_code::{ActionCodeError, EXTRACT_PLACEHOLDER, py_literal, py_str, render_action};
pub use remote::RemoteBrowserEnv;
