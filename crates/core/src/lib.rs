//! # sopilot Core
//!
//! Domain types, traits, and error definitions for the sopilot UI agent.
//! This crate has **no framework dependencies**: it defines the model that
//! every other crate implements against.
//!
//! ## Design Philosophy
//!
//! The two outside worlds the agent talks to (the LLM and the browser) are
//! traits here. Implementations live in their own crates, which keeps the
//! planner and the loop testable with scripted stand-ins.

pub mod browser;
pub mod element;
pub mod error;
pub mod event;
pub mod manifest;
pub mod message;
pub mod plan;
pub mod provider;
pub mod sop;

// Re-export key types at crate root for ergonomics
pub use browser::{BrowserEnv, Observation, StepOutcome};
pub use element::{BBox, ElementTable, UiElement};
pub use error::{Error, Result};
pub use event::{DomainEvent, EventBus};
pub use manifest::{MissionIntent, TaskManifest, TaskMetadata};
pub use message::{Message, Role};
pub use plan::{ActionType, ConcretePlan, ConcreteStep, PlannedAction, TargetRef};
pub use provider::{Provider, ProviderRequest, ProviderResponse, Usage};
pub use sop::{Sop, SopEntry, SopStep};
