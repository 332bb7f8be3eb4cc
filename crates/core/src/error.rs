//! Error types for the sopilot domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all sopilot operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Browser errors ---
    #[error("Browser error: {0}")]
    Browser(#[from] BrowserError),

    // --- Observation errors ---
    #[error("Observation error: {0}")]
    Observation(#[from] ObservationError),

    // --- Grounding errors ---
    #[error("Grounding error: {0}")]
    Grounding(#[from] GroundingError),

    // --- Planning errors ---
    #[error("Planning error: {0}")]
    Plan(#[from] PlanError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- IO ---
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Clone, Error)]
pub enum BrowserError {
    #[error("Browser bridge unreachable: {0}")]
    Unreachable(String),

    #[error("Browser bridge returned {status_code}: {message}")]
    Bridge { status_code: u16, message: String },

    #[error("Malformed bridge payload: {0}")]
    InvalidPayload(String),

    #[error("Environment not started; call reset first")]
    NotStarted,
}

#[derive(Debug, Clone, Error)]
pub enum ObservationError {
    #[error("Observation is missing {0}")]
    Missing(&'static str),

    #[error("Malformed {part}: {reason}")]
    Malformed { part: &'static str, reason: String },
}

/// Failure signals from just-in-time grounding.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GroundingError {
    #[error("no element on the page satisfies role '{role}'")]
    NoCandidate { role: String },

    #[error("{count} elements satisfy role '{role}' and none matches '{label}'")]
    Ambiguous {
        role: String,
        label: String,
        count: usize,
    },

    #[error("step has neither a role nor an action that implies one")]
    Unconstrained,
}

#[derive(Debug, Clone, Error)]
pub enum PlanError {
    #[error("Goal analysis failed: {0}")]
    GoalAnalysis(String),

    #[error("Plan generation failed: {0}")]
    Generation(String),

    #[error("SOP library error: {0}")]
    SopLibrary(String),

    #[error("Unknown action type: {0}")]
    UnknownAction(String),
}
