//! Error types for the rostering pipeline.

use thiserror::Error;

/// Failure modes of the spec-to-schedule pipeline.
///
/// Infeasibility and timeouts are solve outcomes, not errors; they are
/// reported through [`crate::solver::SolveStatus`].
#[derive(Debug, Clone, Error)]
pub enum RosterError {
    /// The spec document does not match the declared schema.
    #[error("spec failed schema validation: {}", .0.join("; "))]
    Schema(Vec<String>),

    /// The spec references ids that do not resolve, or uses a rule kind
    /// outside the recognized catalog.
    #[error("spec failed reference validation: {}", .0.join("; "))]
    Reference(Vec<String>),

    /// The assignment lattice would exceed the variable ceiling.
    #[error("assignment lattice too large: {vars} variables (limit {limit})")]
    Capacity { vars: usize, limit: usize },

    /// The CP engine rejected the model.
    #[error("solver engine error: {0}")]
    Engine(String),
}

impl RosterError {
    /// Flattens the error into the caller-facing message list.
    pub fn messages(&self) -> Vec<String> {
        match self {
            Self::Schema(errors) | Self::Reference(errors) => errors.clone(),
            other => vec![other.to_string()],
        }
    }
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, RosterError>;
