use thiserror::Error;

/// Error taxonomy of the simulation engine.
///
/// Configuration problems are always detected before any stepping happens.
/// The other two variants report failures of a run already in progress; the
/// partial result is discarded rather than returned truncated.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed chain length, state-vector length, initial-condition
    /// count, mode index, or time grid.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The solver could not satisfy its error tolerance within its step
    /// budget.
    #[error("integration failed at t = {time}: {reason}")]
    IntegrationFailure { time: f64, reason: String },

    /// A non-finite value appeared in the state.
    #[error("non-finite value in state at t = {time}")]
    NumericAnomaly { time: f64 },
}
