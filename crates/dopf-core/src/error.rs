//! Unified error types for the dopf workspace
//!
//! Structural problems that would otherwise abort a run (phase sets that do not
//! nest, zero or several substations, disconnected or meshed feeders, dangling
//! bus names) are reported as [`DopfError`] values at topology-construction
//! time and surfaced to the caller.
//!
//! # Example
//!
//! ```ignore
//! use dopf_core::{DopfResult, NetworkModel};
//!
//! fn prepare(model: &mut NetworkModel) -> DopfResult<()> {
//!     model.sort_by_breadth_first_search()?;
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// Unified error type for all dopf operations.
#[derive(Error, Debug)]
pub enum DopfError {
    /// I/O errors (file access)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed text input
    #[error("Parse error: {0}")]
    Parse(String),

    /// Phase string that is empty, unordered, or outside `a..=c`
    #[error("Invalid phase: {0}")]
    InvalidPhase(String),

    /// Child phase set not contained in its parent's phase set
    #[error("Phase mismatch: {0}")]
    PhaseMismatch(String),

    /// Zero or several substations
    #[error("Topology error: {0}")]
    Topology(String),

    /// Buses or lines unreachable from the substation
    #[error("Disconnected network: {0}")]
    Disconnected(String),

    /// The line set contains a cycle
    #[error("Network is not radial: {0}")]
    NotRadial(String),

    /// Data validation errors (duplicate names, unknown handles)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic errors (for wrapping external errors)
    #[error("{0}")]
    Other(String),
}

/// Convenience type alias for Results using DopfError.
pub type DopfResult<T> = Result<T, DopfError>;

impl From<anyhow::Error> for DopfError {
    fn from(err: anyhow::Error) -> Self {
        DopfError::Other(err.to_string())
    }
}

impl From<String> for DopfError {
    fn from(s: String) -> Self {
        DopfError::Other(s)
    }
}

impl From<&str> for DopfError {
    fn from(s: &str) -> Self {
        DopfError::Other(s.to_string())
    }
}
