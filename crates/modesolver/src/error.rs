//! Error types shared by the rasterizer, the solvers and the classifier

use thiserror::Error;

use crate::solver::Solution;

/// Everything that can go wrong between a geometry description and a
/// labelled mode list.
#[derive(Debug, Error)]
pub enum ModeError {
    /// Invalid geometry, grid, material or solver parameter
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// Fewer eigenpairs converged than were requested. The converged
    /// subset is still available in `partial`.
    #[error("only {converged} of {requested} eigenpairs converged")]
    NotConverged {
        requested: usize,
        converged: usize,
        partial: Box<Solution>,
    },

    /// Mode carries no electric-field energy, so it cannot be labelled
    #[error("mode {mode} has zero electric-field energy")]
    UndefinedPolarization { mode: usize },

    /// Initial mode guess shape does not match the solver grid
    #[error("dimension mismatch: expected {expected:?}, found {found:?}")]
    DimensionMismatch {
        expected: (usize, usize),
        found: (usize, usize),
    },

    /// The shifted operator `A - σI` is numerically singular
    #[error("shifted operator is singular at σ = {shift}; perturb the effective index guess")]
    SingularShift { shift: f64 },
}

impl ModeError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        ModeError::Configuration(msg.into())
    }

    /// Number of converged pairs for a convergence failure, `None` otherwise
    pub fn converged_count(&self) -> Option<usize> {
        match self {
            ModeError::NotConverged { converged, .. } => Some(*converged),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ModeError>;
