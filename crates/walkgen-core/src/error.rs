use thiserror::Error;

use crate::types::{Axis, SubProblem};

/// Top-level error type for the walking pattern generator.
#[derive(Debug, Error)]
pub enum WalkgenError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Walkgen used before init")]
    NotInitialized,

    #[error("{problem} QP failed: {source}")]
    Solve {
        problem: SubProblem,
        #[source]
        source: SolverError,
    },

    #[error("Reference length mismatch: expected {expected} samples, got {got}")]
    ReferenceLength { expected: usize, got: usize },

    #[error("Perturbations along {axis} are not modelled")]
    UnsupportedAxis { axis: Axis },
}

/// Configuration errors, raised by `init` before any state is touched.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid {name}: {value} (must be > 0)")]
    NonPositivePeriod { name: &'static str, value: f64 },

    #[error(
        "Sampling periods must satisfy actuation ({actuation}) <= mpc ({mpc}) <= qp ({qp})"
    )]
    PeriodOrdering { actuation: f64, mpc: f64, qp: f64 },

    #[error("nb_samples_qp must be >= 1")]
    EmptyHorizon,

    #[error("Ponderation index {index} out of range ({len} sets)")]
    InvalidPonderation { index: usize, len: usize },

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: &'static str, message: String },
}

/// Per-cycle QP backend failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SolverError {
    #[error("Solver setup failed: {0}")]
    Setup(String),

    #[error("Solver did not converge: {status} after {iterations} iterations")]
    NotConverged { status: String, iterations: u32 },

    #[error("Solver returned a non-finite primal")]
    NonFinite,
}
