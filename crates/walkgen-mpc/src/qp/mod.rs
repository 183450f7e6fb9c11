//! Dense QP interface shared by both generators.
//!
//! Every problem has the two-sided form
//!
//! ```text
//! minimise    ½ xᵀ H x + gᵀ x
//! subject to  l ≤ A x ≤ u
//! ```
//!
//! Dual convention: `y_i > 0` when row `i` presses on its upper bound,
//! `y_i < 0` when it presses on its lower bound.

mod admm;
mod interior_point;

use nalgebra::{DMatrix, DVector};
use walkgen_core::{QpSolverType, SolverError};

pub use admm::{AdmmQpSolver, AdmmSettings};
pub use interior_point::ClarabelQpSolver;

/// Dual magnitude above which a row counts as active.
pub const ACTIVE_DUAL_TOLERANCE: f64 = 1e-7;

/// A two-sided dense QP.
#[derive(Clone, Debug, PartialEq)]
pub struct QpProblem {
    pub hessian: DMatrix<f64>,
    pub gradient: DVector<f64>,
    pub constraints: DMatrix<f64>,
    pub lower: DVector<f64>,
    pub upper: DVector<f64>,
}

impl QpProblem {
    /// All-zero problem with `nb_variables` unknowns and `nb_constraints` rows.
    pub fn new(nb_variables: usize, nb_constraints: usize) -> Self {
        Self {
            hessian: DMatrix::zeros(nb_variables, nb_variables),
            gradient: DVector::zeros(nb_variables),
            constraints: DMatrix::zeros(nb_constraints, nb_variables),
            lower: DVector::zeros(nb_constraints),
            upper: DVector::zeros(nb_constraints),
        }
    }

    pub fn nb_variables(&self) -> usize {
        self.gradient.len()
    }

    pub fn nb_constraints(&self) -> usize {
        self.lower.len()
    }

    /// `½ xᵀ H x + gᵀ x`
    pub fn objective(&self, x: &DVector<f64>) -> f64 {
        0.5 * x.dot(&(&self.hessian * x)) + self.gradient.dot(x)
    }

    /// Largest bound violation of `x` over all rows (zero when feasible).
    pub fn max_violation(&self, x: &DVector<f64>) -> f64 {
        let ax = &self.constraints * x;
        ax.iter()
            .zip(self.lower.iter().zip(self.upper.iter()))
            .map(|(&v, (&l, &u))| (l - v).max(v - u).max(0.0))
            .fold(0.0, f64::max)
    }
}

/// Which side of its bounds a constraint row sits on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ConstraintActivity {
    #[default]
    Inactive,
    AtLower,
    AtUpper,
}

/// Classify rows by the sign of their duals.
pub fn activity_from_duals(duals: &DVector<f64>) -> Vec<ConstraintActivity> {
    duals
        .iter()
        .map(|&y| {
            if y > ACTIVE_DUAL_TOLERANCE {
                ConstraintActivity::AtUpper
            } else if y < -ACTIVE_DUAL_TOLERANCE {
                ConstraintActivity::AtLower
            } else {
                ConstraintActivity::Inactive
            }
        })
        .collect()
}

/// Seed for a solve: a previous iterate moved onto the current horizon.
#[derive(Clone, Debug, PartialEq)]
pub struct WarmStart {
    pub primal: DVector<f64>,
    pub duals: DVector<f64>,
    pub active_set: Vec<ConstraintActivity>,
}

impl WarmStart {
    /// Zero primal and duals, nothing active.
    pub fn cold(nb_variables: usize, nb_constraints: usize) -> Self {
        Self {
            primal: DVector::zeros(nb_variables),
            duals: DVector::zeros(nb_constraints),
            active_set: vec![ConstraintActivity::Inactive; nb_constraints],
        }
    }

    /// Shift a previous iterate by `shift` horizon samples. Every vector is
    /// a stack of blocks of `block_len` samples; each block is shifted on its
    /// own and its last sample repeated into the tail.
    pub fn shifted(
        primal: &DVector<f64>,
        duals: &DVector<f64>,
        active_set: &[ConstraintActivity],
        block_len: usize,
        shift: usize,
    ) -> Self {
        Self {
            primal: DVector::from_vec(shift_blocks(primal.as_slice(), block_len, shift)),
            duals: DVector::from_vec(shift_blocks(duals.as_slice(), block_len, shift)),
            active_set: shift_blocks(active_set, block_len, shift),
        }
    }
}

/// Drop the first `shift` samples of every `block_len` block and pad each
/// block with its last sample.
pub fn shift_blocks<T: Copy>(values: &[T], block_len: usize, shift: usize) -> Vec<T> {
    if block_len == 0 {
        return values.to_vec();
    }
    values
        .chunks(block_len)
        .flat_map(|block| {
            let last = block.len() - 1;
            (0..block.len()).map(move |k| block[(k + shift).min(last)])
        })
        .collect()
}

/// What a backend hands back.
#[derive(Clone, Debug, PartialEq)]
pub struct QpOutput {
    pub primal: DVector<f64>,
    pub duals: DVector<f64>,
    pub active_set: Vec<ConstraintActivity>,
    pub iterations: u32,
}

impl QpOutput {
    fn new(primal: DVector<f64>, duals: DVector<f64>, iterations: u32) -> Result<Self, SolverError> {
        if primal.iter().chain(duals.iter()).any(|v| !v.is_finite()) {
            return Err(SolverError::NonFinite);
        }
        let active_set = activity_from_duals(&duals);
        Ok(Self {
            primal,
            duals,
            active_set,
            iterations,
        })
    }
}

/// A dense QP backend.
///
/// Backends may keep state between solves (factorisations, step sizes);
/// [`reset`](QpSolver::reset) drops it.
pub trait QpSolver: Send + Sync {
    fn kind(&self) -> QpSolverType;

    fn reset(&mut self);

    /// Solve `problem`, optionally seeded with `warm_start`. Backends that
    /// cannot use a seed ignore it.
    fn solve(
        &mut self,
        problem: &QpProblem,
        warm_start: Option<&WarmStart>,
    ) -> Result<QpOutput, SolverError>;
}

/// Construct the backend for `kind` with default settings.
pub fn create_qp_solver(kind: QpSolverType) -> Box<dyn QpSolver> {
    match kind {
        QpSolverType::Clarabel => Box::new(ClarabelQpSolver::default()),
        QpSolverType::Admm => Box::new(AdmmQpSolver::default()),
    }
}
