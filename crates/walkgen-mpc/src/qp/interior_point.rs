//! Interior-point backend built on Clarabel.
//!
//! Clarabel takes `A x + s = b, s ∈ K`. Each finite bound becomes one row of a
//! nonnegative cone: `A_i x ≤ u_i` for upper bounds and `-A_i x ≤ -l_i` for
//! lower bounds.

use clarabel::algebra::CscMatrix;
use clarabel::solver::{
    DefaultSettingsBuilder, DefaultSolver, IPSolver, SolverStatus,
    SupportedConeT::NonnegativeConeT,
};
use nalgebra::{DMatrix, DVector};
use tracing::trace;
use walkgen_core::{QpSolverType, SolverError};

use super::{QpOutput, QpProblem, QpSolver, WarmStart};

/// Stateless Clarabel wrapper. Warm starts are ignored.
#[derive(Clone, Debug)]
pub struct ClarabelQpSolver {
    pub max_iter: u32,
}

impl Default for ClarabelQpSolver {
    fn default() -> Self {
        Self { max_iter: 200 }
    }
}

impl QpSolver for ClarabelQpSolver {
    fn kind(&self) -> QpSolverType {
        QpSolverType::Clarabel
    }

    fn reset(&mut self) {}

    fn solve(
        &mut self,
        problem: &QpProblem,
        warm_start: Option<&WarmStart>,
    ) -> Result<QpOutput, SolverError> {
        if warm_start.is_some() {
            trace!("clarabel ignores warm start");
        }

        let n = problem.nb_variables();
        let m = problem.nb_constraints();

        // (constraint row, upper side)
        let rows: Vec<(usize, bool)> = (0..m)
            .filter(|&i| problem.upper[i].is_finite())
            .map(|i| (i, true))
            .chain(
                (0..m)
                    .filter(|&i| problem.lower[i].is_finite())
                    .map(|i| (i, false)),
            )
            .collect();

        let mut a_all = DMatrix::zeros(rows.len(), n);
        let mut b_all = Vec::with_capacity(rows.len());
        for (r, &(i, upper)) in rows.iter().enumerate() {
            let sign = if upper { 1.0 } else { -1.0 };
            for j in 0..n {
                a_all[(r, j)] = sign * problem.constraints[(i, j)];
            }
            b_all.push(if upper { problem.upper[i] } else { -problem.lower[i] });
        }

        let p_csc = to_csc(&problem.hessian, true);
        let a_csc = to_csc(&a_all, false);
        let cones = vec![NonnegativeConeT(rows.len())];

        let settings = DefaultSettingsBuilder::default()
            .max_iter(self.max_iter)
            .verbose(false)
            .build()
            .map_err(|e| SolverError::Setup(format!("{e:?}")))?;

        let mut solver = DefaultSolver::new(
            &p_csc,
            problem.gradient.as_slice(),
            &a_csc,
            &b_all,
            &cones,
            settings,
        )
        .map_err(|e| SolverError::Setup(format!("{e:?}")))?;

        solver.solve();
        let sol = &solver.solution;

        if !matches!(sol.status, SolverStatus::Solved | SolverStatus::AlmostSolved) {
            return Err(SolverError::NotConverged {
                status: format!("{:?}", sol.status),
                iterations: sol.iterations,
            });
        }

        let mut duals = DVector::zeros(m);
        for (&(i, upper), &z) in rows.iter().zip(sol.z.iter()) {
            if upper {
                duals[i] += z;
            } else {
                duals[i] -= z;
            }
        }

        QpOutput::new(DVector::from_column_slice(&sol.x), duals, sol.iterations)
    }
}

/// Column-compressed copy of `m`. With `upper_triangle` only entries on or
/// above the diagonal are kept, which is what Clarabel expects for `P`.
fn to_csc(m: &DMatrix<f64>, upper_triangle: bool) -> CscMatrix<f64> {
    let (nrows, ncols) = m.shape();
    let mut colptr = Vec::with_capacity(ncols + 1);
    let mut rowval = Vec::new();
    let mut nzval = Vec::new();

    colptr.push(0);
    for (j, column) in m.column_iter().enumerate() {
        let rows = if upper_triangle { (j + 1).min(nrows) } else { nrows };
        for (i, &v) in column.iter().take(rows).enumerate().filter(|(_, v)| **v != 0.0) {
            rowval.push(i);
            nzval.push(v);
        }
        colptr.push(rowval.len());
    }

    CscMatrix::new(nrows, ncols, colptr, rowval, nzval)
}
