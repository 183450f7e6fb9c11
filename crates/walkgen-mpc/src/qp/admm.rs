//! Operator-splitting backend (OSQP-style ADMM) on dense nalgebra matrices.
//!
//! Iterates on `(x, z, y)` where `z = A x` is the bounded copy of the
//! constraint rows:
//!
//! ```text
//! (P + σI + ρAᵀA) x̃ = σx - q + Aᵀ(ρz - y)
//! x ← αx̃ + (1-α)x
//! ẑ = αAx̃ + (1-α)z
//! z ← Π[l,u](ẑ + y/ρ)
//! y ← y + ρ(ẑ - z)
//! ```
//!
//! Constraint rows are scaled to unit infinity norm before iterating. Duals
//! are mapped between the two row scalings on warm start and on output.
//!
//! The step size `ρ` is rebalanced from the residual ratio every
//! `adapt_interval` iterations and kept across solves until [`reset`].
//!
//! [`reset`]: super::QpSolver::reset

use nalgebra::{Cholesky, DMatrix, DVector, Dyn};
use tracing::{debug, trace};
use walkgen_core::{QpSolverType, SolverError};

use super::{QpOutput, QpProblem, QpSolver, WarmStart};

/// Refactor only when `ρ` moves by more than this factor.
const RHO_REFACTOR_RATIO: f64 = 5.0;

#[derive(Clone, Debug, PartialEq)]
pub struct AdmmSettings {
    pub rho: f64,
    pub sigma: f64,
    /// Over-relaxation, in `(0, 2)`.
    pub alpha: f64,
    pub eps_abs: f64,
    pub eps_rel: f64,
    pub max_iter: u32,
    pub adapt_interval: u32,
    pub rho_min: f64,
    pub rho_max: f64,
}

impl Default for AdmmSettings {
    fn default() -> Self {
        Self {
            rho: 0.1,
            sigma: 1e-6,
            alpha: 1.6,
            eps_abs: 1e-7,
            eps_rel: 1e-7,
            max_iter: 10_000,
            adapt_interval: 25,
            rho_min: 1e-6,
            rho_max: 1e6,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct AdmmQpSolver {
    pub settings: AdmmSettings,
    /// Step size carried over from the last solve.
    rho: Option<f64>,
}

impl AdmmQpSolver {
    pub fn new(settings: AdmmSettings) -> Self {
        Self { settings, rho: None }
    }

    fn factor(
        p: &DMatrix<f64>,
        a: &DMatrix<f64>,
        sigma: f64,
        rho: f64,
    ) -> Result<Cholesky<f64, Dyn>, SolverError> {
        let n = p.nrows();
        let kkt = p + DMatrix::identity(n, n) * sigma + a.tr_mul(a) * rho;
        Cholesky::new(kkt).ok_or_else(|| {
            SolverError::Setup("reduced KKT matrix is not positive definite".to_string())
        })
    }
}

fn inf_norm(v: &DVector<f64>) -> f64 {
    v.amax()
}

/// Per-row factors bringing every non-zero row of `a` to unit infinity norm.
fn row_scaling(a: &DMatrix<f64>) -> DVector<f64> {
    DVector::from_fn(a.nrows(), |i, _| {
        let norm = a.row(i).amax();
        if norm > 0.0 { norm.recip() } else { 1.0 }
    })
}

impl QpSolver for AdmmQpSolver {
    fn kind(&self) -> QpSolverType {
        QpSolverType::Admm
    }

    fn reset(&mut self) {
        self.rho = None;
    }

    #[allow(clippy::many_single_char_names)]
    fn solve(
        &mut self,
        problem: &QpProblem,
        warm_start: Option<&WarmStart>,
    ) -> Result<QpOutput, SolverError> {
        let s = &self.settings;
        let n = problem.nb_variables();
        let m = problem.nb_constraints();
        let p = &problem.hessian;
        let q = &problem.gradient;

        let d = row_scaling(&problem.constraints);
        let scaled = DMatrix::from_fn(m, n, |i, j| problem.constraints[(i, j)] * d[i]);
        let lower = problem.lower.component_mul(&d);
        let upper = problem.upper.component_mul(&d);
        let a = &scaled;
        let at = a.transpose();
        let (l, u) = (&lower, &upper);

        let mut rho = self.rho.unwrap_or(s.rho);
        let mut kkt = Self::factor(p, a, s.sigma, rho)?;

        let (mut x, mut y) = match warm_start {
            Some(ws) if ws.primal.len() == n && ws.duals.len() == m => {
                (ws.primal.clone(), ws.duals.component_div(&d))
            }
            _ => (DVector::zeros(n), DVector::zeros(m)),
        };
        let mut z = (a * &x).zip_zip_map(l, u, |v, lo, hi| v.clamp(lo, hi));

        for iter in 1..=s.max_iter {
            let rhs = &x * s.sigma - q + &at * (&z * rho - &y);
            let x_tilde = kkt.solve(&rhs);
            let z_tilde = a * &x_tilde;

            x = &x_tilde * s.alpha + &x * (1.0 - s.alpha);
            let z_relaxed = &z_tilde * s.alpha + &z * (1.0 - s.alpha);
            z = (&z_relaxed + &y / rho).zip_zip_map(l, u, |v, lo, hi| v.clamp(lo, hi));
            y += (&z_relaxed - &z) * rho;

            let ax = a * &x;
            let px = p * &x;
            let aty = &at * &y;
            let r_prim = inf_norm(&(&ax - &z));
            let r_dual = inf_norm(&(&px + q + &aty));
            let prim_scale = inf_norm(&ax).max(inf_norm(&z));
            let dual_scale = inf_norm(&px).max(inf_norm(&aty)).max(inf_norm(q));

            if r_prim <= s.eps_abs + s.eps_rel * prim_scale
                && r_dual <= s.eps_abs + s.eps_rel * dual_scale
            {
                trace!(iter, rho, r_prim, r_dual, "admm converged");
                self.rho = Some(rho);
                return QpOutput::new(x, y.component_mul(&d), iter);
            }

            if s.adapt_interval > 0 && iter % s.adapt_interval == 0 {
                let ratio = (r_prim / prim_scale.max(f64::MIN_POSITIVE))
                    / (r_dual / dual_scale.max(f64::MIN_POSITIVE)).max(f64::MIN_POSITIVE);
                let new_rho = (rho * ratio.sqrt()).clamp(s.rho_min, s.rho_max);
                if new_rho.is_finite()
                    && (new_rho > rho * RHO_REFACTOR_RATIO || new_rho < rho / RHO_REFACTOR_RATIO)
                {
                    trace!(iter, rho, new_rho, "admm rho update");
                    rho = new_rho;
                    kkt = Self::factor(p, a, s.sigma, rho)?;
                }
            }
        }

        debug!(max_iter = s.max_iter, rho, "admm hit iteration limit");
        self.rho = Some(rho);
        Err(SolverError::NotConverged {
            status: "MaxIterations".to_string(),
            iterations: s.max_iter,
        })
    }
}
