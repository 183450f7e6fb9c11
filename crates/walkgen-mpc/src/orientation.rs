//! Yaw sub-problem.
//!
//! Decision variables: the base yaw jerk at each horizon sample (N). The CoM
//! body shares the same yaw motion.
//!
//! Cost: yaw rate tracking, yaw position tracking and jerk minimisation.
//! Constraints: yaw rate and yaw acceleration bounds at every sample.
//!
//! Solved before the translation problem, which reads [`predicted_yaw`].
//!
//! [`predicted_yaw`]: OrientationGenerator::predicted_yaw

use nalgebra::{DMatrix, DVector};
use walkgen_core::{BodyType, PonderationSet, RobotData};

use crate::dynamics::RigidBodySystem;
use crate::qp::{QpProblem, WarmStart};
use crate::types::{QpRecord, Reference};

pub const fn nb_variables(nb_samples: usize) -> usize {
    nb_samples
}

pub const fn nb_constraints(nb_samples: usize) -> usize {
    2 * nb_samples
}

/// Builds the yaw QP from the base dynamics and the committed references.
#[derive(Clone, Debug)]
pub struct OrientationGenerator {
    nb_samples: usize,
    weights: PonderationSet,
    /// Normalised Hessian, time invariant.
    hessian: DMatrix<f64>,
    scale: f64,
    yaw_rate_ref: DVector<f64>,
    yaw_ref: DVector<f64>,
    problem: QpProblem,
}

impl Default for OrientationGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl OrientationGenerator {
    pub fn new() -> Self {
        Self {
            nb_samples: 0,
            weights: PonderationSet::tracking(),
            hessian: DMatrix::zeros(0, 0),
            scale: 1.0,
            yaw_rate_ref: DVector::zeros(0),
            yaw_ref: DVector::zeros(0),
            problem: QpProblem::new(0, 0),
        }
    }

    pub const fn nb_samples(&self) -> usize {
        self.nb_samples
    }

    /// Cache the Hessian for the current dynamics and `weights`.
    pub fn precompute_objective(&mut self, system: &RigidBodySystem, weights: &PonderationSet) {
        let n = system.nb_samples_qp();
        let dynamics = system.body(BodyType::Base).dynamics();
        let uv = &dynamics.velocity.u;
        let up = &dynamics.position.u;

        let hessian = uv.transpose() * uv * weights.yaw_instant_velocity
            + up.transpose() * up * weights.yaw_position
            + DMatrix::identity(n, n) * weights.yaw_jerk_min;
        let max_diag = hessian.diagonal().max();
        self.scale = if max_diag > 0.0 { 1.0 / max_diag } else { 1.0 };
        self.hessian = hessian * self.scale;
        self.weights = *weights;

        if n != self.nb_samples {
            self.nb_samples = n;
            self.yaw_rate_ref = DVector::zeros(n);
            self.yaw_ref = DVector::zeros(n);
            self.problem = QpProblem::new(nb_variables(n), nb_constraints(n));
        }
    }

    /// Yaw rate target `ω_local + ω_global`, yaw target from the global
    /// position reference.
    pub fn compute_reference_vector(&mut self, vel_ref: &Reference, pos_ref: &Reference) {
        self.yaw_rate_ref = &vel_ref.local.yaw + &vel_ref.global.yaw;
        self.yaw_ref.clone_from(&pos_ref.global.yaw);
    }

    pub fn build_objective(&mut self, system: &RigidBodySystem) {
        let base = system.body(BodyType::Base);
        let dynamics = base.dynamics();
        let state = &base.state().yaw;

        let rate_error = dynamics.velocity.free_response(state) - &self.yaw_rate_ref;
        let yaw_error = dynamics.position.free_response(state) - &self.yaw_ref;

        let w = &self.weights;
        self.problem.gradient = (dynamics.velocity.u.tr_mul(&rate_error) * w.yaw_instant_velocity
            + dynamics.position.u.tr_mul(&yaw_error) * w.yaw_position)
            * self.scale;
        self.problem.hessian.clone_from(&self.hessian);
    }

    /// Yaw rate rows `[0, N)`, yaw acceleration rows `[N, 2N)`.
    pub fn build_constraints(&mut self, system: &RigidBodySystem, robot: &RobotData) {
        let n = self.nb_samples;
        let base = system.body(BodyType::Base);
        let dynamics = base.dynamics();
        let state = &base.state().yaw;

        let bounds = [
            (&dynamics.velocity, robot.yaw_velocity_limit),
            (&dynamics.acceleration, robot.yaw_acceleration_limit),
        ];
        for (block, (map, limit)) in bounds.into_iter().enumerate() {
            let free = map.free_response(state);
            self.problem
                .constraints
                .view_mut((block * n, 0), (n, n))
                .copy_from(&map.u);
            for k in 0..n {
                self.problem.lower[block * n + k] = -limit - free[k];
                self.problem.upper[block * n + k] = limit - free[k];
            }
        }
    }

    /// Previous yaw solution shifted by `shift` samples; cold when there is
    /// none or it no longer fits.
    pub fn compute_warm_start(&self, previous: Option<&QpRecord>, shift: usize) -> Option<WarmStart> {
        let previous = previous?;
        if previous.solution.len() != nb_variables(self.nb_samples)
            || previous.duals.len() != nb_constraints(self.nb_samples)
        {
            return None;
        }
        previous.shifted_warm_start(self.nb_samples, shift)
    }

    pub const fn problem(&self) -> &QpProblem {
        &self.problem
    }

    /// Base yaw at every horizon sample under `jerks`.
    pub fn predicted_yaw(&self, system: &RigidBodySystem, jerks: &DVector<f64>) -> DVector<f64> {
        let base = system.body(BodyType::Base);
        base.dynamics().position.predict(&base.state().yaw, jerks)
    }
}
