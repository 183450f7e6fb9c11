//! Horizontal sub-problem: CoM and base x/y motion with CoP support
//! constraints.
//!
//! # QP Formulation
//!
//! Decision variables (4N): `z = [J_com_x, J_base_x, J_com_y, J_base_y]`,
//! one jerk per horizon sample and body axis. Both horizontal axes share the
//! same maps; per axis, with `z_a = [J_com_a, J_base_a]`:
//!
//! | term            | map `M z_a + c`                                   |
//! |-----------------|---------------------------------------------------|
//! | base velocity   | `Uv_b J_b + Sv_b s_b - v_ref`                     |
//! | base position   | `Up_b J_b + Sp_b s_b - p_ref`                     |
//! | CoP centering   | whole-robot CoP minus base position               |
//! | CoM centering   | `Up_c J_c - Up_b J_b + Sp_c s_c - Sp_b s_b`       |
//! | jerk            | `z_a`                                             |
//!
//! The cost is `Σ w/2 ‖M z_a + c‖²`, normalised by the largest Hessian
//! diagonal entry.
//!
//! Constraints (8N rows, `lb ≤ A z ≤ ub`), with `θ_k` the predicted yaw:
//! - CoP minus base along the heading and its normal (support rectangle)
//! - CoM minus base along the heading and its normal
//! - base velocity x, y
//! - base acceleration x, y

use nalgebra::{DMatrix, DVector};
use walkgen_core::{Axis, BodyType, PonderationSet, RobotData};

use crate::dynamics::RigidBodySystem;
use crate::qp::{QpProblem, WarmStart};
use crate::types::{QpRecord, Reference};

/// Variable block of the CoM x jerks.
pub const COM_X: usize = 0;
/// Variable block of the base x jerks.
pub const BASE_X: usize = 1;
/// Variable block of the CoM y jerks.
pub const COM_Y: usize = 2;
/// Variable block of the base y jerks.
pub const BASE_Y: usize = 3;

const NB_VARIABLE_BLOCKS: usize = 4;
const NB_CONSTRAINT_BLOCKS: usize = 8;

pub const fn nb_variables(nb_samples: usize) -> usize {
    NB_VARIABLE_BLOCKS * nb_samples
}

pub const fn nb_constraints(nb_samples: usize) -> usize {
    NB_CONSTRAINT_BLOCKS * nb_samples
}

/// Per-axis maps from `[J_com, J_base]` (2N) to N-long outputs.
#[derive(Clone, Debug)]
struct AxisMaps {
    base_velocity: DMatrix<f64>,
    base_position: DMatrix<f64>,
    base_acceleration: DMatrix<f64>,
    /// Whole-robot CoP relative to the base position.
    cop: DMatrix<f64>,
    /// CoM relative to the base position.
    com: DMatrix<f64>,
}

impl AxisMaps {
    fn zeros(n: usize) -> Self {
        Self {
            base_velocity: DMatrix::zeros(n, 2 * n),
            base_position: DMatrix::zeros(n, 2 * n),
            base_acceleration: DMatrix::zeros(n, 2 * n),
            cop: DMatrix::zeros(n, 2 * n),
            com: DMatrix::zeros(n, 2 * n),
        }
    }
}

/// Free responses (zero jerk) of the quantities in [`AxisMaps`] for one axis.
struct FreeResponse {
    base_velocity: DVector<f64>,
    base_position: DVector<f64>,
    base_acceleration: DVector<f64>,
    cop: DVector<f64>,
    com: DVector<f64>,
}

impl FreeResponse {
    fn new(system: &RigidBodySystem, axis: Axis) -> Self {
        let com = system.body(BodyType::Com);
        let base = system.body(BodyType::Base);
        let (s_c, s_b) = (com.state().axis(axis), base.state().axis(axis));
        let (w_com, w_base) = system.cop_weights();

        let base_position = base.dynamics().position.free_response(s_b);
        let cop = com.dynamics().cop.free_response(s_c) * w_com
            + base.dynamics().cop.free_response(s_b) * w_base
            - &base_position;
        let com_rel = com.dynamics().position.free_response(s_c) - &base_position;

        Self {
            base_velocity: base.dynamics().velocity.free_response(s_b),
            base_acceleration: base.dynamics().acceleration.free_response(s_b),
            base_position,
            cop,
            com: com_rel,
        }
    }
}

fn side_by_side(left: &DMatrix<f64>, right: &DMatrix<f64>) -> DMatrix<f64> {
    let n = left.nrows();
    let mut m = DMatrix::zeros(n, left.ncols() + right.ncols());
    m.view_mut((0, 0), left.shape()).copy_from(left);
    m.view_mut((0, left.ncols()), right.shape()).copy_from(right);
    m
}

/// Builds the translation QP.
#[derive(Clone, Debug)]
pub struct TranslationGenerator {
    nb_samples: usize,
    weights: PonderationSet,
    maps: AxisMaps,
    /// Normalised per-axis Hessian (2N×2N), time invariant.
    axis_hessian: DMatrix<f64>,
    scale: f64,
    velocity_ref_x: DVector<f64>,
    velocity_ref_y: DVector<f64>,
    position_ref_x: DVector<f64>,
    position_ref_y: DVector<f64>,
    problem: QpProblem,
}

impl Default for TranslationGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl TranslationGenerator {
    pub fn new() -> Self {
        Self {
            nb_samples: 0,
            weights: PonderationSet::tracking(),
            maps: AxisMaps::zeros(0),
            axis_hessian: DMatrix::zeros(0, 0),
            scale: 1.0,
            velocity_ref_x: DVector::zeros(0),
            velocity_ref_y: DVector::zeros(0),
            position_ref_x: DVector::zeros(0),
            position_ref_y: DVector::zeros(0),
            problem: QpProblem::new(0, 0),
        }
    }

    pub const fn nb_samples(&self) -> usize {
        self.nb_samples
    }

    /// Cache the maps and the Hessian for the current dynamics and `weights`.
    pub fn precompute_objective(&mut self, system: &RigidBodySystem, weights: &PonderationSet) {
        let n = system.nb_samples_qp();
        let com = system.body(BodyType::Com).dynamics();
        let base = system.body(BodyType::Base).dynamics();
        let (w_com, w_base) = system.cop_weights();
        let zero = DMatrix::zeros(n, n);

        self.maps = AxisMaps {
            base_velocity: side_by_side(&zero, &base.velocity.u),
            base_position: side_by_side(&zero, &base.position.u),
            base_acceleration: side_by_side(&zero, &base.acceleration.u),
            cop: side_by_side(&(&com.cop.u * w_com), &(&base.cop.u * w_base - &base.position.u)),
            com: side_by_side(&com.position.u, &(-&base.position.u)),
        };

        let m = &self.maps;
        let hessian = m.base_velocity.tr_mul(&m.base_velocity) * weights.base_instant_velocity
            + m.base_position.tr_mul(&m.base_position) * weights.base_position
            + m.cop.tr_mul(&m.cop) * weights.cop_centering
            + m.com.tr_mul(&m.com) * weights.com_centering
            + DMatrix::identity(2 * n, 2 * n) * weights.jerk_min;
        let max_diag = hessian.diagonal().max();
        self.scale = if max_diag > 0.0 { 1.0 / max_diag } else { 1.0 };
        self.axis_hessian = hessian * self.scale;
        self.weights = *weights;

        if n != self.nb_samples {
            self.nb_samples = n;
            self.velocity_ref_x = DVector::zeros(n);
            self.velocity_ref_y = DVector::zeros(n);
            self.position_ref_x = DVector::zeros(n);
            self.position_ref_y = DVector::zeros(n);
            self.problem = QpProblem::new(nb_variables(n), nb_constraints(n));
        }
    }

    /// Per-sample base velocity target `R(θ_k) v_local + v_global` and
    /// position target from the global position reference.
    pub fn compute_reference_vector(&mut self, vel_ref: &Reference, pos_ref: &Reference, yaw: &DVector<f64>) {
        for k in 0..self.nb_samples {
            let (sin, cos) = yaw[k].sin_cos();
            let (lx, ly) = (vel_ref.local.x[k], vel_ref.local.y[k]);
            self.velocity_ref_x[k] = cos * lx - sin * ly + vel_ref.global.x[k];
            self.velocity_ref_y[k] = sin * lx + cos * ly + vel_ref.global.y[k];
        }
        self.position_ref_x.clone_from(&pos_ref.global.x);
        self.position_ref_y.clone_from(&pos_ref.global.y);
    }

    fn axis_gradient(&self, free: &FreeResponse, velocity_ref: &DVector<f64>, position_ref: &DVector<f64>) -> DVector<f64> {
        let m = &self.maps;
        let w = &self.weights;
        (m.base_velocity.tr_mul(&(&free.base_velocity - velocity_ref)) * w.base_instant_velocity
            + m.base_position.tr_mul(&(&free.base_position - position_ref)) * w.base_position
            + m.cop.tr_mul(&free.cop) * w.cop_centering
            + m.com.tr_mul(&free.com) * w.com_centering)
            * self.scale
    }

    pub fn build_objective(&mut self, system: &RigidBodySystem) {
        let n = self.nb_samples;
        let g_x = self.axis_gradient(
            &FreeResponse::new(system, Axis::X),
            &self.velocity_ref_x,
            &self.position_ref_x,
        );
        let g_y = self.axis_gradient(
            &FreeResponse::new(system, Axis::Y),
            &self.velocity_ref_y,
            &self.position_ref_y,
        );

        self.problem.gradient.rows_mut(0, 2 * n).copy_from(&g_x);
        self.problem.gradient.rows_mut(2 * n, 2 * n).copy_from(&g_y);

        self.problem.hessian.fill(0.0);
        self.problem
            .hessian
            .view_mut((0, 0), (2 * n, 2 * n))
            .copy_from(&self.axis_hessian);
        self.problem
            .hessian
            .view_mut((2 * n, 2 * n), (2 * n, 2 * n))
            .copy_from(&self.axis_hessian);
    }

    /// Fill row `row` with `dir · (map_x z_x, map_y z_y)` at sample `k`,
    /// bounded by `±limit` minus the free response along `dir`.
    #[allow(clippy::too_many_arguments)]
    fn set_row(
        problem: &mut QpProblem,
        row: usize,
        k: usize,
        map: &DMatrix<f64>,
        dir: (f64, f64),
        free: (f64, f64),
        limit: f64,
    ) {
        let width = map.ncols();
        for j in 0..width {
            problem.constraints[(row, j)] = dir.0 * map[(k, j)];
            problem.constraints[(row, width + j)] = dir.1 * map[(k, j)];
        }
        let offset = dir.0 * free.0 + dir.1 * free.1;
        problem.lower[row] = -limit - offset;
        problem.upper[row] = limit - offset;
    }

    /// Support, CoM box and base limits along the predicted heading `yaw`.
    pub fn build_constraints(&mut self, system: &RigidBodySystem, robot: &RobotData, yaw: &DVector<f64>) {
        let n = self.nb_samples;
        let fx = FreeResponse::new(system, Axis::X);
        let fy = FreeResponse::new(system, Axis::Y);
        let m = &self.maps;
        let problem = &mut self.problem;

        for k in 0..n {
            let (sin, cos) = yaw[k].sin_cos();
            let heading = (cos, sin);
            let normal = (-sin, cos);
            let cop = (fx.cop[k], fy.cop[k]);
            let com = (fx.com[k], fy.com[k]);
            let vel = (fx.base_velocity[k], fy.base_velocity[k]);
            let acc = (fx.base_acceleration[k], fy.base_acceleration[k]);

            let rows = [
                (&m.cop, heading, cop, robot.cop_limits[0]),
                (&m.cop, normal, cop, robot.cop_limits[1]),
                (&m.com, heading, com, robot.com_limits[0]),
                (&m.com, normal, com, robot.com_limits[1]),
                (&m.base_velocity, (1.0, 0.0), vel, robot.base_velocity_limit),
                (&m.base_velocity, (0.0, 1.0), vel, robot.base_velocity_limit),
                (&m.base_acceleration, (1.0, 0.0), acc, robot.base_acceleration_limit),
                (&m.base_acceleration, (0.0, 1.0), acc, robot.base_acceleration_limit),
            ];
            for (block, (map, dir, free, limit)) in rows.into_iter().enumerate() {
                Self::set_row(problem, block * n + k, k, map, dir, free, limit);
            }
        }
    }

    /// Previous translation solution shifted by `shift` samples; cold when
    /// there is none or it no longer fits.
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qp::{ClarabelQpSolver, QpSolver};
    use approx::assert_relative_eq;
    use walkgen_core::MpcData;

    const N: usize = 10;

    fn setup() -> (RigidBodySystem, TranslationGenerator) {
        let mpc = MpcData {
            nb_samples_qp: N,
            qp_sampling_period: 0.1,
            ..MpcData::default()
        };
        let mut system = RigidBodySystem::new();
        system.init(&RobotData::default());
        system.compute_dynamics(&mpc);
        system.reset_states();
        let mut generator = TranslationGenerator::new();
        generator.precompute_objective(&system, &PonderationSet::tracking());
        (system, generator)
    }

    fn build(system: &RigidBodySystem, generator: &mut TranslationGenerator, vel: &Reference, yaw: &DVector<f64>) {
        generator.compute_reference_vector(vel, &Reference::zeros(N), yaw);
        generator.build_objective(system);
        generator.build_constraints(system, &RobotData::default(), yaw);
    }

    #[test]
    fn problem_sizes() {
        let (_, generator) = setup();
        assert_eq!(generator.problem().nb_variables(), 40);
        assert_eq!(generator.problem().nb_constraints(), 80);
    }

    #[test]
    fn hessian_is_block_diagonal_and_symmetric() {
        let (system, mut generator) = setup();
        build(&system, &mut generator, &Reference::zeros(N), &DVector::zeros(N));
        let h = &generator.problem().hessian;
        assert_relative_eq!(h.clone(), h.transpose(), epsilon = 1e-12);
        assert_eq!(h.view((0, 2 * N), (2 * N, 2 * N)).amax(), 0.0);
        assert_relative_eq!(h.diagonal().max(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn local_reference_is_rotated_by_yaw() {
        let (_, mut generator) = setup();
        let mut vel = Reference::zeros(N);
        vel.local.fill(1.0, 0.0, 0.0);
        vel.global.fill(0.0, 0.5, 0.0);
        let yaw = DVector::from_element(N, std::f64::consts::FRAC_PI_2);
        generator.compute_reference_vector(&vel, &Reference::zeros(N), &yaw);
        assert_relative_eq!(generator.velocity_ref_x[3], 0.0, epsilon = 1e-12);
        assert_relative_eq!(generator.velocity_ref_y[3], 1.5, epsilon = 1e-12);
    }

    #[test]
    fn at_rest_with_zero_reference_stays_put() {
        let (system, mut generator) = setup();
        build(&system, &mut generator, &Reference::zeros(N), &DVector::zeros(N));
        let out = ClarabelQpSolver::default().solve(generator.problem(), None).unwrap();
        assert!(out.primal.amax() < 1e-6);
        // Rest lies strictly inside every bound.
        assert!(generator.problem().lower.max() < 0.0);
        assert!(generator.problem().upper.min() > 0.0);
    }

    #[test]
    fn forward_reference_moves_base_forward_within_support() {
        let (system, mut generator) = setup();
        let mut vel = Reference::zeros(N);
        vel.local.fill(0.3, 0.0, 0.0);
        build(&system, &mut generator, &vel, &DVector::zeros(N));
        let problem = generator.problem().clone();
        let out = ClarabelQpSolver::default().solve(&problem, None).unwrap();
        assert!(problem.max_violation(&out.primal) < 1e-6);

        let base = system.body(BodyType::Base);
        let jerks = DVector::from_column_slice(&out.primal.as_slice()[BASE_X * N..(BASE_X + 1) * N]);
        let velocity = base.dynamics().velocity.predict(&base.state().x, &jerks);
        assert!(velocity[N - 1] > 0.2, "base should approach 0.3 m/s, got {}", velocity[N - 1]);

        // Nothing pushes sideways.
        let jerks_y = &out.primal.as_slice()[BASE_Y * N..(BASE_Y + 1) * N];
        assert!(jerks_y.iter().all(|j| j.abs() < 1e-4));
    }

    #[test]
    fn rotated_support_uses_heading_and_normal() {
        let (system, mut generator) = setup();
        let yaw = DVector::from_element(N, std::f64::consts::FRAC_PI_2);
        build(&system, &mut generator, &Reference::zeros(N), &yaw);
        let a = &generator.problem().constraints;
        let cop_map = &generator.maps.cop;
        // Heading row at θ = π/2 acts on the y block only.
        let k = 2;
        assert_relative_eq!(a[(k, 0)], 0.0, epsilon = 1e-12);
        assert_relative_eq!(a[(k, 2 * N)], cop_map[(k, 0)], epsilon = 1e-12);
        // Normal row acts on x with a negative sign.
        assert_relative_eq!(a[(N + k, 0)], -cop_map[(k, 0)], epsilon = 1e-12);
    }

    #[test]
    fn velocity_bounds_account_for_current_state() {
        let (mut system, mut generator) = setup();
        let mut state = system.body(BodyType::Base).state().clone();
        state.x[1] = 0.4;
        system.set_body_state(BodyType::Base, state);
        build(&system, &mut generator, &Reference::zeros(N), &DVector::zeros(N));
        let row = 4 * N;
        assert_relative_eq!(generator.problem().upper[row], 1.4 - 0.4, epsilon = 1e-12);
        assert_relative_eq!(generator.problem().lower[row], -1.4 - 0.4, epsilon = 1e-12);
    }
}
