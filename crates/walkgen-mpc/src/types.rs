//! Core types for the walkgen pipeline.

use nalgebra::{DVector, Vector3};
use walkgen_core::Axis;

use crate::qp::{ConstraintActivity, QpOutput, QpProblem, WarmStart};

/// Kinematic state of one body.
///
/// Each axis holds `[position, velocity, acceleration]`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BodyState {
    pub x: Vector3<f64>,
    pub y: Vector3<f64>,
    pub z: Vector3<f64>,
    pub yaw: Vector3<f64>,
}

impl BodyState {
    /// Body at rest at `(x, y, z)` with zero yaw.
    pub fn at_rest(x: f64, y: f64, z: f64) -> Self {
        Self {
            x: Vector3::new(x, 0.0, 0.0),
            y: Vector3::new(y, 0.0, 0.0),
            z: Vector3::new(z, 0.0, 0.0),
            yaw: Vector3::zeros(),
        }
    }

    pub const fn axis(&self, axis: Axis) -> &Vector3<f64> {
        match axis {
            Axis::X => &self.x,
            Axis::Y => &self.y,
            Axis::Z => &self.z,
            Axis::Yaw => &self.yaw,
        }
    }

    pub const fn axis_mut(&mut self, axis: Axis) -> &mut Vector3<f64> {
        match axis {
            Axis::X => &mut self.x,
            Axis::Y => &mut self.y,
            Axis::Z => &mut self.z,
            Axis::Yaw => &mut self.yaw,
        }
    }
}

// ---------------------------------------------------------------------------
// References
// ---------------------------------------------------------------------------

/// Per-horizon-sample `(x, y, yaw)` sequences.
#[derive(Clone, Debug, PartialEq)]
pub struct AxisSequence {
    pub x: DVector<f64>,
    pub y: DVector<f64>,
    pub yaw: DVector<f64>,
}

impl AxisSequence {
    pub fn zeros(len: usize) -> Self {
        Self {
            x: DVector::zeros(len),
            y: DVector::zeros(len),
            yaw: DVector::zeros(len),
        }
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Broadcast one value per axis over the whole sequence.
    pub fn fill(&mut self, x: f64, y: f64, yaw: f64) {
        self.x.fill(x);
        self.y.fill(y);
        self.yaw.fill(yaw);
    }

    /// Resize to `len`, keeping leading samples and repeating the last one
    /// (zero when empty) into any new tail.
    pub fn resize(&mut self, len: usize) {
        fn extend(v: &DVector<f64>, len: usize) -> DVector<f64> {
            let tail = v.iter().last().copied().unwrap_or(0.0);
            DVector::from_fn(len, |i, _| if i < v.len() { v[i] } else { tail })
        }
        self.x = extend(&self.x, len);
        self.y = extend(&self.y, len);
        self.yaw = extend(&self.yaw, len);
    }
}

/// A reference expressed in the robot frame and in the world frame.
///
/// Local and global contributions add up: local velocities are rotated by the
/// predicted yaw at each sample, then summed with the global ones.
#[derive(Clone, Debug, PartialEq)]
pub struct Reference {
    pub local: AxisSequence,
    pub global: AxisSequence,
}

impl Reference {
    pub fn zeros(len: usize) -> Self {
        Self {
            local: AxisSequence::zeros(len),
            global: AxisSequence::zeros(len),
        }
    }

    pub fn len(&self) -> usize {
        self.local.len()
    }

    pub fn is_empty(&self) -> bool {
        self.local.is_empty()
    }

    pub fn resize(&mut self, len: usize) {
        self.local.resize(len);
        self.global.resize(len);
    }
}

// ---------------------------------------------------------------------------
// Trajectories
// ---------------------------------------------------------------------------

/// Dense per-actuation-sample trajectory of one axis.
#[derive(Clone, Debug, PartialEq)]
pub struct AxisTrajectory {
    pub position: DVector<f64>,
    pub velocity: DVector<f64>,
    pub acceleration: DVector<f64>,
}

impl AxisTrajectory {
    pub fn zeros(len: usize) -> Self {
        Self {
            position: DVector::zeros(len),
            velocity: DVector::zeros(len),
            acceleration: DVector::zeros(len),
        }
    }

    pub fn len(&self) -> usize {
        self.position.len()
    }

    pub fn is_empty(&self) -> bool {
        self.position.is_empty()
    }

    /// `[position, velocity, acceleration]` at sample `i`.
    pub fn state_at(&self, i: usize) -> Vector3<f64> {
        Vector3::new(self.position[i], self.velocity[i], self.acceleration[i])
    }

    /// State at the last sample, if any.
    pub fn last_state(&self) -> Option<Vector3<f64>> {
        self.len().checked_sub(1).map(|i| self.state_at(i))
    }
}

/// Dense trajectory of one body.
#[derive(Clone, Debug, PartialEq)]
pub struct BodyTrajectory {
    pub x: AxisTrajectory,
    pub y: AxisTrajectory,
    pub yaw: AxisTrajectory,
}

impl BodyTrajectory {
    pub fn zeros(len: usize) -> Self {
        Self {
            x: AxisTrajectory::zeros(len),
            y: AxisTrajectory::zeros(len),
            yaw: AxisTrajectory::zeros(len),
        }
    }
}

// ---------------------------------------------------------------------------
// QP records and the aggregate solution
// ---------------------------------------------------------------------------

/// What went into and came out of one QP solve.
#[derive(Clone, Debug, PartialEq)]
pub struct QpRecord {
    /// Primal solution (jerks).
    pub solution: DVector<f64>,
    /// Constraint duals (positive: upper bound active, negative: lower).
    pub duals: DVector<f64>,
    pub active_set: Vec<ConstraintActivity>,
    /// Warm-start seed handed to the backend (zeros on a cold start).
    pub initial_solution: DVector<f64>,
    pub initial_duals: DVector<f64>,
    pub initial_active_set: Vec<ConstraintActivity>,
    pub lower_bounds: DVector<f64>,
    pub upper_bounds: DVector<f64>,
    pub iterations: u32,
}

impl QpRecord {
    pub fn zeros(nb_variables: usize, nb_constraints: usize) -> Self {
        Self {
            solution: DVector::zeros(nb_variables),
            duals: DVector::zeros(nb_constraints),
            active_set: vec![ConstraintActivity::Inactive; nb_constraints],
            initial_solution: DVector::zeros(nb_variables),
            initial_duals: DVector::zeros(nb_constraints),
            initial_active_set: vec![ConstraintActivity::Inactive; nb_constraints],
            lower_bounds: DVector::zeros(nb_constraints),
            upper_bounds: DVector::zeros(nb_constraints),
            iterations: 0,
        }
    }

    /// This record's solution and duals moved `shift` samples forward, each
    /// vector read as blocks of `block_len`. `None` once the shift runs past
    /// the horizon.
    pub fn shifted_warm_start(&self, block_len: usize, shift: usize) -> Option<WarmStart> {
        (shift < block_len).then(|| {
            WarmStart::shifted(&self.solution, &self.duals, &self.active_set, block_len, shift)
        })
    }

    /// Overwrite with the outcome of a solve.
    pub(crate) fn record(
        &mut self,
        problem: &QpProblem,
        warm_start: Option<&WarmStart>,
        output: QpOutput,
    ) {
        match warm_start {
            Some(ws) => {
                self.initial_solution.clone_from(&ws.primal);
                self.initial_duals.clone_from(&ws.duals);
                self.initial_active_set.clone_from(&ws.active_set);
            }
            None => {
                let cold = WarmStart::cold(problem.nb_variables(), problem.nb_constraints());
                self.initial_solution = cold.primal;
                self.initial_duals = cold.duals;
                self.initial_active_set = cold.active_set;
            }
        }
        self.lower_bounds.clone_from(&problem.lower);
        self.upper_bounds.clone_from(&problem.upper);
        self.solution = output.primal;
        self.duals = output.duals;
        self.active_set = output.active_set;
        self.iterations = output.iterations;
    }
}

/// Result of the latest feedback cycle.
///
/// Overwritten as a whole on each successful solve; a failed solve leaves the
/// previous content untouched.
#[derive(Clone, Debug, PartialEq)]
pub struct MpcSolution {
    /// True only on the `online` call that computed this trajectory.
    pub new_traj: bool,
    /// Caller time the trajectory starts at.
    pub time: f64,
    /// Walkgen clock (last rolling-window advance) at the solve.
    pub qp_time: f64,
    /// Whether the backends were seeded from the previous solution.
    pub use_warm_start: bool,
    pub com: BodyTrajectory,
    pub base: BodyTrajectory,
    pub cop_x: DVector<f64>,
    pub cop_y: DVector<f64>,
    pub translation: QpRecord,
    pub orientation: QpRecord,
}

impl MpcSolution {
    /// Empty solution sized for `nb_samples_qp` horizon samples and
    /// `nb_samples_control` output samples.
    pub fn sized(nb_samples_qp: usize, nb_samples_control: usize) -> Self {
        Self {
            new_traj: false,
            time: 0.0,
            qp_time: 0.0,
            use_warm_start: false,
            com: BodyTrajectory::zeros(nb_samples_control),
            base: BodyTrajectory::zeros(nb_samples_control),
            cop_x: DVector::zeros(nb_samples_control),
            cop_y: DVector::zeros(nb_samples_control),
            translation: QpRecord::zeros(
                crate::translation::nb_variables(nb_samples_qp),
                crate::translation::nb_constraints(nb_samples_qp),
            ),
            orientation: QpRecord::zeros(
                crate::orientation::nb_variables(nb_samples_qp),
                crate::orientation::nb_constraints(nb_samples_qp),
            ),
        }
    }
}
