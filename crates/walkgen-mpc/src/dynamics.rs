//! Rigid-body system: body states and the condensed horizon dynamics.
//!
//! Every body axis (x, y, yaw) is a triple integrator driven by a jerk held
//! constant over one QP sampling period `T`:
//!
//! ```text
//! [p v a]_{k+1} = A [p v a]_k + B j_k
//! A = [1  T  T²/2]      B = [T³/6]
//!     [0  1  T   ]          [T²/2]
//!     [0  0  1   ]          [T   ]
//! ```
//!
//! Condensing over `N` samples gives, for each derivative order,
//! `X = S s_0 + U J` with `S` (N×3) and `U` (N×N, lower triangular). Row `k`
//! predicts sample `k + 1`.
//!
//! The CoP of a body at height `h` follows the cart-table model
//! `z = p - (h / g) a`, so its maps are `S_pos - (h/g) S_acc` and likewise for
//! `U`. The whole-robot CoP is the mass-weighted mean of the body CoPs.

use nalgebra::{DMatrix, DVector, Matrix3, Vector3};
use walkgen_core::{Axis, BodyType, MpcData, RobotData, WalkgenError};

use crate::interpolation::Interpolator;
use crate::types::{BodyState, MpcSolution};
use crate::translation::{BASE_X, BASE_Y, COM_X, COM_Y};

/// Discrete-time triple integrator `(A, B)` for period `dt`.
pub fn jerk_transition(dt: f64) -> (Matrix3<f64>, Vector3<f64>) {
    let a = Matrix3::new(
        1.0, dt, dt * dt / 2.0, //
        0.0, 1.0, dt, //
        0.0, 0.0, 1.0,
    );
    let b = Vector3::new(dt * dt * dt / 6.0, dt * dt / 2.0, dt);
    (a, b)
}

/// Condensed linear map from `(s_0, J)` to one derivative over the horizon.
#[derive(Clone, Debug, PartialEq)]
pub struct LinearDynamics {
    /// State-to-output map (N×3).
    pub s: DMatrix<f64>,
    /// Jerk-to-output map (N×N, lower triangular).
    pub u: DMatrix<f64>,
}

impl LinearDynamics {
    pub fn zeros(nb_samples: usize) -> Self {
        Self {
            s: DMatrix::zeros(nb_samples, 3),
            u: DMatrix::zeros(nb_samples, nb_samples),
        }
    }

    pub fn nb_samples(&self) -> usize {
        self.u.nrows()
    }

    /// Output when all jerks are zero.
    pub fn free_response(&self, state: &Vector3<f64>) -> DVector<f64> {
        &self.s * DVector::from_column_slice(state.as_slice())
    }

    /// Output for the given jerks.
    pub fn predict(&self, state: &Vector3<f64>, jerks: &DVector<f64>) -> DVector<f64> {
        self.free_response(state) + &self.u * jerks
    }
}

/// Horizon maps of one body.
#[derive(Clone, Debug, PartialEq)]
pub struct BodyDynamics {
    pub position: LinearDynamics,
    pub velocity: LinearDynamics,
    pub acceleration: LinearDynamics,
    /// CoP of this body alone, `position - (h/g) acceleration`.
    pub cop: LinearDynamics,
}

impl BodyDynamics {
    pub fn zeros(nb_samples: usize) -> Self {
        Self {
            position: LinearDynamics::zeros(nb_samples),
            velocity: LinearDynamics::zeros(nb_samples),
            acceleration: LinearDynamics::zeros(nb_samples),
            cop: LinearDynamics::zeros(nb_samples),
        }
    }
}

/// Build the condensed maps for `nb_samples` steps of `period`, for a body
/// whose CoM sits `height_over_gravity = h / g` above the ground.
pub fn build_jerk_dynamics(
    period: f64,
    nb_samples: usize,
    height_over_gravity: f64,
) -> BodyDynamics {
    let (a, b) = jerk_transition(period);

    // powers[j] = A^j
    let mut powers = Vec::with_capacity(nb_samples + 1);
    powers.push(Matrix3::identity());
    for j in 1..=nb_samples {
        powers.push(a * powers[j - 1]);
    }
    let impulse: Vec<Vector3<f64>> = powers.iter().map(|p| p * b).collect();

    let mut dynamics = BodyDynamics::zeros(nb_samples);
    let orders = [
        &mut dynamics.position,
        &mut dynamics.velocity,
        &mut dynamics.acceleration,
    ];
    for (order, map) in orders.into_iter().enumerate() {
        for k in 0..nb_samples {
            for col in 0..3 {
                map.s[(k, col)] = powers[k + 1][(order, col)];
            }
            for i in 0..=k {
                map.u[(k, i)] = impulse[k - i][order];
            }
        }
    }

    dynamics.cop = LinearDynamics {
        s: &dynamics.position.s - &dynamics.acceleration.s * height_over_gravity,
        u: &dynamics.position.u - &dynamics.acceleration.u * height_over_gravity,
    };

    dynamics
}

// ---------------------------------------------------------------------------
// RigidBody
// ---------------------------------------------------------------------------

/// One tracked body: its live state and its horizon maps.
#[derive(Clone, Debug)]
pub struct RigidBody {
    body_type: BodyType,
    mass: f64,
    height: f64,
    state: BodyState,
    dynamics: BodyDynamics,
}

impl RigidBody {
    fn new(body_type: BodyType) -> Self {
        Self {
            body_type,
            mass: 1.0,
            height: 0.0,
            state: BodyState::default(),
            dynamics: BodyDynamics::zeros(0),
        }
    }

    pub const fn body_type(&self) -> BodyType {
        self.body_type
    }

    pub const fn mass(&self) -> f64 {
        self.mass
    }

    /// CoM height used by the CoP map.
    pub const fn height(&self) -> f64 {
        self.height
    }

    pub const fn state(&self) -> &BodyState {
        &self.state
    }

    pub const fn dynamics(&self) -> &BodyDynamics {
        &self.dynamics
    }
}

// ---------------------------------------------------------------------------
// RigidBodySystem
// ---------------------------------------------------------------------------

/// Owns the CoM and base bodies and the dynamics every QP generator reads.
#[derive(Clone, Debug)]
pub struct RigidBodySystem {
    bodies: [RigidBody; 2],
    gravity: f64,
    nb_samples_qp: usize,
    interpolator: Interpolator,
    revision: u64,
}

impl Default for RigidBodySystem {
    fn default() -> Self {
        Self::new()
    }
}

impl RigidBodySystem {
    pub fn new() -> Self {
        Self {
            bodies: [RigidBody::new(BodyType::Com), RigidBody::new(BodyType::Base)],
            gravity: 9.81,
            nb_samples_qp: 0,
            interpolator: Interpolator::new(1.0, 1.0, 0),
            revision: 0,
        }
    }

    /// Take masses, heights and gravity from `robot`.
    pub fn init(&mut self, robot: &RobotData) {
        let com = &mut self.bodies[BodyType::Com.index()];
        com.mass = robot.com_mass;
        com.height = robot.com_height;
        let base = &mut self.bodies[BodyType::Base.index()];
        base.mass = robot.base_mass;
        base.height = robot.base_height;
        self.gravity = robot.gravity;
    }

    /// Rebuild every body's horizon maps for the sampling in `mpc`.
    pub fn compute_dynamics(&mut self, mpc: &MpcData) {
        self.nb_samples_qp = mpc.nb_samples_qp;
        self.interpolator = Interpolator::from_mpc_data(mpc);
        for body in &mut self.bodies {
            body.dynamics = build_jerk_dynamics(
                mpc.qp_sampling_period,
                mpc.nb_samples_qp,
                body.height / self.gravity,
            );
        }
        self.revision += 1;
    }

    /// Put both bodies at rest above the origin at their CoM heights.
    pub fn reset_states(&mut self) {
        for body in &mut self.bodies {
            body.state = BodyState::at_rest(0.0, 0.0, body.height);
        }
    }

    pub const fn body(&self, body: BodyType) -> &RigidBody {
        &self.bodies[body.index()]
    }

    pub const fn nb_samples_qp(&self) -> usize {
        self.nb_samples_qp
    }

    pub const fn gravity(&self) -> f64 {
        self.gravity
    }

    pub const fn interpolator(&self) -> &Interpolator {
        &self.interpolator
    }

    /// Incremented by each [`compute_dynamics`](Self::compute_dynamics).
    pub const fn revision(&self) -> u64 {
        self.revision
    }

    /// Mass fractions `(com, base)` weighting each body's CoP.
    pub fn cop_weights(&self) -> (f64, f64) {
        let m_com = self.body(BodyType::Com).mass;
        let m_base = self.body(BodyType::Base).mass;
        let total = m_com + m_base;
        (m_com / total, m_base / total)
    }

    /// Whole-robot CoP from the two bodies' position and acceleration.
    fn cop_at(&self, com: (f64, f64), base: (f64, f64)) -> f64 {
        let (w_com, w_base) = self.cop_weights();
        let h_com = self.body(BodyType::Com).height / self.gravity;
        let h_base = self.body(BodyType::Base).height / self.gravity;
        w_com * (com.0 - h_com * com.1) + w_base * (base.0 - h_base * base.1)
    }

    /// Resample the QP jerks in `solution` into dense body and CoP
    /// trajectories starting from the live body states, stamped at `time`.
    pub fn interpolate_bodies(&self, solution: &mut MpcSolution, time: f64) {
        let n = self.nb_samples_qp;
        let trans = solution.translation.solution.as_slice();
        let yaw_jerks = solution.orientation.solution.as_slice();
        let block = |b: usize| &trans[b * n..(b + 1) * n];

        let com = self.body(BodyType::Com).state();
        let base = self.body(BodyType::Base).state();
        let interp = &self.interpolator;

        solution.com.x = interp.interpolate(&com.x, block(COM_X));
        solution.com.y = interp.interpolate(&com.y, block(COM_Y));
        solution.base.x = interp.interpolate(&base.x, block(BASE_X));
        solution.base.y = interp.interpolate(&base.y, block(BASE_Y));
        solution.base.yaw = interp.interpolate(&base.yaw, yaw_jerks);
        solution.com.yaw.clone_from(&solution.base.yaw);

        let len = interp.nb_samples();
        solution.cop_x = DVector::from_fn(len, |i, _| {
            self.cop_at(
                (solution.com.x.position[i], solution.com.x.acceleration[i]),
                (solution.base.x.position[i], solution.base.x.acceleration[i]),
            )
        });
        solution.cop_y = DVector::from_fn(len, |i, _| {
            self.cop_at(
                (solution.com.y.position[i], solution.com.y.acceleration[i]),
                (solution.base.y.position[i], solution.base.y.acceleration[i]),
            )
        });
        solution.time = time;
    }

    /// Commit the last interpolated sample as the live state of each body.
    /// The vertical axis is left untouched.
    pub fn update_body_state(&mut self, solution: &MpcSolution) {
        for (body, traj) in [
            (BodyType::Com, &solution.com),
            (BodyType::Base, &solution.base),
        ] {
            let state = &mut self.bodies[body.index()].state;
            if let Some(s) = traj.x.last_state() {
                state.x = s;
            }
            if let Some(s) = traj.y.last_state() {
                state.y = s;
            }
            if let Some(s) = traj.yaw.last_state() {
                state.yaw = s;
            }
        }
    }

    /// Overwrite the live state of `body`. Yaw is one axis shared by both
    /// bodies: it is stored on the base and mirrored on the CoM.
    pub fn set_body_state(&mut self, body: BodyType, state: BodyState) {
        let yaw = state.yaw;
        self.bodies[body.index()].state = state;
        self.bodies[BodyType::Base.index()].state.yaw = yaw;
        self.sync_yaw();
    }

    fn sync_yaw(&mut self) {
        let yaw = self.bodies[BodyType::Base.index()].state.yaw;
        self.bodies[BodyType::Com.index()].state.yaw = yaw;
    }

    /// Add the acceleration an external `force` imparts on `body` along `axis`.
    ///
    /// A yaw torque acts on the shared yaw axis and is scaled by the base
    /// mass whichever body it is applied to. The vertical axis is not
    /// modelled and is rejected.
    pub fn apply_perturbation_force(
        &mut self,
        axis: Axis,
        body: BodyType,
        force: f64,
    ) -> Result<(), WalkgenError> {
        match axis {
            Axis::X | Axis::Y => {
                let mass = self.body(body).mass;
                self.bodies[body.index()].state.axis_mut(axis)[2] += force / mass;
            }
            Axis::Yaw => {
                let base = &mut self.bodies[BodyType::Base.index()];
                base.state.yaw[2] += force / base.mass;
                self.sync_yaw();
            }
            Axis::Z => return Err(WalkgenError::UnsupportedAxis { axis }),
        }
        Ok(())
    }
}
