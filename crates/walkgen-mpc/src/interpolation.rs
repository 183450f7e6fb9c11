//! Dense resampling of a coarse jerk plan.
//!
//! The QP decides one jerk per QP sample. Between QP samples the jerk is held
//! constant, so position, velocity and acceleration are cubic, quadratic and
//! linear in time. The interpolator walks that piecewise polynomial and emits
//! a state every actuation period.

use nalgebra::Vector3;
use walkgen_core::MpcData;

use crate::types::AxisTrajectory;

/// Guard for comparisons against QP sample boundaries.
const BOUNDARY_EPS: f64 = 1e-12;

/// Advance `[p, v, a]` by `dt` seconds under constant `jerk`.
pub fn integrate_jerk(state: &Vector3<f64>, jerk: f64, dt: f64) -> Vector3<f64> {
    let (p, v, a) = (state[0], state[1], state[2]);
    let dt2 = dt * dt;
    let dt3 = dt2 * dt;
    Vector3::new(
        p + v * dt + a * dt2 / 2.0 + jerk * dt3 / 6.0,
        v + a * dt + jerk * dt2 / 2.0,
        a + jerk * dt,
    )
}

/// Resamples a per-QP-sample jerk sequence at the actuation period.
#[derive(Clone, Debug, PartialEq)]
pub struct Interpolator {
    qp_period: f64,
    actuation_period: f64,
    nb_samples: usize,
}

impl Interpolator {
    pub const fn new(qp_period: f64, actuation_period: f64, nb_samples: usize) -> Self {
        Self {
            qp_period,
            actuation_period,
            nb_samples,
        }
    }

    /// One output sample per actuation period over one MPC period.
    pub fn from_mpc_data(mpc: &MpcData) -> Self {
        Self::new(
            mpc.qp_sampling_period,
            mpc.actuation_sampling_period,
            mpc.nb_samples_control(),
        )
    }

    /// Number of samples produced by [`interpolate`](Self::interpolate).
    pub const fn nb_samples(&self) -> usize {
        self.nb_samples
    }

    pub const fn actuation_period(&self) -> f64 {
        self.actuation_period
    }

    /// Sample the trajectory starting at `initial` under the piecewise
    /// constant `jerks`. Sample `i` is the state at `(i + 1)` actuation periods.
    ///
    /// Past the last QP sample the last jerk is held. An empty `jerks` slice
    /// integrates with zero jerk.
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn interpolate(&self, initial: &Vector3<f64>, jerks: &[f64]) -> AxisTrajectory {
        let mut traj = AxisTrajectory::zeros(self.nb_samples);
        let mut state = *initial;
        let mut t = 0.0;

        for i in 0..self.nb_samples {
            let target = (i + 1) as f64 * self.actuation_period;
            while t < target - BOUNDARY_EPS {
                let idx = ((t + BOUNDARY_EPS) / self.qp_period).floor() as usize;
                let (jerk, boundary) = match jerks.len() {
                    0 => (0.0, f64::INFINITY),
                    len if idx + 1 >= len => (jerks[len - 1], f64::INFINITY),
                    _ => (jerks[idx], (idx + 1) as f64 * self.qp_period),
                };
                let step = target.min(boundary) - t;
                state = integrate_jerk(&state, jerk, step);
                t += step;
            }
            traj.position[i] = state[0];
            traj.velocity[i] = state[1];
            traj.acceleration[i] = state[2];
        }

        traj
    }
}
