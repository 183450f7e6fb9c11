//! Model predictive walking pattern generator for a wheeled humanoid.
//!
//! The robot is two bodies, an upper-body CoM and a mobile base, each
//! modelled per axis as a jerk-driven triple integrator. Every feedback cycle
//! the generator solves two QPs over a rolling horizon:
//!
//! 1. **Orientation**: base yaw jerks tracking the yaw-rate and yaw references
//!    under yaw rate and acceleration limits.
//! 2. **Translation**: CoM and base x/y jerks tracking the velocity/position
//!    references while keeping the CoP inside the support rectangle of the
//!    base (oriented by the yaw just computed), the CoM near the base and the
//!    base within its velocity and acceleration limits.
//!
//! The jerk plans are then resampled at the actuation period into dense
//! trajectories.
//!
//! # Architecture
//!
//! [`Walkgen`] owns a [`RigidBodySystem`] (states and condensed dynamics), the
//! two generators and one [`QpSolver`] per sub-problem, picked through
//! [`create_qp_solver`] from a [`QpSolverType`](walkgen_core::QpSolverType).

pub mod dynamics;
pub mod interpolation;
pub mod orientation;
#[cfg(feature = "bevy")]
pub mod plugin;
pub mod qp;
pub mod translation;
pub mod types;
pub mod walkgen;

pub use dynamics::{BodyDynamics, LinearDynamics, RigidBody, RigidBodySystem, build_jerk_dynamics};
pub use interpolation::{Interpolator, integrate_jerk};
pub use orientation::OrientationGenerator;
#[cfg(feature = "bevy")]
pub use plugin::{WalkgenPlugin, WalkgenResource};
pub use qp::{
    AdmmQpSolver, AdmmSettings, ClarabelQpSolver, ConstraintActivity, QpOutput, QpProblem,
    QpSolver, WarmStart, create_qp_solver,
};
pub use translation::TranslationGenerator;
pub use types::{
    AxisSequence, AxisTrajectory, BodyState, BodyTrajectory, MpcSolution, QpRecord, Reference,
};
pub use walkgen::{Walkgen, create_walkgen};
