// walkgen-core: config, errors, timing and shared identifiers for the MPC walking pattern generator.

pub mod config;
pub mod error;
pub mod time;
pub mod types;

pub use config::{MpcData, Ponderation, PonderationSet, RobotData, WalkgenConfig};
pub use error::{ConfigError, SolverError, WalkgenError};
pub use time::{Deadline, TIME_EPSILON};
pub use types::{Axis, BodyType, QpSolverType, SubProblem};
