//! The reference scenario: a 10-sample horizon sampled every 0.02 s with
//! 0.01 s actuation output.

use walkgen_core::{MpcData, Ponderation, QpSolverType, RobotData};
use walkgen_mpc::{Walkgen, create_walkgen};

/// Caller cadence of the scenario (equal to the MPC and QP periods).
pub const SCENARIO_PERIOD: f64 = 0.02;

pub fn scenario_mpc_data() -> MpcData {
    MpcData {
        qp_sampling_period: SCENARIO_PERIOD,
        mpc_sampling_period: SCENARIO_PERIOD,
        actuation_sampling_period: 0.01,
        nb_samples_qp: 10,
        ponderation: Ponderation::default(),
    }
}

pub fn scenario_robot_data() -> RobotData {
    RobotData::default()
}

/// Initialised walkgen on the scenario configuration.
///
/// # Panics
///
/// Panics if the scenario configuration is rejected.
pub fn scenario_walkgen(solver: QpSolverType) -> Walkgen {
    let mut walkgen = create_walkgen(solver);
    walkgen
        .init(scenario_robot_data(), scenario_mpc_data())
        .expect("scenario configuration is valid");
    walkgen
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_config_is_valid() {
        assert!(scenario_mpc_data().validate().is_ok());
        assert_eq!(scenario_mpc_data().nb_samples_control(), 2);
        let walkgen = scenario_walkgen(QpSolverType::Clarabel);
        assert!(walkgen.is_initialized());
    }
}
