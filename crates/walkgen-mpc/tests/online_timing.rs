//! Integration tests: deadline pacing, reuse, double-buffered references and
//! warm-start chaining of `Walkgen::online`.

use walkgen_core::{ConfigError, MpcData, QpSolverType, RobotData, WalkgenError};
use walkgen_mpc::create_walkgen;
use walkgen_mpc::qp::shift_blocks;
use walkgen_test_utils::{
    SCENARIO_PERIOD, drive, jittered_times, scenario_mpc_data, scenario_robot_data,
    scenario_walkgen, seeded_rng, time_grid,
};

const N: usize = 10;

#[test]
fn misordered_periods_are_rejected_before_any_solve() {
    let mut walkgen = create_walkgen(QpSolverType::Clarabel);
    let bad = MpcData {
        actuation_sampling_period: 0.05,
        ..scenario_mpc_data()
    };
    assert!(matches!(
        walkgen.init(scenario_robot_data(), bad),
        Err(ConfigError::PeriodOrdering { .. })
    ));
    assert!(matches!(
        walkgen.online(0.02, false),
        Err(WalkgenError::NotInitialized)
    ));

    let zero = MpcData {
        qp_sampling_period: 0.0,
        ..scenario_mpc_data()
    };
    assert!(matches!(
        walkgen.init(scenario_robot_data(), zero),
        Err(ConfigError::NonPositivePeriod { .. })
    ));

    let empty = MpcData {
        nb_samples_qp: 0,
        ..scenario_mpc_data()
    };
    assert!(matches!(
        walkgen.init(scenario_robot_data(), empty),
        Err(ConfigError::EmptyHorizon)
    ));
    assert!(!walkgen.is_initialized());
}

#[test]
fn calls_before_the_next_deadline_reuse_the_solution() {
    let mut walkgen = scenario_walkgen(QpSolverType::Clarabel);
    walkgen.vel_reference_in_local_frame(0.25, 0.0, 0.0);

    let mut first = walkgen.online(0.02, false).unwrap().clone();
    assert!(first.new_traj);
    first.new_traj = false;

    for t in [0.02, 0.021, 0.03, 0.039, 0.04] {
        let again = walkgen.online(t, false).unwrap();
        assert!(!again.new_traj, "t = {t}");
        assert_eq!(*again, first, "t = {t}");
    }
}

#[test]
fn oversampling_yields_one_solve_per_interval() {
    let mut walkgen = scenario_walkgen(QpSolverType::Clarabel);
    walkgen.vel_reference_in_local_frame(0.2, 0.0, 0.0);
    let mut rng = seeded_rng(11);

    for interval in 1..=25 {
        let end = f64::from(interval) * SCENARIO_PERIOD;
        let start = end - SCENARIO_PERIOD;
        let mut times = jittered_times(&mut rng, start, end, 6);
        times.push(end);

        let solutions = drive(&mut walkgen, times, true).unwrap();
        let solves = solutions.iter().filter(|s| s.new_traj).count();
        assert_eq!(solves, 1, "interval {interval}");
        assert!(solutions[0].new_traj, "the first call past the deadline solves");
    }
}

#[test]
fn staged_references_wait_for_the_next_solve() {
    let mut walkgen = scenario_walkgen(QpSolverType::Clarabel);
    let before = walkgen.online(0.02, false).unwrap().clone();

    walkgen.vel_reference_in_local_frame(0.3, 0.0, 0.0);
    walkgen.pos_reference_in_global_frame(1.0, 0.0, 0.0);
    assert_eq!(walkgen.velocity_reference().local.x[0], 0.0);
    assert_eq!(walkgen.staged_velocity_reference().local.x[0], 0.3);

    let mut expected = before.clone();
    expected.new_traj = false;
    let between = walkgen.online(0.03, false).unwrap();
    assert_eq!(*between, expected);

    let after = walkgen.online(0.04, false).unwrap().clone();
    assert!(after.new_traj);
    assert_eq!(walkgen.velocity_reference().local.x[N - 1], 0.3);
    assert_eq!(walkgen.position_reference().global.x[0], 1.0);
    assert!(after.base.x.velocity[1] > before.base.x.velocity[1] + 1e-4);
}

#[test]
fn consecutive_solves_chain_warm_starts() {
    let mut walkgen = scenario_walkgen(QpSolverType::Clarabel);
    walkgen.vel_reference_in_local_frame(0.25, 0.0, 0.0);

    let first = walkgen.online(0.02, false).unwrap().clone();
    assert!(!first.use_warm_start);
    assert!(first.translation.initial_solution.iter().all(|&v| v == 0.0));

    let second = walkgen.online(0.04, false).unwrap().clone();
    assert!(second.use_warm_start);

    let expected = shift_blocks(first.translation.solution.as_slice(), N, 1);
    assert_eq!(second.translation.initial_solution.as_slice(), expected.as_slice());
    assert!(second.translation.initial_solution.amax() > 0.0);

    let expected_duals = shift_blocks(first.translation.duals.as_slice(), N, 1);
    assert_eq!(second.translation.initial_duals.as_slice(), expected_duals.as_slice());

    let expected_yaw = shift_blocks(first.orientation.solution.as_slice(), N, 1);
    assert_eq!(second.orientation.initial_solution.as_slice(), expected_yaw.as_slice());
}

#[test]
fn identical_reinit_is_cheap_and_keeps_references() {
    let mut walkgen = scenario_walkgen(QpSolverType::Clarabel);
    walkgen.vel_reference_in_local_frame(0.1, 0.05, 0.0);
    drive(&mut walkgen, time_grid(0.0, 0.1, SCENARIO_PERIOD), true).unwrap();

    let revision = walkgen.dynamics_revision();
    let staged = walkgen.staged_velocity_reference().clone();
    let solution = walkgen.solution().clone();
    let real_time = walkgen.current_real_time();

    walkgen
        .init(scenario_robot_data(), scenario_mpc_data())
        .unwrap();

    assert_eq!(walkgen.dynamics_revision(), revision);
    assert_eq!(*walkgen.staged_velocity_reference(), staged);
    assert_eq!(*walkgen.solution(), solution);
    assert_eq!(walkgen.current_real_time(), real_time);

    // A different CoM height does rebuild.
    let taller = RobotData {
        com_height: 0.8,
        ..scenario_robot_data()
    };
    walkgen.init_robot(taller).unwrap();
    assert_eq!(walkgen.dynamics_revision(), revision + 1);
    assert_eq!(walkgen.current_real_time(), 0.0);
    assert_eq!(walkgen.staged_velocity_reference().local.x[N - 1], 0.1);
}
