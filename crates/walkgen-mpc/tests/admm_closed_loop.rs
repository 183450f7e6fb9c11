//! Integration tests: the operator-splitting backend driving the reference
//! scenario, where each solve is seeded from the previous one.

use walkgen_core::{BodyType, QpSolverType};
use walkgen_mpc::MpcSolution;
use walkgen_test_utils::{SCENARIO_PERIOD, drive, scenario_walkgen, time_grid};

fn fresh(solutions: &[MpcSolution]) -> Vec<&MpcSolution> {
    solutions.iter().filter(|s| s.new_traj).collect()
}

#[test]
fn admm_tracks_constant_velocity() {
    let mut walkgen = scenario_walkgen(QpSolverType::Admm);
    walkgen.vel_reference_in_local_frame(0.25, 0.0, 0.0);

    let solutions = drive(&mut walkgen, time_grid(0.0, 2.0, SCENARIO_PERIOD), true)
        .expect("every solve converges");
    assert_eq!(fresh(&solutions).len(), 100);

    let base = walkgen.body_state(BodyType::Base);
    assert!((base.x[1] - 0.25).abs() < 0.03, "base vx = {}", base.x[1]);
    assert!(base.y[1].abs() < 1e-3);

    let last = walkgen.solution();
    for i in 0..last.cop_x.len() {
        assert!((last.cop_x[i] - last.base.x.position[i]).abs() <= 0.1 + 1e-3);
    }
}

#[test]
fn admm_warm_starts_save_iterations() {
    let mut walkgen = scenario_walkgen(QpSolverType::Admm);
    walkgen.vel_reference_in_local_frame(0.25, 0.0, 0.0);

    let solutions = drive(&mut walkgen, time_grid(0.0, 0.2, SCENARIO_PERIOD), true)
        .expect("every solve converges");
    let solves = fresh(&solutions);
    assert_eq!(solves.len(), 10);

    let cold = solves[0];
    assert!(!cold.use_warm_start);
    let warm = &solves[1..];
    assert!(warm.iter().all(|s| s.use_warm_start));
    assert!(warm.iter().all(|s| s.translation.initial_solution.amax() > 0.0));

    #[allow(clippy::cast_precision_loss)]
    let mean = |pick: fn(&MpcSolution) -> u32| {
        warm.iter().map(|s| f64::from(pick(s))).sum::<f64>() / warm.len() as f64
    };
    let warm_translation = mean(|s| s.translation.iterations);
    assert!(
        warm_translation < f64::from(cold.translation.iterations),
        "translation: cold {} vs warm mean {warm_translation}",
        cold.translation.iterations
    );
    let warm_orientation = mean(|s| s.orientation.iterations);
    assert!(warm_orientation <= f64::from(cold.orientation.iterations));
}
