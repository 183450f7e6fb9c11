//! Helpers stepping a walkgen through a sequence of caller times.

use walkgen_core::WalkgenError;
use walkgen_mpc::{MpcSolution, Walkgen};

/// `start, start + period, ...` up to and including `end`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
pub fn time_grid(start: f64, end: f64, period: f64) -> Vec<f64> {
    let steps = ((end - start) / period).round() as usize;
    (0..=steps).map(|i| start + i as f64 * period).collect()
}

/// Call `online` at every time in `times`, collecting a copy of each
/// returned solution. Stops at the first error.
pub fn drive(
    walkgen: &mut Walkgen,
    times: impl IntoIterator<Item = f64>,
    preview: bool,
) -> Result<Vec<MpcSolution>, WalkgenError> {
    times
        .into_iter()
        .map(|t| walkgen.online(t, preview).cloned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::scenario_walkgen;
    use walkgen_core::QpSolverType;

    #[test]
    fn grid_includes_both_ends() {
        let grid = time_grid(0.0, 2.0, 0.02);
        assert_eq!(grid.len(), 101);
        assert!((grid[100] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn drive_collects_one_solution_per_call() {
        let mut walkgen = scenario_walkgen(QpSolverType::Clarabel);
        let solutions = drive(&mut walkgen, time_grid(0.0, 0.1, 0.02), false).unwrap();
        assert_eq!(solutions.len(), 6);
        assert!(!solutions[0].new_traj);
        assert!(solutions[1..].iter().all(|s| s.new_traj));
    }
}
