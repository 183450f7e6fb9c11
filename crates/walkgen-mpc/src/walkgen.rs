//! The walking pattern generator: deadlines, double-buffered references and
//! the orientation-then-translation solve cycle.
//!
//! # Timing
//!
//! `online(t)` compares the caller's clock against two deadlines:
//!
//! - the *update* deadline, paced by the QP sampling period, moves the
//!   rolling window forward one horizon sample;
//! - the *feedback* deadline, paced by the MPC sampling period, triggers a
//!   new solve.
//!
//! Between feedback deadlines `online` hands back the stored solution
//! untouched.
//!
//! # References
//!
//! Setters write the *staged* velocity and position references. The staged
//! buffers are copied into the *current* ones only when a solve is
//! triggered, so a solve always sees one consistent snapshot.
//!
//! `Walkgen` is `Send + Sync` but not internally synchronised: callers that
//! share it across threads wrap it in a lock.

use tracing::{debug, info, trace, warn};
use walkgen_core::{
    Axis, BodyType, ConfigError, Deadline, MpcData, QpSolverType, RobotData, SubProblem,
    WalkgenConfig, WalkgenError,
};

use crate::dynamics::RigidBodySystem;
use crate::orientation::OrientationGenerator;
use crate::qp::{QpProblem, QpSolver, WarmStart, create_qp_solver};
use crate::translation::TranslationGenerator;
use crate::types::{AxisSequence, BodyState, MpcSolution, QpRecord, Reference};

/// Construct an uninitialised walkgen using the `solver_type` backend for
/// both sub-problems.
pub fn create_walkgen(solver_type: QpSolverType) -> Walkgen {
    Walkgen::new(solver_type)
}

/// Receding-horizon CoM/base trajectory generator.
pub struct Walkgen {
    solver_type: QpSolverType,
    orientation_solver: Box<dyn QpSolver>,
    translation_solver: Box<dyn QpSolver>,

    robot_data: RobotData,
    mpc_data: MpcData,

    system: RigidBodySystem,
    orientation: OrientationGenerator,
    translation: TranslationGenerator,
    solution: MpcSolution,

    vel_ref: Reference,
    new_vel_ref: Reference,
    pos_ref: Reference,
    new_pos_ref: Reference,

    current_time: f64,
    current_real_time: f64,
    update_deadline: Deadline,
    feedback_deadline: Deadline,
    /// Window advances since the last solve.
    pending_shift: usize,
    warm_start_valid: bool,
    initialized: bool,
}

impl std::fmt::Debug for Walkgen {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Walkgen")
            .field("solver_type", &self.solver_type)
            .field("initialized", &self.initialized)
            .field("current_time", &self.current_time)
            .field("current_real_time", &self.current_real_time)
            .field("dynamics_revision", &self.system.revision())
            .finish_non_exhaustive()
    }
}

impl Walkgen {
    pub fn new(solver_type: QpSolverType) -> Self {
        Self {
            solver_type,
            orientation_solver: create_qp_solver(solver_type),
            translation_solver: create_qp_solver(solver_type),
            robot_data: RobotData::default(),
            mpc_data: MpcData::default(),
            system: RigidBodySystem::new(),
            orientation: OrientationGenerator::new(),
            translation: TranslationGenerator::new(),
            solution: MpcSolution::sized(0, 0),
            vel_ref: Reference::zeros(0),
            new_vel_ref: Reference::zeros(0),
            pos_ref: Reference::zeros(0),
            new_pos_ref: Reference::zeros(0),
            current_time: 0.0,
            current_real_time: 0.0,
            update_deadline: Deadline::new(),
            feedback_deadline: Deadline::new(),
            pending_shift: 0,
            warm_start_valid: false,
            initialized: false,
        }
    }

    /// Construct and initialise from a loaded configuration.
    pub fn from_config(config: &WalkgenConfig) -> Result<Self, ConfigError> {
        let mut walkgen = Self::new(config.solver);
        walkgen.init(config.robot.clone(), config.mpc.clone())?;
        Ok(walkgen)
    }

    // -----------------------------------------------------------------------
    // Configuration
    // -----------------------------------------------------------------------

    /// Configure robot and sampling.
    ///
    /// The first call, or any change to heights, masses, gravity, periods or
    /// horizon length, rebuilds everything: dynamics, objectives, body states,
    /// timing, buffers and the solution. A change confined to limits or
    /// weights only recomputes the objectives. Identical data is a no-op.
    ///
    /// Nothing is modified when validation fails.
    pub fn init(&mut self, robot: RobotData, mpc: MpcData) -> Result<(), ConfigError> {
        robot.validate()?;
        mpc.validate()?;

        let full_rebuild = !self.initialized
            || !self.robot_data.same_dynamics(&robot)
            || !self.mpc_data.same_sampling(&mpc);

        if full_rebuild {
            self.robot_data = robot;
            self.mpc_data = mpc;
            self.rebuild();
        } else if robot != self.robot_data || mpc != self.mpc_data {
            self.robot_data = robot;
            self.mpc_data = mpc;
            self.precompute_objectives();
            debug!(
                ponderation = self.mpc_data.ponderation.active,
                "walkgen objectives recomputed"
            );
        } else {
            trace!("walkgen init with unchanged configuration");
        }
        Ok(())
    }

    /// Configure the robot, keeping the current sampling.
    pub fn init_robot(&mut self, robot: RobotData) -> Result<(), ConfigError> {
        let mpc = self.mpc_data.clone();
        self.init(robot, mpc)
    }

    /// Configure the sampling, keeping the current robot.
    pub fn init_mpc(&mut self, mpc: MpcData) -> Result<(), ConfigError> {
        let robot = self.robot_data.clone();
        self.init(robot, mpc)
    }

    fn rebuild(&mut self) {
        let n = self.mpc_data.nb_samples_qp;

        self.system.init(&self.robot_data);
        self.system.compute_dynamics(&self.mpc_data);
        self.system.reset_states();
        self.precompute_objectives();

        for reference in [
            &mut self.vel_ref,
            &mut self.new_vel_ref,
            &mut self.pos_ref,
            &mut self.new_pos_ref,
        ] {
            reference.resize(n);
        }
        self.solution = MpcSolution::sized(n, self.mpc_data.nb_samples_control());

        self.current_time = 0.0;
        self.current_real_time = 0.0;
        self.update_deadline.reset();
        self.feedback_deadline.reset();
        self.pending_shift = 0;
        self.warm_start_valid = false;
        self.orientation_solver.reset();
        self.translation_solver.reset();
        self.initialized = true;

        info!(
            nb_samples_qp = n,
            qp_period = self.mpc_data.qp_sampling_period,
            mpc_period = self.mpc_data.mpc_sampling_period,
            actuation_period = self.mpc_data.actuation_sampling_period,
            revision = self.system.revision(),
            "walkgen rebuilt"
        );
    }

    fn precompute_objectives(&mut self) {
        let weights = *self.mpc_data.ponderation.active_set();
        self.orientation.precompute_objective(&self.system, &weights);
        self.translation.precompute_objective(&self.system, &weights);
    }

    /// Switch the cost regime used from the next solve on.
    pub fn set_active_ponderation(&mut self, index: usize) -> Result<(), ConfigError> {
        let len = self.mpc_data.ponderation.sets.len();
        if index >= len {
            return Err(ConfigError::InvalidPonderation { index, len });
        }
        self.mpc_data.ponderation.active = index;
        if self.initialized {
            self.precompute_objectives();
        }
        debug!(index, "active ponderation changed");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Step
    // -----------------------------------------------------------------------

    /// Advance the generator to caller time `time`.
    ///
    /// Returns the stored solution, freshly computed when the feedback
    /// deadline was crossed (`new_traj` is then true). With `preview`, a new
    /// solution's end state becomes the live body state.
    ///
    /// On a solver failure the stored solution keeps its previous trajectory,
    /// the next solve starts cold and the error is returned.
    pub fn online(&mut self, time: f64, preview: bool) -> Result<&MpcSolution, WalkgenError> {
        if !self.initialized {
            return Err(WalkgenError::NotInitialized);
        }

        self.current_real_time = time;
        self.solution.new_traj = false;

        if self.update_deadline.is_exceeded(time) {
            self.update_deadline.advance(self.mpc_data.qp_sampling_period);
            self.current_time = time;
            self.pending_shift += 1;
        }

        if self.feedback_deadline.is_exceeded(time) {
            self.feedback_deadline.advance(self.mpc_data.mpc_sampling_period);
            self.solve_cycle(time, preview)?;
        } else {
            trace!(time, "reusing previous trajectory");
        }

        Ok(&self.solution)
    }

    /// [`online`](Self::online) one MPC period after the last caller time.
    pub fn online_advance(&mut self, preview: bool) -> Result<&MpcSolution, WalkgenError> {
        let time = self.current_real_time + self.mpc_data.mpc_sampling_period;
        self.online(time, preview)
    }

    fn solve_cycle(&mut self, time: f64, preview: bool) -> Result<(), WalkgenError> {
        self.orientation_solver.reset();
        self.translation_solver.reset();
        self.vel_ref.clone_from(&self.new_vel_ref);
        self.pos_ref.clone_from(&self.new_pos_ref);
        let shift = std::mem::take(&mut self.pending_shift);

        let mut candidate = self.solution.clone();
        if let Err(err) = self.solve_sub_problems(&mut candidate, shift) {
            self.warm_start_valid = false;
            warn!(time, error = %err, "solve failed, keeping previous trajectory");
            return Err(err);
        }

        candidate.new_traj = true;
        candidate.qp_time = self.current_time;
        self.system.interpolate_bodies(&mut candidate, time);
        self.solution = candidate;
        self.warm_start_valid = true;

        if preview {
            self.system.update_body_state(&self.solution);
        }
        Ok(())
    }

    /// Orientation first: translation reads its predicted yaw.
    fn solve_sub_problems(&mut self, candidate: &mut MpcSolution, shift: usize) -> Result<(), WalkgenError> {
        let previous = self.warm_start_valid.then_some(&self.solution);

        self.orientation
            .compute_reference_vector(&self.vel_ref, &self.pos_ref);
        self.orientation.build_objective(&self.system);
        self.orientation
            .build_constraints(&self.system, &self.robot_data);
        let orientation_seed = self
            .orientation
            .compute_warm_start(previous.map(|s| &s.orientation), shift);
        run_solver(
            self.orientation_solver.as_mut(),
            self.orientation.problem(),
            orientation_seed.as_ref(),
            SubProblem::Orientation,
            &mut candidate.orientation,
            shift,
        )?;

        let yaw = self
            .orientation
            .predicted_yaw(&self.system, &candidate.orientation.solution);

        self.translation
            .compute_reference_vector(&self.vel_ref, &self.pos_ref, &yaw);
        self.translation.build_objective(&self.system);
        self.translation
            .build_constraints(&self.system, &self.robot_data, &yaw);
        let translation_seed = self
            .translation
            .compute_warm_start(previous.map(|s| &s.translation), shift);
        run_solver(
            self.translation_solver.as_mut(),
            self.translation.problem(),
            translation_seed.as_ref(),
            SubProblem::Translation,
            &mut candidate.translation,
            shift,
        )?;

        candidate.use_warm_start = orientation_seed.is_some() && translation_seed.is_some();
        Ok(())
    }

    // -----------------------------------------------------------------------
    // References
    // -----------------------------------------------------------------------

    fn check_length(&self, sequence: &AxisSequence) -> Result<(), WalkgenError> {
        let expected = self.mpc_data.nb_samples_qp;
        for got in [sequence.x.len(), sequence.y.len(), sequence.yaw.len()] {
            if got != expected {
                return Err(WalkgenError::ReferenceLength { expected, got });
            }
        }
        Ok(())
    }

    /// Stage a robot-frame velocity for every horizon sample.
    pub fn vel_reference_in_local_frame(&mut self, dx: f64, dy: f64, dyaw: f64) {
        self.new_vel_ref.local.fill(dx, dy, dyaw);
    }

    pub fn vel_reference_in_local_frame_sequence(
        &mut self,
        sequence: &AxisSequence,
    ) -> Result<(), WalkgenError> {
        self.check_length(sequence)?;
        self.new_vel_ref.local.clone_from(sequence);
        Ok(())
    }

    /// Stage a world-frame velocity for every horizon sample.
    pub fn vel_reference_in_global_frame(&mut self, dx: f64, dy: f64, dyaw: f64) {
        self.new_vel_ref.global.fill(dx, dy, dyaw);
    }

    pub fn vel_reference_in_global_frame_sequence(
        &mut self,
        sequence: &AxisSequence,
    ) -> Result<(), WalkgenError> {
        self.check_length(sequence)?;
        self.new_vel_ref.global.clone_from(sequence);
        Ok(())
    }

    /// Stage a world-frame position target for every horizon sample.
    pub fn pos_reference_in_global_frame(&mut self, x: f64, y: f64, yaw: f64) {
        self.new_pos_ref.global.fill(x, y, yaw);
    }

    pub fn pos_reference_in_global_frame_sequence(
        &mut self,
        sequence: &AxisSequence,
    ) -> Result<(), WalkgenError> {
        self.check_length(sequence)?;
        self.new_pos_ref.global.clone_from(sequence);
        Ok(())
    }

    /// Velocity reference used by the last solve.
    pub const fn velocity_reference(&self) -> &Reference {
        &self.vel_ref
    }

    /// Velocity reference waiting for the next solve.
    pub const fn staged_velocity_reference(&self) -> &Reference {
        &self.new_vel_ref
    }

    pub const fn position_reference(&self) -> &Reference {
        &self.pos_ref
    }

    pub const fn staged_position_reference(&self) -> &Reference {
        &self.new_pos_ref
    }

    // -----------------------------------------------------------------------
    // Bodies
    // -----------------------------------------------------------------------

    pub const fn body_state(&self, body: BodyType) -> &BodyState {
        self.system.body(body).state()
    }

    /// Overwrite the live state of `body`. The yaw part is shared by both
    /// bodies.
    pub fn set_body_state(&mut self, body: BodyType, state: BodyState) {
        self.system.set_body_state(body, state);
    }

    /// Push `body` along `axis` as if hit by `force` newtons. Yaw pushes act
    /// on the shared yaw axis; the vertical axis is rejected.
    pub fn apply_perturbation_force(
        &mut self,
        axis: Axis,
        body: BodyType,
        force: f64,
    ) -> Result<(), WalkgenError> {
        self.system.apply_perturbation_force(axis, body, force)?;
        debug!(%axis, %body, force, "perturbation applied");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub const fn solution(&self) -> &MpcSolution {
        &self.solution
    }

    pub const fn mpc_data(&self) -> &MpcData {
        &self.mpc_data
    }

    pub const fn robot_data(&self) -> &RobotData {
        &self.robot_data
    }

    pub const fn solver_type(&self) -> QpSolverType {
        self.solver_type
    }

    /// Caller time at the last window advance.
    pub const fn current_time(&self) -> f64 {
        self.current_time
    }

    /// Caller time of the last `online` call.
    pub const fn current_real_time(&self) -> f64 {
        self.current_real_time
    }

    pub const fn dynamics_revision(&self) -> u64 {
        self.system.revision()
    }

    pub const fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub const fn rigid_body_system(&self) -> &RigidBodySystem {
        &self.system
    }
}

fn run_solver(
    solver: &mut dyn QpSolver,
    problem: &QpProblem,
    warm_start: Option<&WarmStart>,
    which: SubProblem,
    record: &mut QpRecord,
    shift: usize,
) -> Result<(), WalkgenError> {
    let output = solver
        .solve(problem, warm_start)
        .map_err(|source| WalkgenError::Solve {
            problem: which,
            source,
        })?;
    debug!(
        problem = %which,
        solver = %solver.kind(),
        iterations = output.iterations,
        warm_start = warm_start.is_some(),
        shift,
        "qp solved"
    );
    record.record(problem, warm_start, output);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use walkgen_core::Ponderation;

    fn small_mpc() -> MpcData {
        MpcData {
            qp_sampling_period: 0.02,
            mpc_sampling_period: 0.02,
            actuation_sampling_period: 0.01,
            nb_samples_qp: 10,
            ponderation: Ponderation::default(),
        }
    }

    fn walkgen() -> Walkgen {
        let mut walkgen = create_walkgen(QpSolverType::Clarabel);
        walkgen.init(RobotData::default(), small_mpc()).unwrap();
        walkgen
    }

    #[test]
    fn online_before_init_fails() {
        let mut walkgen = create_walkgen(QpSolverType::Clarabel);
        assert!(matches!(walkgen.online(0.02, false), Err(WalkgenError::NotInitialized)));
    }

    #[test]
    fn from_config_initialises() {
        let config =
            WalkgenConfig::from_toml_str("solver = \"admm\"\n[mpc]\nnb_samples_qp = 8\n").unwrap();
        let walkgen = Walkgen::from_config(&config).unwrap();
        assert_eq!(walkgen.solver_type(), QpSolverType::Admm);
        assert!(walkgen.is_initialized());
        assert_eq!(walkgen.velocity_reference().len(), 8);
    }

    #[test]
    fn invalid_config_leaves_walkgen_untouched() {
        let mut walkgen = create_walkgen(QpSolverType::Clarabel);
        let bad = MpcData {
            mpc_sampling_period: 0.2,
            ..small_mpc()
        };
        assert!(matches!(
            walkgen.init(RobotData::default(), bad),
            Err(ConfigError::PeriodOrdering { .. })
        ));
        assert!(!walkgen.is_initialized());
        assert_eq!(walkgen.dynamics_revision(), 0);
    }

    #[test]
    fn first_call_at_zero_does_not_solve() {
        let mut walkgen = walkgen();
        let solution = walkgen.online(0.0, false).unwrap();
        assert!(!solution.new_traj);
    }

    #[test]
    fn feedback_deadline_triggers_solve() {
        let mut walkgen = walkgen();
        let solution = walkgen.online(0.02, false).unwrap();
        assert!(solution.new_traj);
        assert_relative_eq!(solution.time, 0.02);
        assert_eq!(solution.com.x.len(), 2);
        assert!(!solution.use_warm_start);

        // Same instant: not past the deadline the solve just set.
        let again = walkgen.online(0.02, false).unwrap();
        assert!(!again.new_traj);
    }

    #[test]
    fn second_solve_is_warm_started() {
        let mut walkgen = walkgen();
        walkgen.vel_reference_in_local_frame(0.2, 0.0, 0.0);
        walkgen.online(0.02, false).unwrap();
        let solution = walkgen.online(0.04, false).unwrap();
        assert!(solution.new_traj);
        assert!(solution.use_warm_start);
    }

    #[test]
    fn robot_change_policy() {
        let mut walkgen = walkgen();
        assert_eq!(walkgen.dynamics_revision(), 1);

        let limits_only = RobotData {
            base_velocity_limit: 2.0,
            ..RobotData::default()
        };
        walkgen.init_robot(limits_only).unwrap();
        assert_eq!(walkgen.dynamics_revision(), 1);
        assert_relative_eq!(walkgen.robot_data().base_velocity_limit, 2.0);

        let taller = RobotData {
            com_height: 0.9,
            ..RobotData::default()
        };
        walkgen.init_robot(taller).unwrap();
        assert_eq!(walkgen.dynamics_revision(), 2);
        assert_relative_eq!(walkgen.body_state(BodyType::Com).z[0], 0.9);
    }

    #[test]
    fn sampling_change_resizes_buffers() {
        let mut walkgen = walkgen();
        walkgen.vel_reference_in_local_frame(0.1, 0.0, 0.0);
        walkgen
            .init_mpc(MpcData {
                nb_samples_qp: 14,
                ..small_mpc()
            })
            .unwrap();
        assert_eq!(walkgen.staged_velocity_reference().len(), 14);
        assert_relative_eq!(walkgen.staged_velocity_reference().local.x[13], 0.1);
        assert_eq!(walkgen.solution().translation.solution.len(), 56);
    }

    #[test]
    fn sequence_length_is_checked() {
        let mut walkgen = walkgen();
        let short = AxisSequence::zeros(3);
        assert!(matches!(
            walkgen.vel_reference_in_global_frame_sequence(&short),
            Err(WalkgenError::ReferenceLength { expected: 10, got: 3 })
        ));
        let mut ok = AxisSequence::zeros(10);
        ok.x[9] = 1.0;
        walkgen.pos_reference_in_global_frame_sequence(&ok).unwrap();
        assert_relative_eq!(walkgen.staged_position_reference().global.x[9], 1.0);
        assert_relative_eq!(walkgen.position_reference().global.x[9], 0.0);
    }

    #[test]
    fn ponderation_switch() {
        let mut walkgen = walkgen();
        assert!(matches!(
            walkgen.set_active_ponderation(7),
            Err(ConfigError::InvalidPonderation { index: 7, len: 2 })
        ));
        walkgen.set_active_ponderation(Ponderation::POSITIONING).unwrap();
        assert_eq!(walkgen.mpc_data().ponderation.active, Ponderation::POSITIONING);
    }

    #[test]
    fn online_advance_steps_one_mpc_period() {
        let mut walkgen = walkgen();
        walkgen.online_advance(false).unwrap();
        assert_relative_eq!(walkgen.current_real_time(), 0.02);
        assert!(walkgen.solution().new_traj);
    }

    #[test]
    fn failed_solve_keeps_previous_trajectory() {
        let mut walkgen = walkgen();
        walkgen.online(0.02, false).unwrap();
        let before = walkgen.solution().clone();

        // Far beyond what the acceleration bound can bring back within one sample.
        let mut state = walkgen.body_state(BodyType::Base).clone();
        state.x[1] = 100.0;
        walkgen.set_body_state(BodyType::Base, state);

        let err = walkgen.online(0.04, false).unwrap_err();
        assert!(matches!(
            err,
            WalkgenError::Solve {
                problem: SubProblem::Translation,
                ..
            }
        ));
        let after = walkgen.solution();
        assert!(!after.new_traj);
        assert_eq!(after.translation, before.translation);
        assert_eq!(after.com, before.com);

        walkgen.set_body_state(BodyType::Base, BodyState::at_rest(0.0, 0.0, 0.26));
        let recovered = walkgen.online(0.06, false).unwrap();
        assert!(recovered.new_traj);
        assert!(!recovered.use_warm_start);
    }

    #[test]
    fn failed_orientation_leaves_both_records() {
        let mut walkgen = walkgen();
        walkgen.vel_reference_in_local_frame(0.1, 0.0, 0.2);
        walkgen.online(0.02, false).unwrap();
        let before = walkgen.solution().clone();

        // Yaw rate far above its bound with the yaw acceleration capped.
        let mut state = walkgen.body_state(BodyType::Base).clone();
        state.yaw[1] = 100.0;
        walkgen.set_body_state(BodyType::Base, state);

        let err = walkgen.online(0.04, false).unwrap_err();
        assert!(matches!(
            err,
            WalkgenError::Solve {
                problem: SubProblem::Orientation,
                ..
            }
        ));
        let after = walkgen.solution();
        assert!(!after.new_traj);
        assert_eq!(after.orientation, before.orientation);
        assert_eq!(after.translation, before.translation);
        assert_eq!(after.base, before.base);
        // The window advance was spent on the failed attempt.
        assert_eq!(walkgen.pending_shift, 0);
        assert!(!walkgen.warm_start_valid);

        walkgen.set_body_state(BodyType::Base, BodyState::at_rest(0.0, 0.0, 0.26));
        let recovered = walkgen.online(0.06, false).unwrap();
        assert!(recovered.new_traj);
        assert!(!recovered.use_warm_start);
    }

    #[test]
    fn preview_commits_end_state() {
        let mut walkgen = walkgen();
        walkgen.vel_reference_in_local_frame(0.3, 0.0, 0.0);
        walkgen.online(0.02, true).unwrap();
        let end = walkgen.solution().base.x.last_state().unwrap();
        assert_eq!(walkgen.body_state(BodyType::Base).x, end);
    }

    #[test]
    fn perturbation_reaches_body_state() {
        let mut walkgen = walkgen();
        walkgen
            .apply_perturbation_force(Axis::Y, BodyType::Base, 26.0)
            .unwrap();
        assert_relative_eq!(walkgen.body_state(BodyType::Base).y[2], 2.0, epsilon = 1e-12);
    }
}
