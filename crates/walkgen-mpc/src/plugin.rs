//! Bevy ECS plugin driving a [`Walkgen`] once per frame.
//!
//! Each `Update` advances the resource's clock by one MPC sampling period and
//! calls [`Walkgen::online`] with it, so one frame is one feedback cycle.

use bevy::prelude::*;
use tracing::warn;

use crate::walkgen::Walkgen;

/// Bevy plugin for the walking pattern generator.
///
/// Insert a [`WalkgenResource`] wrapping an initialised walkgen, then add
/// this plugin.
pub struct WalkgenPlugin;

impl Plugin for WalkgenPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(Update, walkgen_online_system);
    }
}

/// Runtime state for the generator inside the ECS.
#[derive(Resource, Debug)]
pub struct WalkgenResource {
    pub walkgen: Walkgen,
    /// Commit each new end state as the live body state.
    pub preview: bool,
    /// Message of the last failed cycle, cleared by the next success.
    pub last_error: Option<String>,
    /// Number of cycles that produced a new trajectory.
    pub solves: u64,
}

impl WalkgenResource {
    pub const fn new(walkgen: Walkgen, preview: bool) -> Self {
        Self {
            walkgen,
            preview,
            last_error: None,
            solves: 0,
        }
    }
}

#[allow(clippy::needless_pass_by_value)]
fn walkgen_online_system(state: Option<ResMut<WalkgenResource>>) {
    let Some(state) = state else {
        return;
    };
    let state = state.into_inner();

    let preview = state.preview;
    match state.walkgen.online_advance(preview) {
        Ok(solution) => {
            if solution.new_traj {
                state.solves += 1;
            }
            state.last_error = None;
        }
        Err(err) => {
            warn!(error = %err, "walkgen cycle failed");
            state.last_error = Some(err.to_string());
        }
    }
}
