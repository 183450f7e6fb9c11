//! Shared test fixtures and utilities for walkgen crates.
//!
//! Provides the reference scenario configuration, helpers that step a
//! walkgen over a time grid, and deterministic RNG setup.

pub mod drive;
pub mod fixtures;
pub mod rng;

// ---------------------------------------------------------------------------
// Re-exports for convenience
// ---------------------------------------------------------------------------

pub use drive::{drive, time_grid};
pub use fixtures::{SCENARIO_PERIOD, scenario_mpc_data, scenario_robot_data, scenario_walkgen};
pub use rng::{jittered_times, seeded_rng};
