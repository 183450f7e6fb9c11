use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::time::TIME_EPSILON;
use crate::types::QpSolverType;

// ---------------------------------------------------------------------------
// Serde default functions
// ---------------------------------------------------------------------------

const fn default_qp_sampling_period() -> f64 {
    0.1
}
const fn default_mpc_sampling_period() -> f64 {
    0.02
}
const fn default_actuation_sampling_period() -> f64 {
    0.02
}
const fn default_nb_samples_qp() -> usize {
    16
}
const fn default_com_height() -> f64 {
    0.76
}
const fn default_base_height() -> f64 {
    0.26
}
const fn default_com_mass() -> f64 {
    17.0
}
const fn default_base_mass() -> f64 {
    13.0
}
const fn default_gravity() -> f64 {
    9.81
}
const fn default_cop_limits() -> [f64; 2] {
    [0.1, 0.1]
}
const fn default_com_limits() -> [f64; 2] {
    [0.1, 0.1]
}
const fn default_base_velocity_limit() -> f64 {
    1.4
}
const fn default_base_acceleration_limit() -> f64 {
    1.5
}
const fn default_yaw_velocity_limit() -> f64 {
    1.0
}
const fn default_yaw_acceleration_limit() -> f64 {
    2.0
}

// ---------------------------------------------------------------------------
// Ponderation
// ---------------------------------------------------------------------------

/// One cost regime: the weight of every objective term.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PonderationSet {
    /// Base velocity tracking.
    pub base_instant_velocity: f64,
    /// Base position tracking (global position reference).
    pub base_position: f64,
    /// Whole-robot CoP kept over the base.
    pub cop_centering: f64,
    /// Upper-body CoM kept over the base.
    pub com_centering: f64,
    /// Translation jerk regularisation.
    pub jerk_min: f64,
    /// Yaw rate tracking.
    pub yaw_instant_velocity: f64,
    /// Yaw position tracking.
    pub yaw_position: f64,
    /// Yaw jerk regularisation.
    pub yaw_jerk_min: f64,
}

impl PonderationSet {
    /// Follow the velocity reference, ignore the position reference.
    pub const fn tracking() -> Self {
        Self {
            base_instant_velocity: 1.0,
            base_position: 0.0,
            cop_centering: 1.0,
            com_centering: 0.1,
            jerk_min: 1e-7,
            yaw_instant_velocity: 1.0,
            yaw_position: 0.0,
            yaw_jerk_min: 1e-7,
        }
    }

    /// Converge on the position reference and stop there.
    pub const fn positioning() -> Self {
        Self {
            base_instant_velocity: 0.1,
            base_position: 1.0,
            cop_centering: 1.0,
            com_centering: 1.0,
            jerk_min: 1e-7,
            yaw_instant_velocity: 0.1,
            yaw_position: 1.0,
            yaw_jerk_min: 1e-7,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let weights = [
            ("base_instant_velocity", self.base_instant_velocity),
            ("base_position", self.base_position),
            ("cop_centering", self.cop_centering),
            ("com_centering", self.com_centering),
            ("yaw_instant_velocity", self.yaw_instant_velocity),
            ("yaw_position", self.yaw_position),
        ];
        for (field, w) in weights {
            if !w.is_finite() || w < 0.0 {
                return Err(ConfigError::InvalidValue {
                    field,
                    message: format!("weight {w} must be finite and >= 0"),
                });
            }
        }
        // The jerk terms keep both Hessians positive definite.
        for (field, w) in [("jerk_min", self.jerk_min), ("yaw_jerk_min", self.yaw_jerk_min)] {
            if !w.is_finite() || w <= 0.0 {
                return Err(ConfigError::InvalidValue {
                    field,
                    message: format!("weight {w} must be finite and > 0"),
                });
            }
        }
        Ok(())
    }
}

/// Weight sets and the index of the one in effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ponderation {
    pub sets: Vec<PonderationSet>,
    #[serde(default)]
    pub active: usize,
}

impl Ponderation {
    /// Index of [`PonderationSet::tracking`] in the default ponderation.
    pub const TRACKING: usize = 0;
    /// Index of [`PonderationSet::positioning`] in the default ponderation.
    pub const POSITIONING: usize = 1;

    /// Weights currently in effect.
    ///
    /// Only call on validated data: the active index must be in range.
    pub fn active_set(&self) -> &PonderationSet {
        &self.sets[self.active]
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.active >= self.sets.len() {
            return Err(ConfigError::InvalidPonderation {
                index: self.active,
                len: self.sets.len(),
            });
        }
        self.sets.iter().try_for_each(PonderationSet::validate)
    }
}

impl Default for Ponderation {
    fn default() -> Self {
        Self {
            sets: vec![PonderationSet::tracking(), PonderationSet::positioning()],
            active: Self::TRACKING,
        }
    }
}

// ---------------------------------------------------------------------------
// MpcData
// ---------------------------------------------------------------------------

/// Sampling and horizon configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MpcData {
    /// Duration of one horizon sample (default: 0.1 s).
    #[serde(default = "default_qp_sampling_period")]
    pub qp_sampling_period: f64,

    /// Re-solve period (default: 0.02 s). Must be <= `qp_sampling_period`.
    #[serde(default = "default_mpc_sampling_period")]
    pub mpc_sampling_period: f64,

    /// Output trajectory resolution (default: 0.02 s). Must be <= `mpc_sampling_period`.
    #[serde(default = "default_actuation_sampling_period")]
    pub actuation_sampling_period: f64,

    /// Number of QP samples in the rolling horizon (default: 16).
    #[serde(default = "default_nb_samples_qp")]
    pub nb_samples_qp: usize,

    #[serde(default)]
    pub ponderation: Ponderation,
}

impl Default for MpcData {
    fn default() -> Self {
        Self {
            qp_sampling_period: default_qp_sampling_period(),
            mpc_sampling_period: default_mpc_sampling_period(),
            actuation_sampling_period: default_actuation_sampling_period(),
            nb_samples_qp: default_nb_samples_qp(),
            ponderation: Ponderation::default(),
        }
    }
}

impl MpcData {
    /// Validate configuration. Returns Err on invalid values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let periods = [
            ("actuation_sampling_period", self.actuation_sampling_period),
            ("mpc_sampling_period", self.mpc_sampling_period),
            ("qp_sampling_period", self.qp_sampling_period),
        ];
        for (name, value) in periods {
            if !(value > 0.0) || !value.is_finite() {
                return Err(ConfigError::NonPositivePeriod { name, value });
            }
        }
        if self.mpc_sampling_period < self.actuation_sampling_period
            || self.qp_sampling_period < self.mpc_sampling_period
        {
            return Err(ConfigError::PeriodOrdering {
                actuation: self.actuation_sampling_period,
                mpc: self.mpc_sampling_period,
                qp: self.qp_sampling_period,
            });
        }
        if self.nb_samples_qp == 0 {
            return Err(ConfigError::EmptyHorizon);
        }
        self.ponderation.validate()
    }

    /// Number of actuation samples produced per feedback cycle.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn nb_samples_control(&self) -> usize {
        ((self.mpc_sampling_period / self.actuation_sampling_period).round() as usize).max(1)
    }

    /// Total duration covered by the horizon.
    #[allow(clippy::cast_precision_loss)]
    pub fn horizon_duration(&self) -> f64 {
        self.nb_samples_qp as f64 * self.qp_sampling_period
    }

    /// Whether `other` samples time the same way (periods and horizon length).
    pub fn same_sampling(&self, other: &Self) -> bool {
        self.nb_samples_qp == other.nb_samples_qp
            && (self.qp_sampling_period - other.qp_sampling_period).abs() <= TIME_EPSILON
            && (self.mpc_sampling_period - other.mpc_sampling_period).abs() <= TIME_EPSILON
            && (self.actuation_sampling_period - other.actuation_sampling_period).abs()
                <= TIME_EPSILON
    }
}

// ---------------------------------------------------------------------------
// RobotData
// ---------------------------------------------------------------------------

/// Physical parameters and kinematic limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotData {
    /// Height of the upper-body CoM above the ground (m).
    #[serde(default = "default_com_height")]
    pub com_height: f64,

    /// Height of the base CoM above the ground (m).
    #[serde(default = "default_base_height")]
    pub base_height: f64,

    /// Upper-body mass (kg).
    #[serde(default = "default_com_mass")]
    pub com_mass: f64,

    /// Base mass (kg).
    #[serde(default = "default_base_mass")]
    pub base_mass: f64,

    /// Gravitational acceleration magnitude (positive).
    #[serde(default = "default_gravity")]
    pub gravity: f64,

    /// Half-extents of the support rectangle around the base, in the base frame (m).
    #[serde(default = "default_cop_limits")]
    pub cop_limits: [f64; 2],

    /// Half-extents of the box the CoM must stay in around the base (m).
    #[serde(default = "default_com_limits")]
    pub com_limits: [f64; 2],

    /// Per-axis base velocity bound (m/s).
    #[serde(default = "default_base_velocity_limit")]
    pub base_velocity_limit: f64,

    /// Per-axis base acceleration bound (m/s^2).
    #[serde(default = "default_base_acceleration_limit")]
    pub base_acceleration_limit: f64,

    /// Yaw rate bound (rad/s).
    #[serde(default = "default_yaw_velocity_limit")]
    pub yaw_velocity_limit: f64,

    /// Yaw acceleration bound (rad/s^2).
    #[serde(default = "default_yaw_acceleration_limit")]
    pub yaw_acceleration_limit: f64,
}

impl Default for RobotData {
    fn default() -> Self {
        Self {
            com_height: default_com_height(),
            base_height: default_base_height(),
            com_mass: default_com_mass(),
            base_mass: default_base_mass(),
            gravity: default_gravity(),
            cop_limits: default_cop_limits(),
            com_limits: default_com_limits(),
            base_velocity_limit: default_base_velocity_limit(),
            base_acceleration_limit: default_base_acceleration_limit(),
            yaw_velocity_limit: default_yaw_velocity_limit(),
            yaw_acceleration_limit: default_yaw_acceleration_limit(),
        }
    }
}

impl RobotData {
    /// Validate configuration. Returns Err on invalid values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("com_height", self.com_height),
            ("com_mass", self.com_mass),
            ("base_mass", self.base_mass),
            ("gravity", self.gravity),
            ("cop_limits[0]", self.cop_limits[0]),
            ("cop_limits[1]", self.cop_limits[1]),
            ("com_limits[0]", self.com_limits[0]),
            ("com_limits[1]", self.com_limits[1]),
            ("base_velocity_limit", self.base_velocity_limit),
            ("base_acceleration_limit", self.base_acceleration_limit),
            ("yaw_velocity_limit", self.yaw_velocity_limit),
            ("yaw_acceleration_limit", self.yaw_acceleration_limit),
        ];
        for (field, value) in positive {
            if !(value > 0.0) || !value.is_finite() {
                return Err(ConfigError::InvalidValue {
                    field,
                    message: format!("{value} must be finite and > 0"),
                });
            }
        }
        if !(self.base_height >= 0.0) || !self.base_height.is_finite() {
            return Err(ConfigError::InvalidValue {
                field: "base_height",
                message: format!("{} must be finite and >= 0", self.base_height),
            });
        }
        Ok(())
    }

    /// Combined mass of both bodies.
    pub fn total_mass(&self) -> f64 {
        self.com_mass + self.base_mass
    }

    /// Whether `other` yields the same dynamics matrices.
    pub fn same_dynamics(&self, other: &Self) -> bool {
        const EPS: f64 = 1e-9;
        (self.com_height - other.com_height).abs() <= EPS
            && (self.base_height - other.base_height).abs() <= EPS
            && (self.com_mass - other.com_mass).abs() <= EPS
            && (self.base_mass - other.base_mass).abs() <= EPS
            && (self.gravity - other.gravity).abs() <= EPS
    }
}

// ---------------------------------------------------------------------------
// WalkgenConfig
// ---------------------------------------------------------------------------

/// Everything needed to construct and initialise a walkgen, loadable from TOML.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WalkgenConfig {
    #[serde(default)]
    pub solver: QpSolverType,
    #[serde(default)]
    pub robot: RobotData,
    #[serde(default)]
    pub mpc: MpcData,
}

impl WalkgenConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.robot.validate()?;
        self.mpc.validate()
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from TOML file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}
