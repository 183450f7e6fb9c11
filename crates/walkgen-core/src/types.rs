use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// BodyType
// ---------------------------------------------------------------------------

/// Bodies tracked by the rigid-body system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BodyType {
    /// Center of mass of the upper body.
    Com,
    /// Mobile base carrying the support polygon.
    Base,
}

impl BodyType {
    /// All bodies, in storage order.
    pub const ALL: [Self; 2] = [Self::Com, Self::Base];

    /// Storage index of the body.
    pub const fn index(self) -> usize {
        match self {
            Self::Com => 0,
            Self::Base => 1,
        }
    }
}

impl fmt::Display for BodyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Com => write!(f, "com"),
            Self::Base => write!(f, "base"),
        }
    }
}

// ---------------------------------------------------------------------------
// Axis
// ---------------------------------------------------------------------------

/// Kinematic axis of a body state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    X,
    Y,
    Z,
    Yaw,
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::X => write!(f, "x"),
            Self::Y => write!(f, "y"),
            Self::Z => write!(f, "z"),
            Self::Yaw => write!(f, "yaw"),
        }
    }
}

// ---------------------------------------------------------------------------
// QpSolverType
// ---------------------------------------------------------------------------

/// Numerical QP backend selected when the walkgen is constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QpSolverType {
    /// Interior-point solver (Clarabel). Ignores warm starts.
    #[default]
    Clarabel,
    /// Dense ADMM solver. Uses primal and dual warm starts.
    Admm,
}

impl fmt::Display for QpSolverType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Clarabel => write!(f, "clarabel"),
            Self::Admm => write!(f, "admm"),
        }
    }
}

// ---------------------------------------------------------------------------
// SubProblem
// ---------------------------------------------------------------------------

/// The two decoupled QPs solved each feedback cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubProblem {
    /// Yaw of the base. Always solved first.
    Orientation,
    /// Horizontal CoM and base motion.
    Translation,
}

impl fmt::Display for SubProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Orientation => write!(f, "orientation"),
            Self::Translation => write!(f, "translation"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_indices_are_distinct() {
        assert_eq!(BodyType::Com.index(), 0);
        assert_eq!(BodyType::Base.index(), 1);
        for (i, body) in BodyType::ALL.iter().enumerate() {
            assert_eq!(body.index(), i);
        }
    }

    #[test]
    fn solver_type_serde_names() {
        #[derive(Deserialize)]
        struct Wrapper {
            solver: QpSolverType,
        }
        let w: Wrapper = toml::from_str("solver = \"admm\"").unwrap();
        assert_eq!(w.solver, QpSolverType::Admm);
        assert_eq!(QpSolverType::default(), QpSolverType::Clarabel);
    }

    #[test]
    fn display_names() {
        assert_eq!(SubProblem::Orientation.to_string(), "orientation");
        assert_eq!(Axis::Yaw.to_string(), "yaw");
        assert_eq!(BodyType::Base.to_string(), "base");
    }
}
