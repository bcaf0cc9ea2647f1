/* src/solver/mod.rs */
//! Per-voxel fraction solvers.
//!
//! Both solvers implement [`FractionSolver`], so the batch executor and the backends
//! are written once against the trait:
//!
//! - [`SearchSolver`]: coarse grid scan followed by adaptive coordinate descent, with an
//!   optional bias-cancelling permutation average. Output always lies on the simplex.
//! - [`ClosedFormSolver`]: direct 2x2 inversion. Fast, unclamped, only approximately
//!   valid.
/*▫~•◦────────────────────────────────────────────────────────────────────────────────────‣
 * © 2025 ArcMoon Studios ◦ SPDX-License-Identifier MIT OR Apache-2.0 ◦ Author: Lord Xyn ✶
 *///◦────────────────────────────────────────────────────────────────────────────────────‣

pub mod closed_form;
pub mod search;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use closed_form::ClosedFormSolver;
pub use search::{SearchOutcome, SearchSolver};

use crate::error::{DectError, Result};
use crate::model::{FractionTriple, Measurement};
use crate::real::Real;

/// Default stopping threshold for the coordinate descent.
pub const DEFAULT_MIN_STEP: f64 = 0.001;

/// Solves one voxel into a fraction triple.
pub trait FractionSolver<R: Real>: Send + Sync {
    /// Decompose a single measurement pair.
    fn solve(&self, m: Measurement) -> Result<FractionTriple<R>>;
}

/// How many permuted solves are averaged per voxel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Enhancement {
    /// One solve with the materials in their given order.
    #[default]
    Standard,
    /// Three solves over the cyclic material orders, averaged.
    BiasCancelling,
}

impl Enhancement {
    /// Numeric level: 1 or 3.
    pub const fn level(self) -> u8 {
        match self {
            Enhancement::Standard => 1,
            Enhancement::BiasCancelling => 3,
        }
    }

    /// Parse a numeric level. Only 1 and 3 are meaningful.
    pub fn from_level(level: u8) -> Result<Self> {
        match level {
            1 => Ok(Enhancement::Standard),
            3 => Ok(Enhancement::BiasCancelling),
            other => Err(DectError::input(format!(
                "enhancement level must be 1 or 3, got {other}"
            ))),
        }
    }
}

impl TryFrom<u8> for Enhancement {
    type Error = DectError;

    fn try_from(level: u8) -> Result<Self> {
        Self::from_level(level)
    }
}

impl From<Enhancement> for u8 {
    fn from(e: Enhancement) -> Self {
        e.level()
    }
}

impl fmt::Display for Enhancement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Enhancement::Standard => write!(f, "standard"),
            Enhancement::BiasCancelling => write!(f, "bias-cancelling"),
        }
    }
}

/// Check that a descent threshold terminates.
pub fn validate_min_step(min_step: f64) -> Result<()> {
    if min_step.is_finite() && min_step > 0.0 {
        Ok(())
    } else {
        Err(DectError::input(format!(
            "min_step must be a positive finite number, got {min_step}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enhancement_levels() {
        assert_eq!(Enhancement::from_level(1).unwrap(), Enhancement::Standard);
        assert_eq!(Enhancement::from_level(3).unwrap(), Enhancement::BiasCancelling);
        assert!(Enhancement::from_level(2).is_err());
        assert_eq!(u8::from(Enhancement::BiasCancelling), 3);
    }

    #[test]
    fn test_enhancement_serde_uses_level() {
        let json = serde_json::to_string(&Enhancement::BiasCancelling).unwrap();
        assert_eq!(json, "3");
        assert!(serde_json::from_str::<Enhancement>("2").is_err());
    }

    #[test]
    fn test_min_step_validation() {
        assert!(validate_min_step(0.001).is_ok());
        assert!(validate_min_step(0.0).is_err());
        assert!(validate_min_step(-1.0).is_err());
        assert!(validate_min_step(f64::NAN).is_err());
    }
}
