/* src/real.rs */
//! Floating-point precision abstraction shared by the CPU solvers.
//!
//! The solvers are written once against [`Real`] and monomorphised for `f32` and
//! `f64`; [`Precision`] is the runtime selector that picks one of the two.
/*▫~•◦────────────────────────────────────────────────────────────────────────────────────‣
 * © 2025 ArcMoon Studios ◦ SPDX-License-Identifier MIT OR Apache-2.0 ◦ Author: Lord Xyn ✶
 *///◦────────────────────────────────────────────────────────────────────────────────────‣

use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DectError;

/// Arithmetic precision used by a solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    /// 64-bit floating point.
    #[default]
    Double,
    /// 32-bit floating point.
    Single,
}

impl Precision {
    /// The other precision, used for the accelerator's second build attempt.
    pub fn complement(self) -> Self {
        match self {
            Precision::Double => Precision::Single,
            Precision::Single => Precision::Double,
        }
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Precision::Double => write!(f, "double"),
            Precision::Single => write!(f, "single"),
        }
    }
}

impl FromStr for Precision {
    type Err = DectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "double" | "f64" => Ok(Precision::Double),
            "single" | "f32" => Ok(Precision::Single),
            _ => Err(DectError::Configuration(format!("unknown precision '{s}'"))),
        }
    }
}

/// Scalar type a solver computes in.
pub trait Real:
    Copy
    + Send
    + Sync
    + PartialOrd
    + fmt::Debug
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
    + 'static
{
    /// Precision tag for this type.
    const PRECISION: Precision;
    /// Additive identity.
    const ZERO: Self;
    /// Multiplicative identity.
    const ONE: Self;

    /// Lossy conversion from `f64`.
    fn from_f64(v: f64) -> Self;
    /// Widening conversion to `f64`.
    fn to_f64(self) -> f64;
    /// Whether the value is neither infinite nor NaN.
    fn is_finite(self) -> bool;

    /// Clamp into `[lo, hi]`.
    #[inline]
    fn clamp_to(self, lo: Self, hi: Self) -> Self {
        if self < lo {
            lo
        } else if self > hi {
            hi
        } else {
            self
        }
    }

    /// Clamp into `[0, 1]`.
    #[inline]
    fn clamp_unit(self) -> Self {
        self.clamp_to(Self::ZERO, Self::ONE)
    }

    /// Conversion from a raw 16-bit measurement.
    #[inline]
    fn from_i16(v: i16) -> Self {
        Self::from_f64(f64::from(v))
    }
}

macro_rules! impl_real {
    ($t:ty, $precision:expr) => {
        impl Real for $t {
            const PRECISION: Precision = $precision;
            const ZERO: Self = 0.0;
            const ONE: Self = 1.0;

            #[inline]
            fn from_f64(v: f64) -> Self {
                v as $t
            }

            #[inline]
            fn to_f64(self) -> f64 {
                f64::from(self)
            }

            #[inline]
            fn is_finite(self) -> bool {
                <$t>::is_finite(self)
            }
        }
    };
}

impl_real!(f32, Precision::Single);
impl_real!(f64, Precision::Double);
