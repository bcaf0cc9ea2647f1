/* src/model.rs */
//! Material model and per-voxel value types.
//!
//! A voxel is explained as a mixture of three reference materials. For each energy
//! channel the expected attenuation is linear in the fractions:
//!
//! ```text
//! A = a * alpha_a + b * beta_a + c * gamma_a
//! B = a * alpha_b + b * beta_b + c * gamma_b      with a + b + c = 1
//! ```
/*▫~•◦────────────────────────────────────────────────────────────────────────────────────‣
 * © 2025 ArcMoon Studios ◦ SPDX-License-Identifier MIT OR Apache-2.0 ◦ Author: Lord Xyn ✶
 *///◦────────────────────────────────────────────────────────────────────────────────────‣

use serde::{Deserialize, Serialize};

use crate::error::{DectError, Result};
use crate::real::Real;

/// Expected attenuation of the three reference materials at both energy channels.
///
/// Defaults are soft tissue, air and iodine (values from xrayphysics.com dual energy
/// tables).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaterialModel {
    /// Material 1 at channel A
    pub alpha_a: f64,
    /// Material 2 at channel A
    pub beta_a: f64,
    /// Material 3 at channel A
    pub gamma_a: f64,
    /// Material 1 at channel B
    pub alpha_b: f64,
    /// Material 2 at channel B
    pub beta_b: f64,
    /// Material 3 at channel B
    pub gamma_b: f64,
}

impl Default for MaterialModel {
    fn default() -> Self {
        Self::new(62.0, -1000.0, 512.0, 58.0, -1000.0, 397.0)
    }
}

impl MaterialModel {
    /// Build a model from the six coefficients, channel A first.
    pub const fn new(
        alpha_a: f64,
        beta_a: f64,
        gamma_a: f64,
        alpha_b: f64,
        beta_b: f64,
        gamma_b: f64,
    ) -> Self {
        Self { alpha_a, beta_a, gamma_a, alpha_b, beta_b, gamma_b }
    }

    /// Coefficients of channel A in material order.
    pub fn channel_a(&self) -> [f64; 3] {
        [self.alpha_a, self.beta_a, self.gamma_a]
    }

    /// Coefficients of channel B in material order.
    pub fn channel_b(&self) -> [f64; 3] {
        [self.alpha_b, self.beta_b, self.gamma_b]
    }

    /// Reject NaN or infinite coefficients.
    pub fn validate(&self) -> Result<()> {
        let mut coeffs = self.channel_a().into_iter().chain(self.channel_b());
        if coeffs.all(f64::is_finite) {
            Ok(())
        } else {
            Err(DectError::Configuration(format!(
                "material coefficients must be finite: {self:?}"
            )))
        }
    }

    /// Relabel materials so that material `k` of the result is material
    /// `permutation.roles()[k]` of `self`.
    pub fn permuted(&self, permutation: Permutation) -> Self {
        let [r0, r1, r2] = permutation.roles();
        let a = self.channel_a();
        let b = self.channel_b();
        Self::new(a[r0], a[r1], a[r2], b[r0], b[r1], b[r2])
    }

    /// Forward linear mixing: predicted `(A, B)` for a fraction triple.
    pub fn mix<R: Real>(&self, t: &FractionTriple<R>) -> (f64, f64) {
        let (a, b, c) = (t.a.to_f64(), t.b.to_f64(), t.c.to_f64());
        (
            a * self.alpha_a + b * self.beta_a + c * self.gamma_a,
            a * self.alpha_b + b * self.beta_b + c * self.gamma_b,
        )
    }

    /// `[min, max]` of the channel A coefficients.
    pub fn range_a(&self) -> (f64, f64) {
        min_max(self.channel_a())
    }

    /// `[min, max]` of the channel B coefficients.
    pub fn range_b(&self) -> (f64, f64) {
        min_max(self.channel_b())
    }

    /// Coefficients converted to the solver precision.
    pub fn coefficients<R: Real>(&self) -> Coefficients<R> {
        Coefficients {
            a: self.channel_a().map(R::from_f64),
            b: self.channel_b().map(R::from_f64),
        }
    }
}

fn min_max(values: [f64; 3]) -> (f64, f64) {
    values
        .into_iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)))
}

/// [`MaterialModel`] coefficients in solver precision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coefficients<R> {
    /// Channel A, material order
    pub a: [R; 3],
    /// Channel B, material order
    pub b: [R; 3],
}

impl<R: Real> Coefficients<R> {
    /// Predicted `(A, B)` for the given fractions.
    #[inline]
    pub fn predict(&self, x: R, y: R, z: R) -> (R, R) {
        (
            self.a[0] * x + self.a[1] * y + self.a[2] * z,
            self.b[0] * x + self.b[1] * y + self.b[2] * z,
        )
    }

    /// Sum of squared residuals against an observed pair.
    #[inline]
    pub fn cost(&self, x: R, y: R, z: R, da: R, db: R) -> R {
        let (ea, eb) = self.predict(x, y, z);
        let ra = ea - da;
        let rb = eb - db;
        ra * ra + rb * rb
    }
}

/// Cyclic relabelling of the three materials used by bias-cancelling mode.
///
/// `roles()[k]` names the original material that plays role `k`, where role 0 takes
/// `ab * ratio`, role 1 takes `ab * (1 - ratio)` and role 2 takes `1 - ab`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permutation {
    /// `(A, B, C)`
    Identity,
    /// `(C, A, B)`
    Rotated,
    /// `(B, C, A)`
    RotatedTwice,
}

impl Permutation {
    /// All three cyclic orders, in evaluation order.
    pub const ALL: [Permutation; 3] = [
        Permutation::Identity,
        Permutation::Rotated,
        Permutation::RotatedTwice,
    ];

    /// Original material index playing each role.
    pub const fn roles(self) -> [usize; 3] {
        match self {
            Permutation::Identity => [0, 1, 2],
            Permutation::Rotated => [2, 0, 1],
            Permutation::RotatedTwice => [1, 2, 0],
        }
    }

    /// Map a triple expressed in role order back to material order.
    pub fn restore<R: Real>(self, roles: FractionTriple<R>) -> FractionTriple<R> {
        let mut out = [R::ZERO; 3];
        for (k, material) in self.roles().into_iter().enumerate() {
            out[material] = roles.get(k);
        }
        FractionTriple::new(out[0], out[1], out[2])
    }
}

/// Per-voxel decomposition result: fractions of materials 1, 2 and 3.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FractionTriple<R> {
    /// Fraction of material 1
    pub a: R,
    /// Fraction of material 2
    pub b: R,
    /// Fraction of material 3
    pub c: R,
}

impl<R: Real> FractionTriple<R> {
    /// Construct from components.
    pub const fn new(a: R, b: R, c: R) -> Self {
        Self { a, b, c }
    }

    /// Expand the `(ab, ratio)` search parameterisation.
    ///
    /// With both inputs in `[0, 1]` every component lies in `[0, 1]` and the sum is 1.
    #[inline]
    pub fn from_search(ab: R, ratio: R) -> Self {
        Self::new(ab * ratio, ab * (R::ONE - ratio), R::ONE - ab)
    }

    /// Component by material index.
    pub fn get(&self, idx: usize) -> R {
        match idx {
            0 => self.a,
            1 => self.b,
            _ => self.c,
        }
    }

    /// `a + b + c`.
    pub fn sum(&self) -> R {
        self.a + self.b + self.c
    }

    /// Sums to one within `tol` and every component is within `[-tol, 1 + tol]`.
    pub fn is_valid(&self, tol: f64) -> bool {
        let in_range = |v: R| {
            let v = v.to_f64();
            v >= -tol && v <= 1.0 + tol
        };
        (self.sum().to_f64() - 1.0).abs() <= tol
            && in_range(self.a)
            && in_range(self.b)
            && in_range(self.c)
    }

    /// Whether every component is finite.
    pub fn is_finite(&self) -> bool {
        self.a.is_finite() && self.b.is_finite() && self.c.is_finite()
    }
}

/// One voxel's pair of offset-corrected attenuation values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Measurement {
    /// Channel A
    pub a: i16,
    /// Channel B
    pub b: i16,
}

impl Measurement {
    /// Construct from the two channel values.
    pub const fn new(a: i16, b: i16) -> Self {
        Self { a, b }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permutation_roles_are_cyclic() {
        let model = MaterialModel::default();
        let once = model.permuted(Permutation::Rotated);
        assert_eq!(once.channel_a(), [512.0, 62.0, -1000.0]);
        let twice = once.permuted(Permutation::Rotated);
        assert_eq!(twice, model.permuted(Permutation::RotatedTwice));
        assert_eq!(twice.permuted(Permutation::Rotated), model);
    }

    #[test]
    fn test_restore_inverts_roles() {
        // Role 0 of the rotated order is material C.
        let roles = FractionTriple::new(0.7f64, 0.2, 0.1);
        let restored = Permutation::Rotated.restore(roles);
        assert_eq!(restored, FractionTriple::new(0.2, 0.1, 0.7));
        let restored = Permutation::RotatedTwice.restore(roles);
        assert_eq!(restored, FractionTriple::new(0.1, 0.7, 0.2));
    }

    #[test]
    fn test_from_search_is_on_simplex() {
        for &(ab, ratio) in &[(0.0f64, 0.0), (1.0, 1.0), (0.3, 0.9), (0.66, 0.5)] {
            assert!(FractionTriple::from_search(ab, ratio).is_valid(1e-12));
        }
    }

    #[test]
    fn test_mix_and_ranges() {
        let model = MaterialModel::default();
        let pure = FractionTriple::new(1.0f64, 0.0, 0.0);
        assert_eq!(model.mix(&pure), (62.0, 58.0));
        assert_eq!(model.range_a(), (-1000.0, 512.0));
        assert_eq!(model.range_b(), (-1000.0, 397.0));
    }

    #[test]
    fn test_validate_rejects_nan() {
        let mut model = MaterialModel::default();
        assert!(model.validate().is_ok());
        model.beta_b = f64::NAN;
        assert!(model.validate().is_err());
    }
}
