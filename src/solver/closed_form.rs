/* src/solver/closed_form.rs */
//! Closed-form fraction solver.
//!
//! Substituting `c = 1 - a - b` into the two mixing equations leaves a 2x2 linear
//! system in `a` and `b`, solved here by elimination. The result is not clamped and not
//! normalised: a voxel off the mixing plane produces fractions outside `[0, 1]`, and the
//! quantizer saturates them for integer outputs.
/*▫~•◦────────────────────────────────────────────────────────────────────────────────────‣
 * © 2025 ArcMoon Studios ◦ SPDX-License-Identifier MIT OR Apache-2.0 ◦ Author: Lord Xyn ✶
 *///◦────────────────────────────────────────────────────────────────────────────────────‣

use crate::error::{DectError, Result};
use crate::model::{FractionTriple, MaterialModel, Measurement};
use crate::real::Real;
use crate::solver::FractionSolver;

/// Direct algebraic solver. Construction fails on models that make the elimination
/// undefined, so `solve` only reports per-voxel overflow.
#[derive(Debug, Clone, Copy)]
pub struct ClosedFormSolver<R> {
    gamma_a: R,
    gamma_b: R,
    /// `alpha_a - gamma_a`
    alpha: R,
    /// `beta_a - gamma_a`
    beta: R,
    /// `(beta_b - gamma_b) / beta`
    epsilon: R,
    /// `(alpha_b - gamma_b) - alpha * epsilon`
    denominator: R,
}

impl<R: Real> ClosedFormSolver<R> {
    /// Precompute the elimination terms for `model`.
    ///
    /// Returns [`DectError::Domain`] when `beta_a == gamma_a` or when the eliminated
    /// denominator vanishes.
    pub fn new(model: &MaterialModel) -> Result<Self> {
        model.validate()?;

        let alpha = model.alpha_a - model.gamma_a;
        let beta = model.beta_a - model.gamma_a;
        let gamma = model.alpha_b - model.gamma_b;
        let delta = model.beta_b - model.gamma_b;

        if beta == 0.0 {
            return Err(DectError::domain(
                "beta_a equals gamma_a; materials 2 and 3 are indistinguishable at channel A",
            ));
        }
        let epsilon = delta / beta;
        let denominator = gamma - alpha * epsilon;
        if denominator == 0.0 || !denominator.is_finite() {
            return Err(DectError::domain(format!(
                "singular mixing system (denominator {denominator})"
            )));
        }

        Ok(Self {
            gamma_a: R::from_f64(model.gamma_a),
            gamma_b: R::from_f64(model.gamma_b),
            alpha: R::from_f64(alpha),
            beta: R::from_f64(beta),
            epsilon: R::from_f64(epsilon),
            denominator: R::from_f64(denominator),
        })
    }
}

impl<R: Real> FractionSolver<R> for ClosedFormSolver<R> {
    fn solve(&self, m: Measurement) -> Result<FractionTriple<R>> {
        let theta = R::from_i16(m.a);
        let phi = R::from_i16(m.b);

        let a = (phi - self.gamma_b - self.epsilon * (theta - self.gamma_a)) / self.denominator;
        let b = (theta - self.gamma_a - a * self.alpha) / self.beta;
        let t = FractionTriple::new(a, b, R::ONE - a - b);

        if t.is_finite() {
            Ok(t)
        } else {
            Err(DectError::domain(format!("non-finite fractions for {m:?}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pure_material_one() {
        let solver = ClosedFormSolver::<f64>::new(&MaterialModel::default()).unwrap();
        let t = solver.solve(Measurement::new(62, 58)).unwrap();
        assert!((t.a - 1.0).abs() < 1e-9, "{t:?}");
        assert!(t.b.abs() < 1e-9);
        assert!(t.c.abs() < 1e-9);

        let solver = ClosedFormSolver::<f32>::new(&MaterialModel::default()).unwrap();
        let t = solver.solve(Measurement::new(62, 58)).unwrap();
        assert!((t.a - 1.0).abs() < 1e-4, "{t:?}");
    }

    #[test]
    fn test_exact_on_mixing_plane() {
        let model = MaterialModel::default();
        let solver = ClosedFormSolver::<f64>::new(&model).unwrap();
        // 0.5 soft tissue + 0.5 air lands on integer measurements.
        let (a, b) = model.mix(&FractionTriple::new(0.5f64, 0.5, 0.0));
        let t = solver.solve(Measurement::new(a as i16, b as i16)).unwrap();
        assert!((t.a - 0.5).abs() < 1e-9 && (t.b - 0.5).abs() < 1e-9 && t.c.abs() < 1e-9);
    }

    #[test]
    fn test_off_plane_is_not_clamped() {
        let solver = ClosedFormSolver::<f64>::new(&MaterialModel::default()).unwrap();
        let t = solver.solve(Measurement::new(2000, -3000)).unwrap();
        assert!(!t.is_valid(1e-6), "{t:?}");
        assert!((t.sum() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_degenerate_channel_a_is_domain_error() {
        let mut model = MaterialModel::default();
        model.beta_a = model.gamma_a;
        let err = ClosedFormSolver::<f64>::new(&model).unwrap_err();
        assert!(matches!(err, DectError::Domain { .. }), "{err}");
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_singular_denominator_is_domain_error() {
        // Channel B is channel A scaled, so the two equations are dependent.
        let model = MaterialModel::new(62.0, -1000.0, 512.0, 124.0, -2000.0, 1024.0);
        let err = ClosedFormSolver::<f32>::new(&model).unwrap_err();
        assert!(matches!(err, DectError::Domain { .. }), "{err}");
    }
}
