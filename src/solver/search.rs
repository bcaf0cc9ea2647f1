/* src/solver/search.rs */
//! Search-based fraction solver.
//!
//! The triple is parameterised by `(ab, ratio)` with `a = ab * ratio`,
//! `b = ab * (1 - ratio)` and `c = 1 - ab`. Keeping both variables in `[0, 1]` keeps the
//! triple on the simplex without any explicit constraint handling.
//!
//! The search runs in two phases:
//!
//! 1. A coarse scan of the 11 x 11 grid at step 0.1, so the descent does not start in a
//!    local basin far from the best region.
//! 2. Coordinate descent from the coarse minimiser: try `±step` along each axis
//!    (clamped), move to the best candidate if it lowers the cost, otherwise halve the
//!    step. Stops once `step < min_step`.
/*▫~•◦────────────────────────────────────────────────────────────────────────────────────‣
 * © 2025 ArcMoon Studios ◦ SPDX-License-Identifier MIT OR Apache-2.0 ◦ Author: Lord Xyn ✶
 *///◦────────────────────────────────────────────────────────────────────────────────────‣

use crate::error::{DectError, Result};
use crate::model::{Coefficients, FractionTriple, MaterialModel, Measurement, Permutation};
use crate::real::Real;
use crate::solver::{validate_min_step, Enhancement, FractionSolver};

/// Grid resolution of the coarse scan (points per axis minus one).
const COARSE_DIVISIONS: u32 = 10;

/// Initial descent step.
const INITIAL_STEP: f64 = 0.05;

/// Result of one two-phase search in role order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchOutcome<R> {
    /// Share of roles 0 and 1 combined.
    pub ab: R,
    /// Share of role 0 within `ab`.
    pub ratio: R,
    /// Best cost found by the coarse scan.
    pub coarse_cost: R,
    /// Cost at the final descent position.
    pub final_cost: R,
}

impl<R: Real> SearchOutcome<R> {
    /// Fractions in role order.
    pub fn fractions(&self) -> FractionTriple<R> {
        FractionTriple::from_search(self.ab, self.ratio)
    }
}

/// Coarse-to-fine search solver, generic over the arithmetic precision.
#[derive(Debug, Clone)]
pub struct SearchSolver<R> {
    /// One coefficient set per evaluated permutation.
    orders: Vec<(Permutation, Coefficients<R>)>,
    min_step: R,
    clamp_a: Option<(R, R)>,
    clamp_b: Option<(R, R)>,
}

impl<R: Real> SearchSolver<R> {
    /// Build a solver for `model`.
    ///
    /// With `pre_clamp` set, each measurement is clamped to the min/max coefficient of
    /// its channel before solving.
    pub fn new(
        model: &MaterialModel,
        min_step: f64,
        enhancement: Enhancement,
        pre_clamp: bool,
    ) -> Result<Self> {
        model.validate()?;
        validate_min_step(min_step)?;
        let narrowed = R::from_f64(min_step);
        if narrowed <= R::ZERO {
            return Err(DectError::input(format!(
                "min_step {min_step} underflows to zero at {} precision",
                R::PRECISION
            )));
        }

        let orders = Permutation::ALL
            .into_iter()
            .take(usize::from(enhancement.level()))
            .map(|p| (p, model.permuted(p).coefficients::<R>()))
            .collect();

        let range = |(lo, hi): (f64, f64)| (R::from_f64(lo), R::from_f64(hi));
        Ok(Self {
            orders,
            min_step: narrowed,
            clamp_a: pre_clamp.then(|| range(model.range_a())),
            clamp_b: pre_clamp.then(|| range(model.range_b())),
        })
    }

    /// Number of permuted searches averaged per voxel.
    pub fn passes(&self) -> usize {
        self.orders.len()
    }

    /// Measurement as seen by the search, after the optional pre-clamp.
    pub fn observed(&self, m: Measurement) -> (R, R) {
        let mut da = R::from_i16(m.a);
        let mut db = R::from_i16(m.b);
        if let Some((lo, hi)) = self.clamp_a {
            da = da.clamp_to(lo, hi);
        }
        if let Some((lo, hi)) = self.clamp_b {
            db = db.clamp_to(lo, hi);
        }
        (da, db)
    }

    /// Run both search phases against one coefficient order.
    pub fn search(&self, coeffs: &Coefficients<R>, da: R, db: R) -> SearchOutcome<R> {
        let cost = |ab: R, ratio: R| {
            let t = FractionTriple::from_search(ab, ratio);
            coeffs.cost(t.a, t.b, t.c, da, db)
        };

        let divisions = R::from_f64(f64::from(COARSE_DIVISIONS));
        let mut best = (R::ZERO, R::ZERO);
        let mut best_cost = cost(R::ZERO, R::ZERO);
        for i in 0..=COARSE_DIVISIONS {
            let ab = R::from_f64(f64::from(i)) / divisions;
            for j in 0..=COARSE_DIVISIONS {
                let ratio = R::from_f64(f64::from(j)) / divisions;
                let c = cost(ab, ratio);
                if c < best_cost {
                    best_cost = c;
                    best = (ab, ratio);
                }
            }
        }
        let coarse_cost = best_cost;

        let (mut ab, mut ratio) = best;
        let mut current = coarse_cost;
        let mut step = R::from_f64(INITIAL_STEP);
        let two = R::ONE + R::ONE;

        while step >= self.min_step {
            let candidates = [
                ((ab + step).clamp_unit(), ratio),
                (ab, (ratio + step).clamp_unit()),
                ((ab - step).clamp_unit(), ratio),
                (ab, (ratio - step).clamp_unit()),
            ];

            let mut move_to = candidates[0];
            let mut move_cost = cost(move_to.0, move_to.1);
            for &(cab, cratio) in &candidates[1..] {
                let c = cost(cab, cratio);
                if c < move_cost {
                    move_cost = c;
                    move_to = (cab, cratio);
                }
            }

            if move_cost < current {
                (ab, ratio) = move_to;
                current = move_cost;
            } else {
                step = step / two;
            }
        }

        SearchOutcome { ab, ratio, coarse_cost, final_cost: current }
    }

    /// Per-permutation outcomes for one voxel, in evaluation order.
    pub fn outcomes(&self, m: Measurement) -> Vec<(Permutation, SearchOutcome<R>)> {
        let (da, db) = self.observed(m);
        self.orders
            .iter()
            .map(|(p, coeffs)| (*p, self.search(coeffs, da, db)))
            .collect()
    }
}

impl<R: Real> FractionSolver<R> for SearchSolver<R> {
    fn solve(&self, m: Measurement) -> Result<FractionTriple<R>> {
        let (da, db) = self.observed(m);

        let mut total = FractionTriple::new(R::ZERO, R::ZERO, R::ZERO);
        for (permutation, coeffs) in &self.orders {
            let t = permutation.restore(self.search(coeffs, da, db).fractions());
            total = FractionTriple::new(total.a + t.a, total.b + t.b, total.c + t.c);
        }

        if self.orders.len() > 1 {
            let n = R::from_f64(self.orders.len() as f64);
            total = FractionTriple::new(total.a / n, total.b / n, total.c / n);
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solver<R: Real>(enhancement: Enhancement) -> SearchSolver<R> {
        SearchSolver::new(&MaterialModel::default(), 0.001, enhancement, true).unwrap()
    }

    #[test]
    fn test_pure_material_one() {
        for enhancement in [Enhancement::Standard, Enhancement::BiasCancelling] {
            let t = solver::<f64>(enhancement).solve(Measurement::new(62, 58)).unwrap();
            assert!((t.a - 1.0).abs() < 1e-9, "{enhancement}: {t:?}");
            assert!(t.b.abs() < 1e-9);
            assert!(t.c.abs() < 1e-9);

            let t = solver::<f32>(enhancement).solve(Measurement::new(62, 58)).unwrap();
            assert!((t.a - 1.0).abs() < 1e-6, "{enhancement}: {t:?}");
        }
    }

    #[test]
    fn test_pure_materials_two_and_three() {
        let s = solver::<f64>(Enhancement::Standard);
        let air = s.solve(Measurement::new(-1000, -1000)).unwrap();
        assert!((air.b - 1.0).abs() < 1e-9, "{air:?}");
        let iodine = s.solve(Measurement::new(512, 397)).unwrap();
        assert!((iodine.c - 1.0).abs() < 1e-9, "{iodine:?}");
    }

    #[test]
    fn test_refinement_never_worse_than_coarse() {
        let s = solver::<f64>(Enhancement::BiasCancelling);
        for &(a, b) in &[(-32, -90), (91, 54), (316, 223), (0, 0), (-700, -650), (400, 100)] {
            for (_, outcome) in s.outcomes(Measurement::new(a, b)) {
                assert!(
                    outcome.final_cost <= outcome.coarse_cost,
                    "({a}, {b}): {outcome:?}"
                );
            }
        }
    }

    #[test]
    fn test_pre_clamp_policy() {
        let model = MaterialModel::default();
        let clamped = SearchSolver::<f64>::new(&model, 0.001, Enhancement::Standard, true).unwrap();
        assert_eq!(clamped.observed(Measurement::new(2000, -3000)), (512.0, -1000.0));

        let raw = SearchSolver::<f64>::new(&model, 0.001, Enhancement::Standard, false).unwrap();
        assert_eq!(raw.observed(Measurement::new(2000, -3000)), (2000.0, -3000.0));

        // Out-of-range voxels still land on the simplex either way.
        assert!(raw.solve(Measurement::new(2000, -3000)).unwrap().is_valid(1e-9));
    }

    #[test]
    fn test_passes_follow_enhancement() {
        assert_eq!(solver::<f32>(Enhancement::Standard).passes(), 1);
        assert_eq!(solver::<f32>(Enhancement::BiasCancelling).passes(), 3);
    }

    #[test]
    fn test_rejects_non_terminating_threshold() {
        let model = MaterialModel::default();
        assert!(SearchSolver::<f64>::new(&model, 0.0, Enhancement::Standard, true).is_err());
    }

    #[test]
    fn test_single_precision_threshold_must_survive_narrowing() {
        let model = MaterialModel::default();
        let err = SearchSolver::<f32>::new(&model, 1e-50, Enhancement::Standard, true).unwrap_err();
        assert!(matches!(err, DectError::InputContract { .. }), "{err}");
        // Still representable in f64, so the double solver runs.
        let s = SearchSolver::<f64>::new(&model, 1e-50, Enhancement::Standard, true).unwrap();
        assert!(s.solve(Measurement::new(91, 54)).is_ok());

        // Subnormal in f32 but non-zero: the descent still halves below it and stops.
        let s = SearchSolver::<f32>::new(&model, 1e-44, Enhancement::Standard, true).unwrap();
        let t = s.solve(Measurement::new(91, 54)).unwrap();
        assert!((t.sum() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_enhanced_invariant_under_material_relabelling() {
        let model = MaterialModel::default();
        let base = SearchSolver::<f64>::new(&model, 0.001, Enhancement::BiasCancelling, true).unwrap();
        let rotated_model = model.permuted(Permutation::Rotated);
        let rotated =
            SearchSolver::<f64>::new(&rotated_model, 0.001, Enhancement::BiasCancelling, true)
                .unwrap();

        for &(a, b) in &[(-32, -90), (91, 54), (316, 223), (-142, -182)] {
            let m = Measurement::new(a, b);
            let t = base.solve(m).unwrap();
            // Material k of the rotated model is material roles()[k] of the base model.
            let r = rotated.solve(m).unwrap();
            let [r0, r1, r2] = Permutation::Rotated.roles();
            for (k, material) in [r0, r1, r2].into_iter().enumerate() {
                assert!((r.get(k) - t.get(material)).abs() < 1e-9, "({a}, {b}) {t:?} {r:?}");
            }
        }
    }
}
