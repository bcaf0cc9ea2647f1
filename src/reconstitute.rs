/* src/reconstitute.rs */
//! Inverse mixing: fraction planes back to approximate measurements.
//!
//! Only used to check decomposition accuracy. Each fraction is dequantized from its
//! representation, mixed through the model and rounded to the nearest `i16`.
/*▫~•◦────────────────────────────────────────────────────────────────────────────────────‣
 * © 2025 ArcMoon Studios ◦ SPDX-License-Identifier MIT OR Apache-2.0 ◦ Author: Lord Xyn ✶
 *///◦────────────────────────────────────────────────────────────────────────────────────‣

use rayon::prelude::*;

use crate::batch::{source_index, BatchOutput, MeasurementBatch, Planes};
use crate::error::{DectError, Result};
use crate::model::{FractionTriple, MaterialModel};
use crate::quantize::OutputSample;

fn saturate(v: f64) -> i16 {
    v.round().clamp(f64::from(i16::MIN), f64::from(i16::MAX)) as i16
}

/// Rebuild channel A and B from three fraction planes.
///
/// With `mirror` set, slot `j` of the result comes from fraction slot `N - 1 - j`, so
/// reconstituting mirrored output with `mirror` set restores the original order.
pub fn reconstitute<O: OutputSample>(
    planes: &Planes<O>,
    model: &MaterialModel,
    mirror: bool,
) -> Result<MeasurementBatch> {
    let n = planes.a.len();
    if planes.b.len() != n || planes.c.len() != n {
        return Err(DectError::input(format!(
            "fraction planes differ in length: {}, {}, {}",
            n,
            planes.b.len(),
            planes.c.len()
        )));
    }
    model.validate()?;

    let (a, b): (Vec<i16>, Vec<i16>) = (0..n)
        .into_par_iter()
        .map(|j| {
            let i = source_index(j, n, mirror);
            let t = FractionTriple::new(
                planes.a[i].dequantize(),
                planes.b[i].dequantize(),
                planes.c[i].dequantize(),
            );
            let (ma, mb) = model.mix(&t);
            (saturate(ma), saturate(mb))
        })
        .unzip();

    MeasurementBatch::new(a, b)
}

/// [`reconstitute`] over whichever representation `output` holds.
pub fn reconstitute_output(
    output: &BatchOutput,
    model: &MaterialModel,
    mirror: bool,
) -> Result<MeasurementBatch> {
    match output {
        BatchOutput::U8(p) => reconstitute(p, model, mirror),
        BatchOutput::U16(p) => reconstitute(p, model, mirror),
        BatchOutput::F32(p) => reconstitute(p, model, mirror),
        BatchOutput::F64(p) => reconstitute(p, model, mirror),
    }
}
