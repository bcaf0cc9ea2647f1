/* src/batch.rs */
//! Batch executor: applies a solver and the quantizer across a voxel array.
//!
//! Voxels are independent, so the work is split across the rayon pool. Each output slot
//! is written exactly once; with `mirror` set, slot `j` holds voxel `N - 1 - j`.
/*▫~•◦────────────────────────────────────────────────────────────────────────────────────‣
 * © 2025 ArcMoon Studios ◦ SPDX-License-Identifier MIT OR Apache-2.0 ◦ Author: Lord Xyn ✶
 *///◦────────────────────────────────────────────────────────────────────────────────────‣

use rayon::prelude::*;

use crate::error::{DectError, Result};
use crate::model::Measurement;
use crate::quantize::{blend, OutputRepr, OutputSample};
use crate::real::Real;
use crate::solver::FractionSolver;

/// Co-registered channel A and channel B samples for one frame.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MeasurementBatch {
    a: Vec<i16>,
    b: Vec<i16>,
}

impl MeasurementBatch {
    /// Pair up two channels. Lengths must match.
    pub fn new(a: Vec<i16>, b: Vec<i16>) -> Result<Self> {
        if a.len() != b.len() {
            return Err(DectError::input(format!(
                "channel lengths differ: A has {} samples, B has {}",
                a.len(),
                b.len()
            )));
        }
        Ok(Self { a, b })
    }

    /// Build from measurement pairs.
    pub fn from_pairs(pairs: &[Measurement]) -> Self {
        let (a, b) = pairs.iter().map(|m| (m.a, m.b)).unzip();
        Self { a, b }
    }

    /// Number of voxels.
    pub fn len(&self) -> usize {
        self.a.len()
    }

    /// `true` when the batch holds no voxels.
    pub fn is_empty(&self) -> bool {
        self.a.is_empty()
    }

    /// Voxel `idx`, or `None` past the end.
    pub fn get(&self, idx: usize) -> Option<Measurement> {
        Some(Measurement::new(*self.a.get(idx)?, *self.b.get(idx)?))
    }

    /// Channel A samples.
    pub fn channel_a(&self) -> &[i16] {
        &self.a
    }

    /// Channel B samples.
    pub fn channel_b(&self) -> &[i16] {
        &self.b
    }

    #[inline]
    fn at(&self, idx: usize) -> Measurement {
        Measurement::new(self.a[idx], self.b[idx])
    }
}

/// Three fraction planes plus the optional merge plane, all of equal length.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Planes<O> {
    /// Material 1 fractions
    pub a: Vec<O>,
    /// Material 2 fractions
    pub b: Vec<O>,
    /// Material 3 fractions
    pub c: Vec<O>,
    /// Blended raw measurements, when a merge ratio was supplied
    pub merge: Option<Vec<i16>>,
}

impl<O> Planes<O> {
    /// Number of voxels.
    pub fn len(&self) -> usize {
        self.a.len()
    }

    /// `true` when empty.
    pub fn is_empty(&self) -> bool {
        self.a.is_empty()
    }
}

/// Planes in whichever representation the run selected.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOutput {
    /// 8-bit planes
    U8(Planes<u8>),
    /// 16-bit planes
    U16(Planes<u16>),
    /// 32-bit float planes
    F32(Planes<f32>),
    /// 64-bit float planes
    F64(Planes<f64>),
}

impl BatchOutput {
    /// Representation tag.
    pub fn repr(&self) -> OutputRepr {
        match self {
            BatchOutput::U8(_) => OutputRepr::U8,
            BatchOutput::U16(_) => OutputRepr::U16,
            BatchOutput::F32(_) => OutputRepr::F32,
            BatchOutput::F64(_) => OutputRepr::F64,
        }
    }

    /// Number of voxels.
    pub fn len(&self) -> usize {
        match self {
            BatchOutput::U8(p) => p.len(),
            BatchOutput::U16(p) => p.len(),
            BatchOutput::F32(p) => p.len(),
            BatchOutput::F64(p) => p.len(),
        }
    }

    /// `true` when empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Merge plane, if one was computed.
    pub fn merge(&self) -> Option<&[i16]> {
        match self {
            BatchOutput::U8(p) => p.merge.as_deref(),
            BatchOutput::U16(p) => p.merge.as_deref(),
            BatchOutput::F32(p) => p.merge.as_deref(),
            BatchOutput::F64(p) => p.merge.as_deref(),
        }
    }

    /// Little-endian encoding of the three fraction planes.
    pub fn encode_planes(&self) -> [Vec<u8>; 3] {
        fn encode<O: OutputSample>(p: &Planes<O>) -> [Vec<u8>; 3] {
            [&p.a, &p.b, &p.c].map(|plane| {
                let mut out = Vec::with_capacity(plane.len() * O::REPR.descriptor().bytes);
                for &v in plane.iter() {
                    v.write_le(&mut out);
                }
                out
            })
        }
        match self {
            BatchOutput::U8(p) => encode(p),
            BatchOutput::U16(p) => encode(p),
            BatchOutput::F32(p) => encode(p),
            BatchOutput::F64(p) => encode(p),
        }
    }
}

impl From<Planes<u8>> for BatchOutput {
    fn from(p: Planes<u8>) -> Self {
        BatchOutput::U8(p)
    }
}

impl From<Planes<u16>> for BatchOutput {
    fn from(p: Planes<u16>) -> Self {
        BatchOutput::U16(p)
    }
}

impl From<Planes<f32>> for BatchOutput {
    fn from(p: Planes<f32>) -> Self {
        BatchOutput::F32(p)
    }
}

impl From<Planes<f64>> for BatchOutput {
    fn from(p: Planes<f64>) -> Self {
        BatchOutput::F64(p)
    }
}

/// Source voxel for output slot `j`.
#[inline]
pub fn source_index(j: usize, len: usize, mirror: bool) -> usize {
    if mirror {
        len - 1 - j
    } else {
        j
    }
}

/// Check a merge ratio before any work is done.
pub fn validate_merge_ratio(ratio: f64) -> Result<()> {
    if ratio.is_finite() && (0.0..=1.0).contains(&ratio) {
        Ok(())
    } else {
        Err(DectError::input(format!("merge ratio must lie in [0, 1], got {ratio}")))
    }
}

/// Solve and quantize every voxel of `batch`.
///
/// The first per-voxel error aborts the batch.
pub fn execute_batch<R, O, S>(
    solver: &S,
    batch: &MeasurementBatch,
    mirror: bool,
    merge_ratio: Option<f64>,
) -> Result<Planes<O>>
where
    R: Real,
    O: OutputSample,
    S: FractionSolver<R> + ?Sized,
{
    if let Some(ratio) = merge_ratio {
        validate_merge_ratio(ratio)?;
    }
    let n = batch.len();

    let triples: Vec<[O; 3]> = (0..n)
        .into_par_iter()
        .map(|j| -> Result<[O; 3]> {
            let t = solver.solve(batch.at(source_index(j, n, mirror)))?;
            Ok([O::quantize(t.a), O::quantize(t.b), O::quantize(t.c)])
        })
        .collect::<Result<Vec<_>>>()?;

    let mut planes = Planes {
        a: Vec::with_capacity(n),
        b: Vec::with_capacity(n),
        c: Vec::with_capacity(n),
        merge: None,
    };
    for [a, b, c] in triples {
        planes.a.push(a);
        planes.b.push(b);
        planes.c.push(c);
    }

    planes.merge = merge_ratio.map(|ratio| {
        (0..n)
            .into_par_iter()
            .map(|j| {
                let m = batch.at(source_index(j, n, mirror));
                blend(m.a, m.b, ratio)
            })
            .collect()
    });

    Ok(planes)
}

/// [`execute_batch`] with the output type chosen at runtime.
pub fn execute_batch_as<R, S>(
    solver: &S,
    batch: &MeasurementBatch,
    repr: OutputRepr,
    mirror: bool,
    merge_ratio: Option<f64>,
) -> Result<BatchOutput>
where
    R: Real,
    S: FractionSolver<R> + ?Sized,
{
    Ok(match repr {
        OutputRepr::U8 => execute_batch::<R, u8, S>(solver, batch, mirror, merge_ratio)?.into(),
        OutputRepr::U16 => execute_batch::<R, u16, S>(solver, batch, mirror, merge_ratio)?.into(),
        OutputRepr::F32 => execute_batch::<R, f32, S>(solver, batch, mirror, merge_ratio)?.into(),
        OutputRepr::F64 => execute_batch::<R, f64, S>(solver, batch, mirror, merge_ratio)?.into(),
    })
}
