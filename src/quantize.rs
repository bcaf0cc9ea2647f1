/* src/quantize.rs */
//! Output representations and the fraction quantizer.
//!
//! Every representation is described by a [`ReprDescriptor`]; the quantizer is one
//! function of `(fraction, descriptor)` rather than a code path per numeric type.
/*▫~•◦────────────────────────────────────────────────────────────────────────────────────‣
 * © 2025 ArcMoon Studios ◦ SPDX-License-Identifier MIT OR Apache-2.0 ◦ Author: Lord Xyn ✶
 *///◦────────────────────────────────────────────────────────────────────────────────────‣

use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::DectError;
use crate::model::FractionTriple;
use crate::real::Real;

// =====================================================================================
// REPRESENTATIONS
// =====================================================================================

/// Numeric type of the fraction planes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum OutputRepr {
    /// 8-bit unsigned, full scale 255.
    #[default]
    U8,
    /// 16-bit unsigned, full scale 65535.
    U16,
    /// 32-bit float, fraction passed through.
    F32,
    /// 64-bit float, fraction passed through.
    F64,
}

/// How a fraction is mapped onto a representation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReprDescriptor {
    /// Multiplier applied to the fraction (1.0 for floats).
    pub scale: f64,
    /// Floor the scaled value and saturate it to `[0, scale]`.
    pub truncate: bool,
    /// Encoded width of one sample.
    pub bytes: usize,
}

impl ReprDescriptor {
    /// Map one fraction component.
    #[inline]
    pub fn apply(&self, fraction: f64) -> f64 {
        if self.truncate {
            (fraction * self.scale).floor().clamp(0.0, self.scale)
        } else {
            fraction
        }
    }

    /// Back to a fraction. Exact for floats, within `1 / scale` for integers.
    #[inline]
    pub fn invert(&self, value: f64) -> f64 {
        value / self.scale
    }
}

impl OutputRepr {
    /// All representations, narrowest first.
    pub const ALL: [OutputRepr; 4] =
        [OutputRepr::U8, OutputRepr::U16, OutputRepr::F32, OutputRepr::F64];

    /// Descriptor for this representation.
    pub const fn descriptor(self) -> ReprDescriptor {
        match self {
            OutputRepr::U8 => ReprDescriptor { scale: 255.0, truncate: true, bytes: 1 },
            OutputRepr::U16 => ReprDescriptor { scale: 65535.0, truncate: true, bytes: 2 },
            OutputRepr::F32 => ReprDescriptor { scale: 1.0, truncate: false, bytes: 4 },
            OutputRepr::F64 => ReprDescriptor { scale: 1.0, truncate: false, bytes: 8 },
        }
    }

    /// Name used in kernel specialisation and logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            OutputRepr::U8 => "u8",
            OutputRepr::U16 => "u16",
            OutputRepr::F32 => "f32",
            OutputRepr::F64 => "f64",
        }
    }
}

impl fmt::Display for OutputRepr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputRepr {
    type Err = DectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "u8" | "uint8" => Ok(OutputRepr::U8),
            "u16" | "uint16" => Ok(OutputRepr::U16),
            "f32" | "float" => Ok(OutputRepr::F32),
            "f64" | "double" => Ok(OutputRepr::F64),
            _ => Err(DectError::Configuration(format!("unknown output representation '{s}'"))),
        }
    }
}

// =====================================================================================
// SAMPLE TYPES
// =====================================================================================

/// A Rust type that stores one quantized fraction.
pub trait OutputSample: Copy + Send + Sync + Default + PartialEq + fmt::Debug + 'static {
    /// Representation tag for this type.
    const REPR: OutputRepr;

    /// Convert an already mapped value; saturating for integers.
    fn from_mapped(value: f64) -> Self;
    /// Widen to `f64` without rescaling.
    fn to_f64(self) -> f64;
    /// Append the little-endian encoding to `out`.
    fn write_le(self, out: &mut Vec<u8>);
    /// Decode from exactly `Self::REPR.descriptor().bytes` little-endian bytes.
    fn read_le(bytes: &[u8]) -> Self;

    /// Quantize one fraction component.
    #[inline]
    fn quantize<R: Real>(fraction: R) -> Self {
        Self::from_mapped(Self::REPR.descriptor().apply(fraction.to_f64()))
    }

    /// Fraction this sample stands for.
    #[inline]
    fn dequantize(self) -> f64 {
        Self::REPR.descriptor().invert(self.to_f64())
    }
}

macro_rules! impl_output_sample {
    ($t:ty, $repr:expr) => {
        impl OutputSample for $t {
            const REPR: OutputRepr = $repr;

            #[inline]
            fn from_mapped(value: f64) -> Self {
                value as $t
            }

            #[inline]
            fn to_f64(self) -> f64 {
                f64::from(self)
            }

            fn write_le(self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_le_bytes());
            }

            fn read_le(bytes: &[u8]) -> Self {
                let mut raw = [0u8; std::mem::size_of::<$t>()];
                raw.copy_from_slice(&bytes[..std::mem::size_of::<$t>()]);
                <$t>::from_le_bytes(raw)
            }
        }
    };
}

impl_output_sample!(u8, OutputRepr::U8);
impl_output_sample!(u16, OutputRepr::U16);
impl_output_sample!(f32, OutputRepr::F32);
impl_output_sample!(f64, OutputRepr::F64);

// =====================================================================================
// PURE FUNCTIONS
// =====================================================================================

/// A fraction triple in one concrete representation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QuantizedTriple {
    /// 8-bit planes
    U8([u8; 3]),
    /// 16-bit planes
    U16([u16; 3]),
    /// 32-bit float planes
    F32([f32; 3]),
    /// 64-bit float planes
    F64([f64; 3]),
}

fn quantize_as<O: OutputSample, R: Real>(t: &FractionTriple<R>) -> [O; 3] {
    [O::quantize(t.a), O::quantize(t.b), O::quantize(t.c)]
}

/// Map a fraction triple onto `repr`.
///
/// Components outside `[0, 1]` (closed-form results) saturate for integer
/// representations and pass through for floats.
pub fn quantize<R: Real>(t: &FractionTriple<R>, repr: OutputRepr) -> QuantizedTriple {
    match repr {
        OutputRepr::U8 => QuantizedTriple::U8(quantize_as(t)),
        OutputRepr::U16 => QuantizedTriple::U16(quantize_as(t)),
        OutputRepr::F32 => QuantizedTriple::F32(quantize_as(t)),
        OutputRepr::F64 => QuantizedTriple::F64(quantize_as(t)),
    }
}

/// Blend the two raw measurements: `round(a * ratio + b * (1 - ratio))`, saturated.
#[inline]
pub fn blend(a: i16, b: i16, ratio: f64) -> i16 {
    let mixed = f64::from(a) * ratio + f64::from(b) * (1.0 - ratio);
    mixed.round().clamp(f64::from(i16::MIN), f64::from(i16::MAX)) as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pure_material_quantizes_to_full_scale() {
        let t = FractionTriple::new(1.0f64, 0.0, 0.0);
        assert_eq!(quantize(&t, OutputRepr::U8), QuantizedTriple::U8([255, 0, 0]));
        assert_eq!(quantize(&t, OutputRepr::U16), QuantizedTriple::U16([65535, 0, 0]));
        assert_eq!(quantize(&t, OutputRepr::F64), QuantizedTriple::F64([1.0, 0.0, 0.0]));
    }

    #[test]
    fn test_integer_truncates() {
        let t = FractionTriple::new(0.5f64, 0.3, 0.2);
        // 127.5 -> 127, 76.5 -> 76, 51.0 -> 51
        assert_eq!(quantize(&t, OutputRepr::U8), QuantizedTriple::U8([127, 76, 51]));
    }

    #[test]
    fn test_out_of_range_saturates_or_passes_through() {
        let t = FractionTriple::new(1.4f64, -0.6, 0.2);
        assert_eq!(quantize(&t, OutputRepr::U8), QuantizedTriple::U8([255, 0, 51]));
        assert_eq!(quantize(&t, OutputRepr::F32), QuantizedTriple::F32([1.4, -0.6, 0.2]));
    }

    #[test]
    fn test_descriptors() {
        assert_eq!(OutputRepr::U16.descriptor().bytes, 2);
        assert!(!OutputRepr::F64.descriptor().truncate);
        assert_eq!(OutputRepr::F32.descriptor().scale, 1.0);
        assert_eq!("UINT16".parse::<OutputRepr>().unwrap(), OutputRepr::U16);
        assert!("i8".parse::<OutputRepr>().is_err());
    }

    #[test]
    fn test_blend() {
        assert_eq!(blend(100, 200, 0.5), 150);
        assert_eq!(blend(100, 200, 1.0), 100);
        assert_eq!(blend(100, 200, 0.0), 200);
        assert_eq!(blend(-3, 0, 0.5), -2);
        assert_eq!(blend(i16::MAX, i16::MIN, 2.0), i16::MAX);
    }

    #[test]
    fn test_sample_le_codec() {
        let mut buf = Vec::new();
        0x1234u16.write_le(&mut buf);
        assert_eq!(buf, [0x34, 0x12]);
        assert_eq!(u16::read_le(&buf), 0x1234);
        assert_eq!(200u8.dequantize(), 200.0 / 255.0);
    }
}
