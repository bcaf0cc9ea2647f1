/* src/accel/kernel.rs */
//! Device kernel source and its precision/representation specialisation.
//!
//! The kernel is written once against `FPTYPE` (compute type) and `OTYPE` (output
//! sample type). [`specialize`] prepends the `#define` prelude for one combination;
//! the result is compiled at backend initialisation.
/*▫~•◦────────────────────────────────────────────────────────────────────────────────────‣
 * © 2025 ArcMoon Studios ◦ SPDX-License-Identifier MIT OR Apache-2.0 ◦ Author: Lord Xyn ✶
 *///◦────────────────────────────────────────────────────────────────────────────────────‣

use crate::quantize::OutputRepr;
use crate::real::Precision;

/// Entry point exported by [`KERNEL_BODY`].
pub const KERNEL_NAME: &str = "dect_decompose";

/// Number of `FPTYPE` values in the parameter buffer.
pub const PARAM_COUNT: usize = 8;

/// Parameterised kernel body. One thread per output slot.
///
/// `params` holds the six model coefficients (channel A then B), `min_step` and the
/// merge ratio.
pub const KERNEL_BODY: &str = r#"
__device__ FPTYPE dect_cost(const FPTYPE *ca, const FPTYPE *cb, FPTYPE ab, FPTYPE ratio,
                            FPTYPE da, FPTYPE db)
{
    FPTYPE x = ab * ratio;
    FPTYPE y = ab * ((FPTYPE)1 - ratio);
    FPTYPE z = (FPTYPE)1 - ab;
    FPTYPE ra = ca[0] * x + ca[1] * y + ca[2] * z - da;
    FPTYPE rb = cb[0] * x + cb[1] * y + cb[2] * z - db;
    return ra * ra + rb * rb;
}

__device__ FPTYPE dect_unit(FPTYPE v)
{
    return v < (FPTYPE)0 ? (FPTYPE)0 : (v > (FPTYPE)1 ? (FPTYPE)1 : v);
}

__device__ void dect_search(const FPTYPE *ca, const FPTYPE *cb, FPTYPE da, FPTYPE db,
                            FPTYPE min_step, FPTYPE *out_ab, FPTYPE *out_ratio)
{
    FPTYPE best_ab = 0, best_ratio = 0;
    FPTYPE best = dect_cost(ca, cb, 0, 0, da, db);
    for (int i = 0; i <= 10; ++i) {
        FPTYPE ab = (FPTYPE)i / (FPTYPE)10;
        for (int j = 0; j <= 10; ++j) {
            FPTYPE ratio = (FPTYPE)j / (FPTYPE)10;
            FPTYPE c = dect_cost(ca, cb, ab, ratio, da, db);
            if (c < best) { best = c; best_ab = ab; best_ratio = ratio; }
        }
    }

    FPTYPE step = (FPTYPE)0.05;
    while (step >= min_step) {
        FPTYPE cand_ab[4] = { dect_unit(best_ab + step), best_ab,
                              dect_unit(best_ab - step), best_ab };
        FPTYPE cand_ratio[4] = { best_ratio, dect_unit(best_ratio + step),
                                 best_ratio, dect_unit(best_ratio - step) };
        int pick = 0;
        FPTYPE pick_cost = dect_cost(ca, cb, cand_ab[0], cand_ratio[0], da, db);
        for (int k = 1; k < 4; ++k) {
            FPTYPE c = dect_cost(ca, cb, cand_ab[k], cand_ratio[k], da, db);
            if (c < pick_cost) { pick_cost = c; pick = k; }
        }
        if (pick_cost < best) {
            best = pick_cost; best_ab = cand_ab[pick]; best_ratio = cand_ratio[pick];
        } else {
            step = step / (FPTYPE)2;
        }
    }
    *out_ab = best_ab;
    *out_ratio = best_ratio;
}

__device__ OTYPE dect_quantize(FPTYPE f)
{
#if TRUNCATE
    double v = floor((double)f * OTYPE_MAX);
    v = v < 0.0 ? 0.0 : (v > OTYPE_MAX ? OTYPE_MAX : v);
    return (OTYPE)v;
#else
    return (OTYPE)f;
#endif
}

extern "C" __global__ void dect_decompose(const short *in_a, const short *in_b,
                                          OTYPE *out_a, OTYPE *out_b, OTYPE *out_c,
                                          short *merge, const FPTYPE *params,
                                          int n, int mirror, int passes, int pre_clamp,
                                          int with_merge)
{
    int j = blockIdx.x * blockDim.x + threadIdx.x;
    if (j >= n) return;
    int i = mirror ? n - 1 - j : j;

    FPTYPE da = (FPTYPE)in_a[i];
    FPTYPE db = (FPTYPE)in_b[i];
    if (pre_clamp) {
        FPTYPE lo_a = fmin(params[0], fmin(params[1], params[2]));
        FPTYPE hi_a = fmax(params[0], fmax(params[1], params[2]));
        FPTYPE lo_b = fmin(params[3], fmin(params[4], params[5]));
        FPTYPE hi_b = fmax(params[3], fmax(params[4], params[5]));
        da = da < lo_a ? lo_a : (da > hi_a ? hi_a : da);
        db = db < lo_b ? lo_b : (db > hi_b ? hi_b : db);
    }

    /* roles[p][k]: material playing role k in pass p */
    const int roles[3][3] = { {0, 1, 2}, {2, 0, 1}, {1, 2, 0} };
    FPTYPE sum[3] = { 0, 0, 0 };
    for (int p = 0; p < passes; ++p) {
        FPTYPE ca[3], cb[3];
        for (int k = 0; k < 3; ++k) {
            ca[k] = params[roles[p][k]];
            cb[k] = params[3 + roles[p][k]];
        }
        FPTYPE ab, ratio;
        dect_search(ca, cb, da, db, params[6], &ab, &ratio);
        sum[roles[p][0]] += ab * ratio;
        sum[roles[p][1]] += ab * ((FPTYPE)1 - ratio);
        sum[roles[p][2]] += (FPTYPE)1 - ab;
    }
    if (passes > 1) {
        for (int k = 0; k < 3; ++k) sum[k] = sum[k] / (FPTYPE)passes;
    }

    out_a[j] = dect_quantize(sum[0]);
    out_b[j] = dect_quantize(sum[1]);
    out_c[j] = dect_quantize(sum[2]);

    if (with_merge) {
        double ratio = (double)params[7];
        double mixed = round((double)in_a[i] * ratio + (double)in_b[i] * (1.0 - ratio));
        mixed = mixed < -32768.0 ? -32768.0 : (mixed > 32767.0 ? 32767.0 : mixed);
        merge[j] = (short)mixed;
    }
}
"#;

/// Index of `min_step` in the parameter buffer.
pub const MIN_STEP_PARAM: usize = 6;

/// Narrow the parameter buffer for a single-precision kernel.
///
/// `min_step` is kept at or above the smallest normal `f32`, so the kernel's halving
/// loop cannot reach a zero threshold.
pub fn single_params(params: &[f64; PARAM_COUNT]) -> [f32; PARAM_COUNT] {
    let mut narrowed = (*params).map(|v| v as f32);
    narrowed[MIN_STEP_PARAM] = narrowed[MIN_STEP_PARAM].max(f32::MIN_POSITIVE);
    narrowed
}

/// C type name for a compute precision.
pub const fn fp_type(precision: Precision) -> &'static str {
    match precision {
        Precision::Double => "double",
        Precision::Single => "float",
    }
}

/// C type name for an output representation.
pub const fn output_type(repr: OutputRepr) -> &'static str {
    match repr {
        OutputRepr::U8 => "unsigned char",
        OutputRepr::U16 => "unsigned short",
        OutputRepr::F32 => "float",
        OutputRepr::F64 => "double",
    }
}

/// Kernel source for one `(precision, repr)` combination.
pub fn specialize(precision: Precision, repr: OutputRepr) -> String {
    let descriptor = repr.descriptor();
    let prelude = format!(
        "#define FPTYPE {fp}\n#define OTYPE {ot}\n#define OTYPE_MAX {max:.1}\n#define TRUNCATE {tr}\n",
        fp = fp_type(precision),
        ot = output_type(repr),
        max = descriptor.scale,
        tr = u8::from(descriptor.truncate),
    );
    prelude + KERNEL_BODY
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_specialize_prelude() {
        let src = specialize(Precision::Single, OutputRepr::U16);
        assert!(src.starts_with("#define FPTYPE float\n#define OTYPE unsigned short\n"));
        assert!(src.contains("#define OTYPE_MAX 65535.0\n#define TRUNCATE 1\n"));
        assert!(src.contains(KERNEL_NAME));

        let src = specialize(Precision::Double, OutputRepr::F64);
        assert!(src.contains("#define FPTYPE double\n#define OTYPE double\n"));
        assert!(src.contains("#define TRUNCATE 0\n"));
    }

    #[test]
    fn test_single_params_keep_threshold_positive() {
        let mut params = [62.0, -1000.0, 512.0, 58.0, -1000.0, 397.0, 1e-50, 0.5];
        let narrowed = single_params(&params);
        assert_eq!(narrowed[MIN_STEP_PARAM], f32::MIN_POSITIVE);
        assert_eq!(narrowed[2], 512.0);
        assert_eq!(narrowed[7], 0.5);

        params[MIN_STEP_PARAM] = 0.001;
        assert_eq!(single_params(&params)[MIN_STEP_PARAM], 0.001f32);
    }
}
