/* src/accel/cuda.rs */
//! CUDA backend: NVRTC-compiled decomposition kernel driven through `cudarc`.
//!
//! The context, module and kernel handle are created once in [`CudaBackend::new`] and
//! reused for every batch. Each batch is a blocking upload, launch and download on the
//! context's default stream.
/*▫~•◦────────────────────────────────────────────────────────────────────────────────────‣
 * © 2025 ArcMoon Studios ◦ SPDX-License-Identifier MIT OR Apache-2.0 ◦ Author: Lord Xyn ✶
 *///◦────────────────────────────────────────────────────────────────────────────────────‣

use std::sync::Arc;
use std::time::Instant;

use cudarc::driver::{
    CudaContext, CudaFunction, CudaStream, DeviceRepr, LaunchConfig, PushKernelArg,
    ValidAsZeroBits,
};
use cudarc::nvrtc::compile_ptx;
use tracing::{debug, info, warn};

use crate::accel::kernel::{single_params, specialize, KERNEL_NAME, PARAM_COUNT};
use crate::accel::{build_with_fallback, PlatformInfo};
use crate::backend::Backend;
use crate::batch::{BatchOutput, MeasurementBatch, Planes};
use crate::dispatch::RunConfig;
use crate::error::{DectError, Result};
use crate::quantize::{OutputRepr, OutputSample};
use crate::real::Precision;
use crate::{counter, histogram};

/// Enumerate CUDA devices. Driver errors mean "no devices".
pub(crate) fn discover() -> Vec<PlatformInfo> {
    let count = match CudaContext::device_count() {
        Ok(n) => n.max(0) as usize,
        Err(e) => {
            debug!("CUDA driver unavailable: {e:?}");
            return Vec::new();
        }
    };

    (0..count)
        .filter_map(|index| match CudaContext::new(index) {
            Ok(ctx) => {
                let name = ctx.name().unwrap_or_else(|_| format!("device {index}"));
                Some(PlatformInfo { index, name: format!("CUDA {name}") })
            }
            Err(e) => {
                warn!(index, "Skipping CUDA device: {e:?}");
                None
            }
        })
        .collect()
}

/// Decomposition backend running on one CUDA device.
#[derive(Debug)]
pub struct CudaBackend {
    name: String,
    stream: Arc<CudaStream>,
    function: CudaFunction,
    precision: Precision,
    config: RunConfig,
}

impl CudaBackend {
    /// Create the context and compile the kernel for `config`.
    ///
    /// The requested precision is tried first, then its complement.
    pub fn new(platform: &PlatformInfo, config: &RunConfig) -> Result<Self> {
        let unavailable = |reason: String| DectError::BackendUnavailable {
            backend: platform.name.clone(),
            reason,
        };

        let ctx = CudaContext::new(platform.index).map_err(|e| unavailable(format!("{e:?}")))?;
        let outcome = build_with_fallback(&platform.name, config.precision, |precision| {
            let source = specialize(precision, config.repr);
            let ptx = compile_ptx(source).map_err(|e| unavailable(format!("nvrtc: {e:?}")))?;
            let module = ctx.load_module(ptx).map_err(|e| unavailable(format!("{e:?}")))?;
            module.load_function(KERNEL_NAME).map_err(|e| unavailable(format!("{e:?}")))
        })?;

        info!(
            device = %platform.name,
            precision = %outcome.achieved,
            repr = %config.repr,
            "CUDA backend ready"
        );

        Ok(Self {
            name: platform.name.clone(),
            stream: ctx.default_stream(),
            function: outcome.artifact,
            precision: outcome.achieved,
            config: config.clone(),
        })
    }

    fn params(&self) -> [f64; PARAM_COUNT] {
        let m = &self.config.model;
        [
            m.alpha_a,
            m.beta_a,
            m.gamma_a,
            m.alpha_b,
            m.beta_b,
            m.gamma_b,
            self.config.min_step,
            self.config.merge_ratio.unwrap_or(0.0),
        ]
    }

    fn failed(&self, stage: &str, e: impl std::fmt::Debug) -> DectError {
        DectError::BackendExecution {
            backend: self.name.clone(),
            reason: format!("{stage}: {e:?}"),
        }
    }

    fn run<O>(&self, batch: &MeasurementBatch) -> Result<Planes<O>>
    where
        O: OutputSample + DeviceRepr + ValidAsZeroBits,
    {
        let n = batch.len();
        if n == 0 {
            let merge = self.config.merge_ratio.map(|_| Vec::new());
            return Ok(Planes { merge, ..Planes::default() });
        }
        let len = i32::try_from(n).map_err(|_| {
            self.failed("launch", format!("batch of {n} voxels exceeds the kernel index range"))
        })?;

        let stream = &self.stream;
        let in_a = stream.memcpy_stod(batch.channel_a()).map_err(|e| self.failed("upload", e))?;
        let in_b = stream.memcpy_stod(batch.channel_b()).map_err(|e| self.failed("upload", e))?;
        let mut out_a = stream.alloc_zeros::<O>(n).map_err(|e| self.failed("alloc", e))?;
        let mut out_b = stream.alloc_zeros::<O>(n).map_err(|e| self.failed("alloc", e))?;
        let mut out_c = stream.alloc_zeros::<O>(n).map_err(|e| self.failed("alloc", e))?;
        let mut merge = stream.alloc_zeros::<i16>(n).map_err(|e| self.failed("alloc", e))?;

        let params = self.params();
        let (params_f64, params_f32);
        let mirror = i32::from(self.config.mirror);
        let passes = i32::from(self.config.enhancement.level());
        let pre_clamp = i32::from(self.config.pre_clamp);
        let with_merge = i32::from(self.config.merge_ratio.is_some());

        let mut launch = stream.launch_builder(&self.function);
        launch.arg(&in_a).arg(&in_b).arg(&mut out_a).arg(&mut out_b).arg(&mut out_c);
        launch.arg(&mut merge);
        match self.precision {
            Precision::Double => {
                params_f64 =
                    stream.memcpy_stod(&params[..]).map_err(|e| self.failed("upload", e))?;
                launch.arg(&params_f64);
            }
            Precision::Single => {
                let narrowed = single_params(&params);
                params_f32 =
                    stream.memcpy_stod(&narrowed[..]).map_err(|e| self.failed("upload", e))?;
                launch.arg(&params_f32);
            }
        }
        launch.arg(&len).arg(&mirror).arg(&passes).arg(&pre_clamp).arg(&with_merge);

        // SAFETY: argument order and types match `dect_decompose` in the specialised
        // source, and every buffer holds `n` elements.
        unsafe { launch.launch(LaunchConfig::for_num_elems(n as u32)) }
            .map_err(|e| self.failed("launch", e))?;

        Ok(Planes {
            a: stream.memcpy_dtov(&out_a).map_err(|e| self.failed("download", e))?,
            b: stream.memcpy_dtov(&out_b).map_err(|e| self.failed("download", e))?,
            c: stream.memcpy_dtov(&out_c).map_err(|e| self.failed("download", e))?,
            merge: match self.config.merge_ratio {
                Some(_) => {
                    Some(stream.memcpy_dtov(&merge).map_err(|e| self.failed("download", e))?)
                }
                None => None,
            },
        })
    }
}

impl Backend for CudaBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn precision(&self) -> Precision {
        self.precision
    }

    fn execute(&self, batch: &MeasurementBatch) -> Result<BatchOutput> {
        let start = Instant::now();
        let out = match self.config.repr {
            OutputRepr::U8 => self.run::<u8>(batch)?.into(),
            OutputRepr::U16 => self.run::<u16>(batch)?.into(),
            OutputRepr::F32 => self.run::<f32>(batch)?.into(),
            OutputRepr::F64 => self.run::<f64>(batch)?.into(),
        };
        counter!("dect.cuda.voxels").increment(batch.len() as u64);
        histogram!("dect.cuda.batch_ms").record(start.elapsed().as_secs_f64() * 1e3);
        Ok(out)
    }
}
