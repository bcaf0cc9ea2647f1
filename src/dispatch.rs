/* src/dispatch.rs */
//! Backend dispatcher.
//!
//! A [`Dispatcher`] is built once per run from an immutable [`RunConfig`]. Building it
//! performs the one-time backend initialisation (solver setup, kernel compilation);
//! [`Dispatcher::dispatch`] then routes each batch to that backend.
//!
//! Failure policy:
//!
//! - accelerator initialisation failure: warning, batches run on CPU-search
//! - accelerator execution failure: warning, one CPU-search re-run of the same batch
//! - re-run failure: [`DectError::Fatal`], the only terminal error
/*▫~•◦────────────────────────────────────────────────────────────────────────────────────‣
 * © 2025 ArcMoon Studios ◦ SPDX-License-Identifier MIT OR Apache-2.0 ◦ Author: Lord Xyn ✶
 *///◦────────────────────────────────────────────────────────────────────────────────────‣

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use tracing::{debug, error, info, warn};

use crate::accel;
use crate::backend::{Backend, BackendId, CpuClosedFormBackend, CpuSearchBackend};
use crate::batch::{validate_merge_ratio, BatchOutput, MeasurementBatch};
use crate::error::{DectError, Result};
use crate::model::MaterialModel;
use crate::quantize::OutputRepr;
use crate::real::Precision;
use crate::solver::{validate_min_step, Enhancement, DEFAULT_MIN_STEP};
use crate::{counter, gauge, histogram};

/// Everything a run needs, fixed before the first batch.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    /// Requested backend.
    pub backend: BackendId,
    /// Mixing coefficients.
    pub model: MaterialModel,
    /// Descent stopping threshold.
    pub min_step: f64,
    /// Standard or bias-cancelling search.
    pub enhancement: Enhancement,
    /// Clamp measurements to the coefficient range before searching.
    pub pre_clamp: bool,
    /// Requested compute precision.
    pub precision: Precision,
    /// Output sample type.
    pub repr: OutputRepr,
    /// Write voxel `i` to slot `N - 1 - i`.
    pub mirror: bool,
    /// Compute the merge plane with this ratio.
    pub merge_ratio: Option<f64>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            backend: BackendId::CpuSearch,
            model: MaterialModel::default(),
            min_step: DEFAULT_MIN_STEP,
            enhancement: Enhancement::Standard,
            pre_clamp: true,
            precision: Precision::Double,
            repr: OutputRepr::U8,
            mirror: false,
            merge_ratio: None,
        }
    }
}

impl RunConfig {
    /// Check every parameter that does not depend on a backend.
    pub fn validate(&self) -> Result<()> {
        self.model.validate()?;
        validate_min_step(self.min_step)?;
        if let Some(ratio) = self.merge_ratio {
            validate_merge_ratio(ratio)?;
        }
        Ok(())
    }
}

/// Routes batches to the configured backend with single CPU-search fallback.
#[derive(Debug)]
pub struct Dispatcher {
    config: RunConfig,
    primary: Box<dyn Backend>,
    /// Whether `primary` is an accelerator (and therefore eligible for fallback).
    accelerated: bool,
    fallback: Box<dyn Backend>,
    fallbacks: AtomicU64,
}

impl Dispatcher {
    /// Initialise the backend named by `config.backend`.
    ///
    /// An accelerator that cannot be brought up is not an error: the dispatcher warns
    /// and uses CPU-search instead. A singular model with the closed-form backend is
    /// reported as [`DectError::Domain`].
    pub fn new(config: RunConfig) -> Result<Self> {
        config.validate()?;
        let cpu_search = CpuSearchBackend::new(&config)?;

        let (primary, accelerated): (Box<dyn Backend>, bool) = match config.backend {
            BackendId::CpuSearch => (Box::new(cpu_search.clone()), false),
            BackendId::CpuClosedForm => (Box::new(CpuClosedFormBackend::new(&config)?), false),
            BackendId::Accelerator(k) => match accel::open(k, &config) {
                Ok(backend) => (backend, true),
                Err(e) => {
                    warn!(
                        requested = %config.backend,
                        error = %e,
                        "Accelerator unavailable; using CPU search"
                    );
                    (Box::new(cpu_search.clone()), false)
                }
            },
        };

        Ok(Self::assemble(config, primary, accelerated, Box::new(cpu_search)))
    }

    /// Use a caller-supplied accelerator implementation as the primary backend.
    pub fn with_accelerator(config: RunConfig, accelerator: Box<dyn Backend>) -> Result<Self> {
        config.validate()?;
        let cpu_search = CpuSearchBackend::new(&config)?;
        Ok(Self::assemble(config, accelerator, true, Box::new(cpu_search)))
    }

    fn assemble(
        config: RunConfig,
        primary: Box<dyn Backend>,
        accelerated: bool,
        fallback: Box<dyn Backend>,
    ) -> Self {
        if accelerated && primary.precision() != config.precision {
            warn!(
                backend = primary.name(),
                requested = %config.precision,
                achieved = %primary.precision(),
                "Accelerator precision differs from request"
            );
        }
        info!(
            backend = primary.name(),
            precision = %primary.precision(),
            repr = %config.repr,
            enhancement = %config.enhancement,
            "Dispatcher initialised"
        );
        Self { config, primary, accelerated, fallback, fallbacks: AtomicU64::new(0) }
    }

    /// Replace the CPU-search fallback.
    #[cfg(test)]
    pub(crate) fn with_fallback(mut self, fallback: Box<dyn Backend>) -> Self {
        self.fallback = fallback;
        self
    }

    /// The run configuration.
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Name of the backend batches are routed to.
    pub fn active_backend(&self) -> &str {
        self.primary.name()
    }

    /// Whether batches go to an accelerator.
    pub fn is_accelerated(&self) -> bool {
        self.accelerated
    }

    /// Precision the active backend computes in.
    pub fn precision(&self) -> Precision {
        self.primary.precision()
    }

    /// Number of batches re-run on CPU-search so far.
    pub fn fallback_count(&self) -> u64 {
        self.fallbacks.load(Ordering::Relaxed)
    }

    /// Process one batch. Blocks until outputs are complete.
    pub fn dispatch(&self, batch: &MeasurementBatch) -> Result<BatchOutput> {
        let start = Instant::now();
        counter!("dect.dispatch.batches").increment(1);

        let result = match self.primary.execute(batch) {
            Ok(out) => Ok(out),
            Err(e) if self.accelerated => self.fall_back(batch, e),
            Err(e) => Err(e),
        };

        let elapsed_ms = start.elapsed().as_secs_f64() * 1e3;
        histogram!("dect.dispatch.batch_ms").record(elapsed_ms);
        gauge!("dect.dispatch.batch_voxels").set(batch.len() as f64);
        if result.is_ok() && elapsed_ms > 0.0 {
            histogram!("dect.dispatch.voxels_per_ms").record(batch.len() as f64 / elapsed_ms);
        }
        debug!(voxels = batch.len(), elapsed_ms, ok = result.is_ok(), "Batch dispatched");
        result
    }

    fn fall_back(&self, batch: &MeasurementBatch, primary: DectError) -> Result<BatchOutput> {
        self.fallbacks.fetch_add(1, Ordering::Relaxed);
        counter!("dect.dispatch.fallbacks").increment(1);
        warn!(
            backend = self.primary.name(),
            error = %primary,
            "Accelerator failed; re-running batch on CPU search"
        );

        self.fallback.execute(batch).map_err(|fallback| {
            error!(
                primary = %primary,
                fallback = %fallback,
                "CPU search fallback failed; abandoning batch"
            );
            DectError::Fatal { primary: Box::new(primary), fallback: Box::new(fallback) }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    /// Accelerator stand-in that always fails mid-batch.
    #[derive(Debug, Default)]
    struct FailingAccelerator {
        calls: Arc<AtomicUsize>,
    }

    impl Backend for FailingAccelerator {
        fn name(&self) -> &str {
            "mock-accelerator"
        }

        fn precision(&self) -> Precision {
            Precision::Single
        }

        fn execute(&self, _batch: &MeasurementBatch) -> Result<BatchOutput> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(DectError::BackendExecution {
                backend: self.name().to_string(),
                reason: "kernel returned error code -5".to_string(),
            })
        }
    }

    /// Fallback stand-in that counts calls and optionally fails.
    #[derive(Debug)]
    struct CountingFallback {
        inner: CpuSearchBackend,
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    impl Backend for CountingFallback {
        fn name(&self) -> &str {
            "counting-fallback"
        }

        fn precision(&self) -> Precision {
            self.inner.precision()
        }

        fn execute(&self, batch: &MeasurementBatch) -> Result<BatchOutput> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(DectError::input("fallback refused the batch"));
            }
            self.inner.execute(batch)
        }
    }

    fn batch() -> MeasurementBatch {
        MeasurementBatch::new(vec![62, -32, 91, 316, -469], vec![58, -90, 54, 223, -471]).unwrap()
    }

    fn config() -> RunConfig {
        RunConfig { min_step: 0.01, merge_ratio: Some(0.5), mirror: true, ..RunConfig::default() }
    }

    #[test]
    fn test_accelerator_failure_falls_back_once() {
        let accel_calls = Arc::new(AtomicUsize::new(0));
        let fallback_calls = Arc::new(AtomicUsize::new(0));
        let cfg = config();

        let dispatcher = Dispatcher::with_accelerator(
            cfg.clone(),
            Box::new(FailingAccelerator { calls: accel_calls.clone() }),
        )
        .unwrap()
        .with_fallback(Box::new(CountingFallback {
            inner: CpuSearchBackend::new(&cfg).unwrap(),
            calls: fallback_calls.clone(),
            fail: false,
        }));

        let out = dispatcher.dispatch(&batch()).unwrap();
        let direct = CpuSearchBackend::new(&cfg).unwrap().execute(&batch()).unwrap();
        assert_eq!(out, direct);
        assert_eq!(accel_calls.load(Ordering::SeqCst), 1);
        assert_eq!(fallback_calls.load(Ordering::SeqCst), 1);
        assert_eq!(dispatcher.fallback_count(), 1);
    }

    #[test]
    fn test_failed_fallback_is_fatal() {
        let fallback_calls = Arc::new(AtomicUsize::new(0));
        let cfg = config();
        let dispatcher =
            Dispatcher::with_accelerator(cfg.clone(), Box::new(FailingAccelerator::default()))
                .unwrap()
                .with_fallback(Box::new(CountingFallback {
                    inner: CpuSearchBackend::new(&cfg).unwrap(),
                    calls: fallback_calls.clone(),
                    fail: true,
                }));

        let err = dispatcher.dispatch(&batch()).unwrap_err();
        assert!(err.is_fatal(), "{err}");
        assert_eq!(fallback_calls.load(Ordering::SeqCst), 1);
        assert_eq!(dispatcher.fallback_count(), 1);
    }

    #[test]
    fn test_default_fallback_is_cpu_search() {
        let cfg = config();
        let dispatcher =
            Dispatcher::with_accelerator(cfg.clone(), Box::new(FailingAccelerator::default()))
                .unwrap();
        assert!(dispatcher.is_accelerated());
        assert_eq!(dispatcher.precision(), Precision::Single);
        let out = dispatcher.dispatch(&batch()).unwrap();
        let direct = Dispatcher::new(cfg).unwrap().dispatch(&batch()).unwrap();
        assert_eq!(out, direct);
    }

    /// Accelerator that rejects batches beyond its own index range.
    #[derive(Debug)]
    struct NarrowIndexAccelerator;

    impl Backend for NarrowIndexAccelerator {
        fn name(&self) -> &str {
            "narrow-index"
        }

        fn precision(&self) -> Precision {
            Precision::Double
        }

        fn execute(&self, batch: &MeasurementBatch) -> Result<BatchOutput> {
            Err(DectError::input(format!("batch of {} voxels exceeds kernel limit", batch.len())))
        }
    }

    #[test]
    fn test_any_accelerator_error_gets_cpu_rerun() {
        let cfg = config();
        let dispatcher =
            Dispatcher::with_accelerator(cfg.clone(), Box::new(NarrowIndexAccelerator)).unwrap();
        let out = dispatcher.dispatch(&batch()).unwrap();
        let direct = CpuSearchBackend::new(&cfg).unwrap().execute(&batch()).unwrap();
        assert_eq!(out, direct);
        assert_eq!(dispatcher.fallback_count(), 1);
    }

    #[test]
    fn test_cpu_backends_do_not_fall_back() {
        let cfg = RunConfig { backend: BackendId::CpuClosedForm, ..config() };
        let dispatcher = Dispatcher::new(cfg).unwrap();
        assert_eq!(dispatcher.active_backend(), crate::backend::CPU_CLOSED_FORM_NAME);
        dispatcher.dispatch(&batch()).unwrap();
        assert_eq!(dispatcher.fallback_count(), 0);
    }

    #[test]
    fn test_degenerate_model_closed_form_is_domain_error() {
        let mut cfg = RunConfig { backend: BackendId::CpuClosedForm, ..config() };
        cfg.model.beta_a = cfg.model.gamma_a;
        let err = Dispatcher::new(cfg).unwrap_err();
        assert!(matches!(err, DectError::Domain { .. }));
    }

    #[test]
    fn test_invalid_config_fails_fast() {
        let cfg = RunConfig { merge_ratio: Some(-0.1), ..config() };
        assert!(matches!(Dispatcher::new(cfg), Err(DectError::InputContract { .. })));
    }

    #[cfg(not(feature = "cuda"))]
    #[test]
    fn test_unavailable_accelerator_routes_to_cpu() {
        let cfg = RunConfig { backend: BackendId::Accelerator(0), ..config() };
        let dispatcher = Dispatcher::new(cfg).unwrap();
        assert!(!dispatcher.is_accelerated());
        assert_eq!(dispatcher.active_backend(), crate::backend::CPU_SEARCH_NAME);
        assert!(dispatcher.dispatch(&batch()).is_ok());
    }
}
