/* src/backend.rs */
//! Backend identities and the two CPU backends.
//!
//! A backend owns a fully configured solver for one run and turns a
//! [`MeasurementBatch`] into a [`BatchOutput`]. The dispatcher only sees the
//! [`Backend`] trait, so CPU and accelerator implementations are interchangeable.
/*▫~•◦────────────────────────────────────────────────────────────────────────────────────‣
 * © 2025 ArcMoon Studios ◦ SPDX-License-Identifier MIT OR Apache-2.0 ◦ Author: Lord Xyn ✶
 *///◦────────────────────────────────────────────────────────────────────────────────────‣

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::batch::{execute_batch_as, BatchOutput, MeasurementBatch};
use crate::dispatch::RunConfig;
use crate::error::Result;
use crate::real::Precision;
use crate::solver::{ClosedFormSolver, SearchSolver};

/// Display name of the CPU search backend.
pub const CPU_SEARCH_NAME: &str = "CPU";
/// Display name of the CPU closed-form backend.
pub const CPU_CLOSED_FORM_NAME: &str = "CPU using simultaneous equations (fast but inaccurate)";

/// Executes whole batches for one run configuration.
pub trait Backend: Send + Sync + fmt::Debug {
    /// Human-readable backend name, used in logs and errors.
    fn name(&self) -> &str;

    /// Precision the backend actually computes in.
    fn precision(&self) -> Precision;

    /// Decompose `batch`. Blocks until every output is available.
    fn execute(&self, batch: &MeasurementBatch) -> Result<BatchOutput>;
}

/// Numeric device identifier: 0 and 1 are the CPU backends, `k + 2` is accelerator
/// platform `k`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub enum BackendId {
    /// Coarse-to-fine search on the CPU.
    #[default]
    CpuSearch,
    /// Closed-form inversion on the CPU.
    CpuClosedForm,
    /// Kernel offload to accelerator platform `k`.
    Accelerator(usize),
}

impl BackendId {
    /// Number of device identifiers that are always present.
    pub const CPU_DEVICES: u32 = 2;

    /// Whether this identity runs on the CPU.
    pub fn is_cpu(self) -> bool {
        !matches!(self, BackendId::Accelerator(_))
    }
}

impl From<u32> for BackendId {
    fn from(id: u32) -> Self {
        match id {
            0 => BackendId::CpuSearch,
            1 => BackendId::CpuClosedForm,
            k => BackendId::Accelerator((k - Self::CPU_DEVICES) as usize),
        }
    }
}

impl From<BackendId> for u32 {
    fn from(id: BackendId) -> Self {
        match id {
            BackendId::CpuSearch => 0,
            BackendId::CpuClosedForm => 1,
            BackendId::Accelerator(k) => k as u32 + BackendId::CPU_DEVICES,
        }
    }
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendId::CpuSearch => write!(f, "cpu-search"),
            BackendId::CpuClosedForm => write!(f, "cpu-closed-form"),
            BackendId::Accelerator(k) => write!(f, "accelerator-{k}"),
        }
    }
}

/// A solver instantiated at the run's precision.
#[derive(Debug, Clone)]
enum ByPrecision<D, S> {
    Double(D),
    Single(S),
}

/// CPU backend built on [`SearchSolver`].
#[derive(Debug, Clone)]
pub struct CpuSearchBackend {
    solver: ByPrecision<SearchSolver<f64>, SearchSolver<f32>>,
    config: RunConfig,
}

impl CpuSearchBackend {
    /// Build the solver for `config`.
    pub fn new(config: &RunConfig) -> Result<Self> {
        let (model, step) = (&config.model, config.min_step);
        let solver = match config.precision {
            Precision::Double => ByPrecision::Double(SearchSolver::new(
                model,
                step,
                config.enhancement,
                config.pre_clamp,
            )?),
            Precision::Single => ByPrecision::Single(SearchSolver::new(
                model,
                step,
                config.enhancement,
                config.pre_clamp,
            )?),
        };
        Ok(Self { solver, config: config.clone() })
    }
}

impl Backend for CpuSearchBackend {
    fn name(&self) -> &str {
        CPU_SEARCH_NAME
    }

    fn precision(&self) -> Precision {
        self.config.precision
    }

    fn execute(&self, batch: &MeasurementBatch) -> Result<BatchOutput> {
        let c = &self.config;
        match &self.solver {
            ByPrecision::Double(s) => execute_batch_as(s, batch, c.repr, c.mirror, c.merge_ratio),
            ByPrecision::Single(s) => execute_batch_as(s, batch, c.repr, c.mirror, c.merge_ratio),
        }
    }
}

/// CPU backend built on [`ClosedFormSolver`].
#[derive(Debug, Clone)]
pub struct CpuClosedFormBackend {
    solver: ByPrecision<ClosedFormSolver<f64>, ClosedFormSolver<f32>>,
    config: RunConfig,
}

impl CpuClosedFormBackend {
    /// Build the solver for `config`; fails with a domain error on a singular model.
    pub fn new(config: &RunConfig) -> Result<Self> {
        let solver = match config.precision {
            Precision::Double => ByPrecision::Double(ClosedFormSolver::new(&config.model)?),
            Precision::Single => ByPrecision::Single(ClosedFormSolver::new(&config.model)?),
        };
        Ok(Self { solver, config: config.clone() })
    }
}

impl Backend for CpuClosedFormBackend {
    fn name(&self) -> &str {
        CPU_CLOSED_FORM_NAME
    }

    fn precision(&self) -> Precision {
        self.config.precision
    }

    fn execute(&self, batch: &MeasurementBatch) -> Result<BatchOutput> {
        let c = &self.config;
        match &self.solver {
            ByPrecision::Double(s) => execute_batch_as(s, batch, c.repr, c.mirror, c.merge_ratio),
            ByPrecision::Single(s) => execute_batch_as(s, batch, c.repr, c.mirror, c.merge_ratio),
        }
    }
}
