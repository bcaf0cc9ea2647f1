/* src/lib.rs */
#![warn(missing_docs)]
//! # dect - Dual-Energy Three-Material Decomposition
//!
//! Splits each voxel of a dual-energy acquisition into the fractions of three
//! reference materials. Two measurements per voxel, three unknowns, one constraint
//! (`a + b + c = 1`): the system is solved per voxel, independently.
//!
//! ## Pipeline
//!
//! ```text
//! MeasurementBatch -> Dispatcher -> Backend -> FractionSolver -> quantize -> BatchOutput
//! ```
//!
//! - [`solver::SearchSolver`]: coarse grid scan plus coordinate descent, optionally
//!   averaged over three material orders.
//! - [`solver::ClosedFormSolver`]: direct inversion, fast but unclamped.
//! - [`dispatch::Dispatcher`]: picks CPU search, CPU closed form or an accelerator, and
//!   re-runs a failed accelerator batch once on CPU search.
//!
//! ```no_run
//! use dect::{Dispatcher, MeasurementBatch, RunConfig};
//!
//! # fn main() -> dect::Result<()> {
//! let dispatcher = Dispatcher::new(RunConfig::default())?;
//! let batch = MeasurementBatch::new(vec![62, -1000], vec![58, -1000])?;
//! let planes = dispatcher.dispatch(&batch)?;
//! assert_eq!(planes.len(), 2);
//! # Ok(())
//! # }
//! ```
/*▫~•◦────────────────────────────────────────────────────────────────────────────────────‣
 * © 2025 ArcMoon Studios ◦ SPDX-License-Identifier MIT OR Apache-2.0 ◦ Author: Lord Xyn ✶
 *///◦────────────────────────────────────────────────────────────────────────────────────‣

pub mod accel;
pub mod backend;
pub mod batch;
pub mod config;
pub mod devices;
pub mod dispatch;
pub mod error;
pub mod frames;
pub mod metrics;
pub mod model;
pub mod quantize;
pub mod real;
pub mod reconstitute;
pub mod solver;

pub use backend::{Backend, BackendId};
pub use batch::{execute_batch, BatchOutput, MeasurementBatch, Planes};
pub use config::DectConfig;
pub use devices::{device_count, device_name};
pub use dispatch::{Dispatcher, RunConfig};
pub use error::{DectError, Result};
pub use model::{FractionTriple, MaterialModel, Measurement};
pub use quantize::{blend, quantize, OutputRepr};
pub use real::Precision;
pub use reconstitute::reconstitute;
pub use solver::{ClosedFormSolver, Enhancement, FractionSolver, SearchSolver};

/// Library version: short git revision and package version.
pub fn version() -> String {
    format!("{} v{}", env!("DECT_GIT_REV"), env!("CARGO_PKG_VERSION"))
}
