/* src/accel/mod.rs */
//! Accelerator support: platform discovery and kernel build with precision fallback.
//!
//! The device path itself lives in [`cuda`] behind the `cuda` feature. Everything here
//! is compiled unconditionally so the build state machine and the platform listing
//! behave the same with or without a device.
/*▫~•◦────────────────────────────────────────────────────────────────────────────────────‣
 * © 2025 ArcMoon Studios ◦ SPDX-License-Identifier MIT OR Apache-2.0 ◦ Author: Lord Xyn ✶
 *///◦────────────────────────────────────────────────────────────────────────────────────‣

pub mod kernel;

#[cfg(feature = "cuda")]
pub mod cuda;

use once_cell::sync::Lazy;
use tracing::{info, warn};

use crate::backend::Backend;
use crate::dispatch::RunConfig;
use crate::error::{DectError, Result};
use crate::real::Precision;

/// One detected accelerator platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformInfo {
    /// Platform index `k`, device id `k + 2`.
    pub index: usize,
    /// Display name.
    pub name: String,
}

static PLATFORMS: Lazy<Vec<PlatformInfo>> = Lazy::new(discover);

#[cfg(feature = "cuda")]
fn discover() -> Vec<PlatformInfo> {
    cuda::discover()
}

#[cfg(not(feature = "cuda"))]
fn discover() -> Vec<PlatformInfo> {
    Vec::new()
}

/// Accelerator platforms detected in this process. Probed once.
pub fn platforms() -> &'static [PlatformInfo] {
    &PLATFORMS
}

/// A kernel built for some precision.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildOutcome<T> {
    /// Whatever the build step produced (compiled module, handle, ...).
    pub artifact: T,
    /// Precision asked for.
    pub requested: Precision,
    /// Precision actually built.
    pub achieved: Precision,
}

impl<T> BuildOutcome<T> {
    /// `true` when the build had to switch precision.
    pub fn downgraded(&self) -> bool {
        self.requested != self.achieved
    }
}

/// Build with `requested` precision, then once more with its complement.
///
/// A second failure yields [`DectError::BackendUnavailable`] carrying both causes.
pub fn build_with_fallback<T, F>(
    backend: &str,
    requested: Precision,
    mut build: F,
) -> Result<BuildOutcome<T>>
where
    F: FnMut(Precision) -> Result<T>,
{
    let first = match build(requested) {
        Ok(artifact) => {
            info!(backend, precision = %requested, "Kernel built");
            return Ok(BuildOutcome { artifact, requested, achieved: requested });
        }
        Err(e) => e,
    };

    let fallback = requested.complement();
    warn!(
        backend,
        requested = %requested,
        fallback = %fallback,
        error = %first,
        "Kernel build failed; retrying with complementary precision"
    );

    match build(fallback) {
        Ok(artifact) => {
            warn!(
                backend,
                requested = %requested,
                achieved = %fallback,
                "Running at reduced precision"
            );
            Ok(BuildOutcome { artifact, requested, achieved: fallback })
        }
        Err(second) => Err(DectError::BackendUnavailable {
            backend: backend.to_string(),
            reason: format!("{requested}: {first}; {fallback}: {second}"),
        }),
    }
}

/// Bring up accelerator platform `index` for `config`.
#[cfg(feature = "cuda")]
pub fn open(index: usize, config: &RunConfig) -> Result<Box<dyn Backend>> {
    let platform = platforms().get(index).ok_or_else(|| DectError::BackendUnavailable {
        backend: format!("accelerator-{index}"),
        reason: format!("only {} accelerator platform(s) detected", platforms().len()),
    })?;
    Ok(Box::new(cuda::CudaBackend::new(platform, config)?))
}

/// Bring up accelerator platform `index` for `config`.
#[cfg(not(feature = "cuda"))]
pub fn open(index: usize, _config: &RunConfig) -> Result<Box<dyn Backend>> {
    Err(DectError::BackendUnavailable {
        backend: format!("accelerator-{index}"),
        reason: "built without accelerator support (enable the `cuda` feature)".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_attempt_succeeds() {
        let mut calls = Vec::new();
        let outcome = build_with_fallback("mock", Precision::Double, |p| {
            calls.push(p);
            Ok(p)
        })
        .unwrap();
        assert_eq!(calls, vec![Precision::Double]);
        assert!(!outcome.downgraded());
        assert_eq!(outcome.artifact, Precision::Double);
    }

    #[test]
    fn test_falls_back_to_complement_once() {
        let mut calls = Vec::new();
        let outcome = build_with_fallback("mock", Precision::Double, |p| {
            calls.push(p);
            match p {
                Precision::Double => Err(DectError::input("no fp64")),
                Precision::Single => Ok("ptx"),
            }
        })
        .unwrap();
        assert_eq!(calls, vec![Precision::Double, Precision::Single]);
        assert_eq!(outcome.achieved, Precision::Single);
        assert!(outcome.downgraded());
    }

    #[test]
    fn test_total_failure_is_unavailable() {
        let mut attempts = 0;
        let err = build_with_fallback::<(), _>("mock", Precision::Single, |_| {
            attempts += 1;
            Err(DectError::input("broken toolchain"))
        })
        .unwrap_err();
        assert_eq!(attempts, 2);
        assert!(matches!(err, DectError::BackendUnavailable { .. }));
        assert!(err.is_recoverable());
    }

    #[cfg(not(feature = "cuda"))]
    #[test]
    fn test_no_platforms_without_feature() {
        assert!(platforms().is_empty());
        let err = open(0, &RunConfig::default()).unwrap_err();
        assert!(matches!(err, DectError::BackendUnavailable { .. }));
    }
}
