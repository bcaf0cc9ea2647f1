/* src/error.rs */
//! Error taxonomy for the decomposition engine.
//!
//! Classification follows how the dispatcher treats each failure:
//!
//! - [`DectError::Domain`]: degenerate material model or a non-finite closed-form result.
//!   Recoverable: the caller may pick another backend.
//! - [`DectError::BackendUnavailable`]: an accelerator could not be initialised. The
//!   dispatcher turns this into a warning and routes to CPU-search.
//! - [`DectError::BackendExecution`]: an accelerator failed mid-batch. Recovered by a
//!   single CPU-search re-run.
//! - [`DectError::Fatal`]: the fallback failed as well. The batch must be abandoned.
//! - [`DectError::InputContract`]: precondition violated by the caller. Fails fast.
/*▫~•◦────────────────────────────────────────────────────────────────────────────────────‣
 * © 2025 ArcMoon Studios ◦ SPDX-License-Identifier MIT OR Apache-2.0 ◦ Author: Lord Xyn ✶
 *///◦────────────────────────────────────────────────────────────────────────────────────‣

use thiserror::Error;

/// Unified error type for the decomposition engine.
#[derive(Error, Debug)]
pub enum DectError {
    /// The material model (or a voxel) makes the closed-form inversion undefined.
    #[error("Domain Error: {reason}")]
    Domain {
        /// Which division or value became undefined
        reason: String,
    },

    /// An accelerator backend could not be brought up.
    #[error("Backend '{backend}' unavailable: {reason}")]
    BackendUnavailable {
        /// Backend display name
        backend: String,
        /// Underlying cause
        reason: String,
    },

    /// A backend failed while processing a batch.
    #[error("Backend '{backend}' failed during execution: {reason}")]
    BackendExecution {
        /// Backend display name
        backend: String,
        /// Underlying cause
        reason: String,
    },

    /// No backend could process the batch, including the CPU-search fallback.
    #[error("Fatal: primary backend failed ({primary}); CPU-search fallback failed ({fallback})")]
    Fatal {
        /// Error reported by the primary backend
        primary: Box<DectError>,
        /// Error reported by the fallback
        fallback: Box<DectError>,
    },

    /// Caller-side precondition violation (lengths, indices, parameter ranges).
    #[error("Invalid Input: {reason}")]
    InputContract {
        /// Description of the violated precondition
        reason: String,
    },

    /// An error related to configuration loading or validation.
    #[error("Configuration Error: {0}")]
    Configuration(String),

    /// I/O failure in the frame codec.
    #[error("I/O Error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failure.
    #[error("Serialization Error: {0}")]
    Serialization(String),
}

impl DectError {
    /// Shorthand for an [`DectError::InputContract`] error.
    pub fn input(reason: impl Into<String>) -> Self {
        DectError::InputContract { reason: reason.into() }
    }

    /// Shorthand for a [`DectError::Domain`] error.
    pub fn domain(reason: impl Into<String>) -> Self {
        DectError::Domain { reason: reason.into() }
    }

    /// `true` only for the terminal "no backend could process the batch" state.
    pub fn is_fatal(&self) -> bool {
        matches!(self, DectError::Fatal { .. })
    }

    /// `true` for failures the dispatcher or the caller can route around.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            DectError::Domain { .. }
                | DectError::BackendUnavailable { .. }
                | DectError::BackendExecution { .. }
        )
    }
}

impl From<serde_json::Error> for DectError {
    fn from(error: serde_json::Error) -> Self {
        DectError::Serialization(error.to_string())
    }
}

impl From<serde_yaml::Error> for DectError {
    fn from(error: serde_yaml::Error) -> Self {
        DectError::Serialization(error.to_string())
    }
}

/// A specialized `Result` type for decomposition operations.
pub type Result<T> = std::result::Result<T, DectError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let domain = DectError::domain("beta == 0");
        assert!(domain.is_recoverable());
        assert!(!domain.is_fatal());

        let fatal = DectError::Fatal {
            primary: Box::new(DectError::BackendExecution {
                backend: "mock".into(),
                reason: "boom".into(),
            }),
            fallback: Box::new(DectError::input("bad")),
        };
        assert!(fatal.is_fatal());
        assert!(!fatal.is_recoverable());
        assert!(fatal.to_string().contains("boom"));

        assert!(!DectError::input("length mismatch").is_recoverable());
    }
}
