/* build.rs */
/*▫~•◦────────────────────────────────────────────────────────────────────────────────────‣
 * © 2025 ArcMoon Studios ◦ SPDX-License-Identifier MIT OR Apache-2.0 ◦ Author: Lord Xyn ✶
 *///◦────────────────────────────────────────────────────────────────────────────────────‣

use std::{
    env,
    path::PathBuf,
    process::Command,
};

type BuildResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Short git revision of the source tree, or `"unknown"` outside a checkout.
fn git_revision() -> String {
    let output = Command::new("git")
        .args(["rev-parse", "--short=7", "HEAD"])
        .output();

    match output {
        Ok(out) if out.status.success() => {
            let rev = String::from_utf8_lossy(&out.stdout).trim().to_string();
            if rev.is_empty() { "unknown".to_string() } else { rev }
        },
        _ => "unknown".to_string(),
    }
}

/// Locate a CUDA toolkit so NVRTC can be loaded at runtime.
///
/// Kernels are compiled at runtime through NVRTC, so nothing is linked here; the
/// probe only warns early when the `cuda` feature is on but no toolkit is visible.
fn find_cuda_root() -> BuildResult<PathBuf> {
    for var in ["CUDA_PATH", "CUDA_HOME"] {
        if let Ok(value) = env::var(var) {
            let path = PathBuf::from(value);
            if path.exists() {
                return Ok(path);
            }
        }
    }

    let standard_paths = if cfg!(windows) {
        vec![
            PathBuf::from("C:\\Program Files\\NVIDIA GPU Computing Toolkit\\CUDA\\v12.8"),
            PathBuf::from("C:\\Program Files\\NVIDIA GPU Computing Toolkit\\CUDA\\v12.6"),
        ]
    } else {
        vec![
            PathBuf::from("/usr/local/cuda"),
            PathBuf::from("/opt/cuda"),
            PathBuf::from("/usr/local/cuda-12.8"),
            PathBuf::from("/usr/local/cuda-12.6"),
        ]
    };

    standard_paths
        .into_iter()
        .find(|p| p.exists())
        .ok_or_else(|| "CUDA installation not found. Set CUDA_PATH to enable the accelerator backend.".into())
}

/// Main build script
fn main() -> BuildResult<()> {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-env-changed=CUDA_PATH");
    println!("cargo:rerun-if-env-changed=CUDA_HOME");

    println!("cargo:rustc-env=DECT_GIT_REV={}", git_revision());

    // Build scripts see enabled features through the environment, not cfg!.
    if env::var_os("CARGO_FEATURE_CUDA").is_some() {
        match find_cuda_root() {
            Ok(root) => println!("cargo:warning=CUDA toolkit found at {}", root.display()),
            Err(e) => println!("cargo:warning={e}"),
        }
    }

    Ok(())
}
