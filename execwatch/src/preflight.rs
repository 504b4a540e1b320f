//! Pre-flight checks for execwatch
//!
//! Validates system requirements before attempting to load eBPF programs.
//! Provides clear, actionable error messages when requirements aren't met.

#![allow(unsafe_code)] // geteuid() and setrlimit() require unsafe

use anyhow::{bail, Context, Result};
use log::debug;
use std::path::Path;

use crate::capture::BufferVariant;

/// Run all pre-flight checks before eBPF loading
pub fn run_preflight_checks(object_path: &Path, variant: BufferVariant) -> Result<()> {
    check_privileges()?;
    check_kernel_version(variant)?;
    check_object_exists(object_path)?;
    Ok(())
}

/// Check if running with sufficient privileges for eBPF
fn check_privileges() -> Result<()> {
    if unsafe { libc::geteuid() } == 0 {
        return Ok(());
    }

    // CAP_BPF + CAP_PERFMON would also do, but checking them needs extra dependencies
    bail!(
        "Permission denied: execwatch requires root privileges to load eBPF programs.\n\n\
         Run with: sudo execwatch ..."
    );
}

/// Check if the kernel version supports the selected buffer variant
fn check_kernel_version(variant: BufferVariant) -> Result<()> {
    let version_str = std::fs::read_to_string("/proc/version")
        .context("Failed to read kernel version from /proc/version")?;

    // "Linux version 6.1.0-arch1-1 ..."
    let release = version_str.split_whitespace().nth(2).unwrap_or("unknown");
    check_kernel_release(release, variant)
}

fn check_kernel_release(release: &str, variant: BufferVariant) -> Result<()> {
    let Some((major, minor)) = parse_kernel_release(release) else {
        // Can't parse, let the loader report the real problem
        return Ok(());
    };

    let min = variant.min_kernel_version();
    if (major, minor) < min {
        bail!(
            "Kernel version {major}.{minor} is too old.\n\n\
             The {variant:?} buffer requires Linux {}.{} or newer.\n\
             Current kernel: {release}",
            min.0,
            min.1,
        );
    }
    Ok(())
}

/// Parse `major.minor` from a release string like `5.15.0-generic`
pub fn parse_kernel_release(release: &str) -> Option<(u32, u32)> {
    let mut parts = release.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts
        .next()?
        .chars()
        .take_while(char::is_ascii_digit)
        .collect::<String>()
        .parse()
        .ok()?;
    Some((major, minor))
}

/// Check if the compiled eBPF object exists and is a file
fn check_object_exists(object_path: &Path) -> Result<()> {
    if !object_path.exists() {
        bail!(
            "eBPF object not found: {}\n\n\
             Build it with: cargo xtask build-ebpf --release",
            object_path.display()
        );
    }
    if !object_path.is_file() {
        bail!(
            "Not a file: {}\n\n\
             --object must point to the compiled eBPF object, not a directory.",
            object_path.display()
        );
    }
    Ok(())
}

/// Lift `RLIMIT_MEMLOCK` so map creation works on kernels without memcg accounting
pub fn remove_memlock_limit() {
    let rlim = libc::rlimit { rlim_cur: libc::RLIM_INFINITY, rlim_max: libc::RLIM_INFINITY };
    let ret = unsafe { libc::setrlimit(libc::RLIMIT_MEMLOCK, &rlim) };
    if ret != 0 {
        debug!("remove limit on locked memory failed, ret is: {ret}");
    }
}
