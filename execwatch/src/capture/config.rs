//! Capture configuration: which artifact, which tracepoint, which buffer.

use clap::ValueEnum;
use execwatch_common::{
    EVENTS_MAP, EXEC_EVENTS_MAP, SCHED_PROCESS_EXEC_PROGRAM, SYS_ENTER_EXECVE_PROGRAM,
};
use std::fmt;
use std::path::PathBuf;

use crate::domain::Tracepoint;

/// Pages per CPU for perf buffers (must be a power of two)
pub const DEFAULT_PER_CPU_PAGES: usize = 64;

/// Compiled eBPF object, produced by `cargo xtask build-ebpf`
#[derive(Debug, Clone)]
pub enum InstrumentationArtifact {
    /// Object file on disk
    File(PathBuf),
    /// Object embedded with `aya::include_bytes_aligned!`
    Embedded(&'static [u8]),
}

impl fmt::Display for InstrumentationArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Embedded(bytes) => write!(f, "<embedded, {} bytes>", bytes.len()),
        }
    }
}

/// How events travel from the kernel to the read loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BufferVariant {
    /// Shared ring buffer fed by `sched/sched_process_exec`
    Ring,
    /// Per-CPU perf buffers fed by `syscalls/sys_enter_execve`
    PerCpu,
}

impl BufferVariant {
    /// Program, tracepoint and map the bundled eBPF object uses for this variant
    #[must_use]
    pub fn default_probe(self) -> Probe {
        match self {
            Self::Ring => Probe {
                program: SCHED_PROCESS_EXEC_PROGRAM.to_string(),
                tracepoint: Tracepoint::new("sched", "sched_process_exec"),
                map: EVENTS_MAP.to_string(),
            },
            Self::PerCpu => Probe {
                program: SYS_ENTER_EXECVE_PROGRAM.to_string(),
                tracepoint: Tracepoint::new("syscalls", "sys_enter_execve"),
                map: EXEC_EVENTS_MAP.to_string(),
            },
        }
    }

    /// Oldest kernel that can load the object for this variant
    ///
    /// Perf buffers alone would work on 4.7, but the bundled object always
    /// creates the `EVENTS` ring buffer map, which needs 5.8.
    #[must_use]
    pub fn min_kernel_version(self) -> (u32, u32) {
        match self {
            Self::Ring | Self::PerCpu => (5, 8),
        }
    }
}

/// One program attached to one tracepoint, writing into one map
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Probe {
    pub program: String,
    pub tracepoint: Tracepoint,
    pub map: String,
}

/// Everything the kernel backend needs to start capturing
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub artifact: InstrumentationArtifact,
    pub variant: BufferVariant,
    pub probe: Probe,
    pub per_cpu_pages: usize,
}

impl CaptureConfig {
    #[must_use]
    pub fn new(artifact: InstrumentationArtifact, variant: BufferVariant) -> Self {
        Self {
            artifact,
            variant,
            probe: variant.default_probe(),
            per_cpu_pages: DEFAULT_PER_CPU_PAGES,
        }
    }

    #[must_use]
    pub fn with_tracepoint(mut self, tracepoint: Tracepoint) -> Self {
        self.probe.tracepoint = tracepoint;
        self
    }

    #[must_use]
    pub fn with_per_cpu_pages(mut self, pages: usize) -> Self {
        self.per_cpu_pages = pages;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variants_use_their_own_tracepoint() {
        let ring = BufferVariant::Ring.default_probe();
        let per_cpu = BufferVariant::PerCpu.default_probe();

        assert_eq!(ring.tracepoint.to_string(), "sched/sched_process_exec");
        assert_eq!(ring.map, "EVENTS");
        assert_eq!(per_cpu.tracepoint.to_string(), "syscalls/sys_enter_execve");
        assert_eq!(per_cpu.map, "EXEC_EVENTS");
    }

    #[test]
    fn test_tracepoint_override_keeps_program() {
        let config = CaptureConfig::new(
            InstrumentationArtifact::File(PathBuf::from("execwatch.o")),
            BufferVariant::PerCpu,
        )
        .with_tracepoint(Tracepoint::new("custom", "exec_probe"));

        assert_eq!(config.probe.program, "sys_enter_execve");
        assert_eq!(config.probe.tracepoint.to_string(), "custom/exec_probe");
        assert_eq!(config.per_cpu_pages, DEFAULT_PER_CPU_PAGES);
    }
}
