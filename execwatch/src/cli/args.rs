//! CLI argument definitions

use clap::Parser;
use std::path::PathBuf;

use crate::capture::{BufferVariant, CaptureConfig, InstrumentationArtifact, DEFAULT_PER_CPU_PAGES};
use crate::domain::Tracepoint;

#[derive(Parser, Debug)]
#[command(
    name = "execwatch",
    about = "Trace process executions with eBPF",
    after_help = "\
EXAMPLES:
    sudo execwatch                                   Ring buffer on sched/sched_process_exec
    sudo execwatch --buffer per-cpu                  Per-CPU buffers on syscalls/sys_enter_execve
    sudo execwatch --json > execs.jsonl              One JSON object per exec"
)]
pub struct Args {
    /// Buffer used to move events out of the kernel
    #[arg(short, long, value_enum, default_value_t = BufferVariant::Ring)]
    pub buffer: BufferVariant,

    /// Compiled eBPF object (built with `cargo xtask build-ebpf --release`)
    #[arg(long, value_name = "PATH", default_value = "target/bpfel-unknown-none/release/execwatch")]
    pub object: PathBuf,

    /// Attach to CATEGORY/NAME instead of the buffer's default tracepoint
    #[arg(long, value_name = "CATEGORY/NAME")]
    pub tracepoint: Option<Tracepoint>,

    /// Pages per CPU buffer (power of two)
    #[arg(long, value_name = "N", default_value_t = DEFAULT_PER_CPU_PAGES, value_parser = parse_page_count)]
    pub per_cpu_pages: usize,

    /// Print one JSON object per exec on stdout
    #[arg(long)]
    pub json: bool,

    /// Skip privilege, kernel and object checks
    #[arg(long)]
    pub skip_preflight: bool,

    /// Suppress non-essential output
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    /// Build the capture configuration these arguments describe
    #[must_use]
    pub fn capture_config(&self) -> CaptureConfig {
        let mut config =
            CaptureConfig::new(InstrumentationArtifact::File(self.object.clone()), self.buffer)
                .with_per_cpu_pages(self.per_cpu_pages);
        if let Some(tracepoint) = &self.tracepoint {
            config = config.with_tracepoint(tracepoint.clone());
        }
        config
    }
}

fn parse_page_count(s: &str) -> Result<usize, String> {
    let pages: usize = s.parse().map_err(|e| format!("{e}"))?;
    if pages == 0 || !pages.is_power_of_two() {
        return Err(format!("{pages} is not a power of two"));
    }
    Ok(pages)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["execwatch"]).unwrap();
        let config = args.capture_config();

        assert_eq!(config.variant, BufferVariant::Ring);
        assert_eq!(config.probe, BufferVariant::Ring.default_probe());
        assert_eq!(config.per_cpu_pages, DEFAULT_PER_CPU_PAGES);
        assert!(!args.json);
    }

    #[test]
    fn test_per_cpu_with_tracepoint_override() {
        let args = Args::try_parse_from([
            "execwatch",
            "--buffer",
            "per-cpu",
            "--tracepoint",
            "custom/exec_probe",
            "--per-cpu-pages",
            "16",
        ])
        .unwrap();
        let config = args.capture_config();

        assert_eq!(config.variant, BufferVariant::PerCpu);
        assert_eq!(config.probe.tracepoint, Tracepoint::new("custom", "exec_probe"));
        assert_eq!(config.probe.map, BufferVariant::PerCpu.default_probe().map);
        assert_eq!(config.per_cpu_pages, 16);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(Args::try_parse_from(["execwatch", "--per-cpu-pages", "12"]).is_err());
        assert!(Args::try_parse_from(["execwatch", "--per-cpu-pages", "0"]).is_err());
        assert!(Args::try_parse_from(["execwatch", "--tracepoint", "no-slash"]).is_err());
        assert!(Args::try_parse_from(["execwatch", "--buffer", "perf"]).is_err());
    }
}
