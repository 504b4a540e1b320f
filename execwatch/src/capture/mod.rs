//! Capture core modules
//!
//! Everything between the compiled eBPF object and decoded records:
//! - Capture configuration (artifact, buffer variant, probe)
//! - Object loading and tracepoint attachment
//! - Ring and per-CPU buffer readers
//! - Cooperative cancellation
//! - The lifecycle controller driving all of the above

pub mod attacher;
pub mod backend;
pub mod cancel;
pub mod config;
pub mod cpu_utils;
pub mod loader;
pub mod pipeline;
pub mod reader;

// Re-export common types
pub use attacher::{attach_tracepoint, detach_tracepoint, AttachmentLink};
pub use backend::{AyaBackend, CaptureBackend};
pub use cancel::{CancelRegistration, CancelSignal};
pub use config::{
    BufferVariant, CaptureConfig, InstrumentationArtifact, Probe, DEFAULT_PER_CPU_PAGES,
};
pub use cpu_utils::online_cpus;
pub use loader::{load_artifact, unload_artifact, KernelHandles};
pub use pipeline::{Pipeline, PipelineState};
pub use reader::{
    BufferReader, EventBufferReader, InterruptHandle, PerCpuBufferReader, RawEventRecord,
    RingBufferReader,
};
