//! # eBPF Object Loading
//!
//! Loads the compiled object (maps first, then the selected tracepoint program)
//! into the kernel. Anything created before a failure is dropped with the
//! `Ebpf` value, so a failed load leaves nothing behind.

use aya::maps::Map;
use aya::programs::TracePoint;
use aya::Ebpf;
use aya_log::EbpfLogger;
use log::{debug, info, warn};

use super::config::InstrumentationArtifact;
use crate::domain::{CloseError, CloseStage, LoadError};

/// Loaded object plus the name of the program the pipeline drives
pub struct KernelHandles {
    ebpf: Ebpf,
    program: String,
}

impl KernelHandles {
    #[must_use]
    pub fn program_name(&self) -> &str {
        &self.program
    }

    pub(crate) fn tracepoint_mut(&mut self) -> Option<&mut TracePoint> {
        self.ebpf.program_mut(&self.program)?.try_into().ok()
    }

    pub(crate) fn take_map(&mut self, name: &str) -> Option<Map> {
        self.ebpf.take_map(name)
    }
}

/// Load `artifact` and run `program` through the verifier
///
/// # Errors
/// Returns an error if the kernel rejects the object or the program
pub fn load_artifact(
    artifact: &InstrumentationArtifact,
    program: &str,
) -> Result<KernelHandles, LoadError> {
    info!("Loading eBPF objects from {artifact}");
    let mut ebpf = match artifact {
        InstrumentationArtifact::File(path) => Ebpf::load_file(path)?,
        InstrumentationArtifact::Embedded(bytes) => Ebpf::load(bytes)?,
    };
    init_ebpf_logger(&mut ebpf);

    let tracepoint: &mut TracePoint = ebpf
        .program_mut(program)
        .ok_or_else(|| LoadError::ProgramNotFound(program.to_string()))?
        .try_into()
        .map_err(|source| LoadError::Program { program: program.to_string(), source })?;
    tracepoint
        .load()
        .map_err(|source| LoadError::Program { program: program.to_string(), source })?;
    debug!("program {program} passed the verifier");

    Ok(KernelHandles { ebpf, program: program.to_string() })
}

/// Unload the program, then drop the object (closing every map fd)
///
/// # Errors
/// Returns an error if the kernel refuses to unload the program
pub fn unload_artifact(mut handles: KernelHandles) -> Result<(), CloseError> {
    let result = match handles.tracepoint_mut() {
        Some(tracepoint) => {
            tracepoint.unload().map_err(|e| CloseError::new(CloseStage::Objects, e))
        }
        None => Ok(()),
    };
    drop(handles);
    result
}

/// Forward `aya-log` records from the programs to the `log` facade
fn init_ebpf_logger(ebpf: &mut Ebpf) {
    if let Err(e) = EbpfLogger::init(ebpf) {
        warn!("Failed to initialize eBPF logger: {e}");
    }
}
