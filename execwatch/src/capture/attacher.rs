//! Tracepoint attachment for a loaded program.

use aya::programs::trace_point::{TracePointError, TracePointLinkId};
use aya::programs::ProgramError;
use log::info;
use std::io;

use super::config::Probe;
use super::loader::KernelHandles;
use crate::domain::{AttachError, CloseError, CloseStage, Tracepoint};

/// Live attachment of the loaded program to one tracepoint
#[derive(Debug)]
pub struct AttachmentLink {
    tracepoint: Tracepoint,
    id: TracePointLinkId,
}

impl AttachmentLink {
    #[must_use]
    pub fn tracepoint(&self) -> &Tracepoint {
        &self.tracepoint
    }
}

/// Attach the program in `handles` to `probe.tracepoint`
///
/// # Errors
/// Returns an error if the tracepoint does not exist or permission is denied
pub fn attach_tracepoint(
    handles: &mut KernelHandles,
    probe: &Probe,
) -> Result<AttachmentLink, AttachError> {
    let program = handles.program_name().to_string();
    let tracepoint = handles
        .tracepoint_mut()
        .ok_or_else(|| AttachError::ProgramNotLoaded(program.clone()))?;

    let id = tracepoint
        .attach(&probe.tracepoint.category, &probe.tracepoint.name)
        .map_err(|source| attach_error(&program, &probe.tracepoint, source))?;
    info!("✓ Attached tracepoint: {}", probe.tracepoint);

    Ok(AttachmentLink { tracepoint: probe.tracepoint.clone(), id })
}

/// A missing tracefs `id` file means the kernel has no such tracepoint
fn attach_error(program: &str, tracepoint: &Tracepoint, source: ProgramError) -> AttachError {
    let missing = matches!(
        &source,
        ProgramError::TracePointError(TracePointError::FileError { io_error, .. })
            if io_error.kind() == io::ErrorKind::NotFound
    );
    if missing {
        return AttachError::Unavailable(tracepoint.clone());
    }
    AttachError::Tracepoint { program: program.to_string(), tracepoint: tracepoint.clone(), source }
}

/// Detach `link` from the kernel
///
/// # Errors
/// Returns an error if the program is gone or the kernel refuses the detach
pub fn detach_tracepoint(handles: &mut KernelHandles, link: AttachmentLink) -> Result<(), CloseError> {
    let program = handles.program_name().to_string();
    let tracepoint = handles.tracepoint_mut().ok_or_else(|| {
        CloseError::new(CloseStage::Link, format!("program {program} is no longer loaded"))
    })?;
    tracepoint.detach(link.id).map_err(|e| CloseError::new(CloseStage::Link, e))?;
    info!("Detached tracepoint: {}", link.tracepoint);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracefs_error(kind: io::ErrorKind) -> ProgramError {
        ProgramError::TracePointError(TracePointError::FileError {
            filename: String::from("/sys/kernel/tracing/events/sched/nope/id"),
            io_error: io::Error::from(kind),
        })
    }

    #[test]
    fn test_missing_tracepoint_is_unavailable() {
        let tracepoint = Tracepoint::new("sched", "nope");
        let err =
            attach_error("sched_process_exec", &tracepoint, tracefs_error(io::ErrorKind::NotFound));
        assert!(matches!(err, AttachError::Unavailable(tp) if tp == tracepoint));
    }

    #[test]
    fn test_other_failures_keep_their_source() {
        let tracepoint = Tracepoint::new("sched", "sched_process_exec");
        let err = attach_error(
            "sched_process_exec",
            &tracepoint,
            tracefs_error(io::ErrorKind::PermissionDenied),
        );
        assert!(matches!(
            err,
            AttachError::Tracepoint { ref program, .. } if program == "sched_process_exec"
        ));
        assert!(std::error::Error::source(&err).is_some());
    }
}
