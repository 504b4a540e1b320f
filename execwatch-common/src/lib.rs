//! # Shared Data Structures (eBPF ↔ Userspace)
//!
//! Defines the exec event record and the program/map names shared between the
//! kernel-side eBPF programs and userspace. The record uses `#[repr(C)]` so both
//! sides agree on a fixed little-endian layout:
//!
//! ```text
//! offset  size  field
//!      0     4  pid           (u32, thread group id)
//!      4    16  comm          (NUL-padded, kernel TASK_COMM_LEN)
//!     20   512  filename      (NUL-padded, only filename_len bytes are valid)
//!    532     4  filename_len  (i32)
//! ```
//!
//! ## Capture Sources
//!
//! 1. **Ring buffer** - `sched/sched_process_exec` writes into the `EVENTS` ring buffer
//! 2. **Per-CPU perf buffers** - `syscalls/sys_enter_execve` writes into `EXEC_EVENTS`

#![no_std]

// ============================================================================
// Kernel Limits
// ============================================================================

/// Length of the kernel's short command name (`TASK_COMM_LEN`)
pub const TASK_COMM_LEN: usize = 16;

/// Capacity of the filename buffer carried in every exec event
pub const MAX_FILENAME_LEN: usize = 512;

// ============================================================================
// Wire Layout
// ============================================================================

pub const PID_OFFSET: usize = 0;
pub const COMM_OFFSET: usize = PID_OFFSET + 4;
pub const FILENAME_OFFSET: usize = COMM_OFFSET + TASK_COMM_LEN;
pub const FILENAME_LEN_OFFSET: usize = FILENAME_OFFSET + MAX_FILENAME_LEN;

/// Size in bytes of one encoded [`ExecEvent`]
pub const EXEC_EVENT_SIZE: usize = FILENAME_LEN_OFFSET + 4;

// ============================================================================
// Program and Map Names
// ============================================================================

/// Tracepoint program feeding the ring buffer (`sched/sched_process_exec`)
pub const SCHED_PROCESS_EXEC_PROGRAM: &str = "sched_process_exec";

/// Tracepoint program feeding the per-CPU buffers (`syscalls/sys_enter_execve`)
pub const SYS_ENTER_EXECVE_PROGRAM: &str = "sys_enter_execve";

/// Ring buffer map written by [`SCHED_PROCESS_EXEC_PROGRAM`]
pub const EVENTS_MAP: &str = "EVENTS";

/// Perf event array written by [`SYS_ENTER_EXECVE_PROGRAM`]
pub const EXEC_EVENTS_MAP: &str = "EXEC_EVENTS";

// ============================================================================
// Shared Data Structures
// ============================================================================

/// Event emitted by the kernel for every successful exec
///
/// **Size**: 536 bytes, larger than the 512-byte BPF stack, so kernel code
/// builds it in place (ring buffer reservation or a per-CPU scratch slot).
#[repr(C)]
#[derive(Clone, Copy)]
pub struct ExecEvent {
    /// Process ID (TGID in Linux terms)
    pub pid: u32,

    /// Command name from `bpf_get_current_comm()`, NUL-padded
    pub comm: [u8; TASK_COMM_LEN],

    /// Executable path, NUL-padded
    pub filename: [u8; MAX_FILENAME_LEN],

    /// Number of valid leading bytes in `filename` (without the trailing NUL)
    pub filename_len: i32,
}

const _: () = assert!(core::mem::size_of::<ExecEvent>() == EXEC_EVENT_SIZE);

#[cfg(feature = "user")]
use aya::Pod;

// Pod marks the record as plain bytes for aya map access
#[cfg(feature = "user")]
#[allow(unsafe_code)]
unsafe impl Pod for ExecEvent {}
