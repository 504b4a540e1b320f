//! # eBPF Kernel-Side Instrumentation
//!
//! Tracepoint programs that report every exec to userspace.
//!
//! ## Programs
//!
//! - **Tracepoint**: `sched_process_exec` - fires after a successful exec, writes to `EVENTS`
//! - **Tracepoint**: `sys_enter_execve` - fires on execve entry, writes to `EXEC_EVENTS`
//!
//! ## Maps (Shared with Userspace)
//!
//! - `EVENTS` - Ring buffer (256KB) read by the ring buffer capture
//! - `EXEC_EVENTS` - Perf event array, one buffer per CPU
//! - `SCRATCH` - Per-CPU slot used to build events too large for the BPF stack
//!
//! ## Build
//!
//! Always compiled in release mode (debug includes incompatible formatting code):
//! ```bash
//! cargo xtask build-ebpf
//! ```

#![no_std]
#![no_main]
#![allow(unused_unsafe)]

use aya_ebpf::{
    helpers::{
        bpf_get_current_comm, bpf_get_current_pid_tgid, bpf_probe_read_kernel_str_bytes,
        bpf_probe_read_user_str_bytes,
    },
    macros::{map, tracepoint},
    maps::{PerCpuArray, PerfEventArray, RingBuf},
    programs::TracePointContext,
    EbpfContext,
};
use aya_log_ebpf::debug;
use execwatch_common::{ExecEvent, TASK_COMM_LEN};

// ============================================================================
// Tracepoint Record Offsets
// ============================================================================

/// `__data_loc char[] filename` in /sys/kernel/tracing/events/sched/sched_process_exec/format
const SCHED_EXEC_FILENAME_LOC: usize = 8;

/// `const char * filename` in /sys/kernel/tracing/events/syscalls/sys_enter_execve/format
const EXECVE_FILENAME_PTR: usize = 16;

/// Written when the user-space filename cannot be read
const UNKNOWN_FILENAME: &[u8] = b"unknown";

// ============================================================================
// eBPF Maps
// ============================================================================

#[map]
static EVENTS: RingBuf = RingBuf::with_byte_size(256 * 1024, 0);

#[map]
static EXEC_EVENTS: PerfEventArray<ExecEvent> = PerfEventArray::new(0);

#[map]
static SCRATCH: PerCpuArray<ExecEvent> = PerCpuArray::with_max_entries(1, 0);

// ============================================================================
// eBPF Program Hooks
// ============================================================================

/// Hook: sched/sched_process_exec
#[tracepoint]
pub fn sched_process_exec(ctx: TracePointContext) -> u32 {
    match try_sched_process_exec(&ctx) {
        Ok(()) => 0,
        Err(_) => 1,
    }
}

fn try_sched_process_exec(ctx: &TracePointContext) -> Result<(), i64> {
    // Low 16 bits: offset of the string from the start of the record, high 16 bits: length
    let data_loc: u32 = unsafe { ctx.read_at(SCHED_EXEC_FILENAME_LOC)? };
    let filename = unsafe { (ctx.as_ptr() as *const u8).add((data_loc & 0xFFFF) as usize) };

    let Some(mut entry) = EVENTS.reserve::<ExecEvent>(0) else {
        return Err(1);
    };

    // SAFETY: every field is written below before the entry is submitted
    let event = unsafe { &mut *entry.as_mut_ptr() };
    event.pid = current_tgid();
    event.comm = current_comm();

    let read = unsafe { bpf_probe_read_kernel_str_bytes(filename, &mut event.filename) }
        .map(<[u8]>::len);
    match read {
        Ok(len) => {
            event.filename_len = len as i32;
            entry.submit(0);
            Ok(())
        }
        Err(e) => {
            entry.discard(0);
            Err(e)
        }
    }
}

/// Hook: syscalls/sys_enter_execve
#[tracepoint]
pub fn sys_enter_execve(ctx: TracePointContext) -> u32 {
    match try_sys_enter_execve(&ctx) {
        Ok(()) => 0,
        Err(_) => 1,
    }
}

fn try_sys_enter_execve(ctx: &TracePointContext) -> Result<(), i64> {
    let slot = SCRATCH.get_ptr_mut(0).ok_or(1i64)?;
    let event = unsafe { &mut *slot };

    event.pid = current_tgid();
    event.comm = current_comm();

    let filename: *const u8 = unsafe { ctx.read_at(EXECVE_FILENAME_PTR)? };
    let read = unsafe { bpf_probe_read_user_str_bytes(filename, &mut event.filename) }
        .map(<[u8]>::len);
    let len = match read {
        Ok(len) => len,
        Err(_) => {
            event.filename[..UNKNOWN_FILENAME.len()].copy_from_slice(UNKNOWN_FILENAME);
            UNKNOWN_FILENAME.len()
        }
    };
    event.filename_len = len as i32;

    debug!(ctx, "execve pid={} filename_len={}", event.pid, len);

    EXEC_EVENTS.output(ctx, event, 0);
    Ok(())
}

// Helper: thread group id of the current task
fn current_tgid() -> u32 {
    (unsafe { bpf_get_current_pid_tgid() } >> 32) as u32
}

// Helper: command name, empty if the helper fails
fn current_comm() -> [u8; TASK_COMM_LEN] {
    unsafe { bpf_get_current_comm() }.unwrap_or([0u8; TASK_COMM_LEN])
}

#[link_section = "license"]
#[no_mangle]
static LICENSE: [u8; 13] = *b"Dual MIT/GPL\0";

#[cfg(all(not(test), target_os = "none"))]
#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    unsafe { core::hint::unreachable_unchecked() }
}
