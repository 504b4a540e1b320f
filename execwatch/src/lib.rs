//! # execwatch - eBPF Process Execution Tracer
//!
//! execwatch attaches a small eBPF program to an exec tracepoint and streams
//! one record per successful `execve` (pid, command name, executable path)
//! back to user space.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     eBPF Programs (Kernel)                      │
//! │  • sched/sched_process_exec    → EVENTS (ring buffer)           │
//! │  • syscalls/sys_enter_execve   → EXEC_EVENTS (per-CPU buffers)  │
//! └───────────────────────┬─────────────────────────────────────────┘
//!                         │ 536-byte ExecEvent records
//!                         ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    execwatch (This Crate)                       │
//! │                                                                 │
//! │  ┌──────────┐   ┌──────────┐   ┌──────────┐   ┌──────────┐    │
//! │  │  Loader  │──▶│ Attacher │──▶│  Reader  │──▶│ Decoder  │    │
//! │  └──────────┘   └──────────┘   └──────────┘   └────┬─────┘    │
//! │        ▲              ▲              ▲              │          │
//! │        └──────── Pipeline (start / run / close) ────┤          │
//! │                                                     ▼          │
//! │                                              ┌──────────┐      │
//! │                                              │ Reporter │      │
//! │                                              └──────────┘      │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! - [`capture`]: kernel resources and the lifecycle controller
//!   - `loader` / `attacher`: load the object, attach the tracepoint
//!   - `reader`: ring buffer and per-CPU perf buffer readers
//!   - `pipeline`: `Idle → Starting → Running → Stopping → Closed`
//!
//! - [`decode`]: byte-level parsing of exec records
//!
//! - [`report`]: where decoded events go (log lines, JSON lines, channels)
//!
//! - [`preflight`]: privilege, kernel version and object checks
//!
//! - [`cli`]: Command-line argument parsing and configuration
//!
//! - [`domain`]: Core domain types (Pid, CpuId, Tracepoint) and errors
//!
//! ## Typical Usage
//!
//! ```bash
//! cargo xtask build-ebpf --release
//! sudo ./target/release/execwatch
//! sudo ./target/release/execwatch --buffer per-cpu --json
//! ```

// Expose modules for testing
pub mod capture;
pub mod cli;
pub mod decode;
pub mod domain;
pub mod preflight;
pub mod report;
