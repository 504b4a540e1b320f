//! Domain model for execwatch
//!
//! This module contains core domain types and errors that provide:
//! - Compile-time safety via newtype pattern
//! - Self-documenting function signatures
//! - Structured error handling per pipeline stage

pub mod errors;
pub mod types;

// Re-export common types for convenience
pub use types::{CpuId, ParseTracepointError, Pid, Tracepoint};

pub use errors::{
    AttachError, CloseError, CloseErrors, CloseStage, DecodeError, LoadError, ReadError,
    StartError,
};
