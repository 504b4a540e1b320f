//! Structured error types for execwatch
//!
//! One enum per pipeline stage so callers can tell fatal start failures,
//! fatal read failures and recoverable decode failures apart.

use super::types::Tracepoint;
use aya::maps::perf::PerfBufferError;
use aya::maps::MapError;
use aya::programs::ProgramError;
use std::fmt;
use thiserror::Error;

/// The kernel refused the instrumentation artifact
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("kernel rejected instrumentation artifact: {0}")]
    Rejected(#[from] aya::EbpfError),

    #[error("program {0} not found in instrumentation artifact")]
    ProgramNotFound(String),

    #[error("failed to load program {program}: {source}")]
    Program {
        program: String,
        #[source]
        source: ProgramError,
    },
}

/// The program could not be attached to its tracepoint
#[derive(Error, Debug)]
pub enum AttachError {
    #[error("program {0} is not loaded")]
    ProgramNotLoaded(String),

    #[error("failed to attach {program} to tracepoint {tracepoint}: {source}")]
    Tracepoint {
        program: String,
        tracepoint: Tracepoint,
        #[source]
        source: ProgramError,
    },

    #[error("tracepoint {0} is not available")]
    Unavailable(Tracepoint),
}

/// Opening or reading the kernel-shared buffer failed
#[derive(Error, Debug)]
pub enum ReadError {
    #[error("map {0} not found in instrumentation artifact")]
    MapNotFound(String),

    #[error(transparent)]
    Map(#[from] MapError),

    #[error(transparent)]
    PerfBuffer(#[from] PerfBufferError),

    #[error("failed to enumerate online CPUs: {0}")]
    OnlineCpus(#[source] std::io::Error),

    #[error("buffer wait failed: {0}")]
    Wait(#[from] std::io::Error),

    #[error("buffer closed unexpectedly")]
    Closed,

    #[error("capture pipeline is not running")]
    NotRunning,
}

/// A raw record did not match the exec event layout
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("truncated record: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("filename length {len} outside buffer capacity {capacity}")]
    FilenameLength { len: i32, capacity: usize },
}

/// Any failure that keeps the pipeline from reaching `Running`
#[derive(Error, Debug)]
pub enum StartError {
    #[error("load failed: {0}")]
    Load(#[from] LoadError),

    #[error("attach failed: {0}")]
    Attach(#[from] AttachError),

    #[error("opening buffer reader failed: {0}")]
    Open(#[from] ReadError),

    #[error("cannot start pipeline in state {0:?}")]
    InvalidState(crate::capture::PipelineState),
}

/// Teardown step a [`CloseError`] came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseStage {
    Reader,
    Link,
    Objects,
}

impl fmt::Display for CloseStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Reader => "reader",
            Self::Link => "link",
            Self::Objects => "objects",
        })
    }
}

/// Releasing one kernel resource failed
#[derive(Error, Debug)]
#[error("closing {stage}: {source}")]
pub struct CloseError {
    pub stage: CloseStage,
    #[source]
    pub source: Box<dyn std::error::Error + Send + Sync>,
}

impl CloseError {
    pub fn new(
        stage: CloseStage,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self { stage, source: source.into() }
    }
}

/// Every teardown failure from one `close()`
#[derive(Debug, Default)]
pub struct CloseErrors(Vec<CloseError>);

impl CloseErrors {
    pub fn push(&mut self, err: CloseError) {
        self.0.push(err);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CloseError> {
        self.0.iter()
    }

    /// Stages that failed, in teardown order
    #[must_use]
    pub fn stages(&self) -> Vec<CloseStage> {
        self.0.iter().map(|e| e.stage).collect()
    }
}

impl fmt::Display for CloseErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for CloseErrors {}
