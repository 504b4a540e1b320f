//! # Kernel Buffer Readers
//!
//! Pull raw exec records out of the buffer the attached program writes into.
//!
//! ## Variants
//!
//! - [`RingBufferReader`]: one shared ring buffer (`BPF_MAP_TYPE_RINGBUF`), no loss counter
//! - [`PerCpuBufferReader`]: one perf buffer per online CPU, drained round-robin,
//!   each record carries the samples lost on its CPU since the previous read
//!
//! Both block in `epoll_wait` until data arrives or their [`InterruptHandle`]
//! fires. After an interrupt every `read()` returns `Ok(None)` without blocking.

mod per_cpu;
mod ring;
mod wakeup;

pub use per_cpu::PerCpuBufferReader;
pub use ring::RingBufferReader;
pub use wakeup::{Poller, Wakeup, WAKE_TOKEN};

use bytes::Bytes;
use std::fmt;
use std::sync::Arc;

use crate::domain::{CloseError, CpuId, ReadError};

/// One record as delivered by the kernel buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEventRecord {
    pub payload: Bytes,
    /// Source CPU, known for per-CPU buffers only
    pub cpu: Option<CpuId>,
    /// Samples dropped on `cpu` since the previous record from it
    pub lost_samples: u64,
}

impl RawEventRecord {
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self { payload: payload.into(), cpu: None, lost_samples: 0 }
    }

    #[must_use]
    pub fn with_cpu(mut self, cpu: CpuId) -> Self {
        self.cpu = Some(cpu);
        self
    }

    #[must_use]
    pub fn with_lost_samples(mut self, lost: u64) -> Self {
        self.lost_samples = lost;
        self
    }
}

/// Cloneable handle that wakes a blocked [`BufferReader::read`]
#[derive(Clone)]
pub struct InterruptHandle(Arc<dyn Fn() + Send + Sync>);

impl InterruptHandle {
    pub fn new(interrupt: impl Fn() + Send + Sync + 'static) -> Self {
        Self(Arc::new(interrupt))
    }

    pub fn interrupt(&self) {
        (self.0)();
    }
}

impl fmt::Debug for InterruptHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("InterruptHandle")
    }
}

/// Open buffer session feeding the read loop
pub trait BufferReader: Send {
    /// Block until a record is available
    ///
    /// Returns `Ok(None)` once the reader has been interrupted.
    ///
    /// # Errors
    /// Returns an error if waiting on or reading from the kernel buffer fails
    fn read(&mut self) -> Result<Option<RawEventRecord>, ReadError>;

    /// Handle that makes pending and future reads return `Ok(None)`
    fn interrupt_handle(&self) -> InterruptHandle;

    /// Release the buffer session
    ///
    /// # Errors
    /// Returns an error if the session could not be released cleanly
    fn close(self) -> Result<(), CloseError>
    where
        Self: Sized;
}

/// Buffer strategy chosen at start-up
pub enum EventBufferReader {
    Ring(RingBufferReader),
    PerCpu(PerCpuBufferReader),
}

impl BufferReader for EventBufferReader {
    fn read(&mut self) -> Result<Option<RawEventRecord>, ReadError> {
        match self {
            Self::Ring(reader) => reader.read(),
            Self::PerCpu(reader) => reader.read(),
        }
    }

    fn interrupt_handle(&self) -> InterruptHandle {
        match self {
            Self::Ring(reader) => reader.interrupt_handle(),
            Self::PerCpu(reader) => reader.interrupt_handle(),
        }
    }

    fn close(self) -> Result<(), CloseError> {
        match self {
            Self::Ring(reader) => reader.close(),
            Self::PerCpu(reader) => reader.close(),
        }
    }
}
