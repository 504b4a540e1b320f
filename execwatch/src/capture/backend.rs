//! Kernel-facing half of the pipeline.
//!
//! [`CaptureBackend`] is the seam between the lifecycle controller and the
//! kernel. [`AyaBackend`] drives the real eBPF object; tests plug in scripted
//! backends.

use log::info;

use super::attacher::{attach_tracepoint, detach_tracepoint, AttachmentLink};
use super::config::{BufferVariant, CaptureConfig};
use super::loader::{load_artifact, unload_artifact, KernelHandles};
use super::reader::{
    BufferReader, EventBufferReader, PerCpuBufferReader, RingBufferReader,
};
use crate::domain::{AttachError, CloseError, LoadError, ReadError};

/// Acquire and release the three kernel resources, in dependency order
pub trait CaptureBackend {
    /// Loaded programs and maps
    type Handles;
    /// Program-to-tracepoint attachment, valid while `Handles` lives
    type Link;
    /// Open buffer session
    type Reader: BufferReader;

    /// # Errors
    /// Returns an error if the kernel rejects the artifact
    fn load(&mut self) -> Result<Self::Handles, LoadError>;

    /// # Errors
    /// Returns an error if the tracepoint is missing or permission is denied
    fn attach(&mut self, handles: &mut Self::Handles) -> Result<Self::Link, AttachError>;

    /// # Errors
    /// Returns an error if the buffer map cannot be opened
    fn open_reader(&mut self, handles: &mut Self::Handles) -> Result<Self::Reader, ReadError>;

    /// # Errors
    /// Returns an error if the kernel refuses the detach
    fn detach(&mut self, handles: &mut Self::Handles, link: Self::Link) -> Result<(), CloseError>;

    /// # Errors
    /// Returns an error if the program cannot be unloaded
    fn unload(&mut self, handles: Self::Handles) -> Result<(), CloseError>;
}

/// Backend driving the compiled execwatch eBPF object through aya
#[derive(Debug)]
pub struct AyaBackend {
    config: CaptureConfig,
}

impl AyaBackend {
    #[must_use]
    pub fn new(config: CaptureConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }
}

impl CaptureBackend for AyaBackend {
    type Handles = KernelHandles;
    type Link = AttachmentLink;
    type Reader = EventBufferReader;

    fn load(&mut self) -> Result<KernelHandles, LoadError> {
        load_artifact(&self.config.artifact, &self.config.probe.program)
    }

    fn attach(&mut self, handles: &mut KernelHandles) -> Result<AttachmentLink, AttachError> {
        attach_tracepoint(handles, &self.config.probe)
    }

    fn open_reader(&mut self, handles: &mut KernelHandles) -> Result<EventBufferReader, ReadError> {
        let map_name = &self.config.probe.map;
        let map = handles.take_map(map_name).ok_or_else(|| ReadError::MapNotFound(map_name.clone()))?;

        let reader = match self.config.variant {
            BufferVariant::Ring => EventBufferReader::Ring(RingBufferReader::open(map)?),
            BufferVariant::PerCpu => EventBufferReader::PerCpu(PerCpuBufferReader::open(
                map,
                self.config.per_cpu_pages,
            )?),
        };
        info!("Reading {map_name} ({:?} buffer)", self.config.variant);
        Ok(reader)
    }

    fn detach(&mut self, handles: &mut KernelHandles, link: AttachmentLink) -> Result<(), CloseError> {
        detach_tracepoint(handles, link)
    }

    fn unload(&mut self, handles: KernelHandles) -> Result<(), CloseError> {
        unload_artifact(handles)
    }
}
