//! # Capture Lifecycle
//!
//! [`Pipeline`] owns the three kernel resources and moves through
//! `Idle → Starting → Running → Stopping → Closed`:
//!
//! 1. [`Pipeline::start`] loads, attaches and opens the reader in sequence,
//!    releasing in reverse order if any step fails.
//! 2. [`Pipeline::run`] reads, decodes and reports until cancelled or a read
//!    fails.
//! 3. [`Pipeline::close`] releases reader, link and objects, in that order,
//!    attempting every step even when an earlier one fails.
//!
//! `run` and `close` both take `&mut self`, so a close can never overlap a
//! read loop that is still executing.

use log::{debug, info, warn};

use super::backend::CaptureBackend;
use super::cancel::CancelSignal;
use super::reader::{BufferReader, RawEventRecord};
use crate::decode::decode_record;
use crate::domain::{CloseErrors, ReadError, StartError};
use crate::report::{CaptureStats, Reporter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Starting,
    Running,
    Stopping,
    Closed,
}

/// Lifecycle controller for one capture session
pub struct Pipeline<B: CaptureBackend> {
    backend: B,
    state: PipelineState,
    handles: Option<B::Handles>,
    link: Option<B::Link>,
    reader: Option<B::Reader>,
    stats: CaptureStats,
}

impl<B: CaptureBackend> Pipeline<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            state: PipelineState::Idle,
            handles: None,
            link: None,
            reader: None,
            stats: CaptureStats::default(),
        }
    }

    #[must_use]
    pub fn state(&self) -> PipelineState {
        self.state
    }

    #[must_use]
    pub fn stats(&self) -> CaptureStats {
        self.stats
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Acquire objects, link and reader
    ///
    /// # Errors
    /// Returns the first failing step's error; the pipeline is back in `Idle`
    /// with nothing acquired
    pub fn start(&mut self) -> Result<(), StartError> {
        if self.state != PipelineState::Idle {
            return Err(StartError::InvalidState(self.state));
        }
        self.state = PipelineState::Starting;

        info!("Loading eBPF programs...");
        let mut handles = match self.backend.load() {
            Ok(handles) => handles,
            Err(e) => {
                self.state = PipelineState::Idle;
                return Err(StartError::Load(e));
            }
        };

        info!("Attaching tracepoint...");
        let link = match self.backend.attach(&mut handles) {
            Ok(link) => link,
            Err(e) => {
                self.release_after_failed_start(None, handles);
                return Err(StartError::Attach(e));
            }
        };

        info!("Setting up event reader...");
        let reader = match self.backend.open_reader(&mut handles) {
            Ok(reader) => reader,
            Err(e) => {
                self.release_after_failed_start(Some(link), handles);
                return Err(StartError::Open(e));
            }
        };

        self.handles = Some(handles);
        self.link = Some(link);
        self.reader = Some(reader);
        self.state = PipelineState::Running;
        info!("✓ Successfully started exec capture");
        Ok(())
    }

    fn release_after_failed_start(&mut self, link: Option<B::Link>, mut handles: B::Handles) {
        if let Some(link) = link {
            if let Err(e) = self.backend.detach(&mut handles, link) {
                warn!("Cleanup after failed start: {e}");
            }
        }
        if let Err(e) = self.backend.unload(handles) {
            warn!("Cleanup after failed start: {e}");
        }
        self.state = PipelineState::Idle;
    }

    /// Read, decode and report until `cancel` fires
    ///
    /// A pending read is woken when `cancel` fires; the wakeup is unregistered
    /// again when `run` returns. Records that fail to decode are reported and
    /// skipped.
    ///
    /// # Errors
    /// Returns `NotRunning` outside `Running`, `Closed` if the reader reached
    /// end of stream without cancellation, or the reader's error
    pub fn run<R>(&mut self, cancel: &CancelSignal, reporter: &mut R) -> Result<(), ReadError>
    where
        R: Reporter + ?Sized,
    {
        if self.state != PipelineState::Running {
            return Err(ReadError::NotRunning);
        }
        let Some(reader) = self.reader.as_mut() else {
            return Err(ReadError::NotRunning);
        };

        let interrupt = reader.interrupt_handle();
        let _registration = cancel.on_cancel(move || interrupt.interrupt());

        let stats = &mut self.stats;
        loop {
            if cancel.is_cancelled() {
                debug!("read loop cancelled");
                return Ok(());
            }

            match reader.read()? {
                Some(record) => dispatch(&record, stats, reporter),
                None if cancel.is_cancelled() => {
                    debug!("read loop cancelled");
                    return Ok(());
                }
                None => return Err(ReadError::Closed),
            }
        }
    }

    /// Release reader, link and objects in that order
    ///
    /// Every step is attempted. Closing twice, or after a failed start, is a
    /// no-op.
    ///
    /// # Errors
    /// Returns every step that failed
    pub fn close(&mut self) -> Result<(), CloseErrors> {
        if self.state == PipelineState::Closed {
            return Ok(());
        }
        self.state = PipelineState::Stopping;

        let mut errors = CloseErrors::default();
        if let Some(reader) = self.reader.take() {
            if let Err(e) = reader.close() {
                errors.push(e);
            }
        }
        if let Some(mut handles) = self.handles.take() {
            if let Some(link) = self.link.take() {
                if let Err(e) = self.backend.detach(&mut handles, link) {
                    errors.push(e);
                }
            }
            if let Err(e) = self.backend.unload(handles) {
                errors.push(e);
            }
        }

        self.state = PipelineState::Closed;
        if errors.is_empty() {
            info!("Capture resources released");
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn dispatch<R>(record: &RawEventRecord, stats: &mut CaptureStats, reporter: &mut R)
where
    R: Reporter + ?Sized,
{
    if record.lost_samples > 0 {
        match record.cpu {
            Some(cpu) => warn!("Lost {} samples on {cpu}", record.lost_samples),
            None => warn!("Lost {} samples", record.lost_samples),
        }
        stats.lost_samples += record.lost_samples;
        reporter.samples_lost(record.cpu, record.lost_samples);
    }

    match decode_record(record) {
        Ok(event) => {
            stats.events += 1;
            reporter.event(&event);
        }
        Err(e) => {
            warn!("Skipping malformed record: {e}");
            stats.decode_failures += 1;
            reporter.decode_failed(&e, record);
        }
    }
}

impl<B: CaptureBackend> Drop for Pipeline<B> {
    fn drop(&mut self) {
        if self.state != PipelineState::Closed {
            if let Err(e) = self.close() {
                warn!("Errors while releasing capture resources: {e}");
            }
        }
    }
}
