//! Scripted capture backend: records every kernel operation and replays a
//! queue of read outcomes, blocking like a real buffer when the queue is empty.

#![allow(dead_code)]

use crossbeam_channel::{unbounded, Receiver, Sender};
use execwatch::capture::{BufferReader, CaptureBackend, InterruptHandle, RawEventRecord};
use execwatch::domain::{
    AttachError, CloseError, CloseStage, LoadError, ReadError, Tracepoint,
};
use execwatch_common::{
    COMM_OFFSET, EXEC_EVENT_SIZE, FILENAME_LEN_OFFSET, FILENAME_OFFSET, PID_OFFSET,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub type OpLog = Arc<Mutex<Vec<&'static str>>>;

/// One outcome of `BufferReader::read`
pub enum ReadStep {
    Record(RawEventRecord),
    Fail(ReadError),
    /// End of stream without an interrupt
    End,
}

/// Which operations should fail
#[derive(Default, Clone, Copy)]
pub struct Failures {
    pub load: bool,
    pub attach: bool,
    pub open: bool,
    pub reader_close: bool,
    pub detach: bool,
    pub unload: bool,
}

pub struct FakeHandles;
pub struct FakeLink;

pub struct FakeBackend {
    pub ops: OpLog,
    pub reads: Arc<AtomicUsize>,
    failures: Failures,
    steps: Option<Receiver<ReadStep>>,
}

impl FakeBackend {
    /// Backend whose reader replays `steps`; once the sender is dropped and the
    /// queue is empty, reads block until interrupted
    pub fn new(steps: Receiver<ReadStep>) -> Self {
        Self::failing(steps, Failures::default())
    }

    pub fn failing(steps: Receiver<ReadStep>, failures: Failures) -> Self {
        Self {
            ops: Arc::new(Mutex::new(Vec::new())),
            reads: Arc::new(AtomicUsize::new(0)),
            failures,
            steps: Some(steps),
        }
    }

    fn record(&self, op: &'static str) {
        self.ops.lock().unwrap().push(op);
    }
}

impl CaptureBackend for FakeBackend {
    type Handles = FakeHandles;
    type Link = FakeLink;
    type Reader = ScriptedReader;

    fn load(&mut self) -> Result<FakeHandles, LoadError> {
        self.record("load");
        if self.failures.load {
            return Err(LoadError::ProgramNotFound("sched_process_exec".to_string()));
        }
        Ok(FakeHandles)
    }

    fn attach(&mut self, _handles: &mut FakeHandles) -> Result<FakeLink, AttachError> {
        self.record("attach");
        if self.failures.attach {
            return Err(AttachError::Unavailable(Tracepoint::new("sched", "sched_process_exec")));
        }
        Ok(FakeLink)
    }

    fn open_reader(&mut self, _handles: &mut FakeHandles) -> Result<ScriptedReader, ReadError> {
        self.record("open");
        if self.failures.open {
            return Err(ReadError::MapNotFound("EVENTS".to_string()));
        }
        let steps = self.steps.take().ok_or(ReadError::Closed)?;
        let (interrupt_tx, interrupt_rx) = unbounded();
        Ok(ScriptedReader {
            steps,
            interrupt_tx,
            interrupt_rx,
            interrupted: Arc::new(AtomicBool::new(false)),
            ops: self.ops.clone(),
            reads: self.reads.clone(),
            fail_close: self.failures.reader_close,
        })
    }

    fn detach(&mut self, _handles: &mut FakeHandles, _link: FakeLink) -> Result<(), CloseError> {
        self.record("detach");
        if self.failures.detach {
            return Err(CloseError::new(CloseStage::Link, "link busy"));
        }
        Ok(())
    }

    fn unload(&mut self, _handles: FakeHandles) -> Result<(), CloseError> {
        self.record("unload");
        if self.failures.unload {
            return Err(CloseError::new(CloseStage::Objects, "program pinned"));
        }
        Ok(())
    }
}

pub struct ScriptedReader {
    steps: Receiver<ReadStep>,
    interrupt_tx: Sender<()>,
    interrupt_rx: Receiver<()>,
    interrupted: Arc<AtomicBool>,
    ops: OpLog,
    reads: Arc<AtomicUsize>,
    fail_close: bool,
}

impl BufferReader for ScriptedReader {
    fn read(&mut self) -> Result<Option<RawEventRecord>, ReadError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.interrupted.load(Ordering::SeqCst) {
            return Ok(None);
        }
        crossbeam_channel::select! {
            recv(self.steps) -> step => match step {
                Ok(ReadStep::Record(record)) => Ok(Some(record)),
                Ok(ReadStep::Fail(e)) => Err(e),
                Ok(ReadStep::End) => Ok(None),
                Err(_) => {
                    let _ = self.interrupt_rx.recv();
                    Ok(None)
                }
            },
            recv(self.interrupt_rx) -> _ => Ok(None),
        }
    }

    fn interrupt_handle(&self) -> InterruptHandle {
        let tx = self.interrupt_tx.clone();
        let interrupted = self.interrupted.clone();
        InterruptHandle::new(move || {
            interrupted.store(true, Ordering::SeqCst);
            let _ = tx.send(());
        })
    }

    fn close(self) -> Result<(), CloseError> {
        self.ops.lock().unwrap().push("close reader");
        if self.fail_close {
            return Err(CloseError::new(CloseStage::Reader, "buffer still mapped"));
        }
        Ok(())
    }
}

/// Encode an exec record the way the eBPF programs lay it out
pub fn encode_exec_event(pid: u32, comm: &str, filename: &str) -> Vec<u8> {
    encode_with_len(pid, comm, filename, i32::try_from(filename.len()).unwrap())
}

pub fn encode_with_len(pid: u32, comm: &str, filename: &str, filename_len: i32) -> Vec<u8> {
    let mut buf = vec![0u8; EXEC_EVENT_SIZE];
    buf[PID_OFFSET..PID_OFFSET + 4].copy_from_slice(&pid.to_le_bytes());
    buf[COMM_OFFSET..COMM_OFFSET + comm.len()].copy_from_slice(comm.as_bytes());
    buf[FILENAME_OFFSET..FILENAME_OFFSET + filename.len()].copy_from_slice(filename.as_bytes());
    buf[FILENAME_LEN_OFFSET..FILENAME_LEN_OFFSET + 4].copy_from_slice(&filename_len.to_le_bytes());
    buf
}

pub fn exec_record(pid: u32, comm: &str, filename: &str) -> RawEventRecord {
    RawEventRecord::new(encode_exec_event(pid, comm, filename))
}
