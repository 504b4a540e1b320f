use aya::maps::perf::{PerfEventArray, PerfEventArrayBuffer};
use aya::maps::{Map, MapData};
use bytes::{Bytes, BytesMut};
use execwatch_common::EXEC_EVENT_SIZE;
use log::{debug, trace};
use std::collections::VecDeque;
use std::sync::Arc;

use super::{BufferReader, InterruptHandle, Poller, RawEventRecord, Wakeup, WAKE_TOKEN};
use crate::capture::cpu_utils::online_cpus;
use crate::domain::{CloseError, CpuId, ReadError};

/// Records drained from one CPU buffer per `read_events` call
const SCRATCH_RECORDS: usize = 64;

struct CpuBuffer {
    cpu: CpuId,
    buf: PerfEventArrayBuffer<MapData>,
    /// Losses seen while no record was delivered for this CPU
    unreported_lost: u64,
}

/// Reader over a `BPF_MAP_TYPE_PERF_EVENT_ARRAY`, one mmap'd buffer per CPU
pub struct PerCpuBufferReader {
    buffers: Vec<CpuBuffer>,
    scratch: Vec<BytesMut>,
    pending: VecDeque<RawEventRecord>,
    next: usize,
    wakeup: Arc<Wakeup>,
    poller: Poller,
}

impl PerCpuBufferReader {
    /// Open one buffer of `page_count` pages for every online CPU
    ///
    /// # Errors
    /// Returns an error if the map is not a perf event array, a CPU buffer cannot
    /// be mapped, or the wait set cannot be built
    pub fn open(map: Map, page_count: usize) -> Result<Self, ReadError> {
        let mut array = PerfEventArray::try_from(map)?;
        let wakeup = Arc::new(Wakeup::new()?);
        let mut poller = Poller::new()?;

        let mut buffers = Vec::new();
        for cpu in online_cpus().map_err(ReadError::OnlineCpus)? {
            trace!("opening perf buffer for {cpu}");
            let buf = array.open(cpu.0, Some(page_count))?;
            poller.add(&buf, buffers.len() as u64)?;
            buffers.push(CpuBuffer { cpu, buf, unreported_lost: 0 });
        }
        poller.add(&*wakeup, WAKE_TOKEN)?;
        debug!("opened {} per-CPU buffers ({page_count} pages each)", buffers.len());

        let scratch =
            (0..SCRATCH_RECORDS).map(|_| BytesMut::with_capacity(EXEC_EVENT_SIZE)).collect();

        Ok(Self { buffers, scratch, pending: VecDeque::new(), next: 0, wakeup, poller })
    }

    /// Visit every CPU buffer once, starting after the last one drained
    ///
    /// Returns true if any record was queued.
    fn drain(&mut self) -> Result<bool, ReadError> {
        let count = self.buffers.len();
        for step in 0..count {
            let index = (self.next + step) % count;
            let cpu_buffer = &mut self.buffers[index];
            if !cpu_buffer.buf.readable() {
                continue;
            }

            let events = cpu_buffer.buf.read_events(&mut self.scratch)?;
            let mut lost = cpu_buffer.unreported_lost + events.lost as u64;
            for raw in self.scratch.iter().take(events.read) {
                self.pending.push_back(
                    RawEventRecord::new(Bytes::copy_from_slice(raw))
                        .with_cpu(cpu_buffer.cpu)
                        .with_lost_samples(lost),
                );
                lost = 0;
            }
            cpu_buffer.unreported_lost = lost;

            if events.read > 0 {
                self.next = (index + 1) % count;
                return Ok(true);
            }
        }
        Ok(false)
    }
}

impl BufferReader for PerCpuBufferReader {
    fn read(&mut self) -> Result<Option<RawEventRecord>, ReadError> {
        loop {
            if let Some(record) = self.pending.pop_front() {
                return Ok(Some(record));
            }
            if self.drain()? {
                continue;
            }
            if self.poller.wait()?.contains(&WAKE_TOKEN) {
                return Ok(None);
            }
        }
    }

    fn interrupt_handle(&self) -> InterruptHandle {
        let wakeup = self.wakeup.clone();
        InterruptHandle::new(move || wakeup.signal())
    }

    fn close(self) -> Result<(), CloseError> {
        self.wakeup.signal();
        debug!("per-CPU buffer reader closed ({} buffers)", self.buffers.len());
        Ok(())
    }
}
