use aya::maps::{Map, MapData, RingBuf};
use bytes::Bytes;
use log::debug;
use std::sync::Arc;

use super::{BufferReader, InterruptHandle, Poller, RawEventRecord, Wakeup, WAKE_TOKEN};
use crate::domain::{CloseError, ReadError};

const RING_TOKEN: u64 = 0;

/// Reader over a single `BPF_MAP_TYPE_RINGBUF`
pub struct RingBufferReader {
    ring: RingBuf<MapData>,
    wakeup: Arc<Wakeup>,
    poller: Poller,
}

impl RingBufferReader {
    /// Open the ring buffer taken out of the loaded object
    ///
    /// # Errors
    /// Returns an error if the map is not a ring buffer or the wait set cannot be built
    pub fn open(map: Map) -> Result<Self, ReadError> {
        let ring = RingBuf::try_from(map)?;
        let wakeup = Arc::new(Wakeup::new()?);

        let mut poller = Poller::new()?;
        poller.add(&ring, RING_TOKEN)?;
        poller.add(&*wakeup, WAKE_TOKEN)?;

        Ok(Self { ring, wakeup, poller })
    }
}

impl BufferReader for RingBufferReader {
    fn read(&mut self) -> Result<Option<RawEventRecord>, ReadError> {
        loop {
            if let Some(item) = self.ring.next() {
                return Ok(Some(RawEventRecord::new(Bytes::copy_from_slice(&item))));
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
        debug!("ring buffer reader closed");
        Ok(())
    }
}
