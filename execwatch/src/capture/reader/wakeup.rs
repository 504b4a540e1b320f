//! Blocking waits on kernel buffer fds that another thread can interrupt.
//!
//! Every reader registers its buffer fds plus one eventfd in an epoll set.
//! Signalling the eventfd makes the blocked `epoll_wait` return. The eventfd
//! is never drained, so every later wait returns immediately as well.

#![allow(unsafe_code)] // eventfd/epoll have no safe std wrappers

use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};

/// Token reported by [`Poller::wait`] when the wakeup fired
pub const WAKE_TOKEN: u64 = u64::MAX;

/// Non-blocking eventfd used as an interrupt line
#[derive(Debug)]
pub struct Wakeup {
    eventfd: OwnedFd,
}

impl Wakeup {
    pub fn new() -> io::Result<Self> {
        let fd = unsafe { libc::eventfd(0, libc::EFD_CLOEXEC | libc::EFD_NONBLOCK) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self { eventfd: unsafe { OwnedFd::from_raw_fd(fd) } })
    }

    pub fn signal(&self) {
        let val: u64 = 1;
        // Only fails with EAGAIN once the counter saturates, which still leaves it readable
        let _ = unsafe {
            libc::write(
                self.eventfd.as_raw_fd(),
                std::ptr::addr_of!(val).cast::<libc::c_void>(),
                std::mem::size_of::<u64>(),
            )
        };
    }
}

impl AsFd for Wakeup {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.eventfd.as_fd()
    }
}

impl AsRawFd for Wakeup {
    fn as_raw_fd(&self) -> RawFd {
        self.eventfd.as_raw_fd()
    }
}

/// Level-triggered epoll set keyed by caller-chosen tokens
#[derive(Debug)]
pub struct Poller {
    epoll: OwnedFd,
    events: Vec<libc::epoll_event>,
}

impl Poller {
    pub fn new() -> io::Result<Self> {
        let fd = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self { epoll: unsafe { OwnedFd::from_raw_fd(fd) }, events: Vec::new() })
    }

    /// Register `source` for readability, reported back as `token`
    ///
    /// aya's `RingBuf` only exposes a raw fd, so sources are taken by `AsRawFd`.
    /// The kernel drops the registration when the fd is closed.
    pub fn add(&mut self, source: &impl AsRawFd, token: u64) -> io::Result<()> {
        #[allow(clippy::cast_sign_loss)]
        let mut ev = libc::epoll_event { events: libc::EPOLLIN as u32, u64: token };
        if unsafe {
            libc::epoll_ctl(self.epoll.as_raw_fd(), libc::EPOLL_CTL_ADD, source.as_raw_fd(), &mut ev)
        } < 0
        {
            return Err(io::Error::last_os_error());
        }
        self.events.push(libc::epoll_event { events: 0, u64: 0 });
        Ok(())
    }

    /// Block until at least one registered fd is readable
    ///
    /// Retries on `EINTR`. Returns the tokens of the ready fds.
    pub fn wait(&mut self) -> io::Result<Vec<u64>> {
        let capacity = i32::try_from(self.events.len()).unwrap_or(i32::MAX).max(1);
        if self.events.is_empty() {
            self.events.push(libc::epoll_event { events: 0, u64: 0 });
        }
        loop {
            let n = unsafe {
                libc::epoll_wait(self.epoll.as_raw_fd(), self.events.as_mut_ptr(), capacity, -1)
            };
            if n < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(err);
            }
            #[allow(clippy::cast_sign_loss)]
            let ready = self.events.iter().take(n as usize).map(|ev| ev.u64).collect();
            return Ok(ready);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    #[test]
    fn test_wakeup_interrupts_wait() {
        let wakeup = Arc::new(Wakeup::new().unwrap());
        let mut poller = Poller::new().unwrap();
        poller.add(&*wakeup, WAKE_TOKEN).unwrap();

        let remote = wakeup.clone();
        let signaller = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            remote.signal();
        });

        let started = Instant::now();
        let ready = poller.wait().unwrap();
        signaller.join().unwrap();

        assert_eq!(ready, vec![WAKE_TOKEN]);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_signalled_wakeup_stays_ready() {
        let wakeup = Wakeup::new().unwrap();
        let mut poller = Poller::new().unwrap();
        poller.add(&wakeup, 7).unwrap();

        wakeup.signal();
        assert_eq!(poller.wait().unwrap(), vec![7]);
        assert_eq!(poller.wait().unwrap(), vec![7]);
    }

    #[test]
    fn test_raw_fd_source_reports_its_token() {
        use std::io::Write;
        use std::os::unix::net::UnixStream;

        let (mut tx, rx) = UnixStream::pair().unwrap();
        let wakeup = Wakeup::new().unwrap();
        let mut poller = Poller::new().unwrap();
        poller.add(&rx, 3).unwrap();
        poller.add(&wakeup, WAKE_TOKEN).unwrap();

        tx.write_all(b"x").unwrap();
        assert_eq!(poller.wait().unwrap(), vec![3]);

        wakeup.signal();
        let mut ready = poller.wait().unwrap();
        ready.sort_unstable();
        assert_eq!(ready, vec![3, WAKE_TOKEN]);
    }
}
