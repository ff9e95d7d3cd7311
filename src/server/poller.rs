//! Readiness multiplexing over raw `epoll`.
//!
//! Connection sockets are registered edge-triggered and one-shot: after one
//! event is delivered for a descriptor, no further events fire until the
//! descriptor is explicitly re-armed. That single property is what makes it
//! safe for a worker pool to operate on connections without any per-socket
//! locking discipline of its own: the kernel's interest table acts as the
//! mutual-exclusion mechanism.

use std::io;
use std::os::unix::io::RawFd;
use std::time::Duration;

use libc::{
    EPOLL_CLOEXEC, EPOLL_CTL_ADD, EPOLL_CTL_DEL, EPOLL_CTL_MOD, EPOLLERR, EPOLLET, EPOLLHUP,
    EPOLLIN, EPOLLONESHOT, EPOLLOUT, EPOLLRDHUP, epoll_create1, epoll_ctl, epoll_event,
    epoll_wait,
};

/// Upper bound on events collected per [`Poller::wait`] call.
const MAX_EVENTS: usize = 64;

/// Readiness direction requested when re-arming a connection socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interest {
    Read,
    Write,
}

/// One readiness notification delivered by [`Poller::wait`].
#[derive(Debug, Clone, Copy)]
pub struct Event {
    pub fd: RawFd,
    pub readable: bool,
    pub writable: bool,
    /// Peer hangup or socket error (`EPOLLRDHUP | EPOLLHUP | EPOLLERR`).
    pub hangup: bool,
}

/// Owner of the `epoll` instance.
pub struct Poller {
    epfd: RawFd,
}

impl Poller {
    pub fn new() -> io::Result<Self> {
        let epfd = unsafe { epoll_create1(EPOLL_CLOEXEC) };
        if epfd < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self { epfd })
    }

    /// Registers the listening socket: edge-triggered read interest, not
    /// one-shot. Accept readiness keeps firing on every new burst of
    /// connections without re-arming.
    pub fn add_listener(&self, fd: RawFd) -> io::Result<()> {
        set_nonblocking(fd)?;
        self.ctl(EPOLL_CTL_ADD, fd, (EPOLLIN | EPOLLET | EPOLLRDHUP) as u32)
    }

    /// Registers a connection socket: non-blocking, edge-triggered,
    /// one-shot read interest.
    pub fn register(&self, fd: RawFd) -> io::Result<()> {
        set_nonblocking(fd)?;
        self.ctl(EPOLL_CTL_ADD, fd, interest_flags(Interest::Read))
    }

    /// Re-subscribes a one-shot descriptor for its next turn.
    ///
    /// Must be called after every handled event, or the descriptor goes
    /// silent forever.
    pub fn rearm(&self, fd: RawFd, interest: Interest) -> io::Result<()> {
        self.ctl(EPOLL_CTL_MOD, fd, interest_flags(interest))
    }

    /// Removes a descriptor from the interest table and closes it.
    pub fn deregister(&self, fd: RawFd) -> io::Result<()> {
        let rc = unsafe { epoll_ctl(self.epfd, EPOLL_CTL_DEL, fd, std::ptr::null_mut()) };
        let result = if rc < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        };
        unsafe { libc::close(fd) };
        result
    }

    /// Blocks for readiness events, coalescing multiple notifications for
    /// the same descriptor into one [`Event`]. Interrupted waits retry.
    pub fn wait(&self, out: &mut Vec<Event>, timeout: Option<Duration>) -> io::Result<()> {
        let timeout_ms = timeout.map(|t| t.as_millis() as i32).unwrap_or(-1);
        let mut sys = [epoll_event { events: 0, u64: 0 }; MAX_EVENTS];

        let n = loop {
            let n = unsafe { epoll_wait(self.epfd, sys.as_mut_ptr(), MAX_EVENTS as i32, timeout_ms) };
            if n >= 0 {
                break n as usize;
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err);
            }
        };

        out.clear();
        for ev in &sys[..n] {
            let fd = ev.u64 as RawFd;
            let readable = ev.events & EPOLLIN as u32 != 0;
            let writable = ev.events & EPOLLOUT as u32 != 0;
            let hangup = ev.events & (EPOLLRDHUP | EPOLLHUP | EPOLLERR) as u32 != 0;

            if let Some(e) = out.iter_mut().find(|e| e.fd == fd) {
                e.readable |= readable;
                e.writable |= writable;
                e.hangup |= hangup;
            } else {
                out.push(Event {
                    fd,
                    readable,
                    writable,
                    hangup,
                });
            }
        }

        Ok(())
    }

    fn ctl(&self, op: libc::c_int, fd: RawFd, flags: u32) -> io::Result<()> {
        let mut event = epoll_event {
            events: flags,
            u64: fd as u64,
        };
        let rc = unsafe { epoll_ctl(self.epfd, op, fd, &mut event) };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        unsafe { libc::close(self.epfd) };
    }
}

fn interest_flags(interest: Interest) -> u32 {
    let direction = match interest {
        Interest::Read => EPOLLIN,
        Interest::Write => EPOLLOUT,
    };
    (direction | EPOLLET | EPOLLRDHUP | EPOLLONESHOT) as u32
}

fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    let rc = unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
