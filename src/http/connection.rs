//! The per-connection engine.
//!
//! A `Connection` owns one accepted socket and everything a request cycle
//! needs: the fixed read/write buffers, the parser, an optional file
//! mapping, and a byte-accurate cursor over the response fragments. It is
//! driven one turn at a time, `on_readable` or `on_writable`, invoked by a
//! worker exactly once per delivered readiness event. The one-shot
//! registration guarantees no two turns for the same connection overlap;
//! every turn ends by re-arming the poller or closing the socket.

use std::io;
use std::net::SocketAddr;
use std::os::unix::io::RawFd;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::{debug, trace, warn};

use crate::config::Config;
use crate::http::buffer::{ReadBuffer, WriteBuffer};
use crate::http::file::{self, ResolveError, ResolvedFile};
use crate::http::parser::{ParseStatus, Parser};
use crate::http::response::{ResponseBuilder, StatusCode};
use crate::server::poller::{Interest, Poller};

/// Connections currently open, process-wide. Touched only on creation and
/// real closure.
static ACTIVE_CONNECTIONS: AtomicUsize = AtomicUsize::new(0);

pub fn active_connections() -> usize {
    ACTIVE_CONNECTIONS.load(Ordering::Relaxed)
}

/// Why a drain pass decided the connection cannot continue.
#[derive(Debug)]
enum DrainError {
    /// Orderly close from the peer.
    PeerClosed,
    /// The request outgrew the read buffer.
    BufferFull,
    /// Socket failure.
    Io(io::Error),
}

/// Progress over the staged response: write-buffer head first, then the
/// mapped file. `sent` is an absolute offset spanning both fragments, so a
/// resumed transmit continues from exactly the unsent remainder.
#[derive(Debug, Clone, Copy, Default)]
struct SendCursor {
    header_len: usize,
    file_len: usize,
    sent: usize,
}

impl SendCursor {
    fn stage(header_len: usize, file_len: usize) -> Self {
        Self {
            header_len,
            file_len,
            sent: 0,
        }
    }

    fn total(&self) -> usize {
        self.header_len + self.file_len
    }

    fn is_done(&self) -> bool {
        self.sent >= self.total()
    }

    fn advance(&mut self, n: usize) {
        self.sent += n;
        debug_assert!(self.sent <= self.total());
    }

    /// Unsent sub-ranges of the header and file fragments.
    fn pending(&self) -> (std::ops::Range<usize>, std::ops::Range<usize>) {
        let header_sent = self.sent.min(self.header_len);
        let file_sent = self.sent - header_sent;
        (header_sent..self.header_len, file_sent..self.file_len)
    }
}

/// One accepted socket and its request-cycle state.
pub struct Connection {
    fd: RawFd,
    peer: SocketAddr,
    poller: Arc<Poller>,
    cfg: Arc<Config>,
    read_buf: ReadBuffer,
    write_buf: WriteBuffer,
    parser: Parser,
    file: Option<ResolvedFile>,
    cursor: SendCursor,
    closed: bool,
}

impl Connection {
    /// Takes ownership of an accepted socket: registers it non-blocking
    /// with one-shot read interest and claims a connection slot. On
    /// registration failure the socket is closed before returning.
    pub fn open(
        fd: RawFd,
        peer: SocketAddr,
        poller: Arc<Poller>,
        cfg: Arc<Config>,
    ) -> io::Result<Self> {
        if let Err(e) = poller.register(fd) {
            unsafe { libc::close(fd) };
            return Err(e);
        }
        ACTIVE_CONNECTIONS.fetch_add(1, Ordering::Relaxed);
        Ok(Self {
            fd,
            peer,
            poller,
            read_buf: ReadBuffer::new(cfg.limits.read_buffer_size),
            write_buf: WriteBuffer::new(cfg.limits.write_buffer_size),
            parser: Parser::new(cfg.limits.max_headers),
            cfg,
            file: None,
            cursor: SendCursor::default(),
            closed: false,
        })
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Deregisters and closes exactly once, releasing the mapping and the
    /// connection slot.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.file = None;
        if let Err(e) = self.poller.deregister(self.fd) {
            warn!("failed to deregister fd {}: {}", self.fd, e);
        }
        ACTIVE_CONNECTIONS.fetch_sub(1, Ordering::Relaxed);
        debug!("closed connection from {}", self.peer);
    }

    /// One readable turn: drain the socket, run the parser, and if a
    /// terminal state was reached, resolve and answer.
    pub fn on_readable(&mut self) {
        // A turn can only arrive read-armed or write-armed; if a response
        // is still staged, this is a resumed transmit in disguise.
        if self.cursor.total() > 0 && !self.cursor.is_done() {
            self.transmit();
            return;
        }

        match self.drain() {
            Ok(()) => {}
            Err(DrainError::PeerClosed) => {
                trace!("peer {} closed the connection", self.peer);
                self.close();
                return;
            }
            Err(DrainError::BufferFull) => {
                warn!(
                    "request from {} exceeded the {}-byte buffer",
                    self.peer,
                    self.read_buf.capacity()
                );
                self.close();
                return;
            }
            Err(DrainError::Io(e)) => {
                warn!("read from {} failed: {}", self.peer, e);
                self.close();
                return;
            }
        }

        match self.parser.advance(&mut self.read_buf) {
            ParseStatus::Incomplete => self.rearm_or_close(Interest::Read),
            ParseStatus::Malformed => self.respond(StatusCode::BadRequest),
            ParseStatus::Complete => {
                let status = self.resolve();
                self.respond(status);
            }
        }
    }

    /// One writable turn: resume the pending transmit.
    pub fn on_writable(&mut self) {
        self.transmit();
    }

    /// Non-blocking receive loop. Under edge-triggered notification this
    /// must consume everything available; data left in the socket fires
    /// no further event.
    fn drain(&mut self) -> Result<(), DrainError> {
        loop {
            if self.read_buf.is_full() {
                return Err(DrainError::BufferFull);
            }
            let spare = self.read_buf.spare_mut();
            let n = unsafe {
                libc::recv(
                    self.fd,
                    spare.as_mut_ptr() as *mut libc::c_void,
                    spare.len(),
                    0,
                )
            };
            if n < 0 {
                let err = io::Error::last_os_error();
                match err.kind() {
                    io::ErrorKind::WouldBlock => return Ok(()),
                    io::ErrorKind::Interrupted => continue,
                    _ => return Err(DrainError::Io(err)),
                }
            }
            if n == 0 {
                return Err(DrainError::PeerClosed);
            }
            self.read_buf.advance_read(n as usize);
        }
    }

    /// Resolves the parsed target against the document root, keeping the
    /// mapping on success.
    fn resolve(&mut self) -> StatusCode {
        let Some(target) = self.parser.request.target(&self.read_buf) else {
            // A complete request always carries a target.
            return StatusCode::InternalError;
        };
        debug!("GET {} from {}", target, self.peer);

        match file::resolve(
            &self.cfg.files.doc_root,
            target,
            &self.cfg.files.default_document,
            self.cfg.limits.max_path_len,
        ) {
            Ok(resolved) => {
                trace!("serving {} ({} bytes)", resolved.path.display(), resolved.len);
                self.file = Some(resolved);
                StatusCode::Ok
            }
            Err(ResolveError::NotFound) => StatusCode::NotFound,
            Err(ResolveError::Forbidden) => StatusCode::Forbidden,
            Err(ResolveError::Malformed) => StatusCode::BadRequest,
            Err(ResolveError::Io(e)) => {
                warn!("resolving {} failed: {}", target, e);
                StatusCode::InternalError
            }
        }
    }

    /// Builds the response for `status` and starts transmitting it.
    fn respond(&mut self, status: StatusCode) {
        let keep_alive = self.parser.request.keep_alive;

        if status != StatusCode::Ok {
            self.file = None;
        }
        // A zero-length file is answered with the stub body, not a mapping.
        if self.file.as_ref().is_some_and(|f| f.len == 0) {
            self.file = None;
        }
        let file_len = self.file.as_ref().map_or(0, |f| f.len);

        let built = if status == StatusCode::Ok {
            ResponseBuilder::new(&mut self.write_buf).file(file_len, keep_alive)
        } else {
            ResponseBuilder::new(&mut self.write_buf).error(status, keep_alive)
        };
        if built.is_err() {
            warn!("response for {} did not fit the write buffer", self.peer);
            self.close();
            return;
        }

        self.cursor = SendCursor::stage(self.write_buf.len(), file_len);
        self.transmit();
    }

    /// Vectored-writes the unsent remainder of the staged response.
    ///
    /// Loops until everything is out or the socket reports would-block; a
    /// would-block re-arms for write-readiness and the next writable turn
    /// resumes from the same cursor. Completion releases the mapping and
    /// either recycles the connection (keep-alive) or closes it.
    fn transmit(&mut self) {
        if self.cursor.total() == 0 {
            // Nothing staged: a spurious turn. Start a fresh cycle.
            self.reset();
            self.rearm_or_close(Interest::Read);
            return;
        }

        loop {
            let (head, body) = self.cursor.pending();
            let header = &self.write_buf.staged()[head];
            let file = self
                .file
                .as_ref()
                .and_then(|f| f.bytes())
                .map(|b| &b[body.clone()])
                .unwrap_or(&[]);

            let mut iov = [libc::iovec {
                iov_base: std::ptr::null_mut(),
                iov_len: 0,
            }; 2];
            let mut count = 0;
            for fragment in [header, file] {
                if !fragment.is_empty() {
                    iov[count] = libc::iovec {
                        iov_base: fragment.as_ptr() as *mut libc::c_void,
                        iov_len: fragment.len(),
                    };
                    count += 1;
                }
            }
            debug_assert!(count > 0);

            let n = unsafe { libc::writev(self.fd, iov.as_ptr(), count as libc::c_int) };
            if n < 0 {
                let err = io::Error::last_os_error();
                match err.kind() {
                    io::ErrorKind::WouldBlock => {
                        self.rearm_or_close(Interest::Write);
                        return;
                    }
                    io::ErrorKind::Interrupted => continue,
                    _ => {
                        warn!("write to {} failed: {}", self.peer, err);
                        self.close();
                        return;
                    }
                }
            }
            if n == 0 {
                warn!("zero-length write to {}", self.peer);
                self.close();
                return;
            }

            self.cursor.advance(n as usize);
            if self.cursor.is_done() {
                trace!("response to {} complete", self.peer);
                self.file = None;
                if self.parser.request.keep_alive {
                    self.reset();
                    self.rearm_or_close(Interest::Read);
                } else {
                    self.close();
                }
                return;
            }
        }
    }

    /// Returns to the freshly-initialized state so the same socket can
    /// carry the next request.
    fn reset(&mut self) {
        self.read_buf.reset();
        self.write_buf.reset();
        self.parser.reset();
        self.file = None;
        self.cursor = SendCursor::default();
    }

    fn rearm_or_close(&mut self, interest: Interest) {
        if let Err(e) = self.poller.rearm(self.fd, interest) {
            warn!("failed to re-arm fd {}: {}", self.fd, e);
            self.close();
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::SendCursor;

    #[test]
    fn cursor_resumes_from_the_unsent_remainder() {
        let mut cursor = SendCursor::stage(10, 90);
        assert_eq!(cursor.total(), 100);

        cursor.advance(4);
        let (head, body) = cursor.pending();
        assert_eq!(head, 4..10);
        assert_eq!(body, 0..90);

        cursor.advance(6);
        let (head, body) = cursor.pending();
        assert!(head.is_empty());
        assert_eq!(body, 0..90);

        cursor.advance(89);
        let (head, body) = cursor.pending();
        assert!(head.is_empty());
        assert_eq!(body, 89..90);
        assert!(!cursor.is_done());

        cursor.advance(1);
        assert!(cursor.is_done());
    }

    #[test]
    fn cursor_with_no_file_fragment() {
        let mut cursor = SendCursor::stage(42, 0);
        cursor.advance(42);
        assert!(cursor.is_done());
        let (head, body) = cursor.pending();
        assert!(head.is_empty());
        assert!(body.is_empty());
    }
}
