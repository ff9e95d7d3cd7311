//! Response formatting.
//!
//! Every terminal resolution of a request cycle maps to exactly one status
//! line and canned body. The mapping is total, so there is no default arm
//! for an unhandled case to fall into. The head (and, for errors, the body)
//! is staged in the connection's bounded write buffer; a resolved file's
//! bytes are never copied there, they travel as a second I/O fragment.

use crate::http::buffer::{BufferFull, WriteBuffer};

/// Status lines this server can emit, one per terminal resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    /// 200 OK: a resolved, readable, regular file.
    Ok,
    /// 400 Bad Request: unparseable request, or a directory target.
    BadRequest,
    /// 403 Forbidden: the file is not world-readable.
    Forbidden,
    /// 404 Not Found: nothing by that name under the document root.
    NotFound,
    /// 500 Internal Error: the checks passed but serving failed anyway.
    InternalError,
}

impl StatusCode {
    pub fn as_u16(&self) -> u16 {
        match self {
            StatusCode::Ok => 200,
            StatusCode::BadRequest => 400,
            StatusCode::Forbidden => 403,
            StatusCode::NotFound => 404,
            StatusCode::InternalError => 500,
        }
    }

    pub fn reason_phrase(&self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::Forbidden => "Forbidden",
            StatusCode::NotFound => "Not Found",
            StatusCode::InternalError => "Internal Error",
        }
    }

    /// Fixed body text paired with each error status.
    pub fn canned_body(&self) -> &'static str {
        match self {
            StatusCode::Ok => "",
            StatusCode::BadRequest => {
                "Your request has bad syntax or is inherently impossible to satisfy."
            }
            StatusCode::Forbidden => {
                "You do not have permission to get file from this server."
            }
            StatusCode::NotFound => "The requested file was not found on this server.",
            StatusCode::InternalError => {
                "There was an unusual problem serving the request file."
            }
        }
    }
}

/// Body substituted for a resolved file of size zero.
pub const EMPTY_PAGE: &str = "<html><body></body></html>";

/// Formats one response into the connection's write buffer.
///
/// Emits, in order: status line, `Content-Length`, `Connection`, a blank
/// line, then the body where one belongs in the buffer. Each append is
/// all-or-nothing; a head that does not fit reports [`BufferFull`] and the
/// connection gives up on the cycle.
pub struct ResponseBuilder<'a> {
    buf: &'a mut WriteBuffer,
}

impl<'a> ResponseBuilder<'a> {
    pub fn new(buf: &'a mut WriteBuffer) -> Self {
        Self { buf }
    }

    /// An error response: status line, headers, and the canned body.
    pub fn error(mut self, status: StatusCode, keep_alive: bool) -> Result<(), BufferFull> {
        let body = status.canned_body();
        self.status_line(status)?;
        self.content_length(body.len())?;
        self.connection(keep_alive)?;
        self.blank_line()?;
        self.buf.append(body.as_bytes())
    }

    /// The head of a 200 response for a resolved file. A non-empty file
    /// contributes no body bytes here; those are sent from the mapping.
    /// A zero-length file gets the [`EMPTY_PAGE`] stub instead.
    pub fn file(mut self, file_len: usize, keep_alive: bool) -> Result<(), BufferFull> {
        self.status_line(StatusCode::Ok)?;
        if file_len == 0 {
            self.content_length(EMPTY_PAGE.len())?;
            self.connection(keep_alive)?;
            self.blank_line()?;
            self.buf.append(EMPTY_PAGE.as_bytes())
        } else {
            self.content_length(file_len)?;
            self.connection(keep_alive)?;
            self.blank_line()
        }
    }

    fn status_line(&mut self, status: StatusCode) -> Result<(), BufferFull> {
        let line = format!(
            "HTTP/1.1 {} {}\r\n",
            status.as_u16(),
            status.reason_phrase()
        );
        self.buf.append(line.as_bytes())
    }

    fn content_length(&mut self, len: usize) -> Result<(), BufferFull> {
        self.buf.append(format!("Content-Length: {len}\r\n").as_bytes())
    }

    fn connection(&mut self, keep_alive: bool) -> Result<(), BufferFull> {
        let value = if keep_alive { "keep-alive" } else { "close" };
        self.buf.append(format!("Connection: {value}\r\n").as_bytes())
    }

    fn blank_line(&mut self) -> Result<(), BufferFull> {
        self.buf.append(b"\r\n")
    }
}
