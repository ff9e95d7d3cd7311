use std::ops::Range;

use crate::http::buffer::ReadBuffer;

/// Byte range within the connection's read buffer.
pub type Span = Range<usize>;

/// HTTP request methods understood by the server. Only GET is served;
/// anything else fails parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Method {
    #[default]
    Get,
}

impl Method {
    /// Case-insensitive method lookup.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.eq_ignore_ascii_case(b"GET") {
            Some(Method::Get)
        } else {
            None
        }
    }
}

/// The request being assembled by the parser.
///
/// Textual fields are spans into the read buffer rather than owned strings;
/// they stay valid until the buffer is reset for the next request cycle.
#[derive(Debug, Clone, Default)]
pub struct Request {
    pub method: Method,
    pub(crate) target: Option<Span>,
    pub(crate) version: Option<Span>,
    pub(crate) host: Option<Span>,
    pub content_length: usize,
    pub keep_alive: bool,
}

impl Request {
    /// The request target, e.g. `/index.html`. Present once the request
    /// line has parsed; always valid UTF-8 (the parser rejects targets
    /// that are not).
    pub fn target<'b>(&self, buf: &'b ReadBuffer) -> Option<&'b str> {
        self.span_str(buf, &self.target)
    }

    /// The protocol version token, always `HTTP/1.1` modulo case.
    pub fn version<'b>(&self, buf: &'b ReadBuffer) -> Option<&'b str> {
        self.span_str(buf, &self.version)
    }

    /// Value of the `Host` header, if the client sent one.
    pub fn host<'b>(&self, buf: &'b ReadBuffer) -> Option<&'b str> {
        self.span_str(buf, &self.host)
    }

    pub fn reset(&mut self) {
        *self = Request::default();
    }

    fn span_str<'b>(&self, buf: &'b ReadBuffer, span: &Option<Span>) -> Option<&'b str> {
        let span = span.as_ref()?;
        std::str::from_utf8(buf.slice(span.clone())).ok()
    }
}
