//! Incremental HTTP/1.1 request parser.
//!
//! Two levels: [`scan_line`] finds one terminated line in the read buffer,
//! and [`Parser`] drives the grammar (request line, then headers, then an
//! optional byte-counted body) over those lines. All state lives in the
//! `Parser` and the buffer cursors, so parsing resumes cleanly after every
//! partial read: feeding the same bytes in any chunking yields the same
//! final classification.

use tracing::{debug, trace};

use crate::http::buffer::ReadBuffer;
use crate::http::request::{Method, Request, Span};

/// Result of scanning for one line terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanStatus {
    /// A full line was found; the span covers its content, terminator
    /// excluded. The terminator bytes have been nulled out and the scan
    /// cursor advanced past them.
    Complete(Span),
    /// No terminator in the buffered bytes yet.
    Partial,
    /// A bare LF with no preceding CR.
    Malformed,
}

/// Grammar-level position within one request cycle. Progresses forward
/// only; reset to `RequestLine` when the connection is reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseState {
    #[default]
    RequestLine,
    Headers,
    Body,
}

/// Outcome of one parser run over the currently buffered bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStatus {
    /// A complete request is buffered.
    Complete,
    /// Wait for the next read event.
    Incomplete,
    /// The request can never parse; answer 400.
    Malformed,
}

enum LineOutcome {
    Continue,
    Done,
    Bad,
}

/// The grammar state machine.
#[derive(Debug)]
pub struct Parser {
    state: ParseState,
    body_start: usize,
    header_count: usize,
    max_headers: usize,
    pub request: Request,
}

impl Parser {
    pub fn new(max_headers: usize) -> Self {
        Self {
            state: ParseState::RequestLine,
            body_start: 0,
            header_count: 0,
            max_headers,
            request: Request::default(),
        }
    }

    pub fn state(&self) -> ParseState {
        self.state
    }

    pub fn reset(&mut self) {
        self.state = ParseState::RequestLine;
        self.body_start = 0;
        self.header_count = 0;
        self.request.reset();
    }

    /// Drives the grammar over whatever is buffered.
    ///
    /// Re-entrant: returns `Incomplete` when the buffer runs dry and picks
    /// up exactly where it left off on the next call.
    pub fn advance(&mut self, buf: &mut ReadBuffer) -> ParseStatus {
        loop {
            if self.state == ParseState::Body {
                if buf.read_pos() - self.body_start >= self.request.content_length {
                    return ParseStatus::Complete;
                }
                return ParseStatus::Incomplete;
            }

            let line = match scan_line(buf) {
                ScanStatus::Complete(span) => span,
                ScanStatus::Partial => return ParseStatus::Incomplete,
                ScanStatus::Malformed => return ParseStatus::Malformed,
            };
            buf.start_line();
            trace!("line: {}", String::from_utf8_lossy(buf.slice(line.clone())));

            let outcome = match self.state {
                ParseState::RequestLine => self.parse_request_line(buf, line),
                ParseState::Headers => self.parse_header(buf, line),
                ParseState::Body => LineOutcome::Continue,
            };
            match outcome {
                LineOutcome::Continue => continue,
                LineOutcome::Done => return ParseStatus::Complete,
                LineOutcome::Bad => return ParseStatus::Malformed,
            }
        }
    }

    /// `METHOD SP target SP version`, tokens separated by runs of SP/HT.
    fn parse_request_line(&mut self, buf: &ReadBuffer, line: Span) -> LineOutcome {
        let bytes = buf.slice(line.clone());

        let Some((method, target, version)) = split_request_line(bytes) else {
            return LineOutcome::Bad;
        };

        let Some(method) = Method::from_bytes(&bytes[method.clone()]) else {
            return LineOutcome::Bad;
        };
        if !bytes[version.clone()].eq_ignore_ascii_case(b"HTTP/1.1") {
            return LineOutcome::Bad;
        }

        // An absolute-form target carries a scheme and host; the true path
        // starts at the first slash after them.
        let Some(target) = strip_scheme(bytes, target) else {
            return LineOutcome::Bad;
        };
        if bytes[target.clone()].first() != Some(&b'/') {
            return LineOutcome::Bad;
        }
        if std::str::from_utf8(&bytes[target.clone()]).is_err() {
            return LineOutcome::Bad;
        }

        self.request.method = method;
        self.request.target = Some(line.start + target.start..line.start + target.end);
        self.request.version = Some(line.start + version.start..line.start + version.end);
        self.state = ParseState::Headers;
        LineOutcome::Continue
    }

    /// One header line, or the empty line that ends the header section.
    fn parse_header(&mut self, buf: &ReadBuffer, line: Span) -> LineOutcome {
        if line.is_empty() {
            if self.request.content_length > 0 {
                self.state = ParseState::Body;
                self.body_start = buf.checked_pos();
                return LineOutcome::Continue;
            }
            return LineOutcome::Done;
        }

        self.header_count += 1;
        if self.header_count > self.max_headers {
            debug!("request exceeded {} header lines", self.max_headers);
            return LineOutcome::Bad;
        }

        let bytes = buf.slice(line.clone());
        let Some(colon) = bytes.iter().position(|&b| b == b':') else {
            debug!("ignoring header line without colon: {}", String::from_utf8_lossy(bytes));
            return LineOutcome::Continue;
        };
        let name = &bytes[..colon];
        let value_start = colon + 1 + count_blanks(&bytes[colon + 1..]);
        let value = &bytes[value_start..];

        if name.eq_ignore_ascii_case(b"connection") {
            if value.eq_ignore_ascii_case(b"keep-alive") {
                self.request.keep_alive = true;
            }
        } else if name.eq_ignore_ascii_case(b"content-length") {
            let parsed = std::str::from_utf8(value)
                .ok()
                .and_then(|v| v.parse::<usize>().ok());
            match parsed {
                Some(n) => self.request.content_length = n,
                None => return LineOutcome::Bad,
            }
        } else if name.eq_ignore_ascii_case(b"host") {
            self.request.host = Some(line.start + value_start..line.end);
        } else {
            debug!("ignoring unrecognized header: {}", String::from_utf8_lossy(name));
        }
        LineOutcome::Continue
    }
}

/// Scans the buffered bytes for a line terminator, starting at the scan
/// cursor.
///
/// A CR that is the final buffered byte leaves the cursor on the CR and
/// reports `Partial`, so the CRLF is recognized once the LF arrives. A
/// recognized terminator is overwritten with NUL bytes and the cursor moves
/// past it. An LF whose predecessor is already a CR is terminated the same
/// way; a bare LF is malformed.
pub fn scan_line(buf: &mut ReadBuffer) -> ScanStatus {
    let start = buf.line_start();
    let mut i = buf.checked_pos();

    while i < buf.read_pos() {
        match buf.byte(i) {
            b'\r' => {
                if i + 1 == buf.read_pos() {
                    buf.set_checked(i);
                    return ScanStatus::Partial;
                }
                if buf.byte(i + 1) == b'\n' {
                    buf.set_byte(i, 0);
                    buf.set_byte(i + 1, 0);
                    buf.set_checked(i + 2);
                    return ScanStatus::Complete(start..i);
                }
                return ScanStatus::Malformed;
            }
            b'\n' => {
                if i > 0 && buf.byte(i - 1) == b'\r' {
                    buf.set_byte(i - 1, 0);
                    buf.set_byte(i, 0);
                    buf.set_checked(i + 1);
                    return ScanStatus::Complete(start..i - 1);
                }
                return ScanStatus::Malformed;
            }
            _ => i += 1,
        }
    }

    buf.set_checked(i);
    ScanStatus::Partial
}

/// Splits a request line into method/target/version token ranges. The
/// version token runs to the end of the line, so trailing junk fails the
/// `HTTP/1.1` comparison rather than being ignored.
fn split_request_line(bytes: &[u8]) -> Option<(Span, Span, Span)> {
    let method_end = bytes.iter().position(|&b| is_blank(b))?;
    let target_start = method_end + count_blanks(&bytes[method_end..]);
    let target_len = bytes[target_start..].iter().position(|&b| is_blank(b))?;
    let target_end = target_start + target_len;
    let version_start = target_end + count_blanks(&bytes[target_end..]);
    if version_start == bytes.len() {
        return None;
    }
    Some((
        0..method_end,
        target_start..target_end,
        version_start..bytes.len(),
    ))
}

/// Drops a case-insensitive `http://` or `https://` prefix, returning the
/// range from the first `/` after the authority. `None` when a scheme is
/// present but no path follows.
fn strip_scheme(bytes: &[u8], target: Span) -> Option<Span> {
    let text = &bytes[target.clone()];
    let skip = if starts_with_ignore_case(text, b"http://") {
        7
    } else if starts_with_ignore_case(text, b"https://") {
        8
    } else {
        return Some(target);
    };
    let slash = text[skip..].iter().position(|&b| b == b'/')?;
    Some(target.start + skip + slash..target.end)
}

fn starts_with_ignore_case(bytes: &[u8], prefix: &[u8]) -> bool {
    bytes.len() >= prefix.len() && bytes[..prefix.len()].eq_ignore_ascii_case(prefix)
}

fn is_blank(b: u8) -> bool {
    b == b' ' || b == b'\t'
}

fn count_blanks(bytes: &[u8]) -> usize {
    bytes.iter().take_while(|&&b| is_blank(b)).count()
}
