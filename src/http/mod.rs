//! HTTP/1.1 per-connection engine.
//!
//! This module turns raw bytes arriving on a non-blocking socket into a
//! parsed GET request, resolves it against the document root, and emits a
//! well-formed response, attaching a file's contents zero-copy via a
//! memory mapping where the resolution succeeds.
//!
//! # Architecture
//!
//! - **`buffer`**: fixed-capacity read/write buffers with bounds-checked
//!   cursor operations
//! - **`parser`**: the incremental line scanner and grammar state machine
//! - **`request`**: the parsed request, its text fields held as spans into
//!   the read buffer
//! - **`file`**: document-root resolution and the scoped file mapping
//! - **`response`**: the total status mapping and the bounded response
//!   formatter
//! - **`connection`**: the dispatcher tying it all together, one readiness
//!   turn at a time
//!
//! # Request cycle
//!
//! ```text
//!   readable turn ──▶ drain ──▶ parse ──┬─ incomplete ─▶ re-arm read
//!                                       ├─ malformed ──▶ respond 400
//!                                       └─ complete ───▶ resolve ─▶ respond
//!
//!   respond ──▶ transmit ──┬─ done, keep-alive ──▶ reset, re-arm read
//!                          ├─ done, close ───────▶ close
//!                          └─ would-block ───────▶ re-arm write
//!                                                  (writable turn resumes)
//! ```

pub mod buffer;
pub mod connection;
pub mod file;
pub mod parser;
pub mod request;
pub mod response;
