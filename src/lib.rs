//! Citadel - single-purpose HTTP/1.1 static file server.
//!
//! A synchronous, non-blocking server built on edge-triggered one-shot
//! epoll: the kernel's event table serializes work per connection, a small
//! worker pool executes one turn per readiness event, and resolved files
//! are served zero-copy from a memory mapping.

pub mod config;
pub mod http;
pub mod server;
