//! Document-root resolution and zero-copy file bodies.
//!
//! A resolved file is served straight from a private read-only memory
//! mapping; the bytes never pass through a user-space copy. The mapping is
//! owned exclusively by one connection and released when the [`MappedFile`]
//! drops, which the connection guarantees on every exit path of a response
//! cycle, including an abandoned partial write.

use std::fs::{self, File};
use std::io;
use std::os::unix::fs::MetadataExt;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

/// Mode bit for "readable by others"; files without it are not served.
const WORLD_READABLE: u32 = 0o004;

/// Why a request target could not be turned into a served file.
#[derive(Debug)]
pub enum ResolveError {
    /// Nothing under the document root by that name (also covers paths
    /// over the configured length cap).
    NotFound,
    /// Present but not world-readable.
    Forbidden,
    /// The target names a directory or tries to escape the root.
    Malformed,
    /// The checks passed but metadata/open/map failed anyway.
    Io(io::Error),
}

/// A successfully resolved target.
///
/// `mapping` is present exactly when the file is non-empty; a zero-length
/// file is answered with a stub body instead of an empty mapping.
#[derive(Debug)]
pub struct ResolvedFile {
    pub path: PathBuf,
    pub len: usize,
    mapping: Option<MappedFile>,
}

impl ResolvedFile {
    /// The mapped file contents, absent for a zero-length file.
    pub fn bytes(&self) -> Option<&[u8]> {
        self.mapping.as_ref().map(|m| m.as_slice())
    }
}

/// Resolves a parsed request target against the document root.
///
/// The bare `/` target is substituted with `default_document`. Check order
/// follows the response table: absent (404), then not world-readable (403),
/// then directory (400).
pub fn resolve(
    root: &Path,
    target: &str,
    default_document: &str,
    max_path_len: usize,
) -> Result<ResolvedFile, ResolveError> {
    let relative = if target == "/" {
        default_document
    } else {
        target.trim_start_matches('/')
    };
    if relative.split('/').any(|segment| segment == "..") {
        return Err(ResolveError::Malformed);
    }

    let path = root.join(relative);
    if path.as_os_str().len() > max_path_len {
        return Err(ResolveError::NotFound);
    }

    let meta = match fs::metadata(&path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(ResolveError::NotFound),
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            return Err(ResolveError::Forbidden);
        }
        Err(e) => return Err(ResolveError::Io(e)),
    };
    if meta.mode() & WORLD_READABLE == 0 {
        return Err(ResolveError::Forbidden);
    }
    if meta.is_dir() {
        return Err(ResolveError::Malformed);
    }

    let len = meta.len() as usize;
    let mapping = if len == 0 {
        None
    } else {
        Some(MappedFile::open(&path, len).map_err(ResolveError::Io)?)
    };
    Ok(ResolvedFile { path, len, mapping })
}

/// Private read-only memory mapping of a served file, unmapped on drop.
#[derive(Debug)]
pub struct MappedFile {
    addr: *mut libc::c_void,
    len: usize,
}

// The mapping is private, read-only, and owned by exactly one connection.
unsafe impl Send for MappedFile {}

impl MappedFile {
    fn open(path: &Path, len: usize) -> io::Result<Self> {
        let file = File::open(path)?;
        let addr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ,
                libc::MAP_PRIVATE,
                file.as_raw_fd(),
                0,
            )
        };
        if addr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        // The descriptor can close here; the mapping outlives it.
        Ok(Self { addr, len })
    }

    pub fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.addr as *const u8, self.len) }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Drop for MappedFile {
    fn drop(&mut self) {
        unsafe { libc::munmap(self.addr, self.len) };
    }
}
