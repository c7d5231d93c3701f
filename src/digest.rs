//! Kernel crypto digest engine
//!
//! Computes file digests by routing content into the kernel's crypto API
//! (`AF_ALG`) through a pipe, so the hashed bytes never enter user space.
//! The two splice directions are bounded and alternate, which keeps the pipe
//! from ever filling while nobody drains it. A software backend built on
//! user-space hashers covers kernels and sandboxes without `AF_ALG`.
//!
//! One session is opened per input file and torn down afterwards; sessions
//! are never shared, so no residual transform state can leak between files.

use crate::cli::DigestBackend;
use crate::copy::{try_lock, LockMode};
use crate::error::{EngineError, Result};
use crate::splice::{drain_pipe, is_unsupported, splice, Pipe, TransferState, TransferTask, TRANSFER_CHUNK};
use sha2::Digest;
use std::fs::File;
use std::io::{self, Read};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::path::Path;
use tracing::debug;

/// Digest algorithms with known result sizes, usable by both backends
const ALGORITHMS: &[(&str, usize)] = &[
    ("md5", 16),
    ("sha1", 20),
    ("sha224", 28),
    ("sha256", 32),
    ("sha384", 48),
    ("sha512", 64),
];

/// Digest size in bytes for `algorithm`, if known
pub fn digest_len(algorithm: &str) -> Option<usize> {
    ALGORITHMS
        .iter()
        .find(|(name, _)| *name == algorithm)
        .map(|(_, len)| *len)
}

/// Names of all supported algorithms
pub fn algorithm_names() -> Vec<&'static str> {
    ALGORITHMS.iter().map(|(name, _)| *name).collect()
}

/// Compute the digest of one file.
///
/// The file is locked shared (non-blocking) for the duration. Backend
/// `auto` prefers the kernel and falls back to the software hashers when no
/// session can be opened.
///
/// # Errors
///
/// [`EngineError::UnsupportedAlgorithm`] when neither backend can serve the
/// algorithm; this is fatal to the whole invocation by convention.
pub fn digest_file(path: &Path, algorithm: &str, backend: DigestBackend) -> Result<Vec<u8>> {
    let file = File::open(path).map_err(|e| EngineError::SourceUnreadable {
        path: path.to_path_buf(),
        source: e,
    })?;
    if !try_lock(&file, LockMode::Shared)? {
        return Err(EngineError::Locked {
            path: path.to_path_buf(),
        });
    }
    let len = file
        .metadata()
        .map_err(|e| EngineError::SourceUnreadable {
            path: path.to_path_buf(),
            source: e,
        })?
        .len();

    match backend {
        DigestBackend::Kernel => KernelSession::open(algorithm)?.digest(&file, len, path),
        DigestBackend::Software => software_digest(&file, algorithm),
        DigestBackend::Auto => match KernelSession::open(algorithm) {
            Ok(session) => session.digest(&file, len, path),
            Err(e) => {
                debug!("kernel crypto unavailable ({}), using software backend", e);
                software_digest(&file, algorithm)
            }
        },
    }
}

/// One kernel crypto transform session, bound to a named hash algorithm.
///
/// Holds both the bound transform socket and the accepted operation
/// descriptor; both close exactly once when the session drops.
pub struct KernelSession {
    /// Bound transform socket; kept open for the lifetime of the session
    #[allow(dead_code)]
    transform: OwnedFd,
    op: OwnedFd,
    digest_len: usize,
}

impl KernelSession {
    /// Bind a session to `algorithm` against the kernel crypto API.
    ///
    /// # Errors
    ///
    /// [`EngineError::UnsupportedAlgorithm`] when the name is unknown here
    /// or no such transform is registered in the kernel; an I/O error when
    /// `AF_ALG` itself is unavailable.
    pub fn open(algorithm: &str) -> Result<Self> {
        let digest_len = digest_len(algorithm)
            .ok_or_else(|| EngineError::UnsupportedAlgorithm(algorithm.to_string()))?;

        let fd = unsafe {
            libc::socket(
                libc::AF_ALG,
                libc::SOCK_SEQPACKET | libc::SOCK_CLOEXEC,
                0,
            )
        };
        if fd < 0 {
            return Err(io::Error::last_os_error().into());
        }
        let transform = unsafe { OwnedFd::from_raw_fd(fd) };

        let mut addr: libc::sockaddr_alg = unsafe { std::mem::zeroed() };
        addr.salg_family = libc::AF_ALG as libc::sa_family_t;
        addr.salg_type[..4].copy_from_slice(b"hash");
        addr.salg_name[..algorithm.len()].copy_from_slice(algorithm.as_bytes());

        let rc = unsafe {
            libc::bind(
                transform.as_raw_fd(),
                std::ptr::addr_of!(addr).cast::<libc::sockaddr>(),
                std::mem::size_of::<libc::sockaddr_alg>() as libc::socklen_t,
            )
        };
        if rc < 0 {
            let err = io::Error::last_os_error();
            return Err(if err.raw_os_error() == Some(libc::ENOENT) {
                EngineError::UnsupportedAlgorithm(algorithm.to_string())
            } else {
                err.into()
            });
        }

        let fd = unsafe {
            libc::accept4(
                transform.as_raw_fd(),
                std::ptr::null_mut(),
                std::ptr::null_mut(),
                libc::SOCK_CLOEXEC,
            )
        };
        if fd < 0 {
            return Err(io::Error::last_os_error().into());
        }
        let op = unsafe { OwnedFd::from_raw_fd(fd) };

        Ok(Self {
            transform,
            op,
            digest_len,
        })
    }

    /// Stream `len` bytes of `file` into the session and read the digest
    pub fn digest(&self, file: &File, len: u64, path: &Path) -> Result<Vec<u8>> {
        if len == 0 {
            self.finalize_empty()?;
            return self.read_digest();
        }
        let task = self.feed(file, len)?;
        if task.state() == TransferState::Failed {
            return Err(EngineError::SizeMismatch {
                path: path.to_path_buf(),
                moved: task.moved(),
                expected: len,
            });
        }
        if task.moved() < len {
            debug!(
                "source ended early: {} of {} bytes hashed for {}",
                task.moved(),
                len,
                path.display()
            );
        }
        self.read_digest()
    }

    /// Alternating bounded transfers: file → pipe, pipe → session.
    ///
    /// Falls back to a buffered feed when the source cannot be spliced
    /// (pseudo-filesystems).
    fn feed(&self, file: &File, len: u64) -> Result<TransferTask> {
        let pipe = Pipe::new()?;
        let mut task = TransferTask::new(len);
        while !task.is_done() {
            let want = task.next_request();
            let more = task.more_expected();
            let n = match splice(file.as_raw_fd(), pipe.write.as_raw_fd(), want, more) {
                Ok(n) => n,
                Err(e) if task.moved() == 0 && is_unsupported(&e) => {
                    debug!("splice unsupported ({}), using buffered feed", e);
                    return self.feed_buffered(file, len);
                }
                Err(e) => return Err(e.into()),
            };
            task.advance(n as u64);
            drain_pipe(&pipe, self.op.as_raw_fd(), n, more)?;
        }
        Ok(task)
    }

    /// Buffered feed into the same session, for sources splice rejects
    fn feed_buffered(&self, file: &File, len: u64) -> Result<TransferTask> {
        let mut file = file;
        let mut buf = vec![0u8; TRANSFER_CHUNK];
        let mut task = TransferTask::new(len);
        while !task.is_done() {
            let want = task.next_request();
            let more = task.more_expected();
            let n = match file.read(&mut buf[..want]) {
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            if n > 0 {
                self.send(&buf[..n], more)?;
            }
            task.advance(n as u64);
        }
        Ok(task)
    }

    /// Send one chunk into the operation socket, `MSG_MORE` while the
    /// stream continues
    fn send(&self, data: &[u8], more: bool) -> Result<()> {
        let flags = if more { libc::MSG_MORE } else { 0 };
        let mut sent = 0;
        while sent < data.len() {
            let rc = unsafe {
                libc::send(
                    self.op.as_raw_fd(),
                    data[sent..].as_ptr().cast(),
                    data.len() - sent,
                    flags,
                )
            };
            if rc < 0 {
                let err = io::Error::last_os_error();
                if err.raw_os_error() == Some(libc::EINTR) {
                    continue;
                }
                return Err(err.into());
            }
            sent += rc as usize;
        }
        Ok(())
    }

    /// A hash of nothing still needs one empty write to finalize
    fn finalize_empty(&self) -> Result<()> {
        let empty: [u8; 0] = [];
        let rc = unsafe { libc::write(self.op.as_raw_fd(), empty.as_ptr().cast(), 0) };
        if rc < 0 {
            return Err(io::Error::last_os_error().into());
        }
        Ok(())
    }

    /// Read back the fixed-size result
    fn read_digest(&self) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; self.digest_len];
        let mut filled = 0;
        while filled < self.digest_len {
            let rc = unsafe {
                libc::read(
                    self.op.as_raw_fd(),
                    buf[filled..].as_mut_ptr().cast(),
                    self.digest_len - filled,
                )
            };
            if rc < 0 {
                let err = io::Error::last_os_error();
                if err.raw_os_error() == Some(libc::EINTR) {
                    continue;
                }
                return Err(err.into());
            }
            if rc == 0 {
                return Err(EngineError::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "crypto session returned a short digest",
                )));
            }
            filled += rc as usize;
        }
        Ok(buf)
    }
}

/// User-space hasher for the software backend
enum SoftwareHasher {
    Md5(md5::Context),
    Sha1(sha1::Sha1),
    Sha224(sha2::Sha224),
    Sha256(sha2::Sha256),
    Sha384(sha2::Sha384),
    Sha512(sha2::Sha512),
}

impl SoftwareHasher {
    fn new(algorithm: &str) -> Result<Self> {
        Ok(match algorithm {
            "md5" => Self::Md5(md5::Context::new()),
            "sha1" => Self::Sha1(sha1::Sha1::new()),
            "sha224" => Self::Sha224(sha2::Sha224::new()),
            "sha256" => Self::Sha256(sha2::Sha256::new()),
            "sha384" => Self::Sha384(sha2::Sha384::new()),
            "sha512" => Self::Sha512(sha2::Sha512::new()),
            other => return Err(EngineError::UnsupportedAlgorithm(other.to_string())),
        })
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Self::Md5(ctx) => ctx.consume(data),
            Self::Sha1(h) => h.update(data),
            Self::Sha224(h) => h.update(data),
            Self::Sha256(h) => h.update(data),
            Self::Sha384(h) => h.update(data),
            Self::Sha512(h) => h.update(data),
        }
    }

    fn finalize(self) -> Vec<u8> {
        match self {
            Self::Md5(ctx) => ctx.compute().0.to_vec(),
            Self::Sha1(h) => h.finalize().to_vec(),
            Self::Sha224(h) => h.finalize().to_vec(),
            Self::Sha256(h) => h.finalize().to_vec(),
            Self::Sha384(h) => h.finalize().to_vec(),
            Self::Sha512(h) => h.finalize().to_vec(),
        }
    }
}

/// Portable digest path: stream the file through a user-space hasher
fn software_digest(file: &File, algorithm: &str) -> Result<Vec<u8>> {
    let mut file = file;
    let mut hasher = SoftwareHasher::new(algorithm)?;
    let mut buf = vec![0u8; TRANSFER_CHUNK];
    loop {
        let n = match file.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize())
}
