//! Zero-copy transfer primitives
//!
//! This module provides the shared machinery that moves bytes between two
//! kernel-held descriptors without staging them in user-space buffers. It
//! implements sendfile for file-to-file moves, splice for routes involving a
//! pipe, and a buffered read/write path as the portable fallback.
//!
//! All loops drive an explicit [`TransferTask`] state machine rather than an
//! implicit retry loop, so partial-progress behavior is testable without a
//! kernel underneath.

use crate::error::{EngineError, Result};
use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

/// Largest request handed to the kernel per call.
///
/// Matches the default pipe capacity (16 pages), so a bounded splice into a
/// pipe can never block on a full pipe buffer.
pub const TRANSFER_CHUNK: usize = 64 * 1024;

/// Progress of one transfer between two descriptors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    /// No bytes requested yet
    Pending,
    /// Some bytes moved, more outstanding
    InProgress,
    /// All expected bytes moved, or the source ended early after progress
    Complete,
    /// The source produced nothing although bytes were expected
    Failed,
}

/// State machine for a single transfer of `expected` bytes.
///
/// The kernel may move fewer bytes per call than requested; callers feed
/// every per-call count into [`advance`](TransferTask::advance) and re-issue
/// with [`next_request`](TransferTask::next_request) until
/// [`is_done`](TransferTask::is_done).
#[derive(Debug)]
pub struct TransferTask {
    expected: u64,
    moved: u64,
    state: TransferState,
}

impl TransferTask {
    /// Create a task for `expected` bytes. A zero-length transfer is
    /// complete from the start.
    pub fn new(expected: u64) -> Self {
        let state = if expected == 0 {
            TransferState::Complete
        } else {
            TransferState::Pending
        };
        Self {
            expected,
            moved: 0,
            state,
        }
    }

    /// Bytes moved so far
    pub fn moved(&self) -> u64 {
        self.moved
    }

    /// Bytes still outstanding
    pub fn remaining(&self) -> u64 {
        self.expected - self.moved
    }

    /// Current state
    pub fn state(&self) -> TransferState {
        self.state
    }

    /// Length to request from the kernel on the next call
    pub fn next_request(&self) -> usize {
        self.remaining().min(TRANSFER_CHUNK as u64) as usize
    }

    /// True while further requests would follow the next one; used to set
    /// `SPLICE_F_MORE` on every chunk except the final expected one.
    pub fn more_expected(&self) -> bool {
        self.remaining() > TRANSFER_CHUNK as u64
    }

    /// Record the result of one kernel call.
    ///
    /// A zero count means the source is exhausted: that is a normal early
    /// end when progress was already made, and a failure when nothing was
    /// moved although bytes were expected (the size the caller stat'ed no
    /// longer matches reality).
    pub fn advance(&mut self, n: u64) {
        if n == 0 {
            self.state = if self.moved == 0 && self.expected > 0 {
                TransferState::Failed
            } else {
                TransferState::Complete
            };
            return;
        }
        self.moved += n;
        self.state = if self.moved >= self.expected {
            TransferState::Complete
        } else {
            TransferState::InProgress
        };
    }

    /// True once the loop must stop, successfully or not
    pub fn is_done(&self) -> bool {
        matches!(self.state, TransferState::Complete | TransferState::Failed)
    }
}

/// An anonymous unidirectional pipe; both ends closed exactly once on drop
#[derive(Debug)]
pub struct Pipe {
    /// Read end
    pub read: OwnedFd,
    /// Write end
    pub write: OwnedFd,
}

impl Pipe {
    /// Create a pipe pair with close-on-exec set on both ends
    pub fn new() -> io::Result<Self> {
        let mut fds = [0i32; 2];
        let rc = unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self {
            read: unsafe { OwnedFd::from_raw_fd(fds[0]) },
            write: unsafe { OwnedFd::from_raw_fd(fds[1]) },
        })
    }
}

/// Retry a syscall until it returns without EINTR/EAGAIN.
///
/// All descriptors in this crate are blocking, so "would block" reduces to
/// an unconditional retry with unchanged progress.
fn retry_transient<F>(mut call: F) -> io::Result<usize>
where
    F: FnMut() -> libc::ssize_t,
{
    loop {
        let rc = call();
        if rc >= 0 {
            return Ok(rc as usize);
        }
        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::EINTR) | Some(libc::EAGAIN) => continue,
            _ => return Err(err),
        }
    }
}

/// One splice call moving up to `len` bytes; at least one side must be a pipe
pub(crate) fn splice(src: RawFd, dst: RawFd, len: usize, more: bool) -> io::Result<usize> {
    let mut flags = libc::SPLICE_F_MOVE;
    if more {
        flags |= libc::SPLICE_F_MORE;
    }
    retry_transient(|| unsafe {
        libc::splice(
            src,
            std::ptr::null_mut::<libc::loff_t>(),
            dst,
            std::ptr::null_mut::<libc::loff_t>(),
            len,
            flags,
        )
    })
}

/// One sendfile call moving up to `len` bytes file-to-file at the current
/// offsets
pub(crate) fn sendfile(dst: RawFd, src: RawFd, len: usize) -> io::Result<usize> {
    retry_transient(|| unsafe {
        libc::sendfile(dst, src, std::ptr::null_mut::<libc::off_t>(), len)
    })
}

/// True when the zero-copy primitive cannot serve this descriptor pair and
/// the buffered path must take over
pub(crate) fn is_unsupported(err: &io::Error) -> bool {
    matches!(
        err.raw_os_error(),
        Some(libc::EINVAL) | Some(libc::ENOSYS) | Some(libc::EXDEV) | Some(libc::EOPNOTSUPP)
    )
}

/// Move up to `len` bytes from `src` to `dst` entirely in kernel space.
///
/// Returns the number of bytes actually moved, which is less than `len`
/// when the source ended early; a source that yields nothing at all is a
/// size mismatch and surfaces at the caller. Falls back to
/// [`copy_buffered`] when sendfile rejects the descriptor pair before any
/// progress was made (pseudo-filesystem sources, for example).
///
/// # Errors
///
/// Returns an error for any syscall failure other than the transparent
/// retry conditions and the fallback cases above.
pub fn transfer_file_range(src: &File, dst: &File, len: u64) -> Result<u64> {
    let mut task = TransferTask::new(len);
    while !task.is_done() {
        match sendfile(dst.as_raw_fd(), src.as_raw_fd(), task.next_request()) {
            Ok(n) => task.advance(n as u64),
            Err(e) if task.moved() == 0 && is_unsupported(&e) => {
                tracing::debug!("sendfile unsupported ({}), using buffered copy", e);
                return copy_buffered(src, dst, len);
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(task.moved())
}

/// Move up to `len` bytes from `src` to `dst` through an intermediate pipe.
///
/// Both splice directions are bounded to the pipe capacity and alternate,
/// so the pipe can never fill while nobody drains it.
pub fn transfer_via_pipe(src: &File, dst: &File, len: u64) -> Result<u64> {
    let pipe = Pipe::new()?;
    let mut task = TransferTask::new(len);
    while !task.is_done() {
        let want = task.next_request();
        let more = task.more_expected();
        let n = match splice(src.as_raw_fd(), pipe.write.as_raw_fd(), want, more) {
            Ok(n) => n,
            Err(e) if task.moved() == 0 && is_unsupported(&e) => {
                tracing::debug!("splice unsupported ({}), using buffered copy", e);
                return copy_buffered(src, dst, len);
            }
            Err(e) => return Err(e.into()),
        };
        task.advance(n as u64);
        drain_pipe(&pipe, dst.as_raw_fd(), n, more)?;
    }
    Ok(task.moved())
}

/// Drain exactly `len` buffered bytes from the pipe into `dst`
pub(crate) fn drain_pipe(pipe: &Pipe, dst: RawFd, len: usize, more: bool) -> Result<()> {
    let mut left = len;
    while left > 0 {
        let n = splice(pipe.read.as_raw_fd(), dst, left, more)?;
        if n == 0 {
            return Err(EngineError::Io(io::Error::new(
                io::ErrorKind::WriteZero,
                "pipe drained early",
            )));
        }
        left -= n;
    }
    Ok(())
}

/// Portable fallback: move up to `len` bytes through a user-space buffer.
///
/// Slower than the zero-copy paths but valid for any readable/writable
/// descriptor pair; required for correctness where splice and sendfile are
/// not.
pub fn copy_buffered(src: &File, dst: &File, len: u64) -> Result<u64> {
    let mut src = src;
    let mut dst = dst;
    let mut buf = vec![0u8; TRANSFER_CHUNK];
    let mut task = TransferTask::new(len);
    while !task.is_done() {
        let want = task.next_request();
        let n = match src.read(&mut buf[..want]) {
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        if n > 0 {
            dst.write_all(&buf[..n])?;
        }
        task.advance(n as u64);
    }
    Ok(task.moved())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Seek, SeekFrom};

    #[test]
    fn task_sums_partial_counts() {
        let mut task = TransferTask::new(100);
        assert_eq!(task.state(), TransferState::Pending);
        task.advance(40);
        assert_eq!(task.state(), TransferState::InProgress);
        task.advance(35);
        task.advance(25);
        assert_eq!(task.state(), TransferState::Complete);
        assert_eq!(task.moved(), 100);
        assert!(task.is_done());
    }

    #[test]
    fn task_accepts_early_end_after_progress() {
        let mut task = TransferTask::new(100);
        task.advance(60);
        task.advance(0);
        assert_eq!(task.state(), TransferState::Complete);
        assert_eq!(task.moved(), 60);
    }

    #[test]
    fn task_fails_on_empty_source_with_expected_bytes() {
        let mut task = TransferTask::new(100);
        task.advance(0);
        assert_eq!(task.state(), TransferState::Failed);
        assert_eq!(task.moved(), 0);
        assert!(task.is_done());
    }

    #[test]
    fn zero_length_task_is_complete_immediately() {
        let task = TransferTask::new(0);
        assert!(task.is_done());
        assert_eq!(task.state(), TransferState::Complete);
    }

    #[test]
    fn task_bounds_requests_to_chunk_size() {
        let mut task = TransferTask::new(TRANSFER_CHUNK as u64 * 2 + 5);
        assert_eq!(task.next_request(), TRANSFER_CHUNK);
        assert!(task.more_expected());
        task.advance(TRANSFER_CHUNK as u64 * 2);
        assert_eq!(task.next_request(), 5);
        assert!(!task.more_expected());
    }

    #[test]
    fn pipe_round_trips_bytes() {
        let pipe = Pipe::new().unwrap();
        let mut writer = File::from(pipe.write);
        let mut reader = File::from(pipe.read);
        writer.write_all(b"hello pipe").unwrap();
        drop(writer);
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"hello pipe");
    }

    #[test]
    fn splice_moves_file_into_pipe() {
        let mut src = tempfile::tempfile().unwrap();
        src.write_all(b"spliced bytes").unwrap();
        src.seek(SeekFrom::Start(0)).unwrap();

        let pipe = Pipe::new().unwrap();
        let n = splice(src.as_raw_fd(), pipe.write.as_raw_fd(), 64, false).unwrap();
        assert_eq!(n, 13);

        drop(pipe.write);
        let mut out = Vec::new();
        File::from(pipe.read).read_to_end(&mut out).unwrap();
        assert_eq!(out, b"spliced bytes");
    }

    #[test]
    fn transfer_file_range_copies_all_bytes() {
        let mut src = tempfile::tempfile().unwrap();
        let payload = vec![0xabu8; TRANSFER_CHUNK + 17];
        src.write_all(&payload).unwrap();
        src.seek(SeekFrom::Start(0)).unwrap();

        let mut dst = tempfile::tempfile().unwrap();
        let moved = transfer_file_range(&src, &dst, payload.len() as u64).unwrap();
        assert_eq!(moved, payload.len() as u64);

        dst.seek(SeekFrom::Start(0)).unwrap();
        let mut out = Vec::new();
        dst.read_to_end(&mut out).unwrap();
        assert_eq!(out, payload);
    }

    #[test]
    fn transfer_via_pipe_copies_all_bytes() {
        let mut src = tempfile::tempfile().unwrap();
        let payload = vec![0x5au8; TRANSFER_CHUNK * 2 + 3];
        src.write_all(&payload).unwrap();
        src.seek(SeekFrom::Start(0)).unwrap();

        let mut dst = tempfile::tempfile().unwrap();
        let moved = transfer_via_pipe(&src, &dst, payload.len() as u64).unwrap();
        assert_eq!(moved, payload.len() as u64);

        dst.seek(SeekFrom::Start(0)).unwrap();
        let mut out = Vec::new();
        dst.read_to_end(&mut out).unwrap();
        assert_eq!(out, payload);
    }

    #[test]
    fn copy_buffered_honors_requested_length() {
        let mut src = tempfile::tempfile().unwrap();
        src.write_all(b"0123456789").unwrap();
        src.seek(SeekFrom::Start(0)).unwrap();

        let mut dst = tempfile::tempfile().unwrap();
        let moved = copy_buffered(&src, &dst, 4).unwrap();
        assert_eq!(moved, 4);

        dst.seek(SeekFrom::Start(0)).unwrap();
        let mut out = Vec::new();
        dst.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"0123");
    }
}
