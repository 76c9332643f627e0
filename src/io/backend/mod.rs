//! Pluggable async-I/O backend: the warming engine drives reads through this
//! four-operation interface (spec §4.7) without knowing whether the kernel
//! is being asked via classical AIO or io_uring.
//!
//! Grounded on the teacher's `io/engine.rs::read_batch`, which already
//! carries the shape of this interface (a buffer pool keyed by slot index,
//! submit-then-drain-completions loop) but hardcodes io_uring; this module
//! lifts that shape into a trait and adds the classical-AIO implementation
//! and the SQPOLL-first fallback chain from spec §4.7. `prepare_read` takes
//! the target file descriptor per request (rather than fixing one fd at
//! construction time) so the same backend drives both the single-device
//! warming engine and `page-cache-warmer/io_operations.c`'s
//! many-files-concurrently pattern, where every in-flight slot belongs to a
//! different open file.

#[cfg(target_os = "linux")]
pub mod aio;
#[cfg(target_os = "linux")]
pub mod uring;

use std::os::fd::RawFd;

use crate::error::DiskWarmerError;
use crate::io::aligned_buf::AlignedBuf;

/// One completed read: the slot it occupied and the raw syscall result
/// (bytes read, or negative errno).
pub struct Completion {
    pub slot: usize,
    pub result: i64,
}

/// A pluggable async-I/O backend. One instance owns `queue_depth` buffer
/// slots for its entire lifetime (spec §5, "I/O buffers are partitioned
/// one-per-queue-slot").
pub trait AsyncBackend {
    /// Stages a read of `len` bytes at `offset` from `fd` into the next free
    /// slot. Returns the slot index, or `None` if every slot is already
    /// staged or in flight.
    fn prepare_read(&mut self, fd: RawFd, offset: u64, len: usize) -> Option<usize>;

    /// Submits every staged-but-not-yet-submitted read. Returns the number
    /// accepted by the kernel, which may be fewer than staged (spec §7,
    /// phase-fatal if so).
    fn submit_batch(&mut self) -> Result<usize, DiskWarmerError>;

    /// Blocks until exactly `count` completions are available (or the
    /// kernel has nothing left in flight), returning one `Completion` per
    /// finished request and freeing their slots.
    fn reap_batch(&mut self, count: usize) -> Result<Vec<Completion>, DiskWarmerError>;

    /// Read-only view into a slot's buffer, valid until that slot is
    /// reused by a later `prepare_read`.
    fn slot_buffer(&self, slot: usize) -> &AlignedBuf;

    fn queue_depth(&self) -> usize;
}

/// Names the backend actually selected, for diagnostics/progress reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    UringPolled,
    UringPlain,
    Classical,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BackendKind::UringPolled => "io_uring (kernel-polled)",
            BackendKind::UringPlain => "io_uring",
            BackendKind::Classical => "classical AIO",
        };
        f.write_str(s)
    }
}

/// Selects an async backend, trying kernel-polled io_uring first, falling
/// back to a plain io_uring, then to classical kernel AIO (spec §4.7). Each
/// buffer is `buf_size` bytes, aligned per `io::aligned_buf`. The backend is
/// agnostic to which file descriptor(s) it ends up serving; the caller
/// supplies one per `prepare_read` call.
#[cfg(target_os = "linux")]
pub fn select_backend(
    queue_depth: usize,
    buf_size: usize,
) -> Result<(Box<dyn AsyncBackend>, BackendKind), DiskWarmerError> {
    match uring::UringBackend::new(queue_depth, buf_size, true) {
        Ok(backend) => return Ok((Box::new(backend), BackendKind::UringPolled)),
        Err(_) => {}
    }
    match uring::UringBackend::new(queue_depth, buf_size, false) {
        Ok(backend) => return Ok((Box::new(backend), BackendKind::UringPlain)),
        Err(_) => {}
    }
    let backend = aio::ClassicalBackend::new(queue_depth, buf_size)?;
    Ok((Box::new(backend), BackendKind::Classical))
}

#[cfg(not(target_os = "linux"))]
pub fn select_backend(
    queue_depth: usize,
    buf_size: usize,
) -> Result<(Box<dyn AsyncBackend>, BackendKind), DiskWarmerError> {
    let _ = (queue_depth, buf_size);
    Err(DiskWarmerError::BackendInit(
        "no async I/O backend available on this platform",
    ))
}
