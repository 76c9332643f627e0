//! Ring-based async backend: shared submission/completion rings, optionally
//! with kernel-side polling (`SQPOLL`).
//!
//! Grounded on the teacher's `io/engine.rs::read_batch` (buffer pool keyed
//! by slot, `opcode::Read` + `user_data` tagging, draining the completion
//! queue after `submit_and_wait`); generalized here into the `AsyncBackend`
//! trait and extended with the `IoUring::builder().setup_sqpoll(...)` path
//! spec §4.7 calls for.

use std::os::fd::RawFd;

use io_uring::{opcode, types, IoUring};

use crate::error::DiskWarmerError;
use crate::io::aligned_buf::{alloc_aligned, AlignedBuf};

use super::{AsyncBackend, Completion};

/// Idle period, in milliseconds, before the kernel poller thread naps when
/// `SQPOLL` is enabled.
const SQPOLL_IDLE_MS: u32 = 1000;

pub struct UringBackend {
    ring: IoUring,
    pool: Vec<AlignedBuf>,
    free_slots: Vec<usize>,
    staged: Vec<(usize, RawFd, u64, usize)>,
    in_flight: usize,
}

impl UringBackend {
    pub fn new(
        queue_depth: usize,
        buf_size: usize,
        polled: bool,
    ) -> Result<Self, DiskWarmerError> {
        let ring = if polled {
            IoUring::builder()
                .setup_sqpoll(SQPOLL_IDLE_MS)
                .build(queue_depth as u32)
        } else {
            IoUring::builder().build(queue_depth as u32)
        }
        .map_err(|_| DiskWarmerError::BackendInit("io_uring ring setup failed"))?;

        let pool: Vec<AlignedBuf> = (0..queue_depth).map(|_| alloc_aligned(buf_size)).collect();
        let free_slots: Vec<usize> = (0..queue_depth).rev().collect();

        Ok(Self {
            ring,
            pool,
            free_slots,
            staged: Vec::with_capacity(queue_depth),
            in_flight: 0,
        })
    }
}

impl AsyncBackend for UringBackend {
    fn prepare_read(&mut self, fd: RawFd, offset: u64, len: usize) -> Option<usize> {
        let slot = self.free_slots.pop()?;
        let capped = len.min(self.pool[slot].len());
        self.staged.push((slot, fd, offset, capped));
        Some(slot)
    }

    fn submit_batch(&mut self) -> Result<usize, DiskWarmerError> {
        if self.staged.is_empty() {
            return Ok(0);
        }

        {
            let mut sq = self.ring.submission();
            for &(slot, fd, offset, len) in &self.staged {
                let ptr = self.pool[slot].as_mut_ptr();
                let sqe = opcode::Read::new(types::Fd(fd), ptr, len as u32)
                    .offset(offset)
                    .build()
                    .user_data(slot as u64);
                unsafe {
                    sq.push(&sqe).map_err(|_| {
                        DiskWarmerError::BackendInit("io_uring submission queue full")
                    })?;
                }
            }
        }

        let accepted = self
            .ring
            .submit()
            .map_err(|_| DiskWarmerError::Submit {
                got: 0,
                expected: self.staged.len(),
            })?;
        self.in_flight += self.staged.len();
        self.staged.clear();
        Ok(accepted)
    }

    fn reap_batch(&mut self, count: usize) -> Result<Vec<Completion>, DiskWarmerError> {
        let mut out = Vec::with_capacity(count);
        while out.len() < count {
            self.ring
                .submit_and_wait(1)
                .map_err(|_| DiskWarmerError::Reap {
                    got: out.len(),
                    expected: count,
                })?;
            let cq = self.ring.completion();
            for cqe in cq {
                let slot = cqe.user_data() as usize;
                out.push(Completion {
                    slot,
                    result: cqe.result() as i64,
                });
                self.free_slots.push(slot);
                self.in_flight -= 1;
                if out.len() == count {
                    break;
                }
            }
        }
        Ok(out)
    }

    fn slot_buffer(&self, slot: usize) -> &AlignedBuf {
        &self.pool[slot]
    }

    fn queue_depth(&self) -> usize {
        self.pool.len()
    }
}
