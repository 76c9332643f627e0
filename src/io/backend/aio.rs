//! Classical kernel-AIO backend: the original Linux `io_submit`/
//! `io_getevents` interface, invoked as raw syscalls.
//!
//! Grounded on spec §4.7's description of the classical interface
//! (`prep_pread`/`submit`/`getevents` over an explicit context handle) and
//! the teacher's habit of reaching for raw syscalls when no safe wrapper
//! exists (`device.rs`'s `BLKSSZGET` ioctl, `throttle.rs`'s `ioprio_set`).
//! No `libaio`-sys crate is available, so the `struct iocb`/`struct
//! io_event` ABI is reproduced here directly from
//! `include/uapi/linux/aio_abi.h`. Field order assumes a little-endian
//! target (x86_64, aarch64) — the only architectures EBS-backed instances
//! run on.

use std::os::fd::RawFd;

use crate::error::DiskWarmerError;
use crate::io::aligned_buf::{alloc_aligned, AlignedBuf};

use super::{AsyncBackend, Completion};

type AioContextT = u64;

const IOCB_CMD_PREAD: u16 = 0;

#[repr(C)]
#[derive(Clone, Copy)]
struct Iocb {
    aio_data: u64,
    aio_key: u32,
    aio_rw_flags: u32,
    aio_lio_opcode: u16,
    aio_reqprio: i16,
    aio_fildes: u32,
    aio_buf: u64,
    aio_nbytes: u64,
    aio_offset: i64,
    aio_reserved2: u64,
    aio_flags: u32,
    aio_resfd: u32,
}

impl Iocb {
    fn zeroed() -> Self {
        unsafe { std::mem::zeroed() }
    }
}

#[repr(C)]
#[derive(Clone, Copy)]
struct IoEvent {
    data: u64,
    obj: u64,
    res: i64,
    res2: i64,
}

fn io_setup(nr_events: u32) -> std::io::Result<AioContextT> {
    let mut ctx: AioContextT = 0;
    let rc = unsafe { libc::syscall(libc::SYS_io_setup, nr_events as libc::c_long, &mut ctx) };
    if rc < 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(ctx)
}

fn io_destroy(ctx: AioContextT) {
    unsafe {
        libc::syscall(libc::SYS_io_destroy, ctx);
    }
}

fn io_submit(ctx: AioContextT, iocbpp: &[*mut Iocb]) -> std::io::Result<usize> {
    let rc = unsafe {
        libc::syscall(
            libc::SYS_io_submit,
            ctx,
            iocbpp.len() as libc::c_long,
            iocbpp.as_ptr(),
        )
    };
    if rc < 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(rc as usize)
}

fn io_getevents(
    ctx: AioContextT,
    min_nr: usize,
    events: &mut [IoEvent],
) -> std::io::Result<usize> {
    let rc = unsafe {
        libc::syscall(
            libc::SYS_io_getevents,
            ctx,
            min_nr as libc::c_long,
            events.len() as libc::c_long,
            events.as_mut_ptr(),
            std::ptr::null_mut::<libc::timespec>(),
        )
    };
    if rc < 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(rc as usize)
}

pub struct ClassicalBackend {
    ctx: AioContextT,
    pool: Vec<AlignedBuf>,
    iocbs: Vec<Iocb>,
    free_slots: Vec<usize>,
    staged: Vec<usize>,
    in_flight: usize,
}

impl ClassicalBackend {
    pub fn new(queue_depth: usize, buf_size: usize) -> Result<Self, DiskWarmerError> {
        let ctx = io_setup(queue_depth as u32)
            .map_err(|_| DiskWarmerError::BackendInit("io_setup failed"))?;

        Ok(Self {
            ctx,
            pool: (0..queue_depth).map(|_| alloc_aligned(buf_size)).collect(),
            iocbs: vec![Iocb::zeroed(); queue_depth],
            free_slots: (0..queue_depth).rev().collect(),
            staged: Vec::with_capacity(queue_depth),
            in_flight: 0,
        })
    }
}

impl AsyncBackend for ClassicalBackend {
    fn prepare_read(&mut self, fd: RawFd, offset: u64, len: usize) -> Option<usize> {
        let slot = self.free_slots.pop()?;
        let capped = len.min(self.pool[slot].len());

        let iocb = &mut self.iocbs[slot];
        *iocb = Iocb::zeroed();
        iocb.aio_lio_opcode = IOCB_CMD_PREAD;
        iocb.aio_fildes = fd as u32;
        iocb.aio_buf = self.pool[slot].as_mut_ptr() as u64;
        iocb.aio_nbytes = capped as u64;
        iocb.aio_offset = offset as i64;
        iocb.aio_data = slot as u64;

        self.staged.push(slot);
        Some(slot)
    }

    fn submit_batch(&mut self) -> Result<usize, DiskWarmerError> {
        if self.staged.is_empty() {
            return Ok(0);
        }
        let iocbpp: Vec<*mut Iocb> = self
            .staged
            .iter()
            .map(|&slot| &mut self.iocbs[slot] as *mut Iocb)
            .collect();

        let accepted = io_submit(self.ctx, &iocbpp).map_err(|_| DiskWarmerError::Submit {
            got: 0,
            expected: self.staged.len(),
        })?;
        self.in_flight += self.staged.len();
        self.staged.clear();
        Ok(accepted)
    }

    fn reap_batch(&mut self, count: usize) -> Result<Vec<Completion>, DiskWarmerError> {
        let mut out = Vec::with_capacity(count);
        let mut events = vec![
            IoEvent {
                data: 0,
                obj: 0,
                res: 0,
                res2: 0
            };
            count
        ];
        while out.len() < count {
            let remaining = count - out.len();
            let got = io_getevents(self.ctx, remaining, &mut events[..remaining]).map_err(|_| {
                DiskWarmerError::Reap {
                    got: out.len(),
                    expected: count,
                }
            })?;
            for ev in &events[..got] {
                let slot = ev.data as usize;
                out.push(Completion {
                    slot,
                    result: ev.res,
                });
                self.free_slots.push(slot);
                self.in_flight -= 1;
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

impl Drop for ClassicalBackend {
    fn drop(&mut self) {
        io_destroy(self.ctx);
    }
}
