//! Raw FIEMAP ioctl binding: physical-extent query for an open file
//! descriptor.
//!
//! Grounded on `original_source/disk-warmer/filesystem.c`'s
//! `filesystem_extract_file_extents` (batch size, `FIEMAP_FLAG_SYNC`, the
//! `fm_start` advance-by-last-logical-offset loop) and the `fiemap`/
//! `fiemap_extent` struct layout documented in
//! `Documentation/filesystems/fiemap.txt`, cross-checked against
//! `examples/coreos-coreos-installer/src/osmet/fiemap.rs`'s field layout.
//! That file reaches for `nix`'s `ioctl_readwrite_bad!` macro to compute the
//! request code; since the teacher has no `nix` dependency and already calls
//! `libc::ioctl` directly (`device.rs`'s `BLKSSZGET`/`BLKPBSZGET`), the
//! request code here is precomputed the same way and used as a plain
//! constant.

use std::os::fd::RawFd;

use crate::extent::Extent;

const EXTENT_BATCH_SIZE: usize = 32;

const FIEMAP_EXTENT_LAST: u32 = 0x0000_0001;
const FIEMAP_EXTENT_UNKNOWN: u32 = 0x0000_0002;
const FIEMAP_FLAG_SYNC: u32 = 0x0000_0001;

/// `_IOWR('f', 11, FIEMAP_SIZE)` with `FIEMAP_SIZE` = the fixed portion of
/// `struct fiemap` (32 bytes: two u64s, three u32s, one u32 reserved) —
/// deliberately excludes the flexible `fm_extents` tail, matching the
/// kernel's own "bad" ioctl number (the naive size-of-whole-struct encoding
/// would embed the wrong size once a batch count is chosen).
const FS_IOC_FIEMAP: libc::c_ulong = 0xc020660b;

#[repr(C)]
struct RawFiemapExtent {
    fe_logical: u64,
    fe_physical: u64,
    fe_length: u64,
    fe_reserved64: [u64; 2],
    fe_flags: u32,
    fe_reserved: [u32; 3],
}

#[repr(C)]
struct RawFiemap {
    fm_start: u64,
    fm_length: u64,
    fm_flags: u32,
    fm_mapped_extents: u32,
    fm_extent_count: u32,
    fm_reserved: u32,
    fm_extents: [RawFiemapExtent; EXTENT_BATCH_SIZE],
}

impl RawFiemap {
    fn new(start: u64) -> Self {
        let mut m: Self = unsafe { std::mem::zeroed() };
        m.fm_start = start;
        m.fm_length = u64::MAX - start;
        m.fm_flags = FIEMAP_FLAG_SYNC;
        m.fm_extent_count = EXTENT_BATCH_SIZE as u32;
        m
    }
}

/// Queries the full set of physical extents backing `fd`'s data, in 32-extent
/// batches, advancing by the last returned logical offset until the `LAST`
/// flag is seen or a batch returns zero extents. Extents flagged `UNKNOWN`
/// are dropped (spec §4.4, §7 — per-item recoverable, not an error).
///
/// Returns `Err` only on an ioctl failure on the very first batch; a failure
/// on a later batch returns whatever was collected so far, matching the C
/// original's `break`-on-ioctl-error behavior.
#[cfg(target_os = "linux")]
pub fn query_extents(fd: RawFd) -> std::io::Result<Vec<Extent>> {
    let mut extents = Vec::new();
    let mut offset = 0u64;

    loop {
        let mut m = RawFiemap::new(offset);
        let rc = unsafe { libc::ioctl(fd, FS_IOC_FIEMAP, &mut m as *mut RawFiemap) };
        if rc == -1 {
            if extents.is_empty() {
                return Err(std::io::Error::last_os_error());
            }
            break;
        }
        if m.fm_mapped_extents == 0 {
            break;
        }

        let mut next_offset = 0u64;
        let mut done = false;
        for raw in m.fm_extents.iter().take(m.fm_mapped_extents as usize) {
            if raw.fe_flags & FIEMAP_EXTENT_UNKNOWN == 0 {
                extents.push(Extent::new(raw.fe_physical, raw.fe_length));
            }
            next_offset = raw.fe_logical + raw.fe_length;
            if raw.fe_flags & FIEMAP_EXTENT_LAST != 0 {
                done = true;
            }
        }
        if done {
            break;
        }
        offset = next_offset;
    }

    Ok(extents)
}

#[cfg(not(target_os = "linux"))]
pub fn query_extents(_fd: RawFd) -> std::io::Result<Vec<Extent>> {
    Err(std::io::Error::from_raw_os_error(libc::ENOTSUP))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_fiemap_request_has_full_length_and_batch_count() {
        let m = RawFiemap::new(4096);
        assert_eq!(m.fm_start, 4096);
        assert_eq!(m.fm_length, u64::MAX - 4096);
        assert_eq!(m.fm_extent_count, EXTENT_BATCH_SIZE as u32);
        assert_eq!(m.fm_flags, FIEMAP_FLAG_SYNC);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn query_extents_on_a_regular_file_does_not_error() {
        use std::io::Write;
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(&vec![0xabu8; 64 * 1024]).unwrap();
        f.flush().unwrap();
        use std::os::fd::AsRawFd;
        // Not asserting on extent count: tmpfs/overlayfs may report none, a
        // delayed-allocation filesystem may legitimately return zero extents
        // for an unflushed file. Only requiring the ioctl call itself to
        // succeed (or the more permissive ENOTTY some filesystems return).
        let result = query_extents(f.as_file().as_raw_fd());
        match result {
            Ok(_) => {}
            Err(e) => assert_eq!(e.raw_os_error(), Some(libc::ENOTTY)),
        }
    }
}
