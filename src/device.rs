//! Device probe: open the target path with a direct-I/O preference, query
//! its size and sector geometry, and compute aligned I/O parameters.
//!
//! Grounded on the teacher's `io/engine.rs::IoEngine::open` (open-with-flags,
//! `lseek(SEEK_END)` for size, `Drop` closes the fd) and
//! `io/platform.rs` (platform-specific direct-I/O flags), generalized from a
//! hardcoded `O_DIRECT`-or-die open into the spec §4.3 probe-with-fallback
//! and `BLKSSZGET`/`BLKPBSZGET` sector queries from
//! `original_source/disk-warmer/disk_warmer.h`.

use std::ffi::CString;
use std::os::fd::RawFd;

use crate::error::DiskWarmerError;
use crate::progress::ProgressSink;

#[cfg(target_os = "linux")]
const BLKSSZGET: libc::c_ulong = 0x1268;
#[cfg(target_os = "linux")]
const BLKPBSZGET: libc::c_ulong = 0x127b;

const DEFAULT_SECTOR_SIZE: u64 = 512;

/// Immutable physical characteristics of the device, fixed after probe.
#[derive(Debug, Clone, Copy)]
pub struct DeviceParams {
    pub size_bytes: u64,
    pub logical_sector: u64,
    pub physical_sector: u64,
    pub supports_direct_io: bool,
}

impl DeviceParams {
    /// Round `read_size` and `stride` up to a multiple of the physical
    /// sector size when direct I/O is active. In buffered mode, returned
    /// unchanged (spec §4.3).
    pub fn align_io_params(&self, read_size: u64, stride: u64) -> (u64, u64) {
        if !self.supports_direct_io {
            return (read_size, stride);
        }
        (
            align_up(read_size, self.physical_sector),
            align_up(stride, self.physical_sector),
        )
    }
}

fn align_up(value: u64, align: u64) -> u64 {
    if align == 0 {
        return value;
    }
    value.div_ceil(align) * align
}

/// An opened device or image file, ready for direct I/O (or buffered
/// fallback) reads.
pub struct OpenDevice {
    pub fd: RawFd,
    pub params: DeviceParams,
}

impl Drop for OpenDevice {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.fd);
        }
    }
}

/// Open `path` for read-only access, preferring direct I/O. Falls back to
/// buffered mode if the direct-I/O open fails (spec §4.3). Inability to open
/// the path in either mode is fatal.
pub fn open(path: &str, progress: &dyn ProgressSink) -> Result<OpenDevice, DiskWarmerError> {
    warn_if_not_block_device(path, progress);

    let c_path = CString::new(path)
        .map_err(|_| DiskWarmerError::BadArgument("path contains a NUL byte".into()))?;

    let (fd, supports_direct_io) = match open_direct(&c_path) {
        Ok(fd) => (fd, true),
        Err(_) => {
            progress.debug("direct I/O open failed, retrying in buffered mode");
            let fd = open_buffered(&c_path).map_err(|e| DiskWarmerError::DeviceOpen {
                path: path.to_string(),
                source: e,
            })?;
            (fd, false)
        }
    };

    let size = match query_size(fd) {
        Ok(s) if s > 0 => s,
        _ => {
            unsafe {
                libc::close(fd);
            }
            return Err(DiskWarmerError::DeviceProbe(
                "device size query returned non-positive size",
            ));
        }
    };

    let (logical_sector, physical_sector) = query_sector_sizes(fd);

    Ok(OpenDevice {
        fd,
        params: DeviceParams {
            size_bytes: size,
            logical_sector,
            physical_sector,
            supports_direct_io,
        },
    })
}

fn warn_if_not_block_device(path: &str, progress: &dyn ProgressSink) {
    let c_path = match CString::new(path) {
        Ok(p) => p,
        Err(_) => return,
    };
    let mut st: libc::stat = unsafe { std::mem::zeroed() };
    if unsafe { libc::stat(c_path.as_ptr(), &mut st) } != 0 {
        return;
    }
    if st.st_mode & libc::S_IFMT != libc::S_IFBLK {
        progress.warn(&format!(
            "{path} is not a block device; continuing anyway"
        ));
    }
}

#[cfg(target_os = "linux")]
fn open_direct(path: &CString) -> std::io::Result<RawFd> {
    let flags = libc::O_RDONLY | libc::O_DIRECT;
    let fd = unsafe { libc::open(path.as_ptr(), flags) };
    if fd < 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(fd)
}

/// macOS has no O_DIRECT; the nearest equivalent is disabling the buffer
/// cache on the fd after opening via `fcntl(F_NOCACHE)`.
#[cfg(target_os = "macos")]
fn open_direct(path: &CString) -> std::io::Result<RawFd> {
    let fd = unsafe { libc::open(path.as_ptr(), libc::O_RDONLY) };
    if fd < 0 {
        return Err(std::io::Error::last_os_error());
    }
    if unsafe { libc::fcntl(fd, libc::F_NOCACHE, 1) } == -1 {
        let err = std::io::Error::last_os_error();
        unsafe {
            libc::close(fd);
        }
        return Err(err);
    }
    Ok(fd)
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
fn open_direct(path: &CString) -> std::io::Result<RawFd> {
    // No portable direct-I/O mode on this platform; the caller falls back
    // to buffered mode.
    let _ = path;
    Err(std::io::Error::from_raw_os_error(libc::ENOTSUP))
}

fn open_buffered(path: &CString) -> std::io::Result<RawFd> {
    let fd = unsafe { libc::open(path.as_ptr(), libc::O_RDONLY) };
    if fd < 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(fd)
}

fn query_size(fd: RawFd) -> std::io::Result<u64> {
    let size = unsafe { libc::lseek(fd, 0, libc::SEEK_END) };
    if size < 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(size as u64)
}

#[cfg(target_os = "linux")]
fn query_sector_sizes(fd: RawFd) -> (u64, u64) {
    let mut logical: libc::c_int = 0;
    let logical_ok = unsafe { libc::ioctl(fd, BLKSSZGET, &mut logical) } == 0 && logical > 0;
    let logical_size = if logical_ok {
        logical as u64
    } else {
        DEFAULT_SECTOR_SIZE
    };

    let mut physical: libc::c_int = 0;
    let physical_ok = unsafe { libc::ioctl(fd, BLKPBSZGET, &mut physical) } == 0 && physical > 0;
    let physical_size = if physical_ok {
        physical as u64
    } else if logical_ok {
        logical_size
    } else {
        DEFAULT_SECTOR_SIZE
    };

    (logical_size, physical_size)
}

#[cfg(not(target_os = "linux"))]
fn query_sector_sizes(_fd: RawFd) -> (u64, u64) {
    (DEFAULT_SECTOR_SIZE, DEFAULT_SECTOR_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NullSink;
    use std::io::Write;

    #[test]
    fn align_io_params_noop_in_buffered_mode() {
        let params = DeviceParams {
            size_bytes: 1 << 30,
            logical_sector: 512,
            physical_sector: 4096,
            supports_direct_io: false,
        };
        assert_eq!(params.align_io_params(5 * 1024, 7 * 1024), (5 * 1024, 7 * 1024));
    }

    // E6 from spec §8
    #[test]
    fn align_io_params_rounds_up_under_direct_io() {
        let params = DeviceParams {
            size_bytes: 1 << 30,
            logical_sector: 512,
            physical_sector: 4096,
            supports_direct_io: true,
        };
        assert_eq!(
            params.align_io_params(5 * 1024, 7 * 1024),
            (8192, 8192)
        );
    }

    #[test]
    fn open_regular_file_succeeds_in_buffered_mode() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(&vec![0u8; 1 << 20]).unwrap();
        let path = f.path().to_str().unwrap().to_string();
        let sink = NullSink;
        let dev = open(&path, &sink).expect("open should succeed on a regular file");
        assert_eq!(dev.params.size_bytes, 1 << 20);
    }

    #[test]
    fn open_missing_path_is_fatal() {
        let sink = NullSink;
        let err = open("/nonexistent/path/for/diskwarmer/tests", &sink);
        assert!(err.is_err());
    }
}
