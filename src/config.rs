//! Immutable run configuration, shared by both binaries.
//!
//! Grounded on `original_source/disk-warmer/main.c`'s `config_t` /
//! `parse_arguments` and `page-cache-warmer/main.c`'s `config_t` (spec §6's
//! full flag table is the union of the two C programs' option sets). The CLI
//! layer (`src/bin/*.rs`) builds a `Config` from parsed clap arguments and
//! calls `validate()` before anything else runs; the C originals silently
//! clamp bad values, but spec §7 classifies a bad argument as Fatal, so this
//! rejects instead of clamping.

use crate::error::DiskWarmerError;

pub const DEFAULT_READ_SIZE_KB: u64 = 128;
pub const DEFAULT_STRIDE_KB: u64 = 1024;
pub const DEFAULT_QUEUE_DEPTH: u32 = 32;
pub const DEFAULT_MAX_DEPTH: i32 = -1;
pub const DEFAULT_THREADS: u32 = 1;
pub const MAX_THREADS: u32 = 16;
pub const MAX_THROTTLE: u32 = 7;
/// EBS optimal transfer unit; the default merge cap (spec §4.1).
pub const DEFAULT_MERGE_CAP_BYTES: i64 = 16 * 1024 * 1024;

/// Fully resolved, validated configuration for a single run. Built once from
/// CLI arguments and passed by shared reference to every subsystem.
#[derive(Debug, Clone)]
pub struct Config {
    pub directories: Vec<String>,
    /// Present for the block-device variant; `None` for `warm-pages`.
    pub device: Option<String>,

    pub read_size_kb: u64,
    pub stride_kb: u64,
    pub queue_depth: u32,

    /// Block-device variant only.
    pub full_disk: bool,
    pub merge_extents: bool,

    pub syslog: bool,
    pub silent: bool,
    pub debug: bool,

    pub max_depth: i32,
    pub threads: u32,

    pub phase1_throttle: u32,
    pub phase2_throttle: u32,
}

impl Config {
    /// Rejects out-of-range values that the original C tools would have
    /// silently clamped. `directories` being empty, `threads` outside
    /// `1..=16`, and throttle levels outside `0..=7` are all Fatal per
    /// spec §7.
    pub fn validate(&self) -> Result<(), DiskWarmerError> {
        if self.directories.is_empty() {
            return Err(DiskWarmerError::BadArgument(
                "at least one directory is required".into(),
            ));
        }
        if self.threads == 0 || self.threads > MAX_THREADS {
            return Err(DiskWarmerError::BadArgument(format!(
                "--threads must be between 1 and {MAX_THREADS}, got {}",
                self.threads
            )));
        }
        if self.phase1_throttle > MAX_THROTTLE {
            return Err(DiskWarmerError::BadArgument(format!(
                "--phase1-throttle must be between 0 and {MAX_THROTTLE}, got {}",
                self.phase1_throttle
            )));
        }
        if self.phase2_throttle > MAX_THROTTLE {
            return Err(DiskWarmerError::BadArgument(format!(
                "--phase2-throttle must be between 0 and {MAX_THROTTLE}, got {}",
                self.phase2_throttle
            )));
        }
        if self.read_size_kb == 0 {
            return Err(DiskWarmerError::BadArgument(
                "--read-size-kb must be greater than 0".into(),
            ));
        }
        if self.stride_kb == 0 {
            return Err(DiskWarmerError::BadArgument(
                "--stride-kb must be greater than 0".into(),
            ));
        }
        if self.queue_depth == 0 {
            return Err(DiskWarmerError::BadArgument(
                "--queue-depth must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    pub fn read_size_bytes(&self) -> u64 {
        self.read_size_kb * 1024
    }

    pub fn stride_bytes(&self) -> u64 {
        self.stride_kb * 1024
    }

    pub fn merge_cap_bytes(&self) -> i64 {
        if self.merge_extents {
            DEFAULT_MERGE_CAP_BYTES
        } else {
            0
        }
    }
}
